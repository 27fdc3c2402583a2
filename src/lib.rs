//! TALLY: daily order fetch, revenue reconciliation and report dispatch.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod recovery;
pub mod portal;
pub mod notify;
pub mod storage;
pub mod engine;
pub mod report;
