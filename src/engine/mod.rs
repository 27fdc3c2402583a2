//! Core engine: fetch every account, reconcile, emit the report.

pub mod aggregator;
pub mod emitter;
pub mod pipeline;
pub mod reconciler;
