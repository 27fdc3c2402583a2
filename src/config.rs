//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `tally.toml` and deserializes into strongly-typed structs.
//! Secrets (account passwords, bot token) may be referenced by env-var
//! name and are resolved once at startup. Any problem here is fatal:
//! nothing is fetched until the whole configuration validates.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::recovery::RecoveryPolicy;
use crate::types::{AccountCredential, FetchTarget, PaymentInstructions, RevenueMode};

/// Default config file name, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "tally.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub accounts: Vec<AccountConfig>,
    pub portal: PortalConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub revenue: RevenueConfig,
    #[serde(default)]
    pub settlement: Option<SettlementConfig>,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub payment: Option<PaymentConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AccountConfig {
    pub identifier: String,
    /// Inline secret. Prefer `secret_env`.
    #[serde(default)]
    pub secret: Option<String>,
    /// Name of the env var holding the secret.
    #[serde(default)]
    pub secret_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PortalConfig {
    pub url: String,
    /// Where the login form posts to. Defaults to `url`.
    #[serde(default)]
    pub login_url: Option<String>,
    /// Page holding the order table. Defaults to the login response.
    #[serde(default)]
    pub orders_url: Option<String>,
    #[serde(default = "default_username_field")]
    pub username_field: String,
    #[serde(default = "default_password_field")]
    pub password_field: String,
    /// Upper bound on one login-and-render session.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl PortalConfig {
    /// Upper bound on one login-and-render session.
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_username_field() -> String {
    "email".to_string()
}

fn default_password_field() -> String {
    "password".to_string()
}

fn default_wait_timeout_secs() -> u64 {
    15
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    3000
}

fn default_backoff() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            backoff: default_backoff(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RevenueConfig {
    FixedRate {
        #[serde(default)]
        rate_per_order: Decimal,
    },
    AmountColumn {
        amount_column: usize,
    },
}

#[derive(Debug, Deserialize, Clone)]
pub struct SettlementConfig {
    pub path: PathBuf,
    #[serde(default = "default_date_column")]
    pub date_column: String,
    #[serde(default = "default_amount_column")]
    pub amount_column: String,
}

fn default_date_column() -> String {
    "date".to_string()
}

fn default_amount_column() -> String {
    "amount".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("financial_ledger.csv")
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_ledger_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExportConfig {
    #[serde(default)]
    pub orders_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotifyConfig {
    pub telegram_bot_token_env: Option<String>,
    pub telegram_chat_id_env: Option<String>,
    /// Override for the Telegram Bot API base URL.
    #[serde(default)]
    pub api_base: Option<String>,
    /// Also notify when a single account exhausts its retries.
    #[serde(default)]
    pub account_failures: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    pub bank: String,
    pub account: String,
    #[serde(default)]
    pub transfer_url: Option<String>,
}

/// Resolved Telegram credentials.
#[derive(Debug, Clone)]
pub struct TelegramCredentials {
    pub token: String,
    pub chat_id: String,
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Invalid config file: {path}"))?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.accounts.is_empty() {
            bail!("At least one [[accounts]] entry is required");
        }
        for account in &self.accounts {
            if account.identifier.trim().is_empty() {
                bail!("Account identifier must not be empty");
            }
            if account.secret.is_none() && account.secret_env.is_none() {
                bail!(
                    "Account {} needs either `secret` or `secret_env`",
                    account.identifier
                );
            }
        }
        if self.portal.url.trim().is_empty() {
            bail!("portal.url must not be empty");
        }
        if self.portal.wait_timeout_secs == 0 {
            bail!("portal.wait_timeout_secs must be positive");
        }
        if let RevenueConfig::FixedRate { rate_per_order } = &self.revenue {
            if rate_per_order.is_sign_negative() {
                bail!("revenue.rate_per_order must not be negative");
            }
        }
        if self.notify.telegram_bot_token_env.is_some() != self.notify.telegram_chat_id_env.is_some() {
            bail!("notify needs both telegram_bot_token_env and telegram_chat_id_env");
        }
        self.recovery_policy()?;
        Ok(())
    }

    /// Build the retry policy shared by fetching and notification.
    pub fn recovery_policy(&self) -> Result<RecoveryPolicy> {
        RecoveryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.delay_ms),
            self.retry.backoff,
        )
        .context("Invalid [retry] section")
    }

    pub fn revenue_mode(&self) -> RevenueMode {
        match &self.revenue {
            RevenueConfig::FixedRate { rate_per_order } => RevenueMode::FixedRate {
                rate_per_order: *rate_per_order,
            },
            RevenueConfig::AmountColumn { amount_column } => RevenueMode::AmountColumn {
                index: *amount_column,
            },
        }
    }

    /// Resolve every account's secret and pair it with the portal URL.
    pub fn fetch_targets(&self) -> Result<Vec<FetchTarget>> {
        self.accounts
            .iter()
            .map(|a| -> Result<FetchTarget> {
                let secret = match (&a.secret_env, &a.secret) {
                    (Some(env), _) => Self::resolve_env(env)?,
                    (None, Some(inline)) => inline.clone(),
                    (None, None) => bail!("Account {} has no secret", a.identifier),
                };
                Ok(FetchTarget::new(
                    AccountCredential::new(a.identifier.clone(), secret),
                    self.portal.url.clone(),
                ))
            })
            .collect()
    }

    /// Telegram credentials. `Ok(None)` when `[notify]` names no Telegram
    /// env vars; an error when they are named but unset or empty.
    pub fn telegram_credentials(&self) -> Result<Option<TelegramCredentials>> {
        let (token_env, chat_env) = match (
            self.notify.telegram_bot_token_env.as_deref(),
            self.notify.telegram_chat_id_env.as_deref(),
        ) {
            (None, None) => return Ok(None),
            (Some(t), Some(c)) => (t, c),
            _ => bail!("notify needs both telegram_bot_token_env and telegram_chat_id_env"),
        };
        let token = Self::resolve_non_empty(token_env)?;
        let chat_id = Self::resolve_non_empty(chat_env)?;
        Ok(Some(TelegramCredentials { token, chat_id }))
    }

    pub fn payment_instructions(&self) -> Option<PaymentInstructions> {
        self.payment.as_ref().map(|p| PaymentInstructions {
            bank: p.bank.clone(),
            account: p.account.clone(),
            transfer_url: p.transfer_url.clone(),
        })
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    fn resolve_non_empty(env_name: &str) -> Result<String> {
        let value = Self::resolve_env(env_name)?;
        if value.trim().is_empty() {
            bail!("Environment variable is empty: {env_name}");
        }
        Ok(value)
    }
}
