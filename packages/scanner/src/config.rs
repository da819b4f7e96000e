//! Scan Configuration
//!
//! Holds every tunable of a scan run. Values start from compiled defaults and may be
//! overridden through environment variables; there are no command-line flags.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default archival API base URL
pub const DEFAULT_API_BASE: &str = "https://rpc.qubic.org";

/// Default explorer base URL used for match links
pub const DEFAULT_EXPLORER_BASE: &str = "https://explorer.qubic.org";

/// QUTIL contract identifier; payout calls are sent to this destination
pub const DEFAULT_CONTRACT_ID: &str =
    "EAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAVWRF";

/// Minimum pause between two requests, in seconds
pub const DEFAULT_REQUEST_INTERVAL_SECS: f64 = 0.4;

/// Per-request HTTP timeout, in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

/// Retries allowed for transient failures before a fetch gives up
pub const DEFAULT_MAX_RETRIES: u32 = 6;

pub const DEFAULT_STATE_FILE: &str = "progress.json";
pub const DEFAULT_RESULTS_FILE: &str = "matches.json";

/// First tick of the scanned range
pub const DEFAULT_START_TICK: u64 = 31_500_000;

/// Last tick of the scanned range (inclusive)
pub const DEFAULT_END_TICK: u64 = 31_600_000;

/// Payout amount a record must carry to be reported
pub const DEFAULT_TARGET_AMOUNT: u64 = 1_000_000;

/// Emit a progress line every this many ticks
pub const DEFAULT_PROGRESS_EVERY: u64 = 100;

/// Errors raised while building a configuration
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration of a scan run
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Archival API base URL, without trailing slash
    pub api_base: String,
    /// Explorer base URL, without trailing slash
    pub explorer_base: String,
    /// Only transactions sent to this identifier are inspected; `None` scans all
    pub contract_id: Option<String>,
    /// Floor between the end of one request and the start of the next
    pub request_interval: Duration,
    /// HTTP timeout for a single request
    pub request_timeout: Duration,
    /// Retry budget for network errors, 429 and 5xx responses
    pub max_retries: u32,
    /// Progress checkpoint path
    pub state_file: PathBuf,
    /// Match log path
    pub results_file: PathBuf,
    pub start_tick: u64,
    /// Inclusive
    pub end_tick: u64,
    pub target_amount: u64,
    pub progress_every: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            explorer_base: DEFAULT_EXPLORER_BASE.to_string(),
            contract_id: Some(DEFAULT_CONTRACT_ID.to_string()),
            request_interval: Duration::from_secs_f64(DEFAULT_REQUEST_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            results_file: PathBuf::from(DEFAULT_RESULTS_FILE),
            start_tick: DEFAULT_START_TICK,
            end_tick: DEFAULT_END_TICK,
            target_amount: DEFAULT_TARGET_AMOUNT,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

impl ScanConfig {
    /// Build a configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    ///
    /// Unset variables keep their defaults. `QUTIL_DEST_ID` set to an empty string
    /// disables destination filtering.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("QUBIC_RPC_URL") {
            config.api_base = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(url) = lookup("QUBIC_EXPLORER_URL") {
            config.explorer_base = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(id) = lookup("QUTIL_DEST_ID") {
            let id = id.trim();
            config.contract_id = (!id.is_empty()).then(|| id.to_string());
        }
        if let Some(secs) = parse_var::<f64, _>(&lookup, "REQ_INTERVAL")? {
            config.request_interval =
                Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidValue {
                    var: "REQ_INTERVAL",
                    value: secs.to_string(),
                })?;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "REQUEST_TIMEOUT")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_var(&lookup, "MAX_RETRIES")? {
            config.max_retries = retries;
        }
        if let Some(path) = lookup("STATE_FILE") {
            config.state_file = PathBuf::from(expand_path(&path));
        }
        if let Some(path) = lookup("RESULTS_FILE") {
            config.results_file = PathBuf::from(expand_path(&path));
        }
        if let Some(tick) = parse_var(&lookup, "START_TICK")? {
            config.start_tick = tick;
        }
        if let Some(tick) = parse_var(&lookup, "END_TICK")? {
            config.end_tick = tick;
        }
        if let Some(amount) = parse_var(&lookup, "TARGET_AMOUNT")? {
            config.target_amount = amount;
        }
        if let Some(every) = parse_var(&lookup, "PROGRESS_EVERY")? {
            config.progress_every = every;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the scanner cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base.is_empty() {
            return Err(ConfigError::Invalid("API base URL cannot be empty".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid("request timeout must be positive".to_string()));
        }
        if self.end_tick == u64::MAX {
            return Err(ConfigError::Invalid(format!("end tick must be below {}", u64::MAX)));
        }
        Ok(())
    }

    /// Number of ticks in the configured range, zero when the range is empty
    pub fn total_ticks(&self) -> u64 {
        if self.start_tick > self.end_tick {
            0
        } else {
            (self.end_tick - self.start_tick).saturating_add(1)
        }
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
    }
}

/// Expand ~ to home directory in path
pub fn expand_path(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
