//! Tick Transactions Client
//!
//! Fetches the transactions of a tick from the archival API. Every request goes
//! through the [`RateLimiter`]; timeouts, connection errors, 429 and 5xx responses
//! are retried with exponential backoff until the retry budget is spent.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::limiter::RateLimiter;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("tickscan/", env!("CARGO_PKG_VERSION"));

/// Base delay of the exponential backoff, doubled on every attempt
pub const BASE_BACKOFF_MS: u64 = 1000;

/// Maximum delay between two attempts
pub const MAX_BACKOFF_MS: u64 = 30000;

/// Upper bound of the random jitter added to each backoff
pub const MAX_JITTER_MS: u64 = 1000;

/// Longest server-requested wait that is honored as given
pub const MAX_RETRY_AFTER_SECS: u64 = 3600;

/// Query parameters of the tick transactions endpoint
pub const TICK_QUERY: &[(&str, &str)] = &[("transfers", "false"), ("approved", "false")];

/// Errors that can occur while fetching from the API
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: StatusCode },

    #[error("Invalid response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Backoff schedule shared by all retryable failure classes
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::config::DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(BASE_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            max_jitter: Duration::from_millis(MAX_JITTER_MS),
        }
    }
}

impl RetryPolicy {
    /// Default schedule with a custom retry budget
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Backoff for the given attempt (1-based), before jitter
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Backoff for the given attempt with random jitter, capped at `max_delay`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let jitter = self.max_jitter.mul_f64(rand::random::<f64>());
        self.base_backoff(attempt)
            .saturating_add(jitter)
            .min(self.max_delay)
    }
}

/// Parse a `Retry-After` header given in (possibly fractional) seconds
///
/// HTTP-date values, negative numbers and values too large for a `Duration` are
/// not honored. Hints above [`MAX_RETRY_AFTER_SECS`] are clamped to it.
pub fn parse_retry_after(value: &HeaderValue) -> Option<Duration> {
    let secs: f64 = value.to_str().ok()?.trim().parse().ok()?;
    let hint = Duration::try_from_secs_f64(secs).ok()?;
    Some(hint.min(Duration::from_secs(MAX_RETRY_AFTER_SECS)))
}

/// Paced JSON fetcher with bounded retries
pub struct HttpFetcher {
    client: reqwest::Client,
    limiter: RateLimiter,
    policy: RetryPolicy,
}

impl HttpFetcher {
    /// Create a fetcher with one reusable connection pool
    pub fn new(
        limiter: RateLimiter,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            limiter,
            policy,
        })
    }

    /// GET `url` with `params` and parse the body as JSON
    ///
    /// Fails only once the retry budget is exhausted, or immediately on a
    /// non-retryable status or an unparseable body.
    pub async fn fetch(&mut self, url: &str, params: &[(&str, &str)]) -> Result<Value, FetchError> {
        let mut attempt = 0u32;

        loop {
            self.limiter.wait().await;
            let result = self.client.get(url).query(params).send().await;

            let response = match result {
                Ok(response) => response,
                Err(source) => {
                    self.limiter.mark();
                    attempt += 1;
                    if attempt > self.policy.max_retries {
                        return Err(FetchError::Network {
                            url: url.to_string(),
                            source,
                        });
                    }
                    let delay = self.policy.backoff_delay(attempt);
                    warn!(
                        "Request error ({}), retrying in {:.1}s for {} (attempt {}/{})",
                        source,
                        delay.as_secs_f64(),
                        url,
                        attempt,
                        self.policy.max_retries
                    );
                    sleep(delay).await;
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                let retry_after = response.headers().get(RETRY_AFTER).and_then(parse_retry_after);
                self.limiter.mark();
                attempt += 1;
                if attempt > self.policy.max_retries {
                    return Err(FetchError::Status {
                        url: url.to_string(),
                        status,
                    });
                }
                let delay = match retry_after {
                    Some(hint) if status == StatusCode::TOO_MANY_REQUESTS => hint,
                    _ => self.policy.backoff_delay(attempt),
                };
                warn!(
                    "[{}] backing off {:.1}s for {} (attempt {}/{})",
                    status.as_u16(),
                    delay.as_secs_f64(),
                    url,
                    attempt,
                    self.policy.max_retries
                );
                sleep(delay).await;
                continue;
            }

            if !status.is_success() {
                self.limiter.mark();
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status,
                });
            }

            let body = response.json::<Value>().await;
            self.limiter.mark();
            return body.map_err(|source| FetchError::Body {
                url: url.to_string(),
                source,
            });
        }
    }
}

/// One element of a tick's `transactions` array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransactionWrapper {
    pub transaction: Option<Transaction>,
    pub timestamp: Option<Value>,
    pub money_flew: Option<bool>,
}

/// Transaction fields the scanner reads; unknown fields are ignored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Transaction {
    pub dest_id: Option<String>,
    pub input_type: Option<i64>,
    pub input_hex: Option<String>,
    pub tx_id: Option<String>,
    pub id: Option<String>,
    pub tick_number: Option<u64>,
}

impl Transaction {
    /// Transaction identifier, preferring `txId` over `id`
    pub fn identifier(&self) -> Option<&str> {
        self.tx_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or_else(|| self.id.as_deref().filter(|id| !id.is_empty()))
    }
}

/// Extract the wrappers from a tick response body
///
/// A missing or non-array `transactions` field yields no wrappers; an element that
/// does not have the expected shape becomes an empty wrapper.
pub fn parse_transactions(body: &Value) -> Vec<TransactionWrapper> {
    match body.get("transactions") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| TransactionWrapper::deserialize(item).unwrap_or_default())
            .collect(),
        _ => Vec::new(),
    }
}

/// Source of per-tick transactions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TickSource {
    async fn tick_transactions(&mut self, tick: u64) -> Result<Vec<TransactionWrapper>, FetchError>;
}

/// Archival API client for tick transactions
pub struct TickClient {
    fetcher: HttpFetcher,
    api_base: String,
}

impl TickClient {
    pub fn new(fetcher: HttpFetcher, api_base: impl Into<String>) -> Self {
        Self {
            fetcher,
            api_base: api_base.into(),
        }
    }

    /// Build a client from the scan configuration
    pub fn from_config(config: &crate::config::ScanConfig) -> Result<Self, FetchError> {
        let fetcher = HttpFetcher::new(
            RateLimiter::new(config.request_interval),
            RetryPolicy::with_max_retries(config.max_retries),
            config.request_timeout,
        )?;
        Ok(Self::new(fetcher, config.api_base.clone()))
    }

    /// URL of the transactions endpoint for `tick`
    pub fn tick_url(&self, tick: u64) -> String {
        format!("{}/v2/ticks/{}/transactions", self.api_base, tick)
    }
}

#[async_trait]
impl TickSource for TickClient {
    async fn tick_transactions(&mut self, tick: u64) -> Result<Vec<TransactionWrapper>, FetchError> {
        let url = self.tick_url(tick);
        let body = self.fetcher.fetch(&url, TICK_QUERY).await?;
        let wrappers = parse_transactions(&body);
        debug!("Tick {}: {} transactions", tick, wrappers.len());
        Ok(wrappers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ==================== RetryPolicy tests ====================

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 6);
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_base_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_backoff(1), Duration::from_secs(2));
        assert_eq!(policy.base_backoff(2), Duration::from_secs(4));
        assert_eq!(policy.base_backoff(3), Duration::from_secs(8));
        assert_eq!(policy.base_backoff(4), Duration::from_secs(16));
    }

    #[test]
    fn test_base_backoff_caps_at_max() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_backoff(5), Duration::from_secs(30));
        assert_eq!(policy.base_backoff(40), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_delay_adds_bounded_jitter() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.backoff_delay(1);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay < Duration::from_secs(3));
        }
    }

    #[test]
    fn test_backoff_delay_never_exceeds_cap() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            assert!(policy.backoff_delay(6) <= Duration::from_secs(30));
        }
    }

    // ==================== parse_retry_after tests ====================

    #[test]
    fn test_parse_retry_after_integer() {
        let value = HeaderValue::from_static("2");
        assert_eq!(parse_retry_after(&value), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_parse_retry_after_fractional() {
        let value = HeaderValue::from_static("0.5");
        assert_eq!(parse_retry_after(&value), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_parse_retry_after_http_date_ignored() {
        let value = HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(parse_retry_after(&value), None);
    }

    #[test]
    fn test_parse_retry_after_negative_ignored() {
        let value = HeaderValue::from_static("-3");
        assert_eq!(parse_retry_after(&value), None);
    }

    #[test]
    fn test_parse_retry_after_out_of_range_ignored() {
        for raw in ["1e20", "inf", "NaN"] {
            let value = HeaderValue::from_static(raw);
            assert_eq!(parse_retry_after(&value), None, "{}", raw);
        }
    }

    #[test]
    fn test_parse_retry_after_clamped() {
        let value = HeaderValue::from_static("1e9");
        assert_eq!(
            parse_retry_after(&value),
            Some(Duration::from_secs(MAX_RETRY_AFTER_SECS))
        );
    }

    // ==================== parse_transactions tests ====================

    #[test]
    fn test_parse_transactions_reads_fields() {
        let body = json!({
            "transactions": [{
                "transaction": {
                    "sourceId": "AAAA",
                    "destId": "EAAAVWRF",
                    "inputType": 1,
                    "inputHex": "00ff",
                    "txId": "abcd",
                    "tickNumber": 17
                },
                "timestamp": "1718000000000",
                "moneyFlew": false
            }]
        });

        let wrappers = parse_transactions(&body);
        assert_eq!(wrappers.len(), 1);
        let tx = wrappers[0].transaction.as_ref().unwrap();
        assert_eq!(tx.dest_id.as_deref(), Some("EAAAVWRF"));
        assert_eq!(tx.input_type, Some(1));
        assert_eq!(tx.input_hex.as_deref(), Some("00ff"));
        assert_eq!(tx.identifier(), Some("abcd"));
        assert_eq!(tx.tick_number, Some(17));
        assert_eq!(wrappers[0].money_flew, Some(false));
    }

    #[test]
    fn test_parse_transactions_missing_field() {
        assert!(parse_transactions(&json!({})).is_empty());
    }

    #[test]
    fn test_parse_transactions_not_an_array() {
        assert!(parse_transactions(&json!({ "transactions": "none" })).is_empty());
        assert!(parse_transactions(&json!({ "transactions": null })).is_empty());
    }

    #[test]
    fn test_parse_transactions_malformed_element_is_empty() {
        let body = json!({ "transactions": [42, { "transaction": null }] });
        let wrappers = parse_transactions(&body);
        assert_eq!(wrappers.len(), 2);
        assert!(wrappers.iter().all(|w| w.transaction.is_none()));
    }

    // ==================== Transaction tests ====================

    #[test]
    fn test_identifier_falls_back_to_id() {
        let tx = Transaction {
            tx_id: Some(String::new()),
            id: Some("fallback".to_string()),
            ..Default::default()
        };
        assert_eq!(tx.identifier(), Some("fallback"));
    }

    #[test]
    fn test_identifier_absent() {
        assert_eq!(Transaction::default().identifier(), None);
    }

    // ==================== TickClient tests ====================

    #[test]
    fn test_tick_url() {
        let fetcher =
            HttpFetcher::new(RateLimiter::unlimited(), RetryPolicy::default(), Duration::from_secs(1))
                .unwrap();
        let client = TickClient::new(fetcher, "https://rpc.example.org");
        assert_eq!(
            client.tick_url(123),
            "https://rpc.example.org/v2/ticks/123/transactions"
        );
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::Status {
            url: "http://x/v2/ticks/1/transactions".to_string(),
            status: StatusCode::NOT_FOUND,
        };
        assert!(err.to_string().contains("404"));
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }
}
