//! Tick Payout Scanner Library
//!
//! This crate walks a range of ticks on a Qubic archival API, decodes the payout
//! lists embedded in QUTIL payout calls and records every payout of a target amount.
//! Progress is checkpointed after each tick so a long scan can be resumed.

pub mod client;
pub mod config;
pub mod decoder;
pub mod filter;
pub mod limiter;
pub mod record;
pub mod scanner;
pub mod store;

// Re-export commonly used types
pub use client::{FetchError, HttpFetcher, RetryPolicy, TickClient, TickSource};
pub use config::ScanConfig;
pub use decoder::{decode_payouts, DecodedPayout};
pub use filter::TransactionFilter;
pub use limiter::RateLimiter;
pub use record::MatchRecord;
pub use scanner::{ScanReport, Scanner};
pub use store::{MatchStore, ProgressState, ProgressStore};
