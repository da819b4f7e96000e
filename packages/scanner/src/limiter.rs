//! Request Pacing
//!
//! Keeps a floor between the end of one request and the start of the next, so a
//! long scan stays polite towards the archival API.

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Owns the "last request finished" marker used to pace outgoing requests
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    /// Create a limiter enforcing `min_interval` between requests
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: None,
        }
    }

    /// A limiter that never waits
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Time left before the next request may start
    pub fn remaining(&self) -> Duration {
        match self.last_request {
            Some(last) => (last + self.min_interval).saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }

    /// Block until the interval since the last completed request has elapsed
    pub async fn wait(&self) {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            debug!("Rate limit: waiting {:?} before next request", remaining);
            sleep(remaining).await;
        }
    }

    /// Record that a request has just completed
    pub fn mark(&mut self) {
        self.last_request = Some(Instant::now());
    }
}
