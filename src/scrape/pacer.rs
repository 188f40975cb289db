//! Inter-request pacing
//!
//! The storefront is someone else's production server. Every page request
//! goes through the pacer, which enforces a minimum delay between
//! consecutive requests as a hard sequencing constraint.

use std::time::Duration;
use tokio::time::Instant;

/// Enforces a minimum delay between consecutive requests
#[derive(Debug)]
pub struct RequestPacer {
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RequestPacer {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_request: None,
        }
    }

    /// The configured minimum delay
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Waits until the minimum delay since the previous request has passed,
    /// then records the new request time
    ///
    /// The first call never waits.
    pub async fn pace(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                tokio::time::sleep(self.min_delay - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}
