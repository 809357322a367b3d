//! Request pacing and retry backoff shared by all HTTP clients.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;

/// Enforces a minimum interval between requests and hands out retry delays.
#[derive(Clone, Debug)]
pub struct Throttle {
    cooldown: Duration,
    retry_base: Duration,
    max_retries: u32,
    last_call: Arc<Mutex<Option<Instant>>>,
}

impl Throttle {
    pub fn new(cooldown: Duration, max_retries: u32, retry_base: Duration) -> Self {
        Self {
            cooldown,
            retry_base,
            max_retries,
            last_call: Arc::new(Mutex::new(None)),
        }
    }

    /// Waits until the cooldown since the previous request has passed.
    pub async fn hit(&self) {
        let mut guard = self.last_call.lock().await;
        if let Some(last) = *guard {
            let elapsed = last.elapsed();
            if elapsed < self.cooldown {
                sleep(self.cooldown - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt` (1-based). A server supplied
    /// `Retry-After` wins over the exponential schedule.
    pub fn retry_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(delay) = retry_after {
            return delay;
        }
        let exponent = attempt.saturating_sub(1).min(6);
        self.retry_base * 2u32.pow(exponent)
    }
}
