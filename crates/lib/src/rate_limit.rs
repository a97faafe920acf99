//! # Recognition Rate Limiter
//!
//! Two knobs, independent of how many tasks are scheduled:
//!
//! - **Permits**: a counting semaphore bounding the number of calls in flight.
//! - **Cooldown**: after a call releases its permit, the calling worker waits a fixed
//!   delay before it can take another one. This smooths bursts even when permits are
//!   free.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub const DEFAULT_RECOGNITION_PERMITS: usize = 2;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    permits: usize,
    cooldown: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RECOGNITION_PERMITS, DEFAULT_COOLDOWN)
    }
}

impl RateLimiter {
    pub fn new(permits: usize, cooldown: Duration) -> Self {
        let permits = permits.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            permits,
            cooldown,
        }
    }

    pub fn permits(&self) -> usize {
        self.permits
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Permits not currently held by a running call.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Runs `call` while holding a permit, then sleeps the cooldown.
    pub async fn throttle<F, T>(&self, call: F) -> T
    where
        F: Future<Output = T>,
    {
        let output = {
            // The semaphore is owned here and never closed.
            let _permit = self.semaphore.acquire().await.ok();
            call.await
        };
        if !self.cooldown.is_zero() {
            tokio::time::sleep(self.cooldown).await;
        }
        output
    }
}
