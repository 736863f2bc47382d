//! Token-bucket rate limiting shared across concurrent items.
//!
//! One bucket exists per external provider and is shared by every task that
//! talks to it, so the aggregate request rate stays within the limit no matter
//! how many items run at once.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Pure token-bucket accounting, driven by caller-supplied timestamps.
#[derive(Debug, Clone)]
pub struct BucketState {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_secs: Option<f64>,
}

impl BucketState {
    /// A bucket that starts full.
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        let capacity = capacity.max(1.0);
        Self {
            capacity,
            refill_per_sec,
            tokens: capacity,
            last_secs: None,
        }
    }

    /// Take one token at time `now_secs`.
    ///
    /// Returns `Err(wait_secs)` with the time until a token is available.
    pub fn try_take(&mut self, now_secs: f64) -> Result<(), f64> {
        if let Some(last) = self.last_secs {
            let elapsed = (now_secs - last).max(0.0);
            self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        }
        self.last_secs = Some(now_secs);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err((1.0 - self.tokens) / self.refill_per_sec)
        }
    }

    pub fn available(&self) -> f64 {
        self.tokens
    }
}

/// Async token bucket. A non-positive rate disables limiting.
#[derive(Debug)]
pub struct TokenBucket {
    name: String,
    epoch: Instant,
    state: Option<Mutex<BucketState>>,
}

impl TokenBucket {
    /// Bucket allowing `per_sec` sustained requests with a burst of one second's worth.
    pub fn per_second(name: impl Into<String>, per_sec: f64) -> Self {
        let state = (per_sec > 0.0 && per_sec.is_finite())
            .then(|| Mutex::new(BucketState::new(per_sec.ceil(), per_sec)));
        Self {
            name: name.into(),
            epoch: Instant::now(),
            state,
        }
    }

    pub fn unlimited(name: impl Into<String>) -> Self {
        Self::per_second(name, 0.0)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait until a request may be issued.
    ///
    /// The lock is held while sleeping so waiters are served in arrival order.
    pub async fn acquire(&self) {
        let Some(state) = &self.state else {
            return;
        };
        let mut bucket = state.lock().await;
        loop {
            match bucket.try_take(self.epoch.elapsed().as_secs_f64()) {
                Ok(()) => return,
                Err(wait_secs) => {
                    tracing::debug!(bucket = %self.name, wait_secs, "Rate limiting");
                    tokio::time::sleep(Duration::from_secs_f64(wait_secs.max(0.001))).await;
                }
            }
        }
    }
}
