//! Request pacing for mailbox calls
//!
//! The audit waits on a [`Limiter`] before every list call and every metadata
//! fetch. [`TokenBucket`] is the production implementation: one token per
//! request, refilled continuously at `requests_per_second` up to `burst`.
//! Waiting observes a [`CancellationToken`] so a run can be aborted while it
//! is throttled.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{AuditError, Result};

/// Pacing primitive consulted before each outbound call
#[async_trait]
pub trait Limiter: Send + Sync {
    /// Block until a request may proceed, or fail with
    /// [`AuditError::Cancelled`] once `cancel` fires
    async fn wait(&self, cancel: &CancellationToken) -> Result<()>;
}

#[async_trait]
impl<L: Limiter + ?Sized> Limiter for Arc<L> {
    async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        (**self).wait(cancel).await
    }
}

/// Token bucket shared across clones
#[derive(Debug, Clone)]
pub struct TokenBucket {
    inner: Arc<Mutex<BucketState>>,
}

#[derive(Debug)]
struct BucketState {
    available: f64,
    capacity: f64,
    /// Tokens added per second
    refill_rate: f64,
    last_refill: Instant,
    total_acquired: u64,
    total_waits: u64,
}

impl BucketState {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.available = (self.available + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Take one token, or report how long until one is available
    fn take(&mut self) -> std::result::Result<(), Duration> {
        self.refill();
        if self.available >= 1.0 {
            self.available -= 1.0;
            self.total_acquired += 1;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - self.available) / self.refill_rate))
        }
    }
}

impl TokenBucket {
    /// Bucket starting full with `burst` tokens
    ///
    /// Both values are clamped to at least 1.
    pub fn new(requests_per_second: u32, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            inner: Arc::new(Mutex::new(BucketState {
                available: capacity,
                capacity,
                refill_rate: f64::from(requests_per_second.max(1)),
                last_refill: Instant::now(),
                total_acquired: 0,
                total_waits: 0,
            })),
        }
    }

    pub async fn stats(&self) -> BucketStats {
        let mut state = self.inner.lock().await;
        state.refill();
        BucketStats {
            available: state.available,
            capacity: state.capacity,
            total_acquired: state.total_acquired,
            total_waits: state.total_waits,
        }
    }
}

#[async_trait]
impl Limiter for TokenBucket {
    async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(AuditError::Cancelled("rate limit wait".to_string()));
            }

            let wait_time = {
                let mut state = self.inner.lock().await;
                match state.take() {
                    Ok(()) => return Ok(()),
                    Err(wait_time) => {
                        state.total_waits += 1;
                        wait_time
                    }
                }
            };

            // Sleep outside the lock so clones can keep refilling
            trace!(wait_ms = wait_time.as_millis() as u64, "Rate limit reached, waiting");
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(AuditError::Cancelled("rate limit wait".to_string()));
                }
                _ = tokio::time::sleep(wait_time) => {}
            }
        }
    }
}

/// Point-in-time view of a bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketStats {
    pub available: f64,
    pub capacity: f64,
    pub total_acquired: u64,
    /// Number of times a caller had to sleep for a token
    pub total_waits: u64,
}
