//! # Sleeper Port
//!
//! The consumer loop paces itself with short sleeps between polls. Those
//! sleeps go through this port so tests can collapse them to nothing and
//! drive the loop at full speed.

use std::time::Duration;

use async_trait::async_trait;

/// Abstract interface for pacing delays (for testability).
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for the given duration.
    async fn sleep(&self, duration: Duration);
}

/// Default sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that returns immediately. Yields once so a tight loop still
/// cooperates with the scheduler.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSleeper;

#[async_trait]
impl Sleeper for NoopSleeper {
    async fn sleep(&self, _duration: Duration) {
        tokio::task::yield_now().await;
    }
}
