//! Injected clock used by every poll loop.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Source of time and sleeps.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn elapsed(&self) -> Duration;

    /// Suspends the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock whose origin is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that only moves when slept on. Sleeps return immediately.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ManualClock {
    now: std::sync::Mutex<Duration>,
    sleeps: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl ManualClock {
    /// Number of sleeps taken so far.
    pub fn sleeps(&self) -> usize {
        self.sleeps.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        *self.now.lock().expect("clock lock")
    }

    async fn sleep(&self, duration: Duration) {
        *self.now.lock().expect("clock lock") += duration;
        self.sleeps.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        tokio::task::yield_now().await;
    }
}
