use std::time::Duration;

use async_trait::async_trait;

/// Suspension primitive the engine awaits between attempts.
#[async_trait]
pub trait Pacer: Send + Sync {
    /// Suspends the current run for `duration`.
    async fn pause(&self, duration: Duration);
}

/// Wall-clock pacing backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, duration: Duration) {
        if duration.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Ignores the requested duration and only yields to the scheduler.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediatePacer;

#[async_trait]
impl Pacer for ImmediatePacer {
    async fn pause(&self, _duration: Duration) {
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn tokio_pacer_sleeps() {
        let start = Instant::now();
        TokioPacer.pause(Duration::from_secs(2)).await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_pacer_skips_duration() {
        let start = Instant::now();
        ImmediatePacer.pause(Duration::from_secs(30)).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
