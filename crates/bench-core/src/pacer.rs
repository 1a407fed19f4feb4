use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Lower bound on a measured window, so a zero-length window still yields a rate.
const MIN_ELAPSED_SECS: f64 = 1e-9;

/// Burst pacer: emit `target_rate` events, then sleep out the rest of the
/// one-second window.
///
/// A window that overruns is not compensated in the next one; the achieved
/// rate is reported instead.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    /// Events per window
    target_rate: u64,
    /// Window length, one second for the benchmark
    window: Duration,
}

impl Pacer {
    pub fn new(target_rate: u64) -> Self {
        Self::with_window(target_rate, Duration::from_secs(1))
    }

    pub fn with_window(target_rate: u64, window: Duration) -> Self {
        Self {
            target_rate,
            window,
        }
    }

    pub fn target_rate(&self) -> u64 {
        self.target_rate
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Time left in the window after spending `elapsed` on the burst. Never negative.
    pub fn residual(&self, elapsed: Duration) -> Duration {
        self.window.saturating_sub(elapsed)
    }

    /// Events per second achieved by emitting `count` events in `elapsed`.
    pub fn achieved_rate(count: u64, elapsed: Duration) -> u64 {
        let secs = elapsed.as_secs_f64().max(MIN_ELAPSED_SECS);
        (count as f64 / secs) as u64
    }

    /// Sleep until the window that began at `window_start` is over.
    /// Returns the time actually slept.
    pub async fn align(&self, window_start: Instant) -> Duration {
        let remaining = self.residual(window_start.elapsed());
        if !remaining.is_zero() {
            sleep(remaining).await;
        }
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_size_is_target_rate() {
        let pacer = Pacer::new(10_000);
        assert_eq!(pacer.target_rate(), 10_000);
        assert_eq!(pacer.window(), Duration::from_secs(1));
    }

    #[test]
    fn test_residual_half_window() {
        let pacer = Pacer::new(10_000);
        let remaining = pacer.residual(Duration::from_millis(500));
        assert_eq!(remaining, Duration::from_millis(500));
    }

    #[test]
    fn test_residual_overrun_is_zero() {
        let pacer = Pacer::new(10_000);
        assert_eq!(pacer.residual(Duration::from_millis(1200)), Duration::ZERO);
        assert_eq!(pacer.residual(Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn test_achieved_rate() {
        assert_eq!(Pacer::achieved_rate(10_000, Duration::from_millis(500)), 20_000);
        assert_eq!(Pacer::achieved_rate(100, Duration::from_secs(2)), 50);
    }

    #[test]
    fn test_achieved_rate_zero_elapsed_is_finite() {
        let rate = Pacer::achieved_rate(5, Duration::ZERO);
        assert!(rate >= 4_999_999_999, "rate: {}", rate);
    }

    #[tokio::test(start_paused = true)]
    async fn test_align_sleeps_out_window() {
        let pacer = Pacer::new(100);
        let start = Instant::now();

        tokio::time::advance(Duration::from_millis(300)).await;
        let slept = pacer.align(start).await;

        assert_eq!(slept, Duration::from_millis(700));
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_align_does_not_sleep_after_overrun() {
        let pacer = Pacer::new(100);
        let start = Instant::now();

        tokio::time::advance(Duration::from_millis(1500)).await;
        let before = Instant::now();
        let slept = pacer.align(start).await;

        assert_eq!(slept, Duration::ZERO);
        assert_eq!(before.elapsed(), Duration::ZERO);
    }
}
