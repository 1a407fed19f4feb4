/// Nearest-rank percentile over an ascending slice: index `floor((n - 1) * p)`.
///
/// Returns 0 for an empty slice, meaning "no samples this window".
pub fn percentile(sorted: &[i64], p: f64) -> i64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((sorted.len() - 1) as f64 * p) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Sorts `samples` in place and returns `(p95, p99)`.
pub fn p95_p99(samples: &mut [i64]) -> (i64, i64) {
    if samples.is_empty() {
        return (0, 0);
    }
    samples.sort_unstable();
    (percentile(samples, 0.95), percentile(samples, 0.99))
}

/// Per-window accumulator for accepted events and their latency samples (ms).
///
/// Samples can be negative when clocks are skewed; they are kept as-is.
#[derive(Debug, Default)]
pub struct WindowStats {
    count: u64,
    latencies: Vec<i64>,
}

impl WindowStats {
    pub fn new() -> Self {
        Self::with_capacity(100_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            count: 0,
            latencies: Vec::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, latency_ms: i64) {
        self.count += 1;
        self.latencies.push(latency_ms);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn samples(&self) -> &[i64] {
        &self.latencies
    }

    /// Summarize the current window and start a new one.
    pub fn take(&mut self) -> WindowSnapshot {
        let (p95, p99) = p95_p99(&mut self.latencies);
        let snapshot = WindowSnapshot {
            count: self.count,
            p95_ms: p95,
            p99_ms: p99,
        };
        self.count = 0;
        self.latencies.clear();
        snapshot
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub count: u64,
    pub p95_ms: i64,
    pub p99_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_p95_p99_small_input() {
        let mut xs = vec![5, 1, 3, 2, 4];
        assert_eq!(p95_p99(&mut xs), (4, 4));
        assert_eq!(xs, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_p95_p99_empty() {
        let mut xs: Vec<i64> = Vec::new();
        assert_eq!(p95_p99(&mut xs), (0, 0));
    }

    #[test]
    fn test_single_sample() {
        let mut xs = vec![-7];
        assert_eq!(p95_p99(&mut xs), (-7, -7));
    }

    #[test]
    fn test_percentile_hundred_samples() {
        // 1..=100 -> idx floor(99*0.95)=94 -> 95, floor(99*0.99)=98 -> 99
        let mut xs: Vec<i64> = (1..=100).rev().collect();
        assert_eq!(p95_p99(&mut xs), (95, 99));
    }

    #[test]
    fn test_negative_samples_are_kept() {
        let mut xs = vec![-20, -10, 0, 10];
        xs.sort_unstable();
        assert_eq!(percentile(&xs, 0.0), -20);
        assert_eq!(percentile(&xs, 0.5), -10);
    }

    #[test]
    fn test_window_stats_take_resets() {
        let mut window = WindowStats::with_capacity(8);
        for lat in [5, 1, 3, 2, 4] {
            window.record(lat);
        }
        assert_eq!(window.count(), 5);

        let snap = window.take();
        assert_eq!(
            snap,
            WindowSnapshot {
                count: 5,
                p95_ms: 4,
                p99_ms: 4
            }
        );

        assert_eq!(window.count(), 0);
        assert!(window.samples().is_empty());
        assert_eq!(
            window.take(),
            WindowSnapshot {
                count: 0,
                p95_ms: 0,
                p99_ms: 0
            }
        );
    }
}
