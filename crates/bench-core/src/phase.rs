use std::fmt;
use std::time::Duration;

/// Where a producer run is, by elapsed time since start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Warming,
    Measuring,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Warming => "warming",
            Phase::Measuring => "measuring",
            Phase::Done => "done",
        };
        f.write_str(s)
    }
}

/// Warmup followed by measurement. Emission is identical in both phases;
/// the split only tells downstream readers which samples to discard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSchedule {
    pub warmup: Duration,
    pub measure: Duration,
}

impl RunSchedule {
    pub fn from_secs(warmup_sec: u64, measure_sec: u64) -> Self {
        Self {
            warmup: Duration::from_secs(warmup_sec),
            measure: Duration::from_secs(measure_sec),
        }
    }

    pub fn total(&self) -> Duration {
        self.warmup + self.measure
    }

    pub fn phase_at(&self, elapsed: Duration) -> Phase {
        if elapsed < self.warmup {
            Phase::Warming
        } else if elapsed < self.total() {
            Phase::Measuring
        } else {
            Phase::Done
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_duration() {
        let schedule = RunSchedule::from_secs(20, 120);
        assert_eq!(schedule.total(), Duration::from_secs(140));
    }

    #[test]
    fn test_phase_boundaries() {
        let schedule = RunSchedule::from_secs(5, 10);
        assert_eq!(schedule.phase_at(Duration::ZERO), Phase::Warming);
        assert_eq!(schedule.phase_at(Duration::from_millis(4999)), Phase::Warming);
        assert_eq!(schedule.phase_at(Duration::from_secs(5)), Phase::Measuring);
        assert_eq!(schedule.phase_at(Duration::from_millis(14_999)), Phase::Measuring);
        assert_eq!(schedule.phase_at(Duration::from_secs(15)), Phase::Done);
    }

    #[test]
    fn test_zero_warmup_starts_measuring() {
        let schedule = RunSchedule::from_secs(0, 1);
        assert_eq!(schedule.phase_at(Duration::ZERO), Phase::Measuring);
    }
}
