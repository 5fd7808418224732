use hdrhistogram::Histogram;
use std::time::{Duration, Instant};

/// Upper bound of the histogram: 1,000s in nanoseconds.
const MAX_TRACKED_NANOS: u64 = 1_000_000_000_000;

/// Statistics for latency measurements, all in nanoseconds.
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p99: u64,
    pub p999: u64,
}

/// Times the enclosing scope when the measurer decided to sample this step.
pub struct LatencyMeasurerGuard<'a> {
    measurer: &'a mut LatencyMeasurer,
    start: Option<Instant>,
}

impl Drop for LatencyMeasurerGuard<'_> {
    fn drop(&mut self) {
        if let Some(start) = self.start {
            self.measurer.record(start.elapsed());
        }
    }
}

/// Sampled latency recorder backed by an HdrHistogram.
///
/// Only every `sample_rate`-th step is timed, so it can sit on the per-record
/// path of a partition worker.
pub struct LatencyMeasurer {
    histogram: Histogram<u64>,
    sample_rate: u64,
    step: u64,
}

impl LatencyMeasurer {
    pub fn new(sample_rate: u64) -> Self {
        assert!(sample_rate > 0, "sample_rate must be positive");
        // 3 significant figures; the bounds are constant and valid.
        let histogram = Histogram::<u64>::new_with_bounds(1, MAX_TRACKED_NANOS, 3)
            .expect("constant histogram bounds");
        Self {
            histogram,
            sample_rate,
            step: 0,
        }
    }

    /// Records `duration` if this step is sampled.
    pub fn measure(&mut self, duration: Duration) {
        if self.next_step_sampled() {
            self.record(duration);
        }
    }

    pub fn measure_with_guard(&mut self) -> LatencyMeasurerGuard<'_> {
        let start = self.next_step_sampled().then(Instant::now);
        LatencyMeasurerGuard {
            measurer: self,
            start,
        }
    }

    fn next_step_sampled(&mut self) -> bool {
        self.step += 1;
        self.step.is_multiple_of(self.sample_rate)
    }

    fn record(&mut self, duration: Duration) {
        let nanos = (duration.as_nanos() as u64).clamp(1, MAX_TRACKED_NANOS);
        self.histogram.saturating_record(nanos);
    }

    pub fn get_stats(&self) -> LatencyStats {
        let count = self.histogram.len();
        if count == 0 {
            return LatencyStats::default();
        }

        LatencyStats {
            count,
            min: self.histogram.min(),
            max: self.histogram.max(),
            mean: self.histogram.mean(),
            p50: self.histogram.value_at_quantile(0.5),
            p99: self.histogram.value_at_quantile(0.99),
            p999: self.histogram.value_at_quantile(0.999),
        }
    }

    pub fn format_stats(&self) -> String {
        let stats = self.get_stats();
        if stats.count == 0 {
            return "No stats collected yet".into();
        }

        format!(
            "samples={} min={} max={} mean={} p50={} p99={} p999={}",
            stats.count,
            format_duration(stats.min as f64),
            format_duration(stats.max as f64),
            format_duration(stats.mean),
            format_duration(stats.p50 as f64),
            format_duration(stats.p99 as f64),
            format_duration(stats.p999 as f64),
        )
    }
}

fn format_duration(nanos: f64) -> String {
    if nanos < 1000.0 {
        format!("{:.1}ns", nanos)
    } else if nanos < 1_000_000.0 {
        format!("{:.1}us", nanos / 1000.0)
    } else if nanos < 1_000_000_000.0 {
        format!("{:.1}ms", nanos / 1_000_000.0)
    } else {
        format!("{:.2}s", nanos / 1_000_000_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_sampled_steps_are_recorded() {
        let mut measurer = LatencyMeasurer::new(3);
        for _ in 0..9 {
            measurer.measure(Duration::from_micros(5));
        }
        assert_eq!(measurer.get_stats().count, 3);
    }

    #[test]
    fn test_guard_records_on_drop() {
        let mut measurer = LatencyMeasurer::new(1);
        {
            let _guard = measurer.measure_with_guard();
            std::thread::sleep(Duration::from_millis(2));
        }
        let stats = measurer.get_stats();
        assert_eq!(stats.count, 1);
        assert!(stats.min >= 1_900_000);
    }

    #[test]
    fn test_format_without_samples() {
        assert_eq!(LatencyMeasurer::new(1).format_stats(), "No stats collected yet");
        assert_eq!(format_duration(1_500.0), "1.5us");
        assert_eq!(format_duration(2_500_000_000.0), "2.50s");
    }
}
