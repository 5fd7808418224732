use crate::measurement::WindowSummary;

pub const DEFAULT_SPIKE_FRACTION: f64 = 0.03;

/// Version tag leading every encoded spike record.
pub const SPIKE_RECORD_VERSION: &str = "v1";

/// Flags summaries whose latest value strays from the window average by more
/// than `fraction` of the average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpikeFilter {
    fraction: f64,
}

impl SpikeFilter {
    pub fn new(fraction: f64) -> Self {
        assert!(
            fraction.is_finite() && fraction >= 0.0,
            "spike fraction must be finite and non-negative"
        );
        Self { fraction }
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    pub fn is_spike(&self, summary: &WindowSummary) -> bool {
        let average = summary.average_value;
        let current = summary.current_value;
        if average == 0.0 {
            // No relative scale around zero: any non-zero reading counts.
            return current != 0.0;
        }
        (current - average).abs() > self.fraction * average.abs()
    }
}

impl Default for SpikeFilter {
    fn default() -> Self {
        Self::new(DEFAULT_SPIKE_FRACTION)
    }
}

/// Wire form of a spike, one line without the trailing newline:
///
/// `v1,<sensor_id>,<window_start_ms>,<window_end_ms>,<average_value>,<current_value>,<measurement_count>`
///
/// Floats use the shortest representation that round-trips.
pub fn encode_spike(summary: &WindowSummary) -> String {
    format!(
        "{},{},{},{},{},{},{}",
        SPIKE_RECORD_VERSION,
        summary.sensor_id,
        summary.window_start,
        summary.window_end,
        summary.average_value,
        summary.current_value,
        summary.measurement_count
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(average_value: f64, current_value: f64) -> WindowSummary {
        WindowSummary {
            window_start: 0,
            window_end: 5_000,
            average_value,
            current_value,
            sensor_id: 1,
            measurement_count: 2,
        }
    }

    #[test]
    fn test_threshold_is_strict() {
        let filter = SpikeFilter::new(0.5);
        assert!(!filter.is_spike(&summary(10.0, 15.0)));
        assert!(filter.is_spike(&summary(10.0, 15.5)));
        assert!(filter.is_spike(&summary(10.0, 4.0)));
    }

    #[test]
    fn test_negative_average_uses_magnitude() {
        let filter = SpikeFilter::default();
        assert!(!filter.is_spike(&summary(-10.0, -10.0)));
        assert!(!filter.is_spike(&summary(-10.0, -10.2)));
        assert!(filter.is_spike(&summary(-10.0, -11.0)));
    }

    #[test]
    fn test_encode_field_order() {
        assert_eq!(encode_spike(&summary(30.0, 50.0)), "v1,1,0,5000,30,50,2");
        assert_eq!(encode_spike(&summary(0.5, -1.25)), "v1,1,0,5000,0.5,-1.25,2");
    }
}
