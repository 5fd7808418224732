use bytemuck::{Pod, Zeroable};

/// Number of metric values carried by every reading.
pub const METRIC_COUNT: usize = 4;

/// One validated sensor reading.
///
/// Only [`crate::parser::parse_line`] builds these from text, so every value
/// that reaches the aggregation stage has a real timestamp and finite metrics.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SensorMeasurement {
    /// Event time, epoch milliseconds (UTC).
    pub event_time_millis: i64,
    pub sensor_id: i32,
    pub device_id: i32,
    pub metrics: [f32; METRIC_COUNT],
}

impl SensorMeasurement {
    pub fn new(
        event_time_millis: i64,
        sensor_id: i32,
        device_id: i32,
        metrics: [f32; METRIC_COUNT],
    ) -> Self {
        Self {
            event_time_millis,
            sensor_id,
            device_id,
            metrics,
        }
    }

    /// The metric used for averaging and spike comparison.
    #[inline(always)]
    pub fn value(&self) -> f64 {
        self.metrics[0] as f64
    }
}

/// Aggregated output of one closed window for one sensor.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct WindowSummary {
    pub window_start: i64,
    /// Exclusive.
    pub window_end: i64,
    pub average_value: f64,
    /// Value of the reading with the latest event time in the window.
    pub current_value: f64,
    pub sensor_id: i32,
    pub measurement_count: u32,
}
