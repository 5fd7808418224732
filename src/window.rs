use crate::measurement::{SensorMeasurement, WindowSummary};

/// Sliding event-time windows of `size_millis`, starting every `slide_millis`.
///
/// Window starts are aligned to multiples of the slide from the epoch, so
/// every key sees the same window boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    size_millis: i64,
    slide_millis: i64,
}

impl WindowSpec {
    /// Both values must be positive; [`crate::config::PipelineConfig`] validates this.
    pub fn new(size_millis: i64, slide_millis: i64) -> Self {
        assert!(size_millis > 0, "window size must be positive");
        assert!(slide_millis > 0, "window slide must be positive");
        Self {
            size_millis,
            slide_millis,
        }
    }

    pub fn from_secs(size_secs: u32, slide_secs: u32) -> Self {
        Self::new(i64::from(size_secs) * 1000, i64::from(slide_secs) * 1000)
    }

    pub fn size_millis(&self) -> i64 {
        self.size_millis
    }

    pub fn slide_millis(&self) -> i64 {
        self.slide_millis
    }

    /// Start of the latest window containing `timestamp`.
    #[inline(always)]
    pub fn last_start(&self, timestamp: i64) -> i64 {
        timestamp - timestamp.rem_euclid(self.slide_millis)
    }

    #[inline(always)]
    pub fn end_of(&self, window_start: i64) -> i64 {
        window_start.saturating_add(self.size_millis)
    }

    /// Starts of every window containing `timestamp`, latest first.
    pub fn starts_containing(&self, timestamp: i64) -> impl Iterator<Item = i64> + use<> {
        let first = self.last_start(timestamp);
        let lower = timestamp.saturating_sub(self.size_millis);
        let slide = self.slide_millis;
        std::iter::successors(Some(first), move |start| start.checked_sub(slide))
            .take_while(move |start| *start > lower)
    }
}

/// Readings of one sensor that fell into one window, in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowState {
    measurements: Vec<SensorMeasurement>,
}

impl WindowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_measurements(measurements: Vec<SensorMeasurement>) -> Self {
        Self { measurements }
    }

    pub fn push(&mut self, measurement: SensorMeasurement) {
        self.measurements.push(measurement);
    }

    pub fn measurements(&self) -> &[SensorMeasurement] {
        &self.measurements
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// Average over all readings and the value of the latest one by event time.
    /// On equal event times the later arrival wins. `None` for an empty window.
    pub fn summarize(&self, sensor_id: i32, window_start: i64, window_end: i64) -> Option<WindowSummary> {
        let mut latest = self.measurements.first()?;
        let mut sum = 0.0;
        for m in &self.measurements {
            sum += m.value();
            if m.event_time_millis >= latest.event_time_millis {
                latest = m;
            }
        }

        Some(WindowSummary {
            window_start,
            window_end,
            average_value: sum / self.measurements.len() as f64,
            current_value: latest.value(),
            sensor_id,
            measurement_count: self.measurements.len() as u32,
        })
    }
}
