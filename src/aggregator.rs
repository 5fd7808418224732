use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::measurement::{SensorMeasurement, WindowSummary};
use crate::snapshot::{AggregatorSnapshot, KeySnapshot, WindowSnapshot};
use crate::stage::{OutputCollector, Stage};
use crate::watermark::{WatermarkPolicy, WatermarkTracker};
use crate::window::{WindowSpec, WindowState};
use fxhash::FxHashMap;
use spdlog::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Open windows and event-time progress of one sensor.
struct KeyedWindows {
    watermark: WatermarkTracker,
    /// Keyed by window start.
    windows: BTreeMap<i64, WindowState>,
}

impl KeyedWindows {
    fn new(policy: WatermarkPolicy) -> Self {
        Self {
            watermark: WatermarkTracker::new(policy),
            windows: BTreeMap::new(),
        }
    }

    /// Emits, in start order, every window whose end of validity the watermark has reached.
    fn fire_closed<C>(&mut self, sensor_id: i32, spec: &WindowSpec, collector: &mut C)
    where
        C: OutputCollector<WindowSummary>,
    {
        while let Some(entry) = self.windows.first_entry() {
            let start = *entry.key();
            let end = spec.end_of(start);
            if !self.watermark.is_window_closed(end) {
                break;
            }
            if let Some(summary) = entry.remove().summarize(sensor_id, start, end) {
                collector.push(summary);
            }
        }
    }

    fn drain<C>(&mut self, sensor_id: i32, spec: &WindowSpec, collector: &mut C)
    where
        C: OutputCollector<WindowSummary>,
    {
        for (start, state) in std::mem::take(&mut self.windows) {
            if let Some(summary) = state.summarize(sensor_id, start, spec.end_of(start)) {
                collector.push(summary);
            }
        }
    }
}

/// Keyed sliding-window average.
///
/// Every reading is added to all windows of its sensor that contain its event
/// time. A window is summarized and discarded once its sensor's watermark
/// passes the window end plus the lateness allowance, or on [`Stage::flush`].
/// One aggregator instance owns the state of every key routed to it; it is
/// never shared between threads.
pub struct WindowAggregator {
    spec: WindowSpec,
    policy: WatermarkPolicy,
    keys: FxHashMap<i32, KeyedWindows>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl WindowAggregator {
    pub fn new(spec: WindowSpec, policy: WatermarkPolicy, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            spec,
            policy,
            keys: FxHashMap::default(),
            diagnostics,
        }
    }

    pub fn spec(&self) -> WindowSpec {
        self.spec
    }

    pub fn policy(&self) -> WatermarkPolicy {
        self.policy
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn open_window_count(&self) -> usize {
        self.keys.values().map(|k| k.windows.len()).sum()
    }

    pub fn watermark(&self, sensor_id: i32) -> Option<i64> {
        self.keys.get(&sensor_id).and_then(|k| k.watermark.current())
    }

    /// Open windows and watermarks, ordered by sensor id then window start.
    pub fn snapshot(&self) -> AggregatorSnapshot {
        let mut keys: Vec<KeySnapshot> = self
            .keys
            .iter()
            .map(|(sensor_id, keyed)| KeySnapshot {
                sensor_id: *sensor_id,
                max_event_time: keyed.watermark.max_event_time(),
                windows: keyed
                    .windows
                    .iter()
                    .map(|(start, state)| WindowSnapshot {
                        window_start: *start,
                        window_end: self.spec.end_of(*start),
                        measurements: state.measurements().to_vec(),
                    })
                    .collect(),
            })
            .collect();
        keys.sort_by_key(|k| k.sensor_id);
        AggregatorSnapshot { keys }
    }

    /// Rebuilds an aggregator from a snapshot taken with the same window spec.
    pub fn restore(
        spec: WindowSpec,
        policy: WatermarkPolicy,
        diagnostics: Arc<dyn DiagnosticSink>,
        snapshot: AggregatorSnapshot,
    ) -> Self {
        let mut aggregator = Self::new(spec, policy, diagnostics);
        for key in snapshot.keys {
            let windows = key
                .windows
                .into_iter()
                .map(|w| (w.window_start, WindowState::from_measurements(w.measurements)))
                .collect();
            aggregator.keys.insert(
                key.sensor_id,
                KeyedWindows {
                    watermark: WatermarkTracker::restore(policy, key.max_event_time),
                    windows,
                },
            );
        }
        aggregator
    }

    fn report_late(&self, measurement: &SensorMeasurement, watermark: Option<i64>) {
        self.diagnostics.report(Diagnostic::new(
            DiagnosticKind::LateDataDropped,
            format!("{:?}", measurement),
            format!(
                "sensor {} event time {} is behind watermark {} by more than the {} ms lateness",
                measurement.sensor_id,
                measurement.event_time_millis,
                watermark.unwrap_or_default(),
                self.policy.lateness_millis()
            ),
        ));
    }
}

impl Stage<SensorMeasurement, WindowSummary> for WindowAggregator {
    fn process<C>(&mut self, measurement: SensorMeasurement, collector: &mut C)
    where
        C: OutputCollector<WindowSummary>,
    {
        let sensor_id = measurement.sensor_id;
        let policy = self.policy;
        let keyed = self
            .keys
            .entry(sensor_id)
            .or_insert_with(|| KeyedWindows::new(policy));

        let event_time = measurement.event_time_millis;
        if keyed.watermark.is_expired(event_time) {
            let watermark = keyed.watermark.current();
            self.report_late(&measurement, watermark);
            return;
        }
        if keyed.watermark.is_late(event_time) {
            debug!(
                "[Aggregator] Late reading for sensor {} at {} accepted within lateness",
                sensor_id, event_time
            );
        }

        keyed.watermark.observe(event_time);
        for start in self.spec.starts_containing(event_time) {
            keyed.windows.entry(start).or_default().push(measurement);
        }
        keyed.fire_closed(sensor_id, &self.spec, collector);
    }

    /// Emits every open window as a (possibly partial) summary, keys in ascending order.
    fn flush<C>(&mut self, collector: &mut C)
    where
        C: OutputCollector<WindowSummary>,
    {
        let mut sensor_ids: Vec<i32> = self.keys.keys().copied().collect();
        sensor_ids.sort_unstable();
        for sensor_id in sensor_ids {
            if let Some(mut keyed) = self.keys.remove(&sensor_id) {
                keyed.drain(sensor_id, &self.spec, collector);
            }
        }
    }
}
