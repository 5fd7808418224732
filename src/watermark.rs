/// How event-time progress is derived from the readings of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkPolicy {
    /// No watermark: windows only close on flush and nothing is dropped as late.
    /// Meant for bounded input.
    None,
    /// Watermark trails the highest event time seen by `lateness_millis`.
    BoundedOutOfOrder { lateness_millis: i64 },
}

impl WatermarkPolicy {
    /// `lateness_millis` must not be negative; [`crate::config::PipelineConfig`]
    /// converts and range-checks the `--lateness` seconds before calling this.
    pub fn bounded(lateness_millis: i64) -> Self {
        assert!(lateness_millis >= 0, "lateness must not be negative");
        WatermarkPolicy::BoundedOutOfOrder { lateness_millis }
    }

    pub fn lateness_millis(&self) -> i64 {
        match self {
            WatermarkPolicy::None => 0,
            WatermarkPolicy::BoundedOutOfOrder { lateness_millis } => *lateness_millis,
        }
    }
}

/// Event-time progress of a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkTracker {
    policy: WatermarkPolicy,
    max_event_time: Option<i64>,
}

impl WatermarkTracker {
    pub fn new(policy: WatermarkPolicy) -> Self {
        Self {
            policy,
            max_event_time: None,
        }
    }

    pub(crate) fn restore(policy: WatermarkPolicy, max_event_time: Option<i64>) -> Self {
        Self {
            policy,
            max_event_time,
        }
    }

    pub fn observe(&mut self, event_time: i64) {
        self.max_event_time = Some(match self.max_event_time {
            Some(max) => max.max(event_time),
            None => event_time,
        });
    }

    pub fn max_event_time(&self) -> Option<i64> {
        self.max_event_time
    }

    /// `max(observed event time) - lateness`; `None` before the first reading
    /// or when the policy has no watermark.
    pub fn current(&self) -> Option<i64> {
        match self.policy {
            WatermarkPolicy::None => None,
            WatermarkPolicy::BoundedOutOfOrder { lateness_millis } => {
                self.max_event_time.map(|max| max.saturating_sub(lateness_millis))
            }
        }
    }

    /// At or behind the watermark. Late readings are still accepted while within lateness.
    pub fn is_late(&self, event_time: i64) -> bool {
        self.current().is_some_and(|wm| event_time <= wm)
    }

    /// Further behind the watermark than the lateness allowance; must be dropped.
    ///
    /// The test is against the watermark alone, not against the windows the
    /// reading would join. With zero lateness the watermark equals the highest
    /// event time seen, so every out-of-order reading is expired even while its
    /// window is still open. A lateness of at least the expected disorder keeps
    /// such readings.
    pub fn is_expired(&self, event_time: i64) -> bool {
        self.current()
            .is_some_and(|wm| event_time < wm.saturating_sub(self.policy.lateness_millis()))
    }

    /// A window is closed once the watermark reaches its end plus the lateness allowance.
    pub fn is_window_closed(&self, window_end: i64) -> bool {
        self.current()
            .is_some_and(|wm| wm >= window_end.saturating_add(self.policy.lateness_millis()))
    }
}
