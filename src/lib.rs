mod aggregator;
pub mod config;
pub mod diagnostics;
mod engine;
mod macros;
pub mod measure;
mod measurement;
pub mod parser;
mod pipe;
mod runner;
pub mod snapshot;
mod spike;
mod stage;
pub mod transport;
mod watermark;
mod window;

pub use crate::aggregator::WindowAggregator;
pub use crate::config::{Args, ConfigError, KafkaOptions, Mode, PipelineConfig};
pub use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, LogDiagnostics, MemoryDiagnostics};
pub use crate::engine::{EngineError, EngineOptions, PartitionedEngine, ShutdownPolicy};
pub use crate::measurement::{METRIC_COUNT, SensorMeasurement, WindowSummary};
pub use crate::parser::{ParseError, RecordParser};
pub use crate::pipe::*;
pub use crate::runner::{RunError, RunReport, SpikeDetection};
pub use crate::snapshot::{AggregatorSnapshot, SnapshotError};
pub use crate::spike::{DEFAULT_SPIKE_FRACTION, SPIKE_RECORD_VERSION, SpikeFilter, encode_spike};
pub use crate::stage::{OutputCollector, Pipeline, Stage, StageExt};
pub use crate::watermark::{WatermarkPolicy, WatermarkTracker};
pub use crate::window::{WindowSpec, WindowState};
