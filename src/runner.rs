use crate::aggregator::WindowAggregator;
use crate::config::PipelineConfig;
use crate::diagnostics::DiagnosticSink;
use crate::engine::{EngineError, PartitionedEngine, ShutdownPolicy};
use crate::measurement::{SensorMeasurement, WindowSummary};
use crate::parser::RecordParser;
use crate::pipe;
use crate::pipe::{filter, inspect, latency, progress};
use crate::spike::{SpikeFilter, encode_spike};
use crate::transport::{LineSource, RecordSink, SourcePoll, TransportError};
use spdlog::{debug, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

const POLL_TIMEOUT: Duration = Duration::from_millis(100);
const LATENCY_SAMPLE_RATE: u64 = 100;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Counters of one completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub lines_read: u64,
    /// Lines that parsed into a reading and were routed to a partition.
    pub measurements: u64,
    pub spikes: u64,
    /// The run stopped on the shutdown flag rather than on exhausted input.
    pub interrupted: bool,
}

/// The spike detection job: source lines in, encoded spike records out.
///
/// Lines are parsed on the calling thread, then routed by sensor id to
/// `parallelism` partition workers. Each worker runs
/// `progress -> latency(window aggregation) -> spike filter -> log`.
pub struct SpikeDetection {
    config: PipelineConfig,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl SpikeDetection {
    pub fn new(config: PipelineConfig, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        Self { config, diagnostics }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn start_engine(&self) -> PartitionedEngine<SensorMeasurement, WindowSummary> {
        let config = &self.config;
        let spikes = SpikeFilter::new(config.spike_fraction);

        PartitionedEngine::new(
            &config.engine,
            |m: &SensorMeasurement| m.sensor_id as u64,
            |partition| {
                let aggregator = WindowAggregator::new(config.window, config.watermark, self.diagnostics.clone());
                pipe![
                    progress::<SensorMeasurement>(format!("Partition {}", partition), config.report_interval),
                    latency::<SensorMeasurement, WindowSummary, _>(
                        format!("Partition {} Aggregate", partition),
                        config.report_interval,
                        LATENCY_SAMPLE_RATE,
                        aggregator,
                    ),
                    filter(move |s: &WindowSummary| spikes.is_spike(s)),
                    inspect(move |s: &WindowSummary| {
                        debug!(
                            "[Partition {}] Spike: sensor {} window [{}, {}) avg {} current {}",
                            partition, s.sensor_id, s.window_start, s.window_end, s.average_value, s.current_value
                        );
                    }),
                ]
            },
        )
    }

    /// Consumes `source` until it is exhausted or `shutdown` is raised.
    ///
    /// Exhausted input always flushes open windows; on shutdown the configured
    /// [`ShutdownPolicy`] decides. The sink is flushed before returning.
    pub fn run(
        &self,
        source: &mut dyn LineSource,
        sink: &mut dyn RecordSink,
        shutdown: &AtomicBool,
    ) -> Result<RunReport, RunError> {
        let parser = RecordParser::new(self.diagnostics.clone());
        let engine = self.start_engine();
        let mut report = RunReport::default();

        info!(
            "[Runner] Mode {:?}, window {} ms / {} ms, watermark {:?}, spike fraction {}",
            self.config.mode,
            self.config.window.size_millis(),
            self.config.window.slide_millis(),
            self.config.watermark,
            self.config.spike_fraction
        );

        loop {
            if shutdown.load(Ordering::Relaxed) {
                report.interrupted = true;
                break;
            }
            match source.next_line(POLL_TIMEOUT)? {
                SourcePoll::Line(line) => {
                    report.lines_read += 1;
                    // Failures already went to the diagnostics sink.
                    if let Ok(measurement) = parser.parse(&line) {
                        report.measurements += 1;
                        engine.send(measurement)?;
                    }
                }
                SourcePoll::Pending => {}
                SourcePoll::Exhausted => break,
            }
            while let Some(summary) = engine.try_receive() {
                write_spike(sink, &summary, &mut report)?;
            }
        }

        let policy = if report.interrupted {
            self.config.shutdown
        } else {
            ShutdownPolicy::Flush
        };
        info!("[Runner] Input stopped, shutting down with {:?}", policy);
        for summary in engine.shutdown(policy)? {
            write_spike(sink, &summary, &mut report)?;
        }
        sink.flush()?;

        info!(
            "[Runner] Read {} lines, {} readings accepted, {} spikes written",
            report.lines_read, report.measurements, report.spikes
        );
        Ok(report)
    }
}

fn write_spike(sink: &mut dyn RecordSink, summary: &WindowSummary, report: &mut RunReport) -> Result<(), RunError> {
    sink.write_record(&encode_spike(summary))?;
    report.spikes += 1;
    Ok(())
}
