//! Line sources and record sinks the pipeline reads from and writes to.

mod file;
#[cfg(feature = "kafka")]
mod kafka;

pub use file::{FileSink, FileSource};
#[cfg(feature = "kafka")]
pub use kafka::{DeliveryTracker, KafkaSink, KafkaSource};

use crate::config::{ConfigError, Mode, PipelineConfig};
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "kafka")]
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
    #[cfg(feature = "kafka")]
    #[error("{0} records were not delivered")]
    Undelivered(u64),
}

/// Result of one poll of a [`LineSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePoll {
    Line(String),
    /// Nothing arrived within the timeout; the source is still open.
    Pending,
    /// Bounded input is finished.
    Exhausted,
}

pub trait LineSource {
    fn next_line(&mut self, timeout: Duration) -> Result<SourcePoll, TransportError>;
}

pub trait RecordSink {
    fn write_record(&mut self, record: &str) -> Result<(), TransportError>;
    fn flush(&mut self) -> Result<(), TransportError>;
}

/// Source over lines held in memory; exhausted once they are consumed.
#[derive(Debug, Default)]
pub struct MemorySource {
    lines: VecDeque<String>,
}

impl MemorySource {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl LineSource for MemorySource {
    fn next_line(&mut self, _timeout: Duration) -> Result<SourcePoll, TransportError> {
        Ok(match self.lines.pop_front() {
            Some(line) => SourcePoll::Line(line),
            None => SourcePoll::Exhausted,
        })
    }
}

/// Sink collecting records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<String>,
    pub flushes: usize,
}

impl RecordSink for MemorySink {
    fn write_record(&mut self, record: &str) -> Result<(), TransportError> {
        self.records.push(record.to_string());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.flushes += 1;
        Ok(())
    }
}

pub type Transports = (Box<dyn LineSource>, Box<dyn RecordSink>);

#[derive(Debug, Error)]
pub enum OpenError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to open {what}: {source}")]
    Transport {
        what: String,
        #[source]
        source: TransportError,
    },
}

/// Opens the source and sink selected by `config.mode`.
pub fn open(config: &PipelineConfig) -> Result<Transports, OpenError> {
    match config.mode {
        Mode::File => {
            let source = FileSource::open(&config.input).map_err(|e| OpenError::Transport {
                what: format!("input file {}", config.input),
                source: e.into(),
            })?;
            let sink = FileSink::create(&config.output).map_err(|e| OpenError::Transport {
                what: format!("output file {}", config.output),
                source: e.into(),
            })?;
            Ok((Box::new(source), Box::new(sink)))
        }
        Mode::Kafka => open_kafka(config),
    }
}

#[cfg(feature = "kafka")]
fn open_kafka(config: &PipelineConfig) -> Result<Transports, OpenError> {
    let kafka = config
        .kafka
        .as_ref()
        .ok_or(ConfigError::MissingParameter("kafka-server"))?;
    let source = KafkaSource::connect(kafka, &config.input).map_err(|source| OpenError::Transport {
        what: format!("Kafka topic {}", config.input),
        source,
    })?;
    let sink = KafkaSink::connect(kafka, &config.output).map_err(|source| OpenError::Transport {
        what: format!("Kafka topic {}", config.output),
        source,
    })?;
    Ok((Box::new(source), Box::new(sink)))
}

#[cfg(not(feature = "kafka"))]
fn open_kafka(_config: &PipelineConfig) -> Result<Transports, OpenError> {
    Err(ConfigError::TransportUnavailable {
        mode: "kafka",
        feature: "kafka",
    }
    .into())
}
