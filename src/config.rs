use crate::engine::{EngineOptions, ShutdownPolicy};
use crate::spike::DEFAULT_SPIKE_FRACTION;
use crate::watermark::WatermarkPolicy;
use crate::window::WindowSpec;
use clap::Parser;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_QUEUE_CAPACITY: usize = 65_536;
const DEFAULT_REPORT_INTERVAL: usize = 1_000_000;
const DEFAULT_GROUP_ID: &str = "spike-detection";
/// Upper bound on `size / slide`, the number of windows a single reading joins.
const MAX_OVERLAPPING_WINDOWS: i64 = 100_000;

/// Fatal startup errors. Raised before any record is read.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unsupported mode '{0}': the only supported modes are \"file\" and \"kafka\"")]
    UnsupportedMode(String),
    #[error("missing required parameter --{0}")]
    MissingParameter(&'static str),
    #[error("invalid value for --{name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("mode '{mode}' needs the '{feature}' cargo feature")]
    TransportUnavailable { mode: &'static str, feature: &'static str },
}

/// Command line of the spike detection job.
///
/// Every option is optional here so that a missing value is reported as a
/// [`ConfigError`] by [`PipelineConfig::from_args`] rather than by clap.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "spike-detection", about = "Sliding-window spike detection over sensor readings")]
pub struct Args {
    /// Transport: "file" or "kafka".
    #[arg(long)]
    pub mode: Option<String>,
    /// Input file path or topic.
    #[arg(long)]
    pub input: Option<String>,
    /// Output file path or topic.
    #[arg(long)]
    pub output: Option<String>,
    /// Number of partition workers.
    #[arg(long)]
    pub parallelism: Option<usize>,
    /// Window length, seconds.
    #[arg(long)]
    pub size: Option<u64>,
    /// Window slide, seconds.
    #[arg(long)]
    pub slide: Option<u64>,
    /// Out-of-order allowance, seconds.
    #[arg(long)]
    pub lateness: Option<u64>,
    /// Relative deviation from the window average that counts as a spike.
    #[arg(long)]
    pub threshold: Option<f64>,
    /// "bounded" or "none". Defaults to "none" for file mode and "bounded" for kafka.
    #[arg(long)]
    pub watermark: Option<String>,
    /// What to do with open windows on Ctrl-C: "flush" (default) or "discard".
    #[arg(long = "on-shutdown")]
    pub on_shutdown: Option<String>,
    #[arg(long = "kafka-server")]
    pub kafka_server: Option<String>,
    #[arg(long = "group-id")]
    pub group_id: Option<String>,
    /// Queue length in front of each partition worker.
    #[arg(long = "queue-capacity")]
    pub queue_capacity: Option<usize>,
    /// Log throughput and latency every N readings per partition.
    #[arg(long = "report-interval")]
    pub report_interval: Option<usize>,
    #[arg(long = "pin-cores")]
    pub pin_cores: bool,
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    File,
    Kafka,
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Mode::File),
            "kafka" => Ok(Mode::Kafka),
            other => Err(ConfigError::UnsupportedMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaOptions {
    pub bootstrap_servers: String,
    pub group_id: String,
}

/// Validated job configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub mode: Mode,
    pub input: String,
    pub output: String,
    pub window: WindowSpec,
    pub watermark: WatermarkPolicy,
    pub spike_fraction: f64,
    pub shutdown: ShutdownPolicy,
    pub engine: EngineOptions,
    pub report_interval: usize,
    pub kafka: Option<KafkaOptions>,
}

fn required<T: Clone>(value: &Option<T>, name: &'static str) -> Result<T, ConfigError> {
    value.clone().ok_or(ConfigError::MissingParameter(name))
}

fn positive<T: Copy + Default + PartialOrd>(value: T, name: &'static str) -> Result<T, ConfigError> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            reason: "must be greater than zero".into(),
        })
    }
}

/// Seconds from the command line as milliseconds, rejecting values that do not fit an `i64`.
fn secs_to_millis(secs: u64, name: &'static str) -> Result<i64, ConfigError> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| s.checked_mul(1000))
        .ok_or_else(|| ConfigError::InvalidParameter {
            name,
            reason: format!("{} seconds is out of range", secs),
        })
}

impl PipelineConfig {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let mode: Mode = required(&args.mode, "mode")?.parse()?;
        let input = required(&args.input, "input")?;
        let output = required(&args.output, "output")?;
        let parallelism = positive(required(&args.parallelism, "parallelism")?, "parallelism")?;
        let size = secs_to_millis(positive(required(&args.size, "size")?, "size")?, "size")?;
        let slide = secs_to_millis(positive(required(&args.slide, "slide")?, "slide")?, "slide")?;
        let lateness = secs_to_millis(required(&args.lateness, "lateness")?, "lateness")?;
        if size / slide > MAX_OVERLAPPING_WINDOWS {
            return Err(ConfigError::InvalidParameter {
                name: "slide",
                reason: format!(
                    "a {} ms slide puts every reading into more than {} windows of {} ms",
                    slide, MAX_OVERLAPPING_WINDOWS, size
                ),
            });
        }

        let spike_fraction = args.threshold.unwrap_or(DEFAULT_SPIKE_FRACTION);
        if !spike_fraction.is_finite() || spike_fraction < 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "threshold",
                reason: format!("{} is not a finite, non-negative fraction", spike_fraction),
            });
        }

        let watermark = match (args.watermark.as_deref(), mode) {
            (Some("bounded"), _) | (None, Mode::Kafka) => WatermarkPolicy::bounded(lateness),
            (Some("none"), _) | (None, Mode::File) => WatermarkPolicy::None,
            (Some(other), _) => {
                return Err(ConfigError::InvalidParameter {
                    name: "watermark",
                    reason: format!("'{}' is neither \"bounded\" nor \"none\"", other),
                });
            }
        };

        let shutdown = match args.on_shutdown.as_deref() {
            None | Some("flush") => ShutdownPolicy::Flush,
            Some("discard") => ShutdownPolicy::Discard,
            Some(other) => {
                return Err(ConfigError::InvalidParameter {
                    name: "on-shutdown",
                    reason: format!("'{}' is neither \"flush\" nor \"discard\"", other),
                });
            }
        };

        let kafka = match mode {
            Mode::Kafka => Some(KafkaOptions {
                bootstrap_servers: required(&args.kafka_server, "kafka-server")?,
                group_id: args.group_id.clone().unwrap_or_else(|| DEFAULT_GROUP_ID.to_string()),
            }),
            Mode::File => None,
        };

        let queue_capacity = positive(
            args.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
            "queue-capacity",
        )?;
        let report_interval = positive(
            args.report_interval.unwrap_or(DEFAULT_REPORT_INTERVAL),
            "report-interval",
        )?;

        Ok(Self {
            mode,
            input,
            output,
            window: WindowSpec::new(size, slide),
            watermark,
            spike_fraction,
            shutdown,
            engine: EngineOptions {
                parallelism,
                queue_capacity,
                pin_cores: args.pin_cores,
            },
            report_interval,
            kafka,
        })
    }
}
