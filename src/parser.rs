use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::measurement::{METRIC_COUNT, SensorMeasurement};
use chrono::NaiveDateTime;
use std::sync::Arc;
use thiserror::Error;

/// Tokens per record: date, time, sensor id, device id and four metrics.
pub const FIELD_COUNT: usize = 8;

const FORMAT_FRACTIONAL: &str = "%Y-%m-%d %H:%M:%S%.f";
const FORMAT_SECONDS: &str = "%Y-%m-%d %H:%M:%S";
const METRIC_FIELDS: [&str; METRIC_COUNT] = ["metric1", "metric2", "metric3", "metric4"];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("expected 8 fields, found {found}")]
    FieldCountMismatch { found: usize },
    #[error("unparseable date/time '{value}'")]
    TimestampParseError { value: String },
    #[error("unparseable {field} '{token}'")]
    NumericParseError { field: &'static str, token: String },
}

impl ParseError {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            ParseError::FieldCountMismatch { .. } => DiagnosticKind::FieldCountMismatch,
            ParseError::TimestampParseError { .. } => DiagnosticKind::TimestampParseError,
            ParseError::NumericParseError { .. } => DiagnosticKind::NumericParseError,
        }
    }
}

/// Parses `yyyy-MM-dd HH:mm:ss.SSSSSS` (3 to 6 fractional digits), falling back
/// to `yyyy-MM-dd HH:mm:ss`. Returns epoch milliseconds, UTC.
pub fn parse_timestamp(value: &str) -> Result<i64, ParseError> {
    parse_fractional(value)
        .or_else(|| NaiveDateTime::parse_from_str(value, FORMAT_SECONDS).ok())
        .map(|dt| dt.and_utc().timestamp_millis())
        .ok_or_else(|| ParseError::TimestampParseError {
            value: value.to_string(),
        })
}

fn parse_fractional(value: &str) -> Option<NaiveDateTime> {
    let (_, fraction) = value.rsplit_once('.')?;
    if !(3..=6).contains(&fraction.len()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDateTime::parse_from_str(value, FORMAT_FRACTIONAL).ok()
}

fn parse_int(field: &'static str, token: &str) -> Result<i32, ParseError> {
    token.parse().map_err(|_| ParseError::NumericParseError {
        field,
        token: token.to_string(),
    })
}

fn parse_metric(field: &'static str, token: &str) -> Result<f32, ParseError> {
    match token.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ParseError::NumericParseError {
            field,
            token: token.to_string(),
        }),
    }
}

/// Parses one raw line into a measurement. Pure; safe to call from any thread.
pub fn parse_line(line: &str) -> Result<SensorMeasurement, ParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != FIELD_COUNT {
        return Err(ParseError::FieldCountMismatch {
            found: tokens.len(),
        });
    }

    let event_time_millis = parse_timestamp(&format!("{} {}", tokens[0], tokens[1]))?;
    let sensor_id = parse_int("sensorId", tokens[2])?;
    let device_id = parse_int("deviceId", tokens[3])?;

    let mut metrics = [0f32; METRIC_COUNT];
    for (i, metric) in metrics.iter_mut().enumerate() {
        *metric = parse_metric(METRIC_FIELDS[i], tokens[4 + i])?;
    }

    Ok(SensorMeasurement::new(
        event_time_millis,
        sensor_id,
        device_id,
        metrics,
    ))
}

/// [`parse_line`] plus failure reporting.
pub struct RecordParser {
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl RecordParser {
    pub fn new(diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        Self { diagnostics }
    }

    pub fn parse(&self, line: &str) -> Result<SensorMeasurement, ParseError> {
        parse_line(line).inspect_err(|err| {
            self.diagnostics
                .report(Diagnostic::new(err.kind(), line, err.to_string()));
        })
    }
}
