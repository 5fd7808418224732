//! Point-in-time copy of a [`crate::WindowAggregator`]'s state and its binary form.
//!
//! Layout (native byte order, unaligned):
//! `SnapshotHeader`, then per key a `KeyHeader` followed by its windows, each a
//! `WindowHeader` followed by `measurement_count` raw [`SensorMeasurement`]s.

use crate::measurement::SensorMeasurement;
use bytemuck::{Pod, Zeroable};
use thiserror::Error;

pub const SNAPSHOT_VERSION: u32 = 1;
const SNAPSHOT_MAGIC: u32 = u32::from_le_bytes(*b"RSPK");

#[derive(Debug, Clone, PartialEq)]
pub struct WindowSnapshot {
    pub window_start: i64,
    pub window_end: i64,
    /// Arrival order.
    pub measurements: Vec<SensorMeasurement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeySnapshot {
    pub sensor_id: i32,
    pub max_event_time: Option<i64>,
    /// Ordered by window start.
    pub windows: Vec<WindowSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatorSnapshot {
    /// Ordered by sensor id.
    pub keys: Vec<KeySnapshot>,
}

#[derive(Debug, Error, PartialEq)]
pub enum SnapshotError {
    #[error("not a window snapshot")]
    BadMagic,
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
    #[error("snapshot truncated at byte {0}")]
    Truncated(usize),
    #[error("{0} trailing bytes after snapshot")]
    TrailingBytes(usize),
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SnapshotHeader {
    magic: u32,
    version: u32,
    key_count: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct KeyHeader {
    sensor_id: i32,
    has_max_event_time: u32,
    max_event_time: i64,
    window_count: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct WindowHeader {
    window_start: i64,
    window_end: i64,
    measurement_count: u64,
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl Reader<'_> {
    fn read<T: Pod>(&mut self) -> Result<T, SnapshotError> {
        let end = self.offset + size_of::<T>();
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(SnapshotError::Truncated(self.offset))?;
        self.offset = end;
        Ok(bytemuck::pod_read_unaligned(slice))
    }
}

impl AggregatorSnapshot {
    pub fn window_count(&self) -> usize {
        self.keys.iter().map(|k| k.windows.len()).sum()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(bytemuck::bytes_of(&SnapshotHeader {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION,
            key_count: self.keys.len() as u64,
        }));
        for key in &self.keys {
            out.extend_from_slice(bytemuck::bytes_of(&KeyHeader {
                sensor_id: key.sensor_id,
                has_max_event_time: key.max_event_time.is_some() as u32,
                max_event_time: key.max_event_time.unwrap_or_default(),
                window_count: key.windows.len() as u64,
            }));
            for window in &key.windows {
                out.extend_from_slice(bytemuck::bytes_of(&WindowHeader {
                    window_start: window.window_start,
                    window_end: window.window_end,
                    measurement_count: window.measurements.len() as u64,
                }));
                out.extend_from_slice(bytemuck::cast_slice(&window.measurements));
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let mut reader = Reader { bytes, offset: 0 };
        let header: SnapshotHeader = reader.read()?;
        if header.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::BadMagic);
        }
        if header.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(header.version));
        }

        let mut keys = Vec::new();
        for _ in 0..header.key_count {
            let key: KeyHeader = reader.read()?;
            let mut windows = Vec::new();
            for _ in 0..key.window_count {
                let window: WindowHeader = reader.read()?;
                let measurements = (0..window.measurement_count)
                    .map(|_| reader.read::<SensorMeasurement>())
                    .collect::<Result<Vec<_>, _>>()?;
                windows.push(WindowSnapshot {
                    window_start: window.window_start,
                    window_end: window.window_end,
                    measurements,
                });
            }
            keys.push(KeySnapshot {
                sensor_id: key.sensor_id,
                max_event_time: (key.has_max_event_time != 0).then_some(key.max_event_time),
                windows,
            });
        }

        let trailing = bytes.len() - reader.offset;
        if trailing != 0 {
            return Err(SnapshotError::TrailingBytes(trailing));
        }
        Ok(AggregatorSnapshot { keys })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AggregatorSnapshot {
        AggregatorSnapshot {
            keys: vec![
                KeySnapshot {
                    sensor_id: 3,
                    max_event_time: Some(7_500),
                    windows: vec![WindowSnapshot {
                        window_start: 5_000,
                        window_end: 10_000,
                        measurements: vec![
                            SensorMeasurement::new(7_500, 3, 9, [1.0, 2.0, 3.0, 4.0]),
                            SensorMeasurement::new(6_000, 3, 9, [5.0, 6.0, 7.0, 8.0]),
                        ],
                    }],
                },
                KeySnapshot {
                    sensor_id: 4,
                    max_event_time: None,
                    windows: vec![],
                },
            ],
        }
    }

    #[test]
    fn test_decode_restores_encoded_state() {
        let snapshot = sample();
        let decoded = AggregatorSnapshot::decode(&snapshot.encode()).unwrap();
        assert_eq!(decoded, snapshot);
        assert_eq!(decoded.window_count(), 1);
    }

    #[test]
    fn test_truncated_snapshot_is_rejected() {
        let bytes = sample().encode();
        let err = AggregatorSnapshot::decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, SnapshotError::Truncated(_)));
    }

    #[test]
    fn test_foreign_bytes_are_rejected() {
        assert_eq!(
            AggregatorSnapshot::decode(&[0u8; 16]).unwrap_err(),
            SnapshotError::BadMagic
        );

        let mut bytes = sample().encode();
        bytes[4] = 9;
        assert_eq!(
            AggregatorSnapshot::decode(&bytes).unwrap_err(),
            SnapshotError::UnsupportedVersion(9)
        );

        bytes[4] = SNAPSHOT_VERSION as u8;
        bytes.push(0);
        assert_eq!(
            AggregatorSnapshot::decode(&bytes).unwrap_err(),
            SnapshotError::TrailingBytes(1)
        );
    }
}
