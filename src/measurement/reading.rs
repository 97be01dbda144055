//! Typed readings decoded from the instrument's reply buffer.

use serde::Serialize;
use std::collections::BTreeMap;

/// One sample: measured voltage and current plus the instrument's clock.
///
/// `timestamp` is seconds since the clock was zeroed by the reset sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    /// Volts.
    pub voltage: f64,
    /// Amps.
    pub current: f64,
    /// Seconds since the instrument clock reset.
    pub timestamp: f64,
}

/// Ordered readings produced by one trigger.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ReadingBuffer {
    readings: Vec<Reading>,
}

impl ReadingBuffer {
    /// Wrap readings in sample order.
    pub fn new(readings: Vec<Reading>) -> Self {
        Self { readings }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// True when there are no samples.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Readings in sample order.
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// Iterate in sample order.
    pub fn iter(&self) -> std::slice::Iter<'_, Reading> {
        self.readings.iter()
    }

    pub fn voltages(&self) -> Vec<f64> {
        self.readings.iter().map(|r| r.voltage).collect()
    }

    pub fn currents(&self) -> Vec<f64> {
        self.readings.iter().map(|r| r.current).collect()
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.readings.iter().map(|r| r.timestamp).collect()
    }

    /// Column view keyed by signal name.
    pub fn to_columns(&self, names: &ColumnNames) -> BTreeMap<String, Vec<f64>> {
        let mut columns = BTreeMap::new();
        columns.insert(names.timestamp.clone(), self.timestamps());
        columns.insert(names.current.clone(), self.currents());
        columns.insert(names.voltage.clone(), self.voltages());
        columns
    }

    /// Consume the buffer, returning the readings.
    pub fn into_inner(self) -> Vec<Reading> {
        self.readings
    }
}

impl IntoIterator for ReadingBuffer {
    type Item = Reading;
    type IntoIter = std::vec::IntoIter<Reading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.into_iter()
    }
}

impl<'a> IntoIterator for &'a ReadingBuffer {
    type Item = &'a Reading;
    type IntoIter = std::slice::Iter<'a, Reading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.iter()
    }
}

/// Signal names used by [`ReadingBuffer::to_columns`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    /// Instrument timestamp column.
    pub timestamp: String,
    /// Measured current column.
    pub current: String,
    /// Measured voltage column.
    pub voltage: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            timestamp: "timestamp".to_string(),
            current: "Current (A)".to_string(),
            voltage: "Voltage (V)".to_string(),
        }
    }
}

/// Result of a trigger, shaped by how many readings were programmed.
///
/// A fixed-level configuration yields `Single`; a list yields `Series`. The
/// driver decides which from the configured reading count.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Measurement {
    /// One sample from a fixed-level configuration.
    Single {
        /// Amps.
        current: f64,
        /// Volts.
        voltage: f64,
    },
    /// Every sample of a list configuration, in order.
    Series(ReadingBuffer),
}

impl Measurement {
    /// `(current, voltage)` for a single sample, `None` for a series.
    pub fn as_single(&self) -> Option<(f64, f64)> {
        match self {
            Measurement::Single { current, voltage } => Some((*current, *voltage)),
            Measurement::Series(_) => None,
        }
    }

    /// The reading buffer for a series, `None` for a single sample.
    pub fn as_series(&self) -> Option<&ReadingBuffer> {
        match self {
            Measurement::Single { .. } => None,
            Measurement::Series(buffer) => Some(buffer),
        }
    }

    /// Number of samples carried.
    pub fn len(&self) -> usize {
        match self {
            Measurement::Single { .. } => 1,
            Measurement::Series(buffer) => buffer.len(),
        }
    }

    /// Always false; a measurement carries at least one sample.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> ReadingBuffer {
        ReadingBuffer::new(vec![
            Reading {
                voltage: 1.0,
                current: 1e-3,
                timestamp: 0.1,
            },
            Reading {
                voltage: 2.0,
                current: 2e-3,
                timestamp: 0.2,
            },
        ])
    }

    #[test]
    fn test_columns_use_default_names() {
        let columns = buffer().to_columns(&ColumnNames::default());
        assert_eq!(columns["timestamp"], vec![0.1, 0.2]);
        assert_eq!(columns["Current (A)"], vec![1e-3, 2e-3]);
        assert_eq!(columns["Voltage (V)"], vec![1.0, 2.0]);
    }

    #[test]
    fn test_measurement_shape_accessors() {
        let single = Measurement::Single {
            current: 1e-3,
            voltage: 0.5,
        };
        assert_eq!(single.as_single(), Some((1e-3, 0.5)));
        assert!(single.as_series().is_none());

        let series = Measurement::Series(buffer());
        assert_eq!(series.len(), 2);
        assert!(series.as_single().is_none());
    }

    #[test]
    fn test_series_serializes_as_tagged_list() {
        let json = serde_json::to_value(Measurement::Series(buffer())).unwrap();
        assert_eq!(json["kind"], "series");
        assert_eq!(json["data"][1]["voltage"], 2.0);
    }
}
