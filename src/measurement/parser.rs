//! Decoder for the `:READ?` reply buffer.
//!
//! The instrument answers with one comma-separated list of numbers per trigger,
//! five fields per sample:
//!
//! ```text
//! voltage, current, resistance, timestamp, status
//! ```
//!
//! Resistance and status are not surfaced. The stride is fixed by the
//! instrument's output format and is not configurable.

use super::reading::Reading;
use crate::error::ProtocolError;

/// Fields per sample in the reply buffer.
pub const FIELDS_PER_READING: usize = 5;

const VOLTAGE_OFFSET: usize = 0;
const CURRENT_OFFSET: usize = 1;
const TIMESTAMP_OFFSET: usize = 3;

/// Decode `raw` into exactly `expected` readings.
///
/// Checks run in order: every field numeric, field count a multiple of the
/// stride, sample count equal to `expected`.
pub fn parse_reply(raw: &str, expected: usize) -> Result<Vec<Reading>, ProtocolError> {
    let fields = raw
        .trim()
        .split(',')
        .enumerate()
        .map(|(index, field)| {
            field
                .trim()
                .parse::<f64>()
                .map_err(|_| ProtocolError::NonNumericField {
                    index,
                    field: field.to_string(),
                })
        })
        .collect::<Result<Vec<f64>, _>>()?;

    if fields.len() % FIELDS_PER_READING != 0 {
        return Err(ProtocolError::StrideMismatch {
            fields: fields.len(),
            stride: FIELDS_PER_READING,
        });
    }

    let actual = fields.len() / FIELDS_PER_READING;
    if actual != expected {
        return Err(ProtocolError::CountMismatch { expected, actual });
    }

    Ok(fields
        .chunks_exact(FIELDS_PER_READING)
        .map(|sample| Reading {
            voltage: sample[VOLTAGE_OFFSET],
            current: sample[CURRENT_OFFSET],
            timestamp: sample[TIMESTAMP_OFFSET],
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_reading() {
        let readings = parse_reply("0.5,0.001,0,0.0,0", 1).unwrap();
        assert_eq!(
            readings,
            vec![Reading {
                voltage: 0.5,
                current: 0.001,
                timestamp: 0.0,
            }]
        );
    }

    #[test]
    fn test_offsets_preserved_in_order() {
        let n = 4;
        let raw = (0..n)
            .map(|k| {
                let k = k as f64;
                format!(
                    "{},{},9.91E+37,{},{}",
                    1.0 + k,
                    -(k + 1.0) * 1e-3,
                    0.25 * k,
                    65536 + k as i64
                )
            })
            .collect::<Vec<_>>()
            .join(",");

        let readings = parse_reply(&raw, n).unwrap();
        assert_eq!(readings.len(), n);
        for (k, reading) in readings.iter().enumerate() {
            let kf = k as f64;
            assert_eq!(reading.voltage, 1.0 + kf);
            assert_eq!(reading.current, -(kf + 1.0) * 1e-3);
            assert_eq!(reading.timestamp, 0.25 * kf);
        }
    }

    #[test]
    fn test_scientific_notation_and_terminator() {
        let readings = parse_reply("+1.234560E+00,+1.000000E-03,+9.910000E+37,+2.5E-01,+1.9E+04\n", 1)
            .unwrap();
        assert_eq!(readings[0].voltage, 1.23456);
        assert_eq!(readings[0].current, 1e-3);
        assert_eq!(readings[0].timestamp, 0.25);
    }

    #[test]
    fn test_non_numeric_field() {
        let err = parse_reply("0.5,0.001,OVER,0.0,0", 1).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::NonNumericField {
                index: 2,
                field: "OVER".to_string(),
            }
        );
    }

    #[test]
    fn test_empty_reply_is_non_numeric() {
        assert!(matches!(
            parse_reply("", 1),
            Err(ProtocolError::NonNumericField { index: 0, .. })
        ));
    }

    #[test]
    fn test_stride_mismatch() {
        assert_eq!(
            parse_reply("0.5,0.001,0,0.0,0,1.0", 1).unwrap_err(),
            ProtocolError::StrideMismatch {
                fields: 6,
                stride: FIELDS_PER_READING,
            }
        );
    }

    #[test]
    fn test_count_mismatch() {
        assert_eq!(
            parse_reply("0.5,0.001,0,0.0,0,0.6,0.002,0,0.1,0", 1).unwrap_err(),
            ProtocolError::CountMismatch {
                expected: 1,
                actual: 2,
            }
        );
        assert_eq!(
            parse_reply("0.5,0.001,0,0.0,0", 3).unwrap_err(),
            ProtocolError::CountMismatch {
                expected: 3,
                actual: 1,
            }
        );
    }
}
