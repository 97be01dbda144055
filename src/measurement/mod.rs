//! Measurement records and the reply-buffer decoder.

pub mod parser;
pub mod reading;

pub use parser::{parse_reply, FIELDS_PER_READING};
pub use reading::{ColumnNames, Measurement, Reading, ReadingBuffer};
