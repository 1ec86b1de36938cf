use thiserror::Error;

use crate::processor::row::InputRow;

pub mod aggregators;
pub mod composite_key;
pub mod filter;
pub mod grouping;
pub mod layout;
pub mod numeric;
pub mod output;
pub mod pipeline;
pub mod projection;
pub mod row;
pub mod spec;
pub mod spec_parser;
pub mod storage;
pub mod stream_processor;
pub mod varint;

/// Error type used across the crate
///
/// Every variant is fatal: the CLI prints it and exits with a non-zero status.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed spec text; `position` is the byte offset of the offending token.
    #[error("Parse error at column {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("Should never happen (tm): {0}")]
    Logic(String),

    #[error("Too much state: {0} bytes of aggregator state per group")]
    TooMuchState(usize),

    #[error("Failed to parse {kind}: {value:?}")]
    Value { kind: &'static str, value: String },

    #[error("No data to aggregate")]
    NoData,

    #[error("Key too long, length={0}")]
    KeyTooLong(usize),

    #[error("Invalid filter regex: {0}")]
    Regex(#[from] regex::Error),
}

impl ProcessorError {
    pub(crate) fn logic(reason: impl Into<String>) -> Self {
        ProcessorError::Logic(reason.into())
    }

    pub(crate) fn value(kind: &'static str, raw: &[u8]) -> Self {
        ProcessorError::Value {
            kind,
            value: String::from_utf8_lossy(raw).into_owned(),
        }
    }
}

/// A grouping key: which input field to read and which output column it lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key {
    pub field: usize,
    pub column: usize,
}

impl Key {
    pub fn new(field: usize, column: usize) -> Self {
        Key { field, column }
    }
}

/// One compiled pipeline stage.
///
/// `push_row` is called once per input row in input order, `finish` exactly
/// once after the last row. Pushing after `finish` never happens.
pub trait Table {
    fn push_row(&mut self, row: &InputRow<'_>) -> Result<(), ProcessorError>;

    fn finish(&mut self) -> Result<(), ProcessorError>;
}
