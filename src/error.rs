use crate::record::RecordError;
use crate::sequence::{PoolError, SequenceError};

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("illegal sample rate {0}")]
    IllegalSampleRate(f64),

    #[error("invalid {field} filter {filter:?}")]
    InvalidFilter { field: &'static str, filter: String },

    /// Channels handed to the block locator do not share a sample interval.
    #[error("block interval mismatch: expected {expected}us, got {actual}us")]
    BlockIntervalMismatch { expected: i64, actual: i64 },

    /// An input stream failed. `bytes` is the number of bytes processed before the failure.
    #[error("stream {stream} failed after {bytes} bytes: {message}")]
    Stream {
        stream: usize,
        bytes: u64,
        message: String,
    },

    #[error(transparent)]
    Sequence(#[from] SequenceError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    BlockPool(#[from] PoolError),
}

pub type Result<T> = std::result::Result<T, Error>;
