use super::pool::PoolError;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SequenceError {
    /// Sequences with different sample intervals can never be merged.
    #[error("interval mismatch: {source_interval}us vs {target_interval}us")]
    IntervalMismatch {
        source_interval: i64,
        target_interval: i64,
    },

    /// The sequences are neither adjacent nor overlapping.
    #[error("sequences are not adjacent: {gap}us between them at interval {interval}us")]
    MergeRange { gap: i64, interval: i64 },

    /// The sequences overlap, but their samples do not line up.
    #[error("overlapping sequences are misaligned by {offset}us at interval {interval}us")]
    Timing { offset: i64, interval: i64 },

    #[error("requested {count} samples at index {index} from a sequence of {length}")]
    Range {
        index: usize,
        count: usize,
        length: usize,
    },

    #[error("time window {start}..={end} is outside of sequence data")]
    TimeRange { start: i64, end: i64 },

    #[error("illegal sample rate {0}")]
    IllegalSampleRate(f64),

    #[error(transparent)]
    Pool(#[from] PoolError),
}
