//! Progress snapshots published on a [FallOffQueue](crate::FallOffQueue).
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// An input stream failed.
    Stream,
    /// Segments with different sample intervals were combined.
    IntervalMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Snapshot of a split run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Bytes processed, including skipped bytes.
    pub bytes: u64,
    /// Set when this snapshot marks the end of the given stream.
    pub stream_done: Option<usize>,
    pub complete: bool,
    pub error: Option<ProgressError>,
}

impl Progress {
    #[must_use]
    pub fn running(bytes: u64) -> Self {
        Progress {
            bytes,
            ..Progress::default()
        }
    }

    #[must_use]
    pub fn stream_done(bytes: u64, stream: usize) -> Self {
        Progress {
            bytes,
            stream_done: Some(stream),
            ..Progress::default()
        }
    }

    #[must_use]
    pub fn complete(bytes: u64) -> Self {
        Progress {
            bytes,
            complete: true,
            ..Progress::default()
        }
    }

    #[must_use]
    pub fn failed(bytes: u64, kind: ErrorKind, message: impl Into<String>) -> Self {
        Progress {
            bytes,
            error: Some(ProgressError {
                kind,
                message: message.into(),
            }),
            ..Progress::default()
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Percent of `total` bytes processed. Never reports 100 until complete.
    #[must_use]
    pub fn percent(&self, total: u64) -> u8 {
        if self.complete {
            return 100;
        }
        if total == 0 {
            return 0;
        }
        (self.bytes.saturating_mul(100) / total).min(99) as u8
    }
}

/// Snapshot of a [BlockLocator](crate::BlockLocator) run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocateProgress {
    pub percent: u8,
    pub complete: bool,
    pub error: Option<ProgressError>,
}

impl LocateProgress {
    /// Progress after `processed` of `total` segments. Capped at 99 until complete.
    #[must_use]
    pub fn running(processed: usize, total: usize) -> Self {
        let percent = if total == 0 {
            0
        } else {
            (processed.saturating_mul(100) / total).min(99) as u8
        };
        LocateProgress {
            percent,
            ..LocateProgress::default()
        }
    }

    #[must_use]
    pub fn complete() -> Self {
        LocateProgress {
            percent: 100,
            complete: true,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        LocateProgress {
            error: Some(ProgressError {
                kind,
                message: message.into(),
            }),
            ..LocateProgress::default()
        }
    }
}
