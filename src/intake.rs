//! Record intake.
//!
//! A [RecordReader] cuts a byte stream into whole records. Each chunk is checked for a
//! record signature before the record length is read from the record itself; chunks
//! that fail the check are counted as skipped and reading resumes at the next chunk.
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam::channel::{SendTimeoutError, Sender};
use serde::Serialize;
use tracing::{debug, error, trace};

use crate::bytes::Bytes;
use crate::record::{self, INDICATORS};

/// One physical chunk of a stream handed from intake to the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteBlock {
    data: Option<Vec<u8>>,
    skipped: u64,
    end: bool,
    last: bool,
    stream: usize,
    error: Option<String>,
}

impl ByteBlock {
    /// A whole record, preceded by `skipped` corrupt bytes.
    #[must_use]
    pub fn record(stream: usize, data: Vec<u8>, skipped: u64) -> Self {
        ByteBlock {
            data: Some(data),
            skipped,
            end: false,
            last: false,
            stream,
            error: None,
        }
    }

    /// End of stream sentinel. `last` marks the end of all streams of a run.
    #[must_use]
    pub fn end_of_stream(stream: usize, skipped: u64, last: bool) -> Self {
        ByteBlock {
            data: None,
            skipped,
            end: true,
            last,
            stream,
            error: None,
        }
    }

    /// End of stream sentinel for a stream that failed.
    #[must_use]
    pub fn failed(stream: usize, skipped: u64, message: String) -> Self {
        ByteBlock {
            error: Some(message),
            ..ByteBlock::end_of_stream(stream, skipped, false)
        }
    }

    /// End of run sentinel sent once all streams are done.
    #[must_use]
    pub fn last() -> Self {
        ByteBlock::end_of_stream(usize::MAX, 0, true)
    }

    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    #[must_use]
    pub fn into_data(self) -> Option<Vec<u8>> {
        self.data
    }

    /// Record bytes, not counting skipped bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    #[must_use]
    pub fn is_end(&self) -> bool {
        self.end
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.last
    }

    #[must_use]
    pub fn stream(&self) -> usize {
        self.stream
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Final state of one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamOutcome {
    pub stream: usize,
    /// Bytes read from the stream.
    pub bytes: u64,
    pub records: u64,
    /// Bytes discarded as not belonging to a record.
    pub skipped: u64,
    /// Hex encoded MD5 of all bytes read, if enabled.
    pub digest: Option<String>,
    pub error: Option<String>,
    pub cancelled: bool,
}

const SEND_POLL: Duration = Duration::from_millis(50);

/// Send `block`, waiting for space on the queue while `cancel` is not set. Returns false
/// if the block was not sent.
pub(crate) fn send_block(tx: &Sender<ByteBlock>, mut block: ByteBlock, cancel: &AtomicBool) -> bool {
    loop {
        match tx.send_timeout(block, SEND_POLL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(b)) => {
                if cancel.load(Ordering::Relaxed) {
                    return false;
                }
                block = b;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

/// Reads whole records from a stream.
pub struct RecordReader<R>
where
    R: Read + Send,
{
    bytes: Bytes<R>,
    stream: usize,
    last: bool,
    skipped: u64,
    records: u64,
    header: Vec<u8>,
}

impl<R> RecordReader<R>
where
    R: Read + Send,
{
    /// Size of the chunk checked for a record signature.
    pub const HEADER_SIZE: usize = 256;
    pub const MAX_RECORD_SIZE: usize = 16384;

    pub fn new(reader: R, stream: usize) -> Self {
        RecordReader {
            bytes: Bytes::new(reader),
            stream,
            last: false,
            skipped: 0,
            records: 0,
            header: vec![0u8; Self::HEADER_SIZE],
        }
    }

    /// Keep an MD5 digest of all bytes read.
    #[must_use]
    pub fn with_digest(mut self) -> Self {
        self.bytes = self.bytes.with_digest();
        self
    }

    /// Mark this stream's end of stream sentinel as the end of the run.
    #[must_use]
    pub fn with_last(mut self, last: bool) -> Self {
        self.last = last;
        self
    }

    /// Bytes read so far.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.bytes.offset()
    }

    /// Read the next whole record. Returns `None` at the end of the stream.
    ///
    /// The returned block carries the count of bytes skipped since the previous record.
    ///
    /// # Errors
    /// Any non-EOF I/O error from the underlying reader.
    pub fn next_record(&mut self) -> std::io::Result<Option<ByteBlock>> {
        loop {
            let n = self.bytes.fill(&mut self.header)?;
            if n < Self::HEADER_SIZE {
                self.skipped += n as u64;
                return Ok(None);
            }
            if !INDICATORS.contains(&self.header[6]) {
                trace!(
                    stream = self.stream,
                    offset = self.bytes.offset(),
                    "no record signature, skipping chunk"
                );
                self.skipped += n as u64;
                continue;
            }
            let len = match record::record_length(&self.header) {
                Ok(len) if len <= Self::MAX_RECORD_SIZE => len,
                Ok(len) => {
                    trace!(stream = self.stream, len, "record too long, skipping chunk");
                    self.skipped += n as u64;
                    continue;
                }
                Err(err) => {
                    trace!(stream = self.stream, "skipping chunk: {err}");
                    self.skipped += n as u64;
                    continue;
                }
            };

            let mut data = vec![0u8; len];
            data[..Self::HEADER_SIZE].copy_from_slice(&self.header);
            let rest = self.bytes.fill(&mut data[Self::HEADER_SIZE..])?;
            if rest < len - Self::HEADER_SIZE {
                debug!(stream = self.stream, len, "truncated record at end of stream");
                self.skipped += (Self::HEADER_SIZE + rest) as u64;
                return Ok(None);
            }

            self.records += 1;
            let skipped = std::mem::take(&mut self.skipped);
            return Ok(Some(ByteBlock::record(self.stream, data, skipped)));
        }
    }

    /// Read records onto `tx` until the end of the stream, a failure, or `cancel` is set,
    /// then send an end of stream sentinel.
    ///
    /// I/O errors end the stream; they are logged, carried by the sentinel, and reported
    /// in the outcome.
    pub fn run(mut self, tx: &Sender<ByteBlock>, cancel: &AtomicBool) -> StreamOutcome {
        let mut outcome = StreamOutcome {
            stream: self.stream,
            ..StreamOutcome::default()
        };
        let mut skipped_total = 0;
        let sentinel = loop {
            if cancel.load(Ordering::Relaxed) {
                debug!(stream = self.stream, "intake cancelled");
                outcome.cancelled = true;
                break None;
            }
            match self.next_record() {
                Ok(Some(block)) => {
                    skipped_total += block.skipped();
                    if !send_block(tx, block, cancel) {
                        outcome.cancelled = true;
                        break None;
                    }
                }
                Ok(None) => break Some(ByteBlock::end_of_stream(self.stream, self.skipped, self.last)),
                Err(err) => {
                    error!(stream = self.stream, offset = self.bytes.offset(), "read failed: {err}");
                    outcome.error = Some(err.to_string());
                    break Some(ByteBlock::failed(self.stream, self.skipped, err.to_string()));
                }
            }
        };
        skipped_total += self.skipped;
        if let Some(sentinel) = sentinel {
            if !send_block(tx, sentinel, cancel) {
                outcome.cancelled = true;
            }
        }

        outcome.bytes = self.bytes.offset();
        outcome.records = self.records;
        outcome.skipped = skipped_total;
        outcome.digest = self.bytes.digest();
        debug!(
            stream = outcome.stream,
            bytes = outcome.bytes,
            records = outcome.records,
            skipped = outcome.skipped,
            "stream done"
        );
        outcome
    }
}
