//! Record classification and reassembly.
//!
//! The [Classifier] routes each record to a working [Sequence] for its [Key]. A working
//! sequence is closed whenever a record does not continue it, i.e., after a gap or an
//! overlap, and a new one is started. At the end of the run the closed sequences of each
//! key are sorted and merged back together wherever they are adjacent or overlap.
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, span, trace, warn, Level};

use crate::error::{Error, Result};
use crate::filter::Filters;
use crate::intake::{ByteBlock, StreamOutcome};
use crate::key::{location_code, Key};
use crate::progress::{ErrorKind, Progress};
use crate::queue::FallOffQueue;
use crate::rate::{lookup_interval, Tolerance};
use crate::record::{CalibrationMarker, Record};
use crate::sequence::{BlockPool, Sequence, SequenceError};
use crate::time::format_timestamp;

/// Counters describing a split run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SplitStats {
    /// Bytes processed, including skipped bytes.
    pub bytes: u64,
    /// Bytes skipped by intake as not belonging to a record.
    pub skipped_bytes: u64,
    /// Records routed to a track.
    pub kept: u64,
    /// Records not routed to a track, for any reason.
    pub discarded: u64,
    /// Records rejected by a filter.
    pub filtered: u64,
    /// Records without samples.
    pub heartbeats: u64,
    /// Records with a sample rate not in the rate table.
    pub illegal_rates: u64,
    /// Records whose header could not be decoded.
    pub corrupt: u64,
    /// Kept records whose samples could not be decoded.
    pub decode_failures: u64,
    /// Working sequences closed because of a gap.
    pub gaps: u64,
    /// Working sequences closed because of an overlap.
    pub overlaps: u64,
    /// Misaligned overlaps resolved by trimming during reconciliation.
    pub timing_corrections: u64,
    /// Records kept per key, keyed by the key's display form.
    pub records: BTreeMap<String, u64>,
}

/// Output of a split run.
#[derive(Debug, Default)]
pub struct SplitResult {
    /// Per key, ordered and non-overlapping segments.
    pub tracks: BTreeMap<Key, Vec<Sequence>>,
    /// Per key, timing quality of every record carrying a blockette 1001.
    pub timing_quality: BTreeMap<Key, Vec<u8>>,
    pub calibrations: BTreeMap<Key, Vec<CalibrationMarker>>,
    pub streams: Vec<StreamOutcome>,
    pub stats: SplitStats,
}

impl SplitResult {
    #[must_use]
    pub fn track(&self, key: &Key) -> Option<&[Sequence]> {
        self.tracks.get(key).map(Vec::as_slice)
    }

    /// Digest of stream `stream`, if computed.
    #[must_use]
    pub fn digest(&self, stream: usize) -> Option<&str> {
        self.streams
            .iter()
            .find(|s| s.stream == stream)
            .and_then(|s| s.digest.as_deref())
    }
}

type TrackId = usize;

struct Track {
    key: Key,
    working: Option<Sequence>,
    closed: Vec<Sequence>,
    timing_quality: Vec<u8>,
    calibrations: Vec<CalibrationMarker>,
    records: u64,
}

impl Track {
    fn new(key: Key) -> Self {
        Track {
            key,
            working: None,
            closed: Vec::new(),
            timing_quality: Vec::new(),
            calibrations: Vec::new(),
            records: 0,
        }
    }

    fn close_working(&mut self) {
        if let Some(seq) = self.working.take() {
            if !seq.is_empty() {
                self.closed.push(seq);
            }
        }
    }
}

/// Outcome of processing one [ByteBlock].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The end of run sentinel was seen.
    Stop,
}

/// Demultiplexes records into per-[Key] tracks.
pub struct Classifier {
    filters: Filters,
    pool: BlockPool,
    tolerance: Tolerance,
    tracks: Vec<Track>,
    index: HashMap<Key, TrackId>,
    stats: SplitStats,
    failure: Option<(usize, u64, String)>,
}

impl Classifier {
    const RECV_POLL: Duration = Duration::from_millis(50);

    #[must_use]
    pub fn new(filters: Filters, pool: BlockPool, tolerance: Tolerance) -> Self {
        Classifier {
            filters,
            pool,
            tolerance,
            tracks: Vec::new(),
            index: HashMap::new(),
            stats: SplitStats::default(),
            failure: None,
        }
    }

    #[must_use]
    pub fn stats(&self) -> &SplitStats {
        &self.stats
    }

    /// Bytes processed so far.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.stats.bytes
    }

    fn track_id(&mut self, key: Key) -> TrackId {
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = self.tracks.len();
        debug!(key = %key, "new track");
        self.tracks.push(Track::new(key.clone()));
        self.index.insert(key, id);
        id
    }

    /// Process one block from intake.
    pub fn process(&mut self, block: ByteBlock) -> Flow {
        self.stats.bytes += block.len() as u64 + block.skipped();
        self.stats.skipped_bytes += block.skipped();

        if block.is_end() {
            if let Some(message) = block.error() {
                warn!(stream = block.stream(), "stream failed: {message}");
                if self.failure.is_none() {
                    self.failure = Some((block.stream(), self.stats.bytes, message.to_string()));
                }
            } else if !block.is_last() {
                debug!(stream = block.stream(), bytes = self.stats.bytes, "stream done");
            }
            return if block.is_last() {
                Flow::Stop
            } else {
                Flow::Continue
            };
        }
        if let Some(data) = block.into_data() {
            self.process_record(data);
        }
        Flow::Continue
    }

    /// Decode, filter and route a single record.
    pub fn process_record(&mut self, data: Vec<u8>) {
        let record = match Record::decode(data) {
            Ok(record) => record,
            Err(err) => {
                trace!("discarding corrupt record: {err}");
                self.stats.corrupt += 1;
                self.stats.discarded += 1;
                return;
            }
        };
        let hdr = record.header();
        if record.is_heartbeat() {
            trace!(
                seq = %hdr.sequence_number,
                channel = %hdr.channel,
                "skipping record without samples"
            );
            self.stats.heartbeats += 1;
            self.stats.discarded += 1;
            return;
        }
        let location = location_code(&hdr.location);
        if let Some(field) = self
            .filters
            .rejects(&hdr.network, &hdr.station, location, &hdr.channel)
        {
            trace!(
                %field,
                network = %hdr.network,
                station = %hdr.station,
                location,
                channel = %hdr.channel,
                "filtered"
            );
            self.stats.filtered += 1;
            self.stats.discarded += 1;
            return;
        }
        let rate = record.sample_rate();
        let Some(interval) = lookup_interval(rate) else {
            debug!(
                rate,
                seq = %hdr.sequence_number,
                channel = %hdr.channel,
                "illegal sample rate"
            );
            self.stats.illegal_rates += 1;
            self.stats.discarded += 1;
            return;
        };

        let key = Key::new(&hdr.network, &hdr.station, location, &hdr.channel, interval);
        self.stats.kept += 1;
        *self.stats.records.entry(key.to_string()).or_default() += 1;

        let id = self.track_id(key);
        let slack = self.tolerance.slack(interval);
        let start = record.start_time();
        let track = &mut self.tracks[id];
        track.records += 1;

        if let Some(working) = track.working.as_mut() {
            if working.is_empty() {
                working.set_start_time(start);
            } else {
                let delta = start - working.end_time();
                if delta > interval + slack {
                    debug!(
                        key = %track.key,
                        gap = delta - interval,
                        at = %format_timestamp(start),
                        "gap"
                    );
                    self.stats.gaps += 1;
                    track.close_working();
                } else if delta < interval - slack {
                    debug!(
                        key = %track.key,
                        seq = %hdr.sequence_number,
                        overlap = interval - delta,
                        at = %format_timestamp(start),
                        "overlap"
                    );
                    self.stats.overlaps += 1;
                    track.close_working();
                }
            }
        }
        if track.working.is_none() {
            match Sequence::with_rate(self.pool.clone(), start, rate) {
                Ok(seq) => track.working = Some(seq),
                Err(err) => {
                    warn!(key = %track.key, "failed to start sequence: {err}");
                    return;
                }
            }
        }
        let Some(working) = track.working.as_mut() else {
            return;
        };

        match record.samples() {
            Ok(samples) => {
                if let Err(err) = working.extend(&samples, 0, samples.len()) {
                    warn!(key = %track.key, "failed to extend sequence: {err}");
                }
            }
            Err(err) => {
                warn!(
                    key = %track.key,
                    seq = %hdr.sequence_number,
                    "skipping samples: {err}"
                );
                self.stats.decode_failures += 1;
            }
        }

        if let Some(quality) = record.timing_quality() {
            track.timing_quality.push(quality);
        }
        track.calibrations.extend(record.calibrations().cloned());
    }

    /// Close all working sequences and reconcile every track.
    ///
    /// # Errors
    /// [Error::Sequence] if a track holds sequences with different intervals.
    pub fn finish(mut self) -> Result<SplitResult> {
        for track in &mut self.tracks {
            track.close_working();
        }
        let tolerance = self.tolerance;
        let reconciled: Vec<_> = self
            .tracks
            .into_par_iter()
            .map(|track| {
                let zult = reconcile(&track.key, track.closed, tolerance);
                (track.key, track.timing_quality, track.calibrations, zult)
            })
            .collect();

        let mut result = SplitResult {
            stats: self.stats,
            ..SplitResult::default()
        };
        for (key, timing_quality, calibrations, zult) in reconciled {
            let (segments, corrections) = zult?;
            result.stats.timing_corrections += corrections;
            if !timing_quality.is_empty() {
                result.timing_quality.insert(key.clone(), timing_quality);
            }
            if !calibrations.is_empty() {
                result.calibrations.insert(key.clone(), calibrations);
            }
            if !segments.is_empty() {
                result.tracks.insert(key, segments);
            }
        }
        info!(
            kept = result.stats.kept,
            discarded = result.stats.discarded,
            tracks = result.tracks.len(),
            "split done"
        );
        Ok(result)
    }

    /// Process blocks from `blocks` until the end of run sentinel, then reconcile.
    ///
    /// A progress snapshot is published after every block. Returns `Ok(None)` if `cancel`
    /// is set, after draining any queued blocks.
    ///
    /// # Errors
    /// [Error::Stream] if any stream failed, or see [Classifier::finish].
    pub fn run(
        mut self,
        blocks: &Receiver<ByteBlock>,
        progress: &FallOffQueue<Progress>,
        cancel: &AtomicBool,
    ) -> Result<Option<SplitResult>> {
        loop {
            if cancel.load(Ordering::Relaxed) {
                let drained = blocks.try_iter().count();
                debug!(drained, "classifier cancelled");
                return Ok(None);
            }
            let block = match blocks.recv_timeout(Self::RECV_POLL) {
                Ok(block) => block,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("intake disconnected without an end of run");
                    break;
                }
            };
            let stream = block.stream();
            let end = block.is_end() && !block.is_last();
            let flow = self.process(block);
            if end {
                progress.push(Progress::stream_done(self.stats.bytes, stream));
            } else {
                progress.push(Progress::running(self.stats.bytes));
            }
            if flow == Flow::Stop {
                break;
            }
        }
        if cancel.load(Ordering::Relaxed) {
            return Ok(None);
        }

        if let Some((stream, bytes, message)) = self.failure.take() {
            progress.push(Progress::failed(bytes, ErrorKind::Stream, message.clone()));
            return Err(Error::Stream {
                stream,
                bytes,
                message,
            });
        }
        let bytes = self.stats.bytes;
        match self.finish() {
            Ok(result) => {
                progress.push(Progress::complete(bytes));
                Ok(Some(result))
            }
            Err(err) => {
                progress.push(Progress::failed(bytes, ErrorKind::IntervalMismatch, err.to_string()));
                Err(err)
            }
        }
    }
}

/// Merge the closed sequences of one track into ordered, non-overlapping segments.
///
/// Returns the segments and the number of misaligned overlaps resolved by trimming.
fn reconcile(
    key: &Key,
    mut closed: Vec<Sequence>,
    tolerance: Tolerance,
) -> std::result::Result<(Vec<Sequence>, u64), SequenceError> {
    let span = span!(Level::DEBUG, "reconcile", key = %key);
    let _guard = span.enter();

    closed.sort_by_key(Sequence::start_time);
    let mut segments = Vec::new();
    let mut corrections = 0;
    let mut closed = closed.into_iter();
    let Some(mut last) = closed.next() else {
        return Ok((segments, corrections));
    };
    for mut curr in closed {
        // Nothing may reach back into a segment already emitted
        if let Some(floor) = segments.last().map(Sequence::end_time) {
            if curr.start_time() <= floor {
                curr.trim_start(floor + 1)?;
                if curr.is_empty() {
                    continue;
                }
            }
        }
        match curr.merge_into_with(&mut last, tolerance) {
            Ok(()) => {}
            Err(SequenceError::MergeRange { gap, interval }) => {
                trace!(gap, points = gap / interval, "segment boundary");
                segments.push(std::mem::replace(&mut last, curr));
            }
            Err(SequenceError::Timing { offset, .. }) => {
                warn!(
                    offset,
                    at = %format_timestamp(curr.start_time()),
                    "misaligned overlap, trimming later segment"
                );
                corrections += 1;
                curr.trim_start(last.end_time() + 1)?;
                if !curr.is_empty() {
                    segments.push(std::mem::replace(&mut last, curr));
                }
            }
            Err(err) => return Err(err),
        }
    }
    segments.push(last);
    debug!(segments = segments.len(), "reconciled");
    Ok((segments, corrections))
}
