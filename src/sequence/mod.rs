//! Block pooled integer time series.
//!
//! A [Sequence] is a run of samples with a start time and a fixed sample interval. Samples
//! live in fixed size blocks checked out of a shared [BlockPool]; blocks released by one
//! sequence, e.g., when it is merged into another, are reused by the next.
mod error;
mod pool;

use std::fmt;

use md5::{Digest, Md5};
use ndarray::Array1;
use tracing::{error, trace};

use crate::rate::{lookup_interval, Tolerance};
use crate::time::format_timestamp;

pub use error::SequenceError;
pub use pool::{BlockId, BlockPool, PoolError, PoolStats};

type Result<T> = std::result::Result<T, SequenceError>;

fn ceil_div(num: i64, den: i64) -> i64 {
    (num + den - 1).div_euclid(den)
}

pub struct Sequence {
    pool: BlockPool,
    blocks: Vec<BlockId>,
    length: usize,
    start_time: i64,
    sample_rate: f64,
    interval: i64,
}

impl Sequence {
    /// Create an empty sequence without a sample rate.
    #[must_use]
    pub fn new(pool: BlockPool) -> Self {
        Sequence {
            pool,
            blocks: Vec::new(),
            length: 0,
            start_time: 0,
            sample_rate: 0.0,
            interval: 0,
        }
    }

    /// Create an empty sequence starting at `start_time` with `sample_rate`.
    ///
    /// # Errors
    /// [SequenceError::IllegalSampleRate] if `sample_rate` is not a legal rate.
    pub fn with_rate(pool: BlockPool, start_time: i64, sample_rate: f64) -> Result<Self> {
        let mut seq = Sequence::new(pool);
        seq.set_start_time(start_time);
        seq.set_sample_rate(sample_rate)?;
        Ok(seq)
    }

    pub fn set_start_time(&mut self, start_time: i64) {
        self.start_time = start_time;
    }

    /// # Errors
    /// [SequenceError::IllegalSampleRate] if `rate` is not one of the legal rates, or
    /// [SequenceError::IntervalMismatch] if the sequence already holds samples at a
    /// different rate.
    pub fn set_sample_rate(&mut self, rate: f64) -> Result<()> {
        let interval = lookup_interval(rate).ok_or(SequenceError::IllegalSampleRate(rate))?;
        if !self.is_empty() && self.interval != interval {
            return Err(SequenceError::IntervalMismatch {
                source_interval: interval,
                target_interval: self.interval,
            });
        }
        self.sample_rate = rate;
        self.interval = interval;
        Ok(())
    }

    #[must_use]
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Time of the last sample. Same as the start time for an empty sequence.
    #[must_use]
    pub fn end_time(&self) -> i64 {
        if self.length == 0 {
            return self.start_time;
        }
        self.start_time + self.interval * (self.length as i64 - 1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Sample interval in microseconds.
    #[must_use]
    pub fn interval(&self) -> i64 {
        self.interval
    }

    #[must_use]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[must_use]
    pub fn pool(&self) -> &BlockPool {
        &self.pool
    }

    /// Append `length` samples from `buffer` starting at `offset`.
    ///
    /// # Errors
    /// [SequenceError::Range] if `buffer` does not hold `offset + length` samples.
    pub fn extend(&mut self, buffer: &[i32], offset: usize, length: usize) -> Result<()> {
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= buffer.len())
            .ok_or(SequenceError::Range {
                index: offset,
                count: length,
                length: buffer.len(),
            })?;
        self.append(&buffer[offset..end])
    }

    /// Append all of `samples`.
    ///
    /// # Errors
    /// If a block could not be written.
    pub fn append(&mut self, mut samples: &[i32]) -> Result<()> {
        let block_size = self.pool.block_size();
        while !samples.is_empty() {
            let block_idx = self.length / block_size;
            let pos = self.length % block_size;
            if block_idx == self.blocks.len() {
                self.blocks.push(self.pool.checkout());
            }
            let n = (block_size - pos).min(samples.len());
            self.pool.write(self.blocks[block_idx], pos, &samples[..n])?;
            self.length += n;
            samples = &samples[n..];
        }
        Ok(())
    }

    /// Get `count` samples starting at sample `index`.
    ///
    /// # Errors
    /// [SequenceError::Range] if the window extends past the end of the data.
    pub fn series(&self, index: usize, count: usize) -> Result<Vec<i32>> {
        if index.checked_add(count).map_or(true, |end| end > self.length) {
            return Err(SequenceError::Range {
                index,
                count,
                length: self.length,
            });
        }
        let block_size = self.pool.block_size();
        let mut series = vec![0; count];
        let mut filled = 0;
        while filled < count {
            let pos = index + filled;
            let offset = pos % block_size;
            let n = (block_size - offset).min(count - filled);
            self.pool
                .read(self.blocks[pos / block_size], offset, &mut series[filled..filled + n])?;
            filled += n;
        }
        Ok(series)
    }

    /// Get `count` samples starting with the first sample at or after `start_time`.
    ///
    /// # Errors
    /// [SequenceError::TimeRange] if `start_time` is outside of the sequence, or
    /// [SequenceError::Range] if fewer than `count` samples are available.
    pub fn series_from(&self, start_time: i64, count: usize) -> Result<Vec<i32>> {
        if self.is_empty() || start_time < self.start_time || start_time > self.end_time() {
            return Err(SequenceError::TimeRange {
                start: start_time,
                end: start_time,
            });
        }
        let index = ceil_div(start_time - self.start_time, self.interval);
        self.series(index as usize, count)
    }

    /// Get every sample falling within `[start_time, end_time]`, inclusive of both ends.
    ///
    /// # Errors
    /// [SequenceError::TimeRange] if the window is not contained in the sequence.
    pub fn series_between(&self, start_time: i64, end_time: i64) -> Result<Vec<i32>> {
        if !self.contains_range(start_time, end_time) {
            return Err(SequenceError::TimeRange {
                start: start_time,
                end: end_time,
            });
        }
        let first = ceil_div(start_time - self.start_time, self.interval);
        let last = (end_time - self.start_time) / self.interval;
        if first > last {
            return Ok(Vec::new());
        }
        self.series(first as usize, (last - first + 1) as usize)
    }

    /// All samples.
    ///
    /// # Errors
    /// If a block could not be read.
    pub fn samples(&self) -> Result<Vec<i32>> {
        self.series(0, self.length)
    }

    /// # Errors
    /// If a block could not be read.
    pub fn to_array(&self) -> Result<Array1<i32>> {
        Ok(Array1::from_vec(self.samples()?))
    }

    /// Narrow the sequence to the samples within `[start_time, end_time]`. The sequence is
    /// cleared if the window does not intersect it.
    ///
    /// # Errors
    /// If a block could not be read or written.
    pub fn trim(&mut self, start_time: i64, end_time: i64) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        if start_time > end_time || end_time < self.start_time || start_time > self.end_time() {
            self.clear();
            return Ok(());
        }
        let last_idx = self.length as i64 - 1;
        let first = ceil_div((start_time - self.start_time).max(0), self.interval);
        let last = ((end_time - self.start_time) / self.interval).min(last_idx);
        if first > last {
            self.clear();
            return Ok(());
        }
        if first == 0 && last == last_idx {
            return Ok(());
        }

        let kept = self.series(first as usize, (last - first + 1) as usize)?;
        let new_start = self.start_time + first * self.interval;
        self.release_blocks()?;
        self.start_time = new_start;
        self.append(&kept)
    }

    /// Drop samples before `start_time`.
    ///
    /// # Errors
    /// See [Sequence::trim].
    pub fn trim_start(&mut self, start_time: i64) -> Result<()> {
        self.trim(start_time, self.end_time())
    }

    /// Drop samples after `end_time`.
    ///
    /// # Errors
    /// See [Sequence::trim].
    pub fn trim_end(&mut self, end_time: i64) -> Result<()> {
        self.trim(self.start_time, end_time)
    }

    fn release_blocks(&mut self) -> Result<()> {
        self.length = 0;
        let mut zult = Ok(());
        for id in self.blocks.drain(..) {
            if let Err(err) = self.pool.release(id) {
                zult = Err(err.into());
            }
        }
        zult
    }

    /// Remove all samples, returning blocks to the pool.
    pub fn clear(&mut self) {
        if let Err(err) = self.release_blocks() {
            error!("failed to return sequence blocks to pool: {err}");
            if cfg!(debug_assertions) {
                panic!("failed to return sequence blocks to pool: {err}");
            }
        }
    }

    #[must_use]
    pub fn starts_before(&self, other: &Sequence) -> bool {
        self.start_time < other.start_time
    }

    #[must_use]
    pub fn starts_after(&self, other: &Sequence) -> bool {
        self.start_time > other.start_time
    }

    #[must_use]
    pub fn ends_before(&self, other: &Sequence) -> bool {
        self.end_time() < other.end_time()
    }

    #[must_use]
    pub fn ends_after(&self, other: &Sequence) -> bool {
        self.end_time() > other.end_time()
    }

    /// True if the time ranges of both non-empty sequences intersect.
    #[must_use]
    pub fn overlaps(&self, other: &Sequence) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.start_time <= other.end_time()
            && other.start_time <= self.end_time()
    }

    /// True if `[start_time, end_time]` lies within this sequence.
    #[must_use]
    pub fn contains_range(&self, start_time: i64, end_time: i64) -> bool {
        !self.is_empty()
            && start_time <= end_time
            && start_time >= self.start_time
            && end_time <= self.end_time()
    }

    /// Same interval, start time and length.
    #[must_use]
    pub fn same_extent(&self, other: &Sequence) -> bool {
        self.interval == other.interval
            && self.start_time == other.start_time
            && self.length == other.length
    }

    /// True if this sequence lies entirely within the time range of `other`.
    ///
    /// # Errors
    /// [SequenceError::IntervalMismatch] if the intervals differ.
    pub fn sub_sequence_of(&self, other: &Sequence) -> Result<bool> {
        self.check_interval(other)?;
        Ok(self.start_time >= other.start_time && self.end_time() <= other.end_time())
    }

    fn check_interval(&self, target: &Sequence) -> Result<()> {
        if self.interval != target.interval {
            return Err(SequenceError::IntervalMismatch {
                source_interval: self.interval,
                target_interval: target.interval,
            });
        }
        Ok(())
    }

    /// Merge this sequence into `target` using the default [Tolerance].
    ///
    /// # Errors
    /// See [Sequence::merge_into_with].
    pub fn merge_into(&mut self, target: &mut Sequence) -> Result<()> {
        self.merge_into_with(target, Tolerance::default())
    }

    /// Merge the data of this sequence into `target`, leaving this sequence empty.
    ///
    /// Where the sequences overlap the data already in `target` is kept. Sequences
    /// separated by one sample interval, give or take `tolerance`, are joined.
    ///
    /// # Errors
    /// * [SequenceError::IntervalMismatch] if the sample intervals differ.
    /// * [SequenceError::MergeRange] if the sequences are neither adjacent nor overlapping.
    /// * [SequenceError::Timing] if the sequences overlap but their samples are not aligned.
    ///
    /// Neither sequence is modified when an error is returned.
    pub fn merge_into_with(&mut self, target: &mut Sequence, tolerance: Tolerance) -> Result<()> {
        self.check_interval(target)?;
        if self.is_empty() {
            return Ok(());
        }
        if target.is_empty() {
            std::mem::swap(self, target);
            return Ok(());
        }

        let interval = self.interval;
        let slack = tolerance.slack(interval);
        let adjacent = |gap: i64| gap >= interval - slack && gap <= interval + slack;

        if self.start_time > target.end_time() {
            let gap = self.start_time - target.end_time();
            if !adjacent(gap) {
                return Err(SequenceError::MergeRange { gap, interval });
            }
            return self.append_onto(target, 0);
        }
        if self.end_time() < target.start_time {
            let gap = target.start_time - self.end_time();
            if !adjacent(gap) {
                return Err(SequenceError::MergeRange { gap, interval });
            }
            target.merge_into_with(self, tolerance)?;
            std::mem::swap(self, target);
            return Ok(());
        }

        if self.sub_sequence_of(target)? {
            trace!(
                start = self.start_time,
                len = self.length,
                "discarding contained sequence"
            );
            self.clear();
            return Ok(());
        }

        let offset = (self.start_time - target.start_time).rem_euclid(interval);
        let offset = offset.min(interval - offset);
        if offset > slack {
            return Err(SequenceError::Timing { offset, interval });
        }

        if self.start_time < target.start_time {
            target.merge_into_with(self, tolerance)?;
            std::mem::swap(self, target);
            return Ok(());
        }

        // Samples of this sequence already covered by target, rounding to absorb jitter
        let skip = (target.end_time() - self.start_time + interval / 2) / interval + 1;
        self.append_onto(target, skip as usize)
    }

    fn append_onto(&mut self, target: &mut Sequence, skip: usize) -> Result<()> {
        let rest = if skip < self.length {
            self.series(skip, self.length - skip)?
        } else {
            Vec::new()
        };
        // Release first so target can reuse the blocks
        self.release_blocks()?;
        target.append(&rest)
    }

    /// Combine possibly overlapping sequences of one track into a single sequence.
    ///
    /// Sequences are merged in start time order. Gaps between sequences are disregarded,
    /// i.e., the samples after a gap are appended directly. Returns `None` if there are no
    /// samples.
    ///
    /// # Errors
    /// [SequenceError::IntervalMismatch] if the sequences do not share an interval.
    pub fn collapse<I>(sequences: I) -> Result<Option<Sequence>>
    where
        I: IntoIterator<Item = Sequence>,
    {
        let mut sequences: Vec<Sequence> =
            sequences.into_iter().filter(|s| !s.is_empty()).collect();
        sequences.sort_by_key(Sequence::start_time);

        let mut sequences = sequences.into_iter();
        let Some(mut collapsed) = sequences.next() else {
            return Ok(None);
        };
        for mut seq in sequences {
            match seq.merge_into(&mut collapsed) {
                Ok(()) => {}
                Err(SequenceError::MergeRange { .. } | SequenceError::Timing { .. }) => {
                    if seq.start_time <= collapsed.end_time() {
                        seq.trim_start(collapsed.end_time() + 1)?;
                    }
                    seq.append_onto(&mut collapsed, 0)?;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(Some(collapsed))
    }

    /// MD5 over the start time, sample rate and samples, hex encoded.
    ///
    /// # Errors
    /// If a block could not be read.
    pub fn digest(&self) -> Result<String> {
        let mut hasher = Md5::new();
        hasher.update(self.start_time.to_be_bytes());
        hasher.update(self.sample_rate.to_be_bytes());
        let block_size = self.pool.block_size();
        let mut buf = vec![0; block_size];
        for (idx, id) in self.blocks.iter().enumerate() {
            let n = (self.length - idx * block_size).min(block_size);
            self.pool.read(*id, 0, &mut buf[..n])?;
            for sample in &buf[..n] {
                hasher.update(sample.to_be_bytes());
            }
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

impl Drop for Sequence {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("start", &format_timestamp(self.start_time))
            .field("end", &format_timestamp(self.end_time()))
            .field("length", &self.length)
            .field("interval", &self.interval)
            .finish()
    }
}
