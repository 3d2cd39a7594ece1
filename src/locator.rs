//! Common coverage windows across channels.
//!
//! The [BlockLocator] intersects the segment lists of several channels, yielding the
//! windows for which every channel has data. All channels must share one sample interval.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::Array2;
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::progress::{ErrorKind, LocateProgress};
use crate::queue::FallOffQueue;
use crate::sequence::Sequence;
use crate::time::format_timestamp;

/// Anything covering a closed time range at a fixed sample interval.
pub trait Span {
    fn start_time(&self) -> i64;
    fn end_time(&self) -> i64;
    fn interval(&self) -> i64;
}

impl Span for Sequence {
    fn start_time(&self) -> i64 {
        Sequence::start_time(self)
    }

    fn end_time(&self) -> i64 {
        Sequence::end_time(self)
    }

    fn interval(&self) -> i64 {
        Sequence::interval(self)
    }
}

/// A window `[start, end]` covered by every channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContiguousBlock {
    start: i64,
    end: i64,
    interval: i64,
}

impl ContiguousBlock {
    #[must_use]
    pub fn new(start: i64, end: i64, interval: i64) -> Self {
        ContiguousBlock {
            start,
            end,
            interval,
        }
    }

    #[must_use]
    pub fn start(&self) -> i64 {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> i64 {
        self.end
    }

    /// Sample interval in microseconds.
    #[must_use]
    pub fn interval(&self) -> i64 {
        self.interval
    }

    #[must_use]
    pub fn range(&self) -> i64 {
        self.end - self.start
    }

    /// Number of samples a channel holds in this window.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.interval <= 0 || self.end < self.start {
            return 0;
        }
        (self.range() / self.interval + 1) as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Span for ContiguousBlock {
    fn start_time(&self) -> i64 {
        self.start
    }

    fn end_time(&self) -> i64 {
        self.end
    }

    fn interval(&self) -> i64 {
        self.interval
    }
}

impl std::fmt::Display for ContiguousBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} - {}",
            format_timestamp(self.start),
            format_timestamp(self.end)
        )
    }
}

/// Finds the windows covered by every channel.
#[derive(Default)]
pub struct BlockLocator {
    cancel: Option<Arc<AtomicBool>>,
    progress: Option<Arc<FallOffQueue<LocateProgress>>>,
}

impl BlockLocator {
    #[must_use]
    pub fn new() -> Self {
        BlockLocator::default()
    }

    /// Stop locating, returning `None`, once `cancel` is set.
    #[must_use]
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Publish progress snapshots to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<FallOffQueue<LocateProgress>>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }

    fn publish(&self, progress: LocateProgress) {
        if let Some(queue) = &self.progress {
            queue.push(progress);
        }
    }

    /// Intersect the time ordered segment lists of each channel.
    ///
    /// The first channel's segments seed the working set of blocks, which is then
    /// narrowed by each following channel. Returns `None` if cancelled. No channels, or
    /// any channel without segments, yields no blocks.
    ///
    /// # Errors
    /// [Error::BlockIntervalMismatch] if a segment's interval differs from the first
    /// channel's.
    pub fn locate<S>(&self, channels: &[Vec<S>]) -> Result<Option<Vec<ContiguousBlock>>>
    where
        S: Span,
    {
        let total: usize = channels.iter().map(Vec::len).sum();
        let Some((first, rest)) = channels.split_first() else {
            self.publish(LocateProgress::complete());
            return Ok(Some(Vec::new()));
        };
        let Some(interval) = first.first().map(Span::interval) else {
            self.publish(LocateProgress::complete());
            return Ok(Some(Vec::new()));
        };

        let mut processed = 0;
        let mut blocks = Vec::with_capacity(first.len());
        for seg in first {
            if self.is_cancelled() {
                return Ok(None);
            }
            self.check_interval(interval, seg.interval())?;
            blocks.push(ContiguousBlock::new(seg.start_time(), seg.end_time(), interval));
            processed += 1;
        }
        self.publish(LocateProgress::running(processed, total));

        for channel in rest {
            let mut narrowed = Vec::new();
            let mut blk = 0;
            let mut dat = 0;
            while blk < blocks.len() && dat < channel.len() {
                if self.is_cancelled() {
                    debug!("locate cancelled");
                    return Ok(None);
                }
                let block = blocks[blk];
                let data = &channel[dat];
                self.check_interval(interval, data.interval())?;

                if data.end_time() <= block.start {
                    dat += 1;
                    processed += 1;
                    self.publish(LocateProgress::running(processed, total));
                    continue;
                }
                if data.start_time() >= block.end {
                    blk += 1;
                    continue;
                }

                let start = block.start.max(data.start_time());
                let end = block.end.min(data.end_time());
                trace!(
                    start = %format_timestamp(start),
                    end = %format_timestamp(end),
                    "common window"
                );
                narrowed.push(ContiguousBlock::new(start, end, interval));

                match data.end_time().cmp(&block.end) {
                    std::cmp::Ordering::Less => {
                        dat += 1;
                        processed += 1;
                        self.publish(LocateProgress::running(processed, total));
                    }
                    std::cmp::Ordering::Greater => blk += 1,
                    std::cmp::Ordering::Equal => {
                        blk += 1;
                        dat += 1;
                        processed += 1;
                        self.publish(LocateProgress::running(processed, total));
                    }
                }
            }
            // Segments not visited still count toward progress
            for data in &channel[dat..] {
                self.check_interval(interval, data.interval())?;
            }
            processed += channel.len() - dat;
            self.publish(LocateProgress::running(processed, total));
            blocks = narrowed;
        }

        debug!(blocks = blocks.len(), "located common windows");
        self.publish(LocateProgress::complete());
        Ok(Some(blocks))
    }

    fn check_interval(&self, expected: i64, actual: i64) -> Result<()> {
        if expected != actual {
            let err = Error::BlockIntervalMismatch { expected, actual };
            self.publish(LocateProgress::failed(ErrorKind::IntervalMismatch, err.to_string()));
            return Err(err);
        }
        Ok(())
    }
}

/// Samples of each channel within `block`, one row per channel.
///
/// Each channel's row is taken from the segment covering `block`.
///
/// # Errors
/// [Error::BlockIntervalMismatch] if a covering segment has a different interval, or
/// [Error::Sequence] if no segment of a channel covers `block`.
pub fn extract_window(block: &ContiguousBlock, channels: &[&[Sequence]]) -> Result<Array2<i32>> {
    let cols = block.len();
    let mut window = Array2::zeros((channels.len(), cols));
    for (row, segments) in channels.iter().enumerate() {
        let seg = segments
            .iter()
            .find(|s| s.start_time() <= block.start && s.end_time() >= block.end)
            .ok_or(crate::sequence::SequenceError::TimeRange {
                start: block.start,
                end: block.end,
            })?;
        if seg.interval() != block.interval {
            return Err(Error::BlockIntervalMismatch {
                expected: block.interval,
                actual: seg.interval(),
            });
        }
        let samples = seg.series_from(block.start, cols)?;
        for (col, sample) in samples.into_iter().enumerate() {
            window[[row, col]] = sample;
        }
    }
    Ok(window)
}
