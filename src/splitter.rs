//! Threaded intake to classifier pipeline.
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, unbounded, Sender};
use threadpool::ThreadPool;
use tracing::{debug, error, info};
use typed_builder::TypedBuilder;

use crate::classifier::{Classifier, SplitResult};
use crate::error::Result;
use crate::filter::{Field, Filters};
use crate::intake::{send_block, ByteBlock, RecordReader, StreamOutcome};
use crate::progress::Progress;
use crate::queue::FallOffQueue;
use crate::rate::Tolerance;
use crate::sequence::BlockPool;

/// Configuration for a [Splitter].
///
/// Filters are globs where `*` matches any run of characters and `?` matches exactly
/// one. An unset filter matches everything.
#[derive(TypedBuilder, Debug, Clone)]
pub struct SplitConfig {
    #[builder(default, setter(strip_option, into))]
    pub network: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub station: Option<String>,
    /// Blank locations are matched as `--`.
    #[builder(default, setter(strip_option, into))]
    pub location: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub channel: Option<String>,
    /// Number of records that may be queued between intake and the classifier.
    #[builder(default = SplitConfig::DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
    /// Number of progress snapshots retained. Older snapshots fall off.
    #[builder(default = 1)]
    pub progress_capacity: usize,
    #[builder(default)]
    pub tolerance: Tolerance,
    /// Compute an MD5 digest of each stream.
    #[builder(default = true)]
    pub digest: bool,
    /// Number of streams read concurrently. With 1, streams are read in order.
    #[builder(default = 1)]
    pub readers: usize,
    /// Samples per pooled sequence block.
    #[builder(default = BlockPool::DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,
}

impl SplitConfig {
    pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
}

impl Default for SplitConfig {
    fn default() -> Self {
        SplitConfig::builder().build()
    }
}

/// Splits record streams into per-channel sequences.
pub struct Splitter {
    config: SplitConfig,
    filters: Filters,
    pool: BlockPool,
}

impl Splitter {
    /// # Errors
    /// [crate::Error::InvalidFilter] if a filter glob does not compile.
    pub fn new(config: SplitConfig) -> Result<Self> {
        let filters = Filters::new()
            .with_opt(Field::Network, config.network.as_deref())?
            .with_opt(Field::Station, config.station.as_deref())?
            .with_opt(Field::Location, config.location.as_deref())?
            .with_opt(Field::Channel, config.channel.as_deref())?;
        let pool = BlockPool::new(config.block_size.max(1));
        Ok(Splitter {
            config,
            filters,
            pool,
        })
    }

    #[must_use]
    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    #[must_use]
    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    /// Pool backing the sequences of every run of this splitter.
    #[must_use]
    pub fn pool(&self) -> &BlockPool {
        &self.pool
    }

    /// Start splitting `streams` in the background. Stream indexes in the result refer
    /// to positions in `streams`.
    ///
    /// # Panics
    /// If the background threads could not be started.
    pub fn start<R>(&self, streams: Vec<R>) -> SplitHandle
    where
        R: Read + Send + 'static,
    {
        self.start_with_total(streams, None)
    }

    /// Start splitting the files at `paths` in the background. The total size of the
    /// files is known up front, so progress can be reported as a percentage.
    ///
    /// # Errors
    /// If any file cannot be opened.
    ///
    /// # Panics
    /// If the background threads could not be started.
    pub fn start_files<P>(&self, paths: &[P]) -> Result<SplitHandle>
    where
        P: AsRef<Path>,
    {
        let mut files = Vec::with_capacity(paths.len());
        let mut total = 0;
        for path in paths {
            let file = File::open(path.as_ref())?;
            total += file.metadata()?.len();
            files.push(file);
        }
        info!(files = files.len(), bytes = total, "starting split");
        Ok(self.start_with_total(files, Some(total)))
    }

    /// Split `streams`, blocking until done. Returns `None` if cancelled.
    ///
    /// # Errors
    /// See [SplitHandle::join].
    pub fn split<R>(&self, streams: Vec<R>) -> Result<Option<SplitResult>>
    where
        R: Read + Send + 'static,
    {
        self.start(streams).join()
    }

    /// Split the files at `paths`, blocking until done.
    ///
    /// # Errors
    /// If a file cannot be opened, or see [SplitHandle::join].
    pub fn split_files<P>(&self, paths: &[P]) -> Result<Option<SplitResult>>
    where
        P: AsRef<Path>,
    {
        self.start_files(paths)?.join()
    }

    fn start_with_total<R>(&self, streams: Vec<R>, total_bytes: Option<u64>) -> SplitHandle
    where
        R: Read + Send + 'static,
    {
        let (block_tx, block_rx) = bounded(self.config.queue_capacity.max(1));
        let progress = Arc::new(FallOffQueue::new(self.config.progress_capacity));
        let cancel = Arc::new(AtomicBool::new(false));

        let classifier = Classifier::new(
            self.filters.clone(),
            self.pool.clone(),
            self.config.tolerance,
        );
        let classifier = {
            let progress = progress.clone();
            let cancel = cancel.clone();
            thread::Builder::new()
                .name("seed-classifier".into())
                .spawn(move || classifier.run(&block_rx, &progress, &cancel))
                .expect("failed to spawn classifier thread")
        };

        let readers = self.config.readers.max(1);
        let digest = self.config.digest;
        let intake = {
            let cancel = cancel.clone();
            thread::Builder::new()
                .name("seed-intake".into())
                .spawn(move || read_streams(streams, readers, digest, &block_tx, &cancel))
                .expect("failed to spawn intake thread")
        };

        SplitHandle {
            progress,
            cancel,
            total_bytes,
            intake: Some(intake),
            classifier: Some(classifier),
        }
    }
}

/// Read every stream on a pool of `readers` threads, then send the end of run sentinel.
fn read_streams<R>(
    streams: Vec<R>,
    readers: usize,
    digest: bool,
    tx: &Sender<ByteBlock>,
    cancel: &Arc<AtomicBool>,
) -> Vec<StreamOutcome>
where
    R: Read + Send + 'static,
{
    let pool = ThreadPool::with_name("seed-reader".into(), readers);
    let (outcome_tx, outcome_rx) = unbounded();
    for (idx, stream) in streams.into_iter().enumerate() {
        let tx = tx.clone();
        let cancel = cancel.clone();
        let outcome_tx = outcome_tx.clone();
        pool.execute(move || {
            let mut reader = RecordReader::new(stream, idx);
            if digest {
                reader = reader.with_digest();
            }
            let outcome = reader.run(&tx, &cancel);
            if outcome_tx.send(outcome).is_err() {
                debug!(stream = idx, "failed to send stream outcome");
            }
        });
    }
    drop(outcome_tx);
    pool.join();
    if pool.panic_count() > 0 {
        error!(panics = pool.panic_count(), "stream reader panicked");
    }

    let mut outcomes: Vec<StreamOutcome> = outcome_rx.try_iter().collect();
    outcomes.sort_by_key(|o| o.stream);
    if !cancel.load(Ordering::Relaxed) && !send_block(tx, ByteBlock::last(), cancel) {
        debug!("failed to send end of run");
    }
    outcomes
}

/// Handle to a split running in the background.
pub struct SplitHandle {
    progress: Arc<FallOffQueue<Progress>>,
    cancel: Arc<AtomicBool>,
    total_bytes: Option<u64>,
    intake: Option<JoinHandle<Vec<StreamOutcome>>>,
    classifier: Option<JoinHandle<Result<Option<SplitResult>>>>,
}

impl SplitHandle {
    /// Most recent progress snapshot published since the last call, if any.
    #[must_use]
    pub fn progress(&self) -> Option<Progress> {
        self.progress.latest()
    }

    /// Total bytes of all inputs, if known.
    #[must_use]
    pub fn total_bytes(&self) -> Option<u64> {
        self.total_bytes
    }

    /// Percent complete for `progress`, if the total input size is known.
    #[must_use]
    pub fn percent(&self, progress: &Progress) -> Option<u8> {
        self.total_bytes.map(|total| progress.percent(total))
    }

    /// Request cancellation. [SplitHandle::join] will return `Ok(None)`.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.intake.as_ref().map_or(true, JoinHandle::is_finished)
            && self.classifier.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the split to finish. Returns `None` if cancelled.
    ///
    /// # Errors
    /// [crate::Error::Stream] if reading any stream failed, or
    /// [crate::Error::Sequence] if segments of a track could not be reconciled.
    ///
    /// # Panics
    /// If a background thread panicked.
    pub fn join(mut self) -> Result<Option<SplitResult>> {
        let outcomes = match self.intake.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|err| std::panic::resume_unwind(err)),
            None => Vec::new(),
        };
        let zult = match self.classifier.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|err| std::panic::resume_unwind(err))?,
            None => None,
        };
        if self.is_cancelled() {
            return Ok(None);
        }
        Ok(zult.map(|mut result| {
            result.streams = outcomes;
            result
        }))
    }
}

impl Drop for SplitHandle {
    fn drop(&mut self) {
        // Stop background threads of a handle that was never joined
        if self.intake.is_some() || self.classifier.is_some() {
            self.cancel();
        }
    }
}
