//! Streaming miniSEED record splitter and time series reassembler.
//!
//! Raw byte streams of fixed length SEED data records are cut into records, classified by
//! network, station, location, channel and sample rate, and reassembled into ordered,
//! gap-aware per-channel [Sequence]s.
//!
//! The pipeline has three stages:
//! * [intake] reads records from one or more streams into a bounded queue.
//! * [classifier] demultiplexes records into per-[Key] working buffers and reconciles
//!   overlapping segments at the end of the run.
//! * [locator] intersects the coverage of several channels to find common windows.
//!
//! [Splitter] wires the first two stages together on background threads.
//!
//! # Example
//! ```no_run
//! use seedsplit::{SplitConfig, Splitter};
//!
//! let config = SplitConfig::builder().channel("BH?").build();
//! let splitter = Splitter::new(config).unwrap();
//! let result = splitter.split_files(&["ANMO.seed"]).unwrap().expect("not cancelled");
//! for (key, segments) in &result.tracks {
//!     println!("{key}: {} segments", segments.len());
//! }
//! ```
mod bytes;
pub mod classifier;
mod error;
pub mod filter;
pub mod intake;
mod key;
pub mod locator;
pub mod progress;
pub mod queue;
pub mod rate;
pub mod record;
pub mod sequence;
pub mod splitter;
pub mod time;

#[cfg(test)]
pub(crate) mod testing;

pub use classifier::{Classifier, SplitResult, SplitStats};
pub use error::{Error, Result};
pub use filter::{Field, Filters};
pub use intake::{ByteBlock, RecordReader, StreamOutcome};
pub use key::Key;
pub use locator::{BlockLocator, ContiguousBlock, Span};
pub use progress::{ErrorKind, LocateProgress, Progress, ProgressError};
pub use queue::FallOffQueue;
pub use rate::{interval_to_sample_rate, sample_rate_to_interval, Tolerance};
pub use sequence::{BlockPool, Sequence, SequenceError};
pub use splitter::{SplitConfig, SplitHandle, Splitter};
