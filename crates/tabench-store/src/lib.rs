//! tabench Store
//!
//! Everything the harness persists or loads from disk:
//!
//! - [`CacheStore`]: per-program exploration caches with a validating sidecar
//! - [`AppendLog`]: append-only NDJSON result and coverage logs
//! - [`read_results`] / [`read_samples`]: tolerant log readers
//! - [`Corpus`]: numbered programs and their stats records
//! - [`Overhead`]: measured per-mode launcher overhead
//!
//! Missing caches, malformed log lines and unusable stats are reported as
//! values (`None`, counts, [`RecordIssue`]); only IO failures on paths the
//! run must write are [`StoreError`]s.

#![warn(unreachable_pub)]

mod cache;
mod corpus;
mod error;
mod log;
mod overhead;

pub use cache::{write_atomic, CacheLookup, CacheMeta, CacheStore};
pub use corpus::{Corpus, CorpusScan, RecordIssue};
pub use error::{StoreError, StoreResult};
pub use log::{parse_lines, read_results, read_samples, read_skips, AppendLog, LogContents};
pub use overhead::Overhead;
