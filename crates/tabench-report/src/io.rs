//! Report inputs and NDJSON output

use crate::error::ReportResult;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tabench_artifact::{ExecutionResult, ProgramId};
use tabench_store::{write_atomic, CacheStore, Corpus, CorpusScan};
use tracing::warn;

/// Load corpus records for every id appearing in `results`, ascending
#[must_use]
pub fn load_programs<'a>(corpus: &Corpus, results: impl IntoIterator<Item = &'a ExecutionResult>) -> CorpusScan {
    let ids: BTreeSet<ProgramId> = results.into_iter().map(ExecutionResult::program_id).collect();
    corpus.load_all(ids)
}

/// Stored cache sizes for `ids`; absent or unreadable caches are left out
#[must_use]
pub fn cache_sizes(store: &CacheStore, ids: impl IntoIterator<Item = ProgramId>) -> BTreeMap<ProgramId, u64> {
    let mut sizes = BTreeMap::new();
    for id in ids {
        match store.read(id) {
            Ok(Some(cache)) => {
                sizes.insert(id, cache.byte_size);
            }
            Ok(None) => {}
            Err(e) => warn!(program_id = %id, error = %e, "cache size unavailable"),
        }
    }
    sizes
}

/// Write `rows` as one JSON object per line, replacing `path`
///
/// # Errors
/// Returns [`crate::ReportError`] if a row cannot be encoded or the file
/// cannot be written
pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> ReportResult<()> {
    let mut out = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut out, row)?;
        out.push(b'\n');
    }
    write_atomic(path, &out)?;
    Ok(())
}
