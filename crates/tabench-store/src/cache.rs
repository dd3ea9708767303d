//! Per-program cache store
//!
//! The engine owns the cache blob format; the store only places, measures,
//! validates and removes it. Layout per program:
//!
//! ```text
//! <results_dir>/<engine_label><id>/cache            opaque blob
//! <results_dir>/<engine_label><id>/cache.meta.json  CacheMeta sidecar
//! ```

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tabench_artifact::{CacheArtifact, ContentHash, ProgramId};
use tracing::{debug, warn};

const BLOB_NAME: &str = "cache";
const META_NAME: &str = "cache.meta.json";

/// Sidecar written next to every registered cache blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMeta {
    /// Program the cache belongs to
    pub program_id: ProgramId,
    /// Blob size measured at write time
    pub byte_size: u64,
    /// Blob digest
    pub digest: ContentHash,
    /// Digest of the base program the engine explored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_digest: Option<ContentHash>,
    /// When the blob was registered
    pub written_at: DateTime<Utc>,
}

/// Outcome of a validated read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Cache exists and was built from the expected base program
    Valid(CacheArtifact),
    /// No cache for this program
    Absent,
    /// Cache exists but was built from a different base program
    Stale {
        /// Digest recorded in the sidecar
        recorded: ContentHash,
    },
}

impl CacheLookup {
    /// Reusable artifact, if any
    #[must_use]
    pub fn into_valid(self) -> Option<CacheArtifact> {
        match self {
            Self::Valid(artifact) => Some(artifact),
            Self::Absent | Self::Stale { .. } => None,
        }
    }
}

/// Cache store rooted at a results directory
#[derive(Debug, Clone)]
pub struct CacheStore {
    results_dir: PathBuf,
    engine_label: String,
}

impl CacheStore {
    /// Create store; nothing is touched on disk until a write
    #[must_use]
    pub fn new(results_dir: impl Into<PathBuf>, engine_label: impl Into<String>) -> Self {
        Self {
            results_dir: results_dir.into(),
            engine_label: engine_label.into(),
        }
    }

    /// Directory holding one program's cache
    #[must_use]
    pub fn entry_dir(&self, id: ProgramId) -> PathBuf {
        self.results_dir.join(format!("{}{}", self.engine_label, id))
    }

    /// Blob location passed to the engine
    #[must_use]
    pub fn cache_path(&self, id: ProgramId) -> PathBuf {
        self.entry_dir(id).join(BLOB_NAME)
    }

    /// Sidecar location
    #[must_use]
    pub fn meta_path(&self, id: ProgramId) -> PathBuf {
        self.entry_dir(id).join(META_NAME)
    }

    /// Store `state` as the cache for `id`, replacing any previous one
    ///
    /// Blob and sidecar are each written to a temp file and renamed into
    /// place.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the entry directory is not writable
    pub fn write(&self, id: ProgramId, state: &[u8], base_digest: Option<ContentHash>) -> StoreResult<CacheArtifact> {
        let path = self.cache_path(id);
        write_atomic(&path, state)?;
        self.write_meta(id, &path, state, base_digest)
    }

    /// Adopt a blob the engine wrote itself at [`Self::cache_path`]
    ///
    /// Returns `None` when the engine left no blob behind.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the blob cannot be read or the sidecar
    /// cannot be written
    pub fn register(&self, id: ProgramId, base_digest: Option<ContentHash>) -> StoreResult<Option<CacheArtifact>> {
        let path = self.cache_path(id);
        let Some(state) = read_optional(&path)? else {
            debug!(program_id = %id, "engine wrote no cache");
            return Ok(None);
        };
        self.write_meta(id, &path, &state, base_digest).map(Some)
    }

    /// Numbers of the `<engine_label><n>` directories under the results dir
    ///
    /// The engine allocates a fresh directory per invocation, one past the
    /// highest existing number. Comparing snapshots taken around a run tells
    /// where that run wrote its cache.
    #[must_use]
    pub fn engine_dirs(&self) -> BTreeSet<u32> {
        let Ok(entries) = std::fs::read_dir(&self.results_dir) else {
            return BTreeSet::new();
        };
        entries
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|e| {
                let name = e.file_name();
                name.to_str()?.strip_prefix(self.engine_label.as_str())?.parse().ok()
            })
            .collect()
    }

    /// Directory the engine allocated as number `n`
    #[must_use]
    pub fn engine_dir(&self, n: u32) -> PathBuf {
        self.results_dir.join(format!("{}{n}", self.engine_label))
    }

    /// Engine directories created since `before` that hold a cache blob
    #[must_use]
    pub fn produced_since(&self, before: &BTreeSet<u32>) -> Vec<u32> {
        self.engine_dirs()
            .difference(before)
            .copied()
            .filter(|n| self.engine_dir(*n).join(BLOB_NAME).is_file())
            .collect()
    }

    /// Register the cache a run wrote into engine directory `produced`
    ///
    /// When the engine numbered its directory differently from `id`, the blob
    /// is moved into the slot for `id`. The engine always allocates past the
    /// highest existing number, so the slot never collides with a later run.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the blob cannot be moved or read
    pub fn adopt(
        &self,
        id: ProgramId,
        produced: u32,
        base_digest: Option<ContentHash>,
    ) -> StoreResult<Option<CacheArtifact>> {
        if produced != id.get() {
            let source = self.engine_dir(produced).join(BLOB_NAME);
            if !source.is_file() {
                debug!(program_id = %id, produced, "engine wrote no cache");
                return Ok(None);
            }
            let target = self.cache_path(id);
            let dir = self.entry_dir(id);
            std::fs::create_dir_all(&dir).map_err(|e| StoreError::io_error(&dir, e))?;
            std::fs::rename(&source, &target).map_err(|e| StoreError::io_error(&source, e))?;
            debug!(program_id = %id, produced, "cache moved into program slot");
        }
        self.register(id, base_digest)
    }

    /// Remove a partial blob left in engine directory `produced`
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] on removal failures other than not-found
    pub fn discard_produced(&self, produced: u32) -> StoreResult<()> {
        let path = self.engine_dir(produced).join(BLOB_NAME);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io_error(path, e)),
        }
    }

    fn write_meta(
        &self,
        id: ProgramId,
        path: &Path,
        state: &[u8],
        base_digest: Option<ContentHash>,
    ) -> StoreResult<CacheArtifact> {
        let meta = CacheMeta {
            program_id: id,
            byte_size: state.len() as u64,
            digest: ContentHash::compute(state),
            base_digest,
            written_at: Utc::now(),
        };
        write_atomic(&self.meta_path(id), &serde_json::to_vec(&meta)?)?;
        debug!(program_id = %id, byte_size = meta.byte_size, "cache registered");
        Ok(CacheArtifact {
            program_id: id,
            byte_size: meta.byte_size,
            path: path.to_path_buf(),
            digest: meta.digest,
            base_digest,
        })
    }

    /// Read the cache for `id`; absence is `Ok(None)`
    ///
    /// A blob without a sidecar (written by an older driver) is measured on
    /// the spot and carries no base digest. A sidecar whose blob is gone
    /// counts as absent.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] on read failures other than not-found, and
    /// [`StoreError::CorruptMeta`] if the sidecar does not decode or names a
    /// different program
    pub fn read(&self, id: ProgramId) -> StoreResult<Option<CacheArtifact>> {
        let path = self.cache_path(id);
        let meta_path = self.meta_path(id);

        let Some(meta_bytes) = read_optional(&meta_path)? else {
            return Ok(read_optional(&path)?.map(|state| CacheArtifact {
                program_id: id,
                byte_size: state.len() as u64,
                path: path.clone(),
                digest: ContentHash::compute(&state),
                base_digest: None,
            }));
        };

        let meta: CacheMeta = serde_json::from_slice(&meta_bytes).map_err(|e| StoreError::CorruptMeta {
            path: meta_path.clone(),
            message: e.to_string(),
        })?;
        if meta.program_id != id {
            return Err(StoreError::CorruptMeta {
                path: meta_path,
                message: format!("sidecar names program {}", meta.program_id),
            });
        }
        if !path.is_file() {
            warn!(program_id = %id, "cache sidecar without blob");
            return Ok(None);
        }
        Ok(Some(CacheArtifact {
            program_id: id,
            byte_size: meta.byte_size,
            path,
            digest: meta.digest,
            base_digest: meta.base_digest,
        }))
    }

    /// Read the cache for `id` and check it was built from `base_digest`
    ///
    /// # Errors
    /// Same as [`Self::read`]
    pub fn lookup(&self, id: ProgramId, base_digest: &ContentHash) -> StoreResult<CacheLookup> {
        let Some(artifact) = self.read(id)? else {
            return Ok(CacheLookup::Absent);
        };
        Ok(match artifact.base_digest {
            Some(recorded) if !artifact.matches_base(base_digest) => {
                warn!(program_id = %id, recorded = %recorded.short(), "stale cache ignored");
                CacheLookup::Stale { recorded }
            }
            _ => CacheLookup::Valid(artifact),
        })
    }

    /// Remove blob and sidecar; returns whether anything was removed
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] on removal failures other than not-found
    pub fn discard(&self, id: ProgramId) -> StoreResult<bool> {
        let mut removed = false;
        for path in [self.cache_path(id), self.meta_path(id)] {
            match std::fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io_error(path, e)),
            }
        }
        if removed {
            debug!(program_id = %id, "cache discarded");
        }
        Ok(removed)
    }
}

fn read_optional(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io_error(path, e)),
    }
}

/// Write `contents` to a temp file beside `path`, then rename over `path`
///
/// # Errors
/// Returns [`StoreError::Io`] naming the path that failed
pub fn write_atomic(path: &Path, contents: &[u8]) -> StoreResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| StoreError::io_error(dir, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io_error(dir, e))?;
    tmp.write_all(contents).map_err(|e| StoreError::io_error(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| StoreError::io_error(path, e.error))?;
    Ok(())
}
