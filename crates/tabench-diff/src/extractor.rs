//! Diff documents and the extractor entry points
//!
//! A diff document is newline-delimited JSON: one header line describing the
//! programs and the invalidation plan, then one line per change entry in
//! base document order.

use crate::delta::{diff_programs, ChangeEntry};
use crate::error::DiffError;
use crate::invalidation::InvalidationPlan;
use crate::syntax::{ProgramTree, SyntaxFailure};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tabench_artifact::{ContentHash, DiffArtifact, ProgramId};
use tracing::{debug, instrument};

/// First line of a diff document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHeader {
    /// Program the diff belongs to
    pub program_id: ProgramId,
    /// Digest of the base source text
    pub base_digest: ContentHash,
    /// Digest of the modified source text
    pub modified_digest: ContentHash,
    /// Number of entry lines that follow
    pub change_count: usize,
    /// Cached-state partition
    #[serde(flatten)]
    pub plan: InvalidationPlan,
}

/// Header plus change entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffDocument {
    /// Header line
    pub header: DiffHeader,
    /// Entry lines
    pub entries: Vec<ChangeEntry>,
}

impl DiffDocument {
    /// Diff two source texts
    ///
    /// # Errors
    /// Returns [`DiffError::Unparsable`] naming `base_name` or `modified_name`
    /// when either text does not parse
    pub fn compute(
        program_id: ProgramId,
        base_source: &str,
        modified_source: &str,
        base_name: &Path,
        modified_name: &Path,
    ) -> Result<Self, DiffError> {
        let base = parse(base_source, base_name)?;
        let modified = parse(modified_source, modified_name)?;
        let entries = diff_programs(&base, &modified);
        let plan = InvalidationPlan::compute(&base, &entries);

        Ok(Self {
            header: DiffHeader {
                program_id,
                base_digest: ContentHash::compute(base_source.as_bytes()),
                modified_digest: ContentHash::compute(modified_source.as_bytes()),
                change_count: entries.len(),
                plan,
            },
            entries,
        })
    }

    /// Encode as newline-delimited JSON
    ///
    /// # Errors
    /// Returns [`DiffError::Encode`] if a line cannot be serialized
    pub fn to_ndjson(&self) -> Result<String, DiffError> {
        let mut out = serde_json::to_string(&self.header)?;
        out.push('\n');
        for entry in &self.entries {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Decode a document produced by [`Self::to_ndjson`]
    ///
    /// # Errors
    /// Returns error if the header is missing, a line is not valid JSON, or
    /// the entry count disagrees with the header
    pub fn parse(text: &str) -> Result<Self, DiffError> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header: DiffHeader = lines
            .next()
            .ok_or_else(|| DiffError::Malformed("missing header line".into()))
            .and_then(|line| serde_json::from_str(line).map_err(DiffError::from))?;
        let entries = lines
            .map(serde_json::from_str)
            .collect::<Result<Vec<ChangeEntry>, _>>()?;
        if entries.len() != header.change_count {
            return Err(DiffError::Malformed(format!(
                "header announces {} entries, found {}",
                header.change_count,
                entries.len()
            )));
        }
        Ok(Self { header, entries })
    }
}

fn parse(source: &str, path: &Path) -> Result<ProgramTree, DiffError> {
    ProgramTree::parse(source).map_err(|failure| match failure {
        SyntaxFailure::Error { line, column } => DiffError::Unparsable {
            path: path.to_path_buf(),
            line,
            column,
        },
        SyntaxFailure::Language(msg) => DiffError::Parser(msg),
        SyntaxFailure::NoTree => DiffError::Parser(format!("no syntax tree for {}", path.display())),
    })
}

fn read_input(path: &Path) -> Result<String, DiffError> {
    if !path.is_file() {
        return Err(DiffError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    std::fs::read_to_string(path).map_err(|e| DiffError::io_error(path, e))
}

/// Write `contents` next to `path` and rename it into place
///
/// # Errors
/// Returns [`DiffError::Io`] if the temp file cannot be created, written or
/// renamed
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), DiffError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| DiffError::io_error(dir, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| DiffError::io_error(dir, e))?;
    tmp.write_all(contents).map_err(|e| DiffError::io_error(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| DiffError::io_error(path, e.error))?;
    Ok(())
}

/// Diff `base_path` against `modified_path` and write the document to
/// `result_path`
///
/// # Errors
/// Returns [`DiffError`] if either input is missing or unparsable, or the
/// result cannot be written
#[instrument(skip_all, fields(program_id = %program_id))]
pub fn compute_diff(
    program_id: ProgramId,
    base_path: &Path,
    modified_path: &Path,
    result_path: &Path,
) -> Result<DiffArtifact, DiffError> {
    let base_source = read_input(base_path)?;
    let modified_source = read_input(modified_path)?;
    let document = DiffDocument::compute(program_id, &base_source, &modified_source, base_path, modified_path)?;
    let encoded = document.to_ndjson()?;
    write_atomic(result_path, encoded.as_bytes())?;

    debug!(
        changes = document.entries.len(),
        invalidated = document.header.plan.invalidated.len(),
        reusable = document.header.plan.reusable.len(),
        result = %result_path.display(),
        "diff written"
    );

    Ok(DiffArtifact {
        program_id,
        base_path: base_path.to_path_buf(),
        modified_path: modified_path.to_path_buf(),
        result_path: result_path.to_path_buf(),
        digest: ContentHash::compute(encoded.as_bytes()),
        change_count: document.entries.len(),
    })
}
