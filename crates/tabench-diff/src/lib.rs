//! tabench Diff Extractor
//!
//! Structural diffs between a base JavaScript program and its modified
//! variant, addressed by statement position rather than byte offset, plus
//! the plan of which cached conditionals a targeted run may reuse.
//!
//! # Core Concepts
//!
//! - [`StructuralPath`]: statement index per list, `then`/`else` per `if`
//! - [`ChangeEntry`]: one added, removed or altered statement with its [`Anchor`]
//! - [`InvalidationPlan`]: reusable vs invalidated conditionals
//! - [`compute_diff`]: read both files, write the NDJSON document atomically
//!
//! # Example
//!
//! ```
//! use tabench_diff::{DiffDocument, ProgramId};
//! use std::path::Path;
//!
//! let id = ProgramId::new(1).unwrap();
//! let doc = DiffDocument::compute(
//!     id,
//!     "if (a > 1) { b(); }",
//!     "if (a > 1) { b(2); }",
//!     Path::new("1.jse.js"),
//!     Path::new("1.jse.diff.js"),
//! )
//! .unwrap();
//! assert_eq!(doc.entries.len(), 1);
//! assert_eq!(doc.entries[0].path.to_string(), "0.then.0");
//! ```

#![warn(unreachable_pub)]

mod delta;
mod error;
mod extractor;
mod invalidation;
mod path;
mod syntax;

pub use delta::{diff_programs, Anchor, ChangeEntry, ChangeKind};
pub use error::DiffError;
pub use extractor::{compute_diff, write_atomic, DiffDocument, DiffHeader};
pub use invalidation::{conditionals, InvalidationPlan};
pub use path::{PathError, Precedence, Segment, StructuralPath};
pub use syntax::{ProgramTree, Statement, StatementKind, SyntaxFailure};
pub use tabench_artifact::ProgramId;
