//! Structural deltas between two versions of a program
//!
//! Statement lists are aligned on [`Statement::alignment_key`] with a
//! longest-common-subsequence pass. Matched conditionals are recursed into
//! arm by arm; unmatched statements inside one gap are paired off as
//! alterations, and the surplus is reported as additions or removals.

use crate::path::{Segment, StructuralPath};
use crate::syntax::{ProgramTree, Statement, StatementKind};
use serde::{Deserialize, Serialize};

/// What happened to a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Present only in the modified version
    Added,
    /// Present only in the base version
    Removed,
    /// Present in both at the same structural slot with different content
    Altered,
}

/// Innermost conditional enclosing a change
///
/// Cached exploration state is keyed by conditional, so this is the key the
/// targeted engine resumes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    /// Position of the conditional in the base program
    pub path: StructuralPath,
    /// Normalized test of the conditional
    pub test: String,
    /// 1-based line of the conditional in the base program
    pub line: usize,
}

/// One structural change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// Kind of change
    pub kind: ChangeKind,
    /// Position in base coordinates (insertion point for additions)
    pub path: StructuralPath,
    /// Position in modified coordinates (`None` for removals)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_path: Option<StructuralPath>,
    /// Base line (`None` for additions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_line: Option<usize>,
    /// Modified line (`None` for removals)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_line: Option<usize>,
    /// Base statement text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_text: Option<String>,
    /// Modified statement text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_text: Option<String>,
    /// Innermost enclosing conditional (`None` at top level)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<Anchor>,
}

/// Changes between two program trees, in base document order
#[must_use]
pub fn diff_programs(base: &ProgramTree, modified: &ProgramTree) -> Vec<ChangeEntry> {
    let mut out = Vec::new();
    let root = StructuralPath::root();
    diff_lists(&base.body, &modified.body, &root, &root, None, &mut out);
    out
}

enum Step {
    Keep(usize, usize),
    Delete(usize),
    Insert(usize),
}

/// LCS alignment; ties prefer deleting from the base first, which keeps the
/// output stable for identical inputs.
fn align(base: &[Statement], modified: &[Statement]) -> Vec<Step> {
    let n = base.len();
    let m = modified.len();
    let mut table = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if base[i].alignment_key() == modified[j].alignment_key() {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut steps = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if base[i].alignment_key() == modified[j].alignment_key() {
            steps.push(Step::Keep(i, j));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            steps.push(Step::Delete(i));
            i += 1;
        } else {
            steps.push(Step::Insert(j));
            j += 1;
        }
    }
    steps.extend((i..n).map(Step::Delete));
    steps.extend((j..m).map(Step::Insert));
    steps
}

fn diff_lists(
    base: &[Statement],
    modified: &[Statement],
    base_prefix: &StructuralPath,
    modified_prefix: &StructuralPath,
    anchor: Option<&Anchor>,
    out: &mut Vec<ChangeEntry>,
) {
    let mut deleted: Vec<usize> = Vec::new();
    let mut inserted: Vec<usize> = Vec::new();

    for step in align(base, modified) {
        match step {
            Step::Delete(i) => deleted.push(i),
            Step::Insert(j) => inserted.push(j),
            Step::Keep(i, j) => {
                flush_gap(base, modified, &deleted, &inserted, i, base_prefix, modified_prefix, anchor, out);
                deleted.clear();
                inserted.clear();
                let base_path = base_prefix.child(Segment::Stmt(i));
                let modified_path = modified_prefix.child(Segment::Stmt(j));
                diff_matched(&base[i], &modified[j], &base_path, &modified_path, out);
            }
        }
    }
    flush_gap(base, modified, &deleted, &inserted, base.len(), base_prefix, modified_prefix, anchor, out);
}

/// Statements with equal alignment keys: simple statements are identical,
/// conditionals share a test and are compared arm by arm.
fn diff_matched(
    base: &Statement,
    modified: &Statement,
    base_path: &StructuralPath,
    modified_path: &StructuralPath,
    out: &mut Vec<ChangeEntry>,
) {
    let (
        StatementKind::Conditional {
            test,
            then_branch: base_then,
            else_branch: base_else,
        },
        StatementKind::Conditional {
            then_branch: mod_then,
            else_branch: mod_else,
            ..
        },
    ) = (&base.kind, &modified.kind)
    else {
        return;
    };

    let anchor = Anchor {
        path: base_path.clone(),
        test: test.clone(),
        line: base.line,
    };
    diff_lists(
        base_then,
        mod_then,
        &base_path.child(Segment::Then),
        &modified_path.child(Segment::Then),
        Some(&anchor),
        out,
    );
    diff_lists(
        base_else.as_deref().unwrap_or_default(),
        mod_else.as_deref().unwrap_or_default(),
        &base_path.child(Segment::Else),
        &modified_path.child(Segment::Else),
        Some(&anchor),
        out,
    );
}

#[allow(clippy::too_many_arguments)]
fn flush_gap(
    base: &[Statement],
    modified: &[Statement],
    deleted: &[usize],
    inserted: &[usize],
    insertion_point: usize,
    base_prefix: &StructuralPath,
    modified_prefix: &StructuralPath,
    anchor: Option<&Anchor>,
    out: &mut Vec<ChangeEntry>,
) {
    let paired = deleted.len().min(inserted.len());

    for (&i, &j) in deleted.iter().zip(inserted) {
        out.push(ChangeEntry {
            kind: ChangeKind::Altered,
            path: base_prefix.child(Segment::Stmt(i)),
            modified_path: Some(modified_prefix.child(Segment::Stmt(j))),
            base_line: Some(base[i].line),
            modified_line: Some(modified[j].line),
            base_text: Some(base[i].text.clone()),
            modified_text: Some(modified[j].text.clone()),
            anchor: anchor.cloned(),
        });
    }
    for &i in &deleted[paired..] {
        out.push(ChangeEntry {
            kind: ChangeKind::Removed,
            path: base_prefix.child(Segment::Stmt(i)),
            modified_path: None,
            base_line: Some(base[i].line),
            modified_line: None,
            base_text: Some(base[i].text.clone()),
            modified_text: None,
            anchor: anchor.cloned(),
        });
    }
    for &j in &inserted[paired..] {
        out.push(ChangeEntry {
            kind: ChangeKind::Added,
            path: base_prefix.child(Segment::Stmt(insertion_point)),
            modified_path: Some(modified_prefix.child(Segment::Stmt(j))),
            base_line: None,
            modified_line: Some(modified[j].line),
            base_text: None,
            modified_text: Some(modified[j].text.clone()),
            anchor: anchor.cloned(),
        });
    }
}
