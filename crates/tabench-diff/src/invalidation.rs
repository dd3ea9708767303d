//! Which cached conditionals survive a change set
//!
//! Cached exploration state is keyed by conditional. A conditional in the base
//! program stays reusable unless some change runs before it on a path that
//! reaches it, sits at its position, or encloses it.

use crate::delta::{Anchor, ChangeEntry};
use crate::path::{Precedence, Segment, StructuralPath};
use crate::syntax::{ProgramTree, Statement, StatementKind};
use serde::{Deserialize, Serialize};

/// Partition of the base program's conditionals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationPlan {
    /// Conditionals whose cached state must be re-explored
    pub invalidated: Vec<Anchor>,
    /// Conditionals whose cached state can be reused
    pub reusable: Vec<Anchor>,
    /// Anchor of the earliest change; `None` means resume from the program start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_from: Option<Anchor>,
}

impl InvalidationPlan {
    /// Plan for `changes` against the conditionals of `base`
    #[must_use]
    pub fn compute(base: &ProgramTree, changes: &[ChangeEntry]) -> Self {
        let mut plan = Self::default();
        for site in conditionals(base) {
            let hit = changes.iter().any(|change| {
                matches!(
                    change.path.precedence(&site.path),
                    Precedence::Before | Precedence::Same | Precedence::Encloses
                )
            });
            if hit {
                plan.invalidated.push(site);
            } else {
                plan.reusable.push(site);
            }
        }
        plan.resume_from = changes
            .iter()
            .min_by(|a, b| a.path.cmp(&b.path))
            .and_then(|first| first.anchor.clone());
        plan
    }
}

/// Every conditional in `tree`, in document order
#[must_use]
pub fn conditionals(tree: &ProgramTree) -> Vec<Anchor> {
    fn walk(list: &[Statement], prefix: &StructuralPath, out: &mut Vec<Anchor>) {
        for (i, stmt) in list.iter().enumerate() {
            let StatementKind::Conditional {
                test,
                then_branch,
                else_branch,
            } = &stmt.kind
            else {
                continue;
            };
            let path = prefix.child(Segment::Stmt(i));
            out.push(Anchor {
                path: path.clone(),
                test: test.clone(),
                line: stmt.line,
            });
            walk(then_branch, &path.child(Segment::Then), out);
            if let Some(alt) = else_branch {
                walk(alt, &path.child(Segment::Else), out);
            }
        }
    }
    let mut out = Vec::new();
    walk(&tree.body, &StructuralPath::root(), &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::diff_programs;
    use pretty_assertions::assert_eq;

    const BASE: &str = "let x = input();
if (x > 1) {
   let k = 2;
   if (x > 5) { k++; }
} else {
   if (x < -5) { x--; }
}
if (x == 3) { x = 0; }
";

    fn plan(modified: &str) -> InvalidationPlan {
        let base = ProgramTree::parse(BASE).unwrap();
        let changes = diff_programs(&base, &ProgramTree::parse(modified).unwrap());
        InvalidationPlan::compute(&base, &changes)
    }

    fn paths(list: &[Anchor]) -> Vec<String> {
        list.iter().map(|a| a.path.to_string()).collect()
    }

    #[test]
    fn lists_conditionals_in_document_order() {
        let tree = ProgramTree::parse(BASE).unwrap();
        assert_eq!(paths(&conditionals(&tree)), vec!["1", "1.then.1", "1.else.0", "2"]);
    }

    #[test]
    fn unchanged_program_reuses_everything() {
        let plan = plan(BASE);
        assert!(plan.invalidated.is_empty());
        assert_eq!(plan.reusable.len(), 4);
        assert!(plan.resume_from.is_none());
    }

    #[test]
    fn edit_in_then_arm_spares_enclosing_and_opposite_arm() {
        let plan = plan(&BASE.replace("let k = 2;", "let k = 20;"));
        assert_eq!(paths(&plan.invalidated), vec!["1.then.1", "2"]);
        assert_eq!(paths(&plan.reusable), vec!["1", "1.else.0"]);
        assert_eq!(plan.resume_from.unwrap().test, "( x > 1 )");
    }

    #[test]
    fn top_level_edit_invalidates_everything_after_it() {
        let plan = plan(&BASE.replace("let x = input();", "let x = input() + 1;"));
        assert_eq!(plan.invalidated.len(), 4);
        assert!(plan.resume_from.is_none());
    }

    #[test]
    fn changed_test_invalidates_nested_conditionals() {
        let plan = plan(&BASE.replace("x > 1", "x > 2"));
        assert_eq!(paths(&plan.invalidated), vec!["1", "1.then.1", "1.else.0", "2"]);
    }

    #[test]
    fn edit_in_last_conditional_keeps_earlier_ones() {
        let plan = plan(&BASE.replace("x = 0;", "x = 1;"));
        assert_eq!(paths(&plan.invalidated), Vec::<String>::new());
        assert_eq!(plan.reusable.len(), 4);
        assert_eq!(plan.resume_from.unwrap().path.to_string(), "2");
    }
}
