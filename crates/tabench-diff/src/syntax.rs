//! JavaScript statement trees
//!
//! Parses source with tree-sitter and reduces it to the shape the differ
//! needs: statement lists, with `if` statements split into test and arms.
//! Every statement carries a token-normalized text so whitespace and
//! comments never count as changes.

use tree_sitter::{Node, Parser};

/// One statement of a program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// 1-based source line where the statement starts
    pub line: usize,
    /// Normalized token text of the whole statement
    pub text: String,
    /// Statement shape
    pub kind: StatementKind,
}

/// Statement shapes the differ distinguishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    /// Conditional with separately diffable arms
    Conditional {
        /// Normalized test expression, parentheses included
        test: String,
        /// Consequent statements
        then_branch: Vec<Statement>,
        /// Alternate statements (`None` when there is no `else`)
        else_branch: Option<Vec<Statement>>,
    },
    /// Any other statement, compared as a whole
    Simple,
}

impl Statement {
    /// Key used to align statements across versions
    ///
    /// Conditionals align on their test only, so edits inside an arm leave
    /// the enclosing `if` matched.
    #[must_use]
    pub fn alignment_key(&self) -> &str {
        match &self.kind {
            StatementKind::Conditional { test, .. } => test,
            StatementKind::Simple => &self.text,
        }
    }

    /// Test expression, for conditionals
    #[must_use]
    pub fn test(&self) -> Option<&str> {
        match &self.kind {
            StatementKind::Conditional { test, .. } => Some(test),
            StatementKind::Simple => None,
        }
    }
}

/// Parsed program body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramTree {
    /// Top-level statements
    pub body: Vec<Statement>,
}

/// Why a source text could not be turned into a [`ProgramTree`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxFailure {
    /// Grammar could not be loaded
    Language(String),
    /// Parser produced no tree
    NoTree,
    /// Syntax error at a 1-based position
    Error {
        /// Line of the first error
        line: usize,
        /// Column of the first error
        column: usize,
    },
}

impl ProgramTree {
    /// Parse JavaScript module source
    ///
    /// # Errors
    /// Returns [`SyntaxFailure::Error`] with the position of the first error
    /// or missing node when the source does not parse cleanly
    pub fn parse(source: &str) -> Result<Self, SyntaxFailure> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_javascript::LANGUAGE.into())
            .map_err(|e| SyntaxFailure::Language(e.to_string()))?;
        let tree = parser.parse(source, None).ok_or(SyntaxFailure::NoTree)?;
        let root = tree.root_node();

        if root.has_error() {
            let bad = first_error(root).unwrap_or(root);
            let pos = bad.start_position();
            return Err(SyntaxFailure::Error {
                line: pos.row + 1,
                column: pos.column + 1,
            });
        }

        Ok(Self {
            body: statement_list(root, source.as_bytes()),
        })
    }

    /// Number of conditionals at any depth
    #[must_use]
    pub fn conditional_count(&self) -> usize {
        fn count(list: &[Statement]) -> usize {
            list.iter()
                .map(|s| match &s.kind {
                    StatementKind::Conditional {
                        then_branch,
                        else_branch,
                        ..
                    } => 1 + count(then_branch) + else_branch.as_deref().map_or(0, count),
                    StatementKind::Simple => 0,
                })
                .sum()
        }
        count(&self.body)
    }
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error() || c.is_missing())
        .find_map(first_error)
}

fn is_skipped(node: &Node<'_>) -> bool {
    matches!(node.kind(), "comment" | "empty_statement" | "hash_bang_line")
}

fn statement_list(parent: Node<'_>, source: &[u8]) -> Vec<Statement> {
    let mut cursor = parent.walk();
    let children: Vec<Node<'_>> = parent.named_children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|n| !is_skipped(n))
        .map(|n| statement(n, source))
        .collect()
}

/// Arm of an `if`: a block contributes its statements, anything else is a
/// single-statement arm.
fn arm(node: Node<'_>, source: &[u8]) -> Vec<Statement> {
    if node.kind() == "statement_block" {
        statement_list(node, source)
    } else if is_skipped(&node) {
        Vec::new()
    } else {
        vec![statement(node, source)]
    }
}

fn statement(node: Node<'_>, source: &[u8]) -> Statement {
    let line = node.start_position().row + 1;
    let text = normalized_text(node, source);

    if node.kind() != "if_statement" {
        return Statement {
            line,
            text,
            kind: StatementKind::Simple,
        };
    }

    let test = node
        .child_by_field_name("condition")
        .map(|c| normalized_text(c, source))
        .unwrap_or_default();
    let then_branch = node
        .child_by_field_name("consequence")
        .map(|c| arm(c, source))
        .unwrap_or_default();
    let else_branch = node.child_by_field_name("alternative").map(|clause| {
        let mut cursor = clause.walk();
        let inner: Vec<Node<'_>> = clause.named_children(&mut cursor).collect();
        inner
            .into_iter()
            .filter(|n| !is_skipped(n))
            .flat_map(|n| arm(n, source))
            .collect()
    });

    Statement {
        line,
        text,
        kind: StatementKind::Conditional {
            test,
            then_branch,
            else_branch,
        },
    }
}

/// Leaf tokens joined by single spaces, comments dropped
fn normalized_text(node: Node<'_>, source: &[u8]) -> String {
    let mut tokens = Vec::new();
    collect_tokens(node, source, &mut tokens);
    tokens.join(" ")
}

fn collect_tokens(node: Node<'_>, source: &[u8], out: &mut Vec<String>) {
    if node.kind() == "comment" {
        return;
    }
    if node.child_count() == 0 {
        if let Ok(text) = node.utf8_text(source) {
            if !text.is_empty() {
                out.push(text.to_string());
            }
        }
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_tokens(child, source, out);
    }
}
