//! Structural positions within a program
//!
//! Provides [`StructuralPath`], which addresses a statement by its index in
//! each enclosing statement list and the arm of each enclosing `if`.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// One step of a [`StructuralPath`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    /// Index within a statement list
    Stmt(usize),
    /// Consequent arm of the enclosing `if`
    Then,
    /// Alternate arm of the enclosing `if`
    Else,
}

impl Display for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stmt(i) => write!(f, "{i}"),
            Self::Then => f.write_str("then"),
            Self::Else => f.write_str("else"),
        }
    }
}

/// Path from the program root to a statement
///
/// # Examples
/// - `3` → fourth top-level statement
/// - `3.then.0` → first statement in the consequent of that `if`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StructuralPath(Vec<Segment>);

/// How two statements relate on any execution of the program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precedence {
    /// The first is executed before the second on every path reaching both
    Before,
    /// The first is executed after the second
    After,
    /// One statement encloses the other
    Encloses,
    /// One statement is nested in the other
    Inside,
    /// The statements sit in opposite arms of one `if`
    Exclusive,
    /// Same position
    Same,
}

impl StructuralPath {
    /// Empty path (program root)
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Number of segments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the root
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a segment, returning new path
    #[inline]
    #[must_use]
    pub fn child(&self, segment: Segment) -> Self {
        let mut new = self.clone();
        new.0.push(segment);
        new
    }

    /// Check if this path is a prefix of another
    #[inline]
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.0.len() <= other.0.len() && self.0 == other.0[..self.0.len()]
    }

    /// Execution-order relation between two statements
    ///
    /// Statements diverging at a statement list run in index order; statements
    /// diverging at an `if` arm never both run.
    #[must_use]
    pub fn precedence(&self, other: &Self) -> Precedence {
        let diverge = self
            .0
            .iter()
            .zip(&other.0)
            .position(|(a, b)| a != b);
        match diverge {
            None => match self.0.len().cmp(&other.0.len()) {
                Ordering::Equal => Precedence::Same,
                Ordering::Less => Precedence::Encloses,
                Ordering::Greater => Precedence::Inside,
            },
            Some(k) => match (self.0[k], other.0[k]) {
                (Segment::Stmt(a), Segment::Stmt(b)) if a < b => Precedence::Before,
                (Segment::Stmt(_), Segment::Stmt(_)) => Precedence::After,
                _ => Precedence::Exclusive,
            },
        }
    }
}

impl Display for StructuralPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for StructuralPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        s.split('.')
            .map(|part| match part {
                "then" => Ok(Segment::Then),
                "else" => Ok(Segment::Else),
                n => n
                    .parse()
                    .map(Segment::Stmt)
                    .map_err(|_| PathError::InvalidSegment(n.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl serde::Serialize for StructuralPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for StructuralPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Path parsing errors
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// Segment is neither an index nor an arm name
    #[error("invalid path segment: '{0}'")]
    InvalidSegment(String),
}
