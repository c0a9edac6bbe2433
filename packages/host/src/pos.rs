//! Source positions attached to call sites.

use std::fmt;
use std::sync::Arc;

/// A position in a source file.
///
/// Positions are cheap to clone; the file name is shared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Pos {
    file: Option<Arc<str>>,
    line: u32,
    column: u32,
}

impl Pos {
    /// Create a position in `file`.
    pub fn new(file: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
        Self {
            file: Some(file.into()),
            line,
            column,
        }
    }

    /// The position used when no source location is known.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> u32 {
        self.column
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file, self.line, self.column),
            None => write!(f, "undefined position"),
        }
    }
}
