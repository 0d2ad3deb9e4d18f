//! Source location types
//!
//! These types represent positions in source code. They follow the front-end
//! contract: `{start: {line, column}, end: {line, column}, sourcefile}`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Single position in source code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl Pos {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Source location attached to an AST node
///
/// Front-ends may omit any part; a missing `sourcefile` means the node was
/// synthesized (wrapper scopes, decorator expansions).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Loc {
    pub start: Pos,
    #[serde(default)]
    pub end: Pos,
    #[serde(default)]
    pub sourcefile: Option<String>,
}

impl Loc {
    pub fn new(start: Pos, end: Pos) -> Self {
        Self {
            start,
            end,
            sourcefile: None,
        }
    }

    /// Create a single-line location (tests and synthesized nodes)
    pub fn line(line: u32) -> Self {
        Self {
            start: Pos::new(line, 0),
            end: Pos::new(line, 0),
            sourcefile: None,
        }
    }

    /// Attach the originating file path
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.sourcefile = Some(file.into());
        self
    }

    /// File name for reporting ("<unknown>" when the front-end omitted it)
    pub fn file(&self) -> &str {
        self.sourcefile.as_deref().unwrap_or("<unknown>")
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file(), self.start.line, self.start.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loc_display() {
        let loc = Loc::line(12).with_file("app.js");
        assert_eq!(loc.to_string(), "app.js:12:0");

        let bare = Loc::line(3);
        assert_eq!(bare.to_string(), "<unknown>:3:0");
    }
}
