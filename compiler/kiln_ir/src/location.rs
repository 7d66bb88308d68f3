//! Locations inside the language definition's own source.
//!
//! Definition APIs are `#[track_caller]`, so the location captured here is
//! the user's call site rather than a frame inside the framework.

use std::fmt;

/// A file/line/column position in the language definition source.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    /// Location of the nearest caller not marked `#[track_caller]`.
    #[inline]
    #[track_caller]
    pub fn caller() -> Self {
        Self::from(std::panic::Location::caller())
    }

    /// Parsable `file:line:column` form.
    pub fn parsable(&self) -> String {
        format!("{}:{}:{}", self.file, self.line, self.column)
    }
}

impl From<&'static std::panic::Location<'static>> for SourceLocation {
    fn from(loc: &'static std::panic::Location<'static>) -> Self {
        SourceLocation {
            file: loc.file(),
            line: loc.line(),
            column: loc.column(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File \"{}\", line {}", self.file, self.line)
    }
}
