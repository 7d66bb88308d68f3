//! Core diagnostic types.
//!
//! The runtime never formats or prints diagnostics. It only classifies them
//! (code + severity) and attaches the location a presentation layer needs.

use std::fmt;

use kiln_ir::{NodeId, SourceLocation, Span};

/// Severity level for diagnostics.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Severity {
    /// Reported, never blocks.
    Warning,
    /// Aborts the current definition step immediately.
    Error,
    /// Accumulates; blocks at the next errors checkpoint.
    NonBlockingError,
}

impl Severity {
    /// Whether this severity counts as an error.
    pub fn is_error(self) -> bool {
        matches!(self, Severity::Error | Severity::NonBlockingError)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error | Severity::NonBlockingError => write!(f, "error"),
        }
    }
}

/// Error codes for all runtime diagnostics.
///
/// Format: K#### where the first digit indicates the phase:
/// - K1xxx: language definition
/// - K2xxx: environment population
/// - K3xxx: property evaluation
/// - K4xxx: equation solving
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorCode {
    // Definition (K1xxx)
    /// Environment action key does not produce a symbol
    K1001,
    /// Invalid `eq_prop` for a bind
    K1002,
    /// Dynamic variable read without being declared
    K1003,
    /// Call requires a dynamic variable that is not bound
    K1004,
    /// Invalid environment metadata struct
    K1005,
    /// Abstract property not overridden by a concrete kind
    K1006,
    /// Override does not match the overridden signature
    K1007,
    /// Duplicate definition
    K1008,
    /// Reference to an unknown argument, local, field or id
    K1009,
    /// Declared dynamic variable is never needed (warning)
    K1010,
    /// Invalid node kind declaration
    K1011,
    /// Invalid predicate property
    K1012,
    /// Property declared without a body
    K1013,

    // Population (K2xxx)
    /// Null symbol used as environment key
    K2001,
    /// Cyclic referenced environment
    K2002,
    /// Subtree already populated
    K2003,
    /// Node environments read before population
    K2004,

    // Evaluation (K3xxx)
    /// No override for an abstract property
    K3001,
    /// Property raised an error
    K3002,
    /// Required dynamic variable missing at call time
    K3003,
    /// Value has the wrong type
    K3004,
    /// Memoized property re-entered with the same key
    K3005,
    /// Logic variable read before being bound
    K3006,
    /// Call depth limit exceeded
    K3007,
    /// Private property called from the host API
    K3008,
    /// Referenced analysis unit could not be loaded
    K3009,

    // Solving (K4xxx)
    /// Inconsistent equation
    K4001,
    /// Variable left unconstrained
    K4002,
    /// Too many alternative branches
    K4003,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::K1001 => "K1001",
            ErrorCode::K1002 => "K1002",
            ErrorCode::K1003 => "K1003",
            ErrorCode::K1004 => "K1004",
            ErrorCode::K1005 => "K1005",
            ErrorCode::K1006 => "K1006",
            ErrorCode::K1007 => "K1007",
            ErrorCode::K1008 => "K1008",
            ErrorCode::K1009 => "K1009",
            ErrorCode::K1010 => "K1010",
            ErrorCode::K1011 => "K1011",
            ErrorCode::K1012 => "K1012",
            ErrorCode::K1013 => "K1013",
            ErrorCode::K2001 => "K2001",
            ErrorCode::K2002 => "K2002",
            ErrorCode::K2003 => "K2003",
            ErrorCode::K2004 => "K2004",
            ErrorCode::K3001 => "K3001",
            ErrorCode::K3002 => "K3002",
            ErrorCode::K3003 => "K3003",
            ErrorCode::K3004 => "K3004",
            ErrorCode::K3005 => "K3005",
            ErrorCode::K3006 => "K3006",
            ErrorCode::K3007 => "K3007",
            ErrorCode::K3008 => "K3008",
            ErrorCode::K3009 => "K3009",
            ErrorCode::K4001 => "K4001",
            ErrorCode::K4002 => "K4002",
            ErrorCode::K4003 => "K4003",
        }
    }

    /// Whether this code belongs to language-definition checking.
    pub fn is_definition(self) -> bool {
        self.as_str().starts_with("K1")
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a diagnostic points.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum Location {
    /// A position in the language definition source.
    Definition(SourceLocation),
    /// A node of an analysis unit.
    Node { node: NodeId, span: Span },
    #[default]
    Unknown,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Definition(loc) => write!(f, "{loc}"),
            Location::Node { node, span } => write!(f, "{node} at {span:?}"),
            Location::Unknown => write!(f, "<unknown location>"),
        }
    }
}

/// A classified diagnostic.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub severity: Severity,
    pub message: String,
    pub location: Location,
}

impl Diagnostic {
    pub fn new(
        code: ErrorCode,
        severity: Severity,
        message: impl Into<String>,
        location: Location,
    ) -> Self {
        Diagnostic {
            code,
            severity,
            message: message.into(),
            location,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity.is_error()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}[{}]: {}",
            self.location, self.severity, self.code, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn non_blocking_error_displays_as_error() {
        assert_eq!(Severity::NonBlockingError.to_string(), "error");
        assert!(Severity::NonBlockingError.is_error());
        assert!(!Severity::Warning.is_error());
    }

    #[test]
    fn phase_of_code() {
        assert!(ErrorCode::K1002.is_definition());
        assert!(!ErrorCode::K2002.is_definition());
    }

    #[test]
    fn display_includes_code_and_location() {
        let diag = Diagnostic::new(
            ErrorCode::K1003,
            Severity::Error,
            "undeclared dynamic variable",
            Location::Definition(SourceLocation {
                file: "lang.rs",
                line: 3,
                column: 1,
            }),
        );
        assert_eq!(
            diag.to_string(),
            "File \"lang.rs\", line 3: error[K1003]: undeclared dynamic variable"
        );
    }
}
