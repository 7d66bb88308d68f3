//! Diagnostics for the Kiln semantic analysis runtime.
//!
//! Two kinds of reporting:
//! - Definition-time: mistakes in a language definition, reported against the
//!   definition's source with a context stack ([`DefinitionDiagnostics`])
//! - Runtime: problems found while populating environments, evaluating
//!   properties or solving equations, reported to a [`DiagnosticSink`]

mod context;
mod definition;
mod diagnostic;
mod sink;

pub use context::{ContextFrame, ContextStack};
pub use definition::{DefinitionDiagnostics, DefinitionError};
pub use diagnostic::{Diagnostic, ErrorCode, Location, Severity};
pub use sink::{DiagnosticBag, DiagnosticConfig, DiagnosticSink};
