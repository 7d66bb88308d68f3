//! Kiln - semantic analysis runtime for language front-ends
//!
//! A language front-end declares its node kinds, properties, dynamic
//! variables and environment specs once. Kiln checks the definition as a
//! whole, then runs name resolution over trees built by the host:
//!
//! ```text
//! LanguageBuilder ──build()──► Language (checked, immutable)
//!                                   │
//! host parser ──► nodes ──► AnalysisContext
//!                               ├── populate  (lexical environments)
//!                               ├── call_public (properties, memoized)
//!                               └── units     (loaded on first reference)
//! ```
//!
//! # Debug Environment Variables
//!
//! - `RUST_LOG=kiln_sema=debug`: population, solving and memo hits.
//! - `RUST_LOG=kiln_sema=trace`: every property call (very verbose).
//!
//! Output only appears once [`init_tracing`] has run, either directly or
//! through [`AnalysisConfig::with_trace`].

mod config;
mod context;
mod error;
mod registry;
mod tracing_setup;

pub use config::AnalysisConfig;
pub use context::AnalysisContext;
pub use error::AnalysisError;
pub use registry::UnitProvider;
pub use tracing_setup::{init_tracing, TraceFormat};

// Re-exports for convenience
pub use kiln_diagnostic::{
    DefinitionError, Diagnostic, DiagnosticBag, DiagnosticConfig, DiagnosticSink, ErrorCode,
    Location, Severity,
};
pub use kiln_ir::{
    DynVarId, EnvId, Entity, KindId, LogicVarId, Metadata, NodeId, PropertyId, SharedSymbols,
    Span, Symbol, SymbolTable, TreeError, UnitId,
};
pub use kiln_logic::{Equation, SolverConfig};
pub use kiln_sema::{
    Analysis, BinaryOp, DynVars, EnvSpec, EnvValue, EquationBuilder, Expr, ExternalCall, KindDecl,
    Language, LanguageBuilder, MatchArm, MetadataDecl, NodeBuildError, PopulateError, PropertyDecl,
    PropertyError, PropertyErrorKind, RefTransform, Value, ValueType,
};
