//! Session configuration.

use kiln_diagnostic::DiagnosticConfig;
use kiln_logic::SolverConfig;
use kiln_sema::EvalConfig;

use crate::TraceFormat;

/// Settings of one [`AnalysisContext`](crate::AnalysisContext).
///
/// # Example
///
/// ```ignore
/// let config = AnalysisConfig::default()
///     .with_max_call_depth(512)
///     .with_trace(TraceFormat::Tree);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AnalysisConfig {
    /// Cache results of memoized properties.
    pub memoize: bool,
    /// Maximum nesting of property calls (0 = unlimited).
    pub max_call_depth: usize,
    pub solver: SolverConfig,
    pub diagnostics: DiagnosticConfig,
    /// Install a tracing subscriber when the context is created.
    pub trace: Option<TraceFormat>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let eval = EvalConfig::default();
        AnalysisConfig {
            memoize: eval.memoize,
            max_call_depth: eval.max_call_depth,
            solver: eval.solver,
            diagnostics: DiagnosticConfig::default(),
            trace: None,
        }
    }
}

impl AnalysisConfig {
    /// No error limit, no diagnostic forwarding (for testing).
    pub fn unlimited() -> Self {
        AnalysisConfig {
            diagnostics: DiagnosticConfig::unlimited(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_memoize(mut self, memoize: bool) -> Self {
        self.memoize = memoize;
        self
    }

    #[must_use]
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    #[must_use]
    pub fn with_max_branches(mut self, branches: usize) -> Self {
        self.solver.max_branches = branches;
        self
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticConfig) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    #[must_use]
    pub fn with_trace(mut self, format: TraceFormat) -> Self {
        self.trace = Some(format);
        self
    }

    /// The evaluator-facing part of the configuration.
    pub fn eval_config(&self) -> EvalConfig {
        EvalConfig {
            memoize: self.memoize,
            max_call_depth: self.max_call_depth,
            solver: self.solver.clone(),
        }
    }
}
