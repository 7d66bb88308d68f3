//! Runtime diagnostic sink.
//!
//! Population and evaluation report through a [`DiagnosticSink`] instead of
//! printing. [`DiagnosticBag`] is the default collector:
//! - Error limit so a broken unit does not flood the caller
//! - Exact-duplicate suppression
//! - Optional forwarding to `tracing`

use kiln_ir::NodeId;
use rustc_hash::FxHashSet;

use crate::{Diagnostic, ErrorCode, Location, Severity};

/// Receives runtime diagnostics.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);

    /// Shorthand for an error about a node.
    fn fail(&mut self, code: ErrorCode, message: String, location: Location) {
        self.report(Diagnostic::new(code, Severity::Error, message, location));
    }

    /// Shorthand for a warning about a node.
    fn warn(&mut self, code: ErrorCode, message: String, location: Location) {
        self.report(Diagnostic::new(code, Severity::Warning, message, location));
    }
}

/// Configuration for runtime diagnostic collection.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DiagnosticConfig {
    /// Maximum number of errors kept (0 = unlimited).
    pub error_limit: usize,
    /// Emit every kept diagnostic as a `tracing` event too.
    pub forward_to_tracing: bool,
    /// Drop diagnostics identical to one already kept.
    pub deduplicate: bool,
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        DiagnosticConfig {
            error_limit: 100,
            forward_to_tracing: true,
            deduplicate: true,
        }
    }
}

impl DiagnosticConfig {
    /// Create a config with no limits (for testing).
    pub fn unlimited() -> Self {
        DiagnosticConfig {
            error_limit: 0,
            forward_to_tracing: false,
            deduplicate: false,
        }
    }
}

/// Collects diagnostics in report order.
#[derive(Clone, Debug, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
    seen: FxHashSet<Diagnostic>,
    error_count: usize,
    dropped: usize,
    config: DiagnosticConfig,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::with_config(DiagnosticConfig::default())
    }

    pub fn with_config(config: DiagnosticConfig) -> Self {
        DiagnosticBag {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &DiagnosticConfig {
        &self.config
    }

    /// Whether the error limit has been reached.
    pub fn limit_reached(&self) -> bool {
        self.config.error_limit > 0 && self.error_count >= self.config.error_limit
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Diagnostics discarded by the error limit.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn count_by_code(&self, code: ErrorCode) -> usize {
        self.diagnostics.iter().filter(|d| d.code == code).count()
    }

    /// Diagnostics pointing at `node`.
    pub fn for_node(&self, node: NodeId) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |d| matches!(d.location, Location::Node { node: n, .. } if n == node))
    }

    /// Drain all diagnostics, resetting counts.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        self.seen.clear();
        self.error_count = 0;
        self.dropped = 0;
        std::mem::take(&mut self.diagnostics)
    }
}

impl DiagnosticSink for DiagnosticBag {
    fn report(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_error() && self.limit_reached() {
            self.dropped += 1;
            return;
        }
        if self.config.deduplicate && !self.seen.insert(diagnostic.clone()) {
            return;
        }
        if self.config.forward_to_tracing {
            let (code, location) = (&diagnostic.code, &diagnostic.location);
            if diagnostic.is_error() {
                tracing::error!(code = %code, location = %location, "{}", diagnostic.message);
            } else {
                tracing::warn!(code = %code, location = %location, "{}", diagnostic.message);
            }
        }
        if diagnostic.is_error() {
            self.error_count += 1;
        }
        self.diagnostics.push(diagnostic);
    }
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_ir::Span;
    use pretty_assertions::assert_eq;

    fn at(node: u32) -> Location {
        Location::Node {
            node: NodeId::from_raw(node),
            span: Span::DUMMY,
        }
    }

    #[test]
    fn error_limit_drops_excess_errors() {
        let mut bag = DiagnosticBag::with_config(DiagnosticConfig {
            error_limit: 2,
            ..DiagnosticConfig::unlimited()
        });
        for i in 0..4 {
            bag.fail(ErrorCode::K3002, format!("raised {i}"), at(i));
        }
        bag.warn(ErrorCode::K1010, "still kept".into(), at(0));

        assert_eq!(bag.error_count(), 2);
        assert_eq!(bag.dropped(), 2);
        assert_eq!(bag.len(), 3);
        assert!(bag.limit_reached());
    }

    #[test]
    fn deduplicates_identical_reports() {
        let mut bag = DiagnosticBag::with_config(DiagnosticConfig {
            deduplicate: true,
            ..DiagnosticConfig::unlimited()
        });
        bag.fail(ErrorCode::K2002, "cycle".into(), at(1));
        bag.fail(ErrorCode::K2002, "cycle".into(), at(1));
        bag.fail(ErrorCode::K2002, "cycle".into(), at(2));

        assert_eq!(bag.count_by_code(ErrorCode::K2002), 2);
        assert_eq!(bag.for_node(NodeId::from_raw(1)).count(), 1);
    }

    #[test]
    fn take_resets_state() {
        let mut bag = DiagnosticBag::with_config(DiagnosticConfig::unlimited());
        bag.fail(ErrorCode::K4001, "inconsistent".into(), Location::Unknown);
        let taken = bag.take();

        assert_eq!(taken.len(), 1);
        assert!(!bag.has_errors());
        assert!(bag.is_empty());
    }
}
