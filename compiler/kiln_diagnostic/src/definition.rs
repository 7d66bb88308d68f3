//! Definition-time checks.
//!
//! Mistakes in a language definition are reported against the definition's
//! own source. `Error` aborts the defining call immediately;
//! `NonBlockingError` accumulates until [`DefinitionDiagnostics::errors_checkpoint`],
//! so independent mistakes surface in one pass; `Warning` never blocks.

use kiln_ir::SourceLocation;

use crate::{ContextStack, Diagnostic, ErrorCode, Location, Severity};

/// A language definition was rejected.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{primary}")]
pub struct DefinitionError {
    /// The diagnostic that triggered the failure.
    pub primary: Diagnostic,
    /// Structured context at the time of the failure, innermost first.
    pub context: Vec<(String, SourceLocation)>,
    /// Further errors accumulated before a checkpoint.
    pub related: Vec<Diagnostic>,
}

impl DefinitionError {
    pub fn code(&self) -> ErrorCode {
        self.primary.code
    }

    /// Primary diagnostic followed by the related ones.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        std::iter::once(&self.primary).chain(self.related.iter())
    }

    /// Whether any carried diagnostic has `code`.
    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.diagnostics().any(|d| d.code == code)
    }
}

/// Diagnostics accumulated while building one language definition.
#[derive(Clone, Debug, Default)]
pub struct DefinitionDiagnostics {
    context: ContextStack,
    reported: Vec<Diagnostic>,
    has_pending_error: bool,
}

impl DefinitionDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(&self) -> &ContextStack {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ContextStack {
        &mut self.context
    }

    /// Check a predicate about the language definition.
    ///
    /// The diagnostic points at the innermost located context frame, or at
    /// the caller when no frame carries a location.
    #[track_caller]
    pub fn check(
        &mut self,
        predicate: bool,
        code: ErrorCode,
        message: impl Into<String>,
        severity: Severity,
    ) -> Result<(), DefinitionError> {
        if predicate {
            return Ok(());
        }
        let caller = SourceLocation::caller();
        let location = Location::Definition(self.context.location().unwrap_or(caller));
        let diagnostic = Diagnostic::new(code, severity, message, location);

        match severity {
            Severity::Warning => tracing::warn!(%diagnostic, "definition warning"),
            Severity::Error | Severity::NonBlockingError => {
                tracing::debug!(%diagnostic, "definition error");
            }
        }
        self.reported.push(diagnostic.clone());

        match severity {
            Severity::Error => Err(DefinitionError {
                primary: diagnostic,
                context: self.context.structured(),
                related: Vec::new(),
            }),
            Severity::NonBlockingError => {
                self.has_pending_error = true;
                Ok(())
            }
            Severity::Warning => Ok(()),
        }
    }

    /// Report an `Error` unconditionally and return it.
    #[track_caller]
    pub fn error(&mut self, code: ErrorCode, message: impl Into<String>) -> DefinitionError {
        let caller = SourceLocation::caller();
        let location = Location::Definition(self.context.location().unwrap_or(caller));
        let primary = Diagnostic::new(code, Severity::Error, message, location);
        tracing::debug!(diagnostic = %primary, "definition error");
        self.reported.push(primary.clone());
        DefinitionError {
            primary,
            context: self.context.structured(),
            related: Vec::new(),
        }
    }

    /// Check several predicates at once with the same severity.
    #[track_caller]
    pub fn check_multiple<I, M>(
        &mut self,
        checks: I,
        severity: Severity,
    ) -> Result<(), DefinitionError>
    where
        I: IntoIterator<Item = (bool, ErrorCode, M)>,
        M: Into<String>,
    {
        for (predicate, code, message) in checks {
            self.check(predicate, code, message, severity)?;
        }
        Ok(())
    }

    /// Fail if any non-blocking error was reported since the last checkpoint.
    pub fn errors_checkpoint(&mut self) -> Result<(), DefinitionError> {
        if !self.has_pending_error {
            return Ok(());
        }
        self.has_pending_error = false;

        let mut errors = self.reported.iter().filter(|d| d.is_error()).cloned();
        let Some(primary) = errors.next() else {
            return Ok(());
        };
        Err(DefinitionError {
            primary,
            context: self.context.structured(),
            related: errors.collect(),
        })
    }

    pub fn has_pending_error(&self) -> bool {
        self.has_pending_error
    }

    /// Everything reported so far, in report order.
    pub fn reported(&self) -> &[Diagnostic] {
        &self.reported
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.reported
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }
}
