//! Solver errors and failure descriptions.

use std::fmt;

use kiln_ir::{LogicVarId, SourceLocation};

/// Hard failure of a solve: the query cannot be answered at all.
///
/// An unsatisfiable equation is not an error; it is reported as
/// [`crate::Outcome::Failed`].
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum SolveError<E> {
    /// Exploring `Or` alternatives and labelings exceeded the branch budget.
    #[error("equation explored more than {limit} branches")]
    TooManyBranches { limit: usize },
    /// A predicate callback failed.
    #[error("predicate failed: {0}")]
    Predicate(E),
}

/// Why a branch of the equation could not be satisfied.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FailureReason {
    /// A constraint emptied a variable's domain.
    EmptyDomain,
    /// A variable was never given candidates.
    Unconstrained,
    /// The branch contained `False`.
    False,
}

/// The failure observed last while solving.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Inconsistency {
    /// Location of the atom that triggered the failure, if known.
    pub origin: Option<SourceLocation>,
    pub var: Option<LogicVarId>,
    pub reason: FailureReason,
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.reason, self.var) {
            (FailureReason::EmptyDomain, Some(var)) => {
                write!(f, "inconsistent equation: no candidate left for {var}")?;
            }
            (FailureReason::Unconstrained, Some(var)) => {
                write!(f, "{var} has no candidates to choose from")?;
            }
            (FailureReason::False, _) => write!(f, "equation is unsatisfiable")?,
            (_, None) => write!(f, "inconsistent equation")?,
        }
        if let Some(origin) = self.origin {
            write!(f, " ({origin})")?;
        }
        Ok(())
    }
}
