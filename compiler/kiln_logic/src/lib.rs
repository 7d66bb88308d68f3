//! Logic equations over unification variables.
//!
//! Name resolution under ambiguity is phrased as an [`Equation`] over
//! [`LogicVarId`]s whose values are entities. The [`Solver`] narrows each
//! variable's candidate set by propagation and picks a consistent
//! assignment.
//!
//! This crate knows nothing about properties or trees: the values are a
//! type parameter, and predicates are callbacks through [`Predicates`].
//!
//! [`LogicVarId`]: kiln_ir::LogicVarId

mod equation;
mod error;
mod solver;

pub use equation::{Equation, PredId};
pub use error::{FailureReason, Inconsistency, SolveError};
pub use solver::{Assignment, Domains, Outcome, Predicates, Solver, SolverConfig};
