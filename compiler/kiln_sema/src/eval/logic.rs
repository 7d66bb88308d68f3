//! Solving equations over entities.
//!
//! Predicates are property calls: a unary predicate is called on the
//! candidate, an `eq` predicate is called on the value of the first
//! variable with the value of the second as its only argument. Both see
//! the dynamic variables of the solving property.

use kiln_diagnostic::{DiagnosticSink, ErrorCode, Location};
use kiln_ir::{Entity, LogicVarId};
use kiln_logic::{
    Domains, Equation, FailureReason, Inconsistency, Outcome, PredId, Predicates, SolveError,
    Solver,
};

use super::{Analysis, DynVars, PropertyError, PropertyErrorKind};
use crate::language::prop_of;
use crate::Value;

struct PropertyPredicates<'a> {
    analysis: &'a mut Analysis,
    dynvars: &'a DynVars,
}

impl PropertyPredicates<'_> {
    fn expect_bool(value: Value) -> Result<bool, PropertyError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(PropertyError::type_mismatch("bool", other.type_name())),
        }
    }
}

impl Predicates<Entity> for PropertyPredicates<'_> {
    type Error = PropertyError;

    fn unary(&mut self, pred: PredId, value: &Entity) -> Result<bool, PropertyError> {
        let result = self
            .analysis
            .call_entity(value, prop_of(pred), &[], self.dynvars)?;
        Self::expect_bool(result)
    }

    fn binary(&mut self, pred: PredId, a: &Entity, b: &Entity) -> Result<bool, PropertyError> {
        let arg = Value::Entity(b.clone());
        let result = self
            .analysis
            .call_entity(a, prop_of(pred), &[arg], self.dynvars)?;
        Self::expect_bool(result)
    }
}

impl Analysis {
    /// Solve `equation`, binding its logic variables on success.
    ///
    /// Variables that already hold a value start with that single
    /// candidate. An unsatisfiable equation is reported and yields
    /// `false`; it leaves every variable untouched.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn solve(
        &mut self,
        equation: &Equation<Entity>,
        dynvars: &DynVars,
    ) -> Result<bool, PropertyError> {
        let bound = self.bound_vars(equation);
        let solver = Solver::new(self.config.solver.clone());
        let outcome = solver
            .solve(
                equation,
                &bound,
                &mut PropertyPredicates {
                    analysis: self,
                    dynvars,
                },
            )
            .map_err(solve_error)?;

        match outcome {
            Outcome::Solved(assignment) => {
                for (var, value) in assignment.into_vec() {
                    self.tree.set_logic_var(var, value);
                }
                Ok(true)
            }
            Outcome::Failed(failure) => {
                self.report_inconsistency(failure);
                Ok(false)
            }
        }
    }

    /// Candidates of every variable over all satisfiable branches, without
    /// binding anything. `None` when the equation is unsatisfiable.
    pub fn satisfiable(
        &mut self,
        equation: &Equation<Entity>,
        dynvars: &DynVars,
    ) -> Result<Option<Domains<Entity>>, PropertyError> {
        let bound = self.bound_vars(equation);
        let solver = Solver::new(self.config.solver.clone());
        solver
            .satisfiable_domains(
                equation,
                &bound,
                &mut PropertyPredicates {
                    analysis: self,
                    dynvars,
                },
            )
            .map_err(solve_error)
    }

    fn bound_vars(&self, equation: &Equation<Entity>) -> Vec<(LogicVarId, Entity)> {
        equation
            .vars()
            .into_iter()
            .filter_map(|var| Some((var, self.tree.logic_var(var)?.clone())))
            .collect()
    }

    fn report_inconsistency(&mut self, failure: Inconsistency) {
        let code = match failure.reason {
            FailureReason::Unconstrained => ErrorCode::K4002,
            FailureReason::EmptyDomain | FailureReason::False => ErrorCode::K4001,
        };
        let location = failure.origin.map_or(Location::Unknown, Location::Definition);
        self.sink.fail(code, failure.to_string(), location);
    }
}

fn solve_error(err: SolveError<PropertyError>) -> PropertyError {
    match err {
        SolveError::TooManyBranches { limit } => {
            PropertyError::new(PropertyErrorKind::TooManyBranches(limit))
        }
        SolveError::Predicate(err) => err,
    }
}
