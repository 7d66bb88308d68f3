//! Host-side construction of equations over entities.

use kiln_diagnostic::{DefinitionDiagnostics, DefinitionError, ErrorCode};
use kiln_ir::{DynVarId, Entity, LogicVarId, PropertyId, SourceLocation};
use kiln_logic::{Equation, PredId};

use super::check::{eq_prop_problem, predicate_problem};
use super::Language;

/// Predicate handle the solver uses for a property.
pub(crate) fn pred_of(prop: PropertyId) -> PredId {
    PredId::from_raw(prop.raw())
}

pub(crate) fn prop_of(pred: PredId) -> PropertyId {
    PropertyId::from_raw(pred.raw())
}

/// Builds an equation, checking every `Bind` and `Predicate` against the
/// dynamic variables that will be bound when it is solved.
///
/// A rejected atom is not added.
#[derive(Debug)]
pub struct EquationBuilder<'a> {
    lang: &'a Language,
    available: Vec<DynVarId>,
    diagnostics: DefinitionDiagnostics,
    atoms: Vec<Equation<Entity>>,
}

impl<'a> EquationBuilder<'a> {
    pub(crate) fn new(lang: &'a Language, available: Vec<DynVarId>) -> Self {
        EquationBuilder {
            lang,
            available,
            diagnostics: DefinitionDiagnostics::new(),
            atoms: Vec::new(),
        }
    }

    #[track_caller]
    pub fn domain(
        &mut self,
        var: LogicVarId,
        values: impl IntoIterator<Item = Entity>,
    ) -> &mut Self {
        self.atoms.push(Equation::domain(var, values));
        self
    }

    /// Relate `a` and `b`, by equality or through `eq` called on the value
    /// of `a` with the value of `b` as argument.
    #[track_caller]
    pub fn bind(
        &mut self,
        a: LogicVarId,
        b: LogicVarId,
        eq: Option<PropertyId>,
    ) -> Result<&mut Self, DefinitionError> {
        let Some(eq) = eq else {
            self.atoms.push(Equation::bind(a, b));
            return Ok(self);
        };
        if let Some(problem) = eq_prop_problem(self.lang, eq, &self.available) {
            return Err(self.reject(ErrorCode::K1002, problem));
        }
        self.atoms.push(Equation::bind_with(a, b, pred_of(eq)));
        Ok(self)
    }

    #[track_caller]
    pub fn predicate(
        &mut self,
        var: LogicVarId,
        prop: PropertyId,
    ) -> Result<&mut Self, DefinitionError> {
        if let Some(problem) = predicate_problem(self.lang, prop, &self.available) {
            return Err(self.reject(ErrorCode::K1012, problem));
        }
        self.atoms.push(Equation::predicate(var, pred_of(prop)));
        Ok(self)
    }

    /// Add an already built equation as is.
    pub fn push(&mut self, equation: Equation<Entity>) -> &mut Self {
        self.atoms.push(equation);
        self
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Conjunction of everything added.
    pub fn finish(self) -> Equation<Entity> {
        Equation::all(self.atoms)
    }

    #[track_caller]
    fn reject(&mut self, code: ErrorCode, message: String) -> DefinitionError {
        let location = SourceLocation::caller();
        self.diagnostics
            .context_mut()
            .push("in equation", Some(location), Some("equation"));
        let err = self.diagnostics.error(code, message);
        self.diagnostics.context_mut().pop();
        err
    }
}

impl Language {
    /// Start an equation that will be solved with `available` bound.
    pub fn equation_builder(
        &self,
        available: impl IntoIterator<Item = DynVarId>,
    ) -> EquationBuilder<'_> {
        EquationBuilder::new(self, available.into_iter().collect())
    }
}
