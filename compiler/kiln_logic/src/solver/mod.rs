//! Fixpoint equation solver.
//!
//! # Design
//!
//! - `Or` alternatives become separate branches, explored depth-first in
//!   declaration order so repeated solves are reproducible
//! - Each branch keeps one candidate list per variable and propagates its
//!   atoms to a fixpoint as soon as they are collected
//! - Propagation only ever removes candidates, so every branch terminates
//! - A plain equality bind hands candidates to an unconstrained partner; a
//!   bind with an eq_prop waits until both sides have candidates
//! - A consistent branch is labeled: variables with several candidates are
//!   fixed one at a time (first candidate first), backtracking on failure
//! - Predicate results are cached per solve call

mod domain;

use std::hash::Hash;

use kiln_ir::{LogicVarId, SourceLocation};
use rustc_hash::FxHashMap;

use crate::{Equation, FailureReason, Inconsistency, PredId, SolveError};
use domain::{dedup, Dom, Effect};

/// Predicate callbacks referenced by [`Equation::Predicate`] and
/// [`Equation::Bind`].
pub trait Predicates<V> {
    type Error;

    fn unary(&mut self, pred: PredId, value: &V) -> Result<bool, Self::Error>;

    fn binary(&mut self, pred: PredId, a: &V, b: &V) -> Result<bool, Self::Error>;
}

/// Configuration for the solver.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SolverConfig {
    /// Maximum number of alternative branches explored per solve
    /// (0 = unlimited).
    pub max_branches: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig { max_branches: 4096 }
    }
}

/// One value per solved variable, in order of first appearance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Assignment<V> {
    values: Vec<(LogicVarId, V)>,
}

impl<V> Assignment<V> {
    pub fn get(&self, var: LogicVarId) -> Option<&V> {
        self.values
            .iter()
            .find_map(|(v, value)| (*v == var).then_some(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (LogicVarId, &V)> {
        self.values.iter().map(|(var, value)| (*var, value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_vec(self) -> Vec<(LogicVarId, V)> {
        self.values
    }
}

/// Result of solving a well-formed equation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome<V> {
    Solved(Assignment<V>),
    Failed(Inconsistency),
}

impl<V> Outcome<V> {
    pub fn is_solved(&self) -> bool {
        matches!(self, Outcome::Solved(_))
    }
}

/// Candidate values per variable, unioned over all satisfiable branches.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Domains<V> {
    vars: Vec<(LogicVarId, Vec<V>)>,
}

impl<V> Domains<V> {
    pub fn get(&self, var: LogicVarId) -> Option<&[V]> {
        self.vars
            .iter()
            .find_map(|(v, values)| (*v == var).then_some(values.as_slice()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (LogicVarId, &[V])> {
        self.vars.iter().map(|(var, values)| (*var, values.as_slice()))
    }
}

/// The equation solver.
#[derive(Clone, Debug, Default)]
pub struct Solver {
    config: SolverConfig,
}

impl Solver {
    pub fn new(config: SolverConfig) -> Self {
        Solver { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Find the first assignment satisfying `equation`.
    ///
    /// `bound` lists variables that already hold a value; they start with
    /// that single candidate.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn solve<V, P>(
        &self,
        equation: &Equation<V>,
        bound: &[(LogicVarId, V)],
        predicates: &mut P,
    ) -> Result<Outcome<V>, SolveError<P::Error>>
    where
        V: Clone + Eq + Hash,
        P: Predicates<V>,
    {
        let mut run = Run::new(&self.config, equation, predicates);
        let initial = run.initial_domains(bound);

        let mut solution = None;
        run.explore(equation, initial, |run, branch| {
            let Some(values) = run.complete(&branch)? else {
                return Ok(false);
            };
            solution = Some(Assignment {
                values: branch
                    .vars
                    .iter()
                    .filter_map(|&slot| {
                        let value = values[slot].values().first()?;
                        Some((run.vars[slot], value.clone()))
                    })
                    .collect(),
            });
            Ok(true)
        })?;

        let branches = run.branches;
        match solution {
            Some(assignment) => {
                tracing::debug!(branches, vars = assignment.len(), "equation solved");
                Ok(Outcome::Solved(assignment))
            }
            None => {
                let failure = run.last_failure.unwrap_or(Inconsistency {
                    origin: None,
                    var: None,
                    reason: FailureReason::False,
                });
                tracing::debug!(branches, %failure, "equation failed");
                Ok(Outcome::Failed(failure))
            }
        }
    }

    /// Candidates per variable over every satisfiable branch.
    ///
    /// Each branch contributes its propagated domains; duplicates across
    /// branches are pruned. Returns `None` when no branch is satisfiable.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn satisfiable_domains<V, P>(
        &self,
        equation: &Equation<V>,
        bound: &[(LogicVarId, V)],
        predicates: &mut P,
    ) -> Result<Option<Domains<V>>, SolveError<P::Error>>
    where
        V: Clone + Eq + Hash,
        P: Predicates<V>,
    {
        let mut run = Run::new(&self.config, equation, predicates);
        let initial = run.initial_domains(bound);

        let mut union: Vec<Option<Vec<V>>> = vec![None; run.vars.len()];
        let mut any = false;
        run.explore(equation, initial, |run, branch| {
            if run.complete(&branch)?.is_none() {
                return Ok(false);
            }
            any = true;
            for &slot in &branch.vars {
                let merged = union[slot].get_or_insert_with(Vec::new);
                for value in branch.domains[slot].values() {
                    if !merged.contains(value) {
                        merged.push(value.clone());
                    }
                }
            }
            Ok(false)
        })?;

        if !any {
            return Ok(None);
        }
        let vars = run
            .vars
            .iter()
            .zip(union)
            .filter_map(|(&var, values)| Some((var, values?)))
            .collect();
        Ok(Some(Domains { vars }))
    }
}

/// State of one exploration path.
#[derive(Clone)]
struct Branch<'e, V> {
    domains: Vec<Dom<V>>,
    atoms: Vec<&'e Equation<V>>,
    /// Equations still to visit; the top is visited next.
    pending: Vec<&'e Equation<V>>,
    /// Slots mentioned by `atoms`, ascending.
    vars: Vec<usize>,
}

enum Step<'e, V> {
    Dead,
    Fork(&'e [Equation<V>]),
    Done,
}

/// Working state of one solve call.
struct Run<'e, 'p, V, P: Predicates<V>> {
    max_branches: usize,
    vars: Vec<LogicVarId>,
    slots: FxHashMap<LogicVarId, usize>,
    predicates: &'p mut P,
    unary_cache: FxHashMap<(PredId, V), bool>,
    binary_cache: FxHashMap<(PredId, V, V), bool>,
    branches: usize,
    last_failure: Option<Inconsistency>,
    _equation: std::marker::PhantomData<&'e Equation<V>>,
}

impl<'e, 'p, V, P> Run<'e, 'p, V, P>
where
    V: Clone + Eq + Hash,
    P: Predicates<V>,
{
    fn new(config: &SolverConfig, equation: &'e Equation<V>, predicates: &'p mut P) -> Self {
        let vars = equation.vars();
        let slots = vars.iter().enumerate().map(|(i, &v)| (v, i)).collect();
        Run {
            max_branches: config.max_branches,
            vars,
            slots,
            predicates,
            unary_cache: FxHashMap::default(),
            binary_cache: FxHashMap::default(),
            branches: 1,
            last_failure: None,
            _equation: std::marker::PhantomData,
        }
    }

    fn initial_domains(&self, bound: &[(LogicVarId, V)]) -> Vec<Dom<V>> {
        let mut domains = vec![Dom::Unconstrained; self.vars.len()];
        for (var, value) in bound {
            if let Some(&slot) = self.slots.get(var) {
                domains[slot] = Dom::Values(vec![value.clone()]);
            }
        }
        domains
    }

    fn slot(&self, var: LogicVarId) -> usize {
        // Every variable of the equation was registered in `new`.
        self.slots.get(&var).copied().unwrap_or_default()
    }

    fn charge(&mut self, extra: usize) -> Result<(), SolveError<P::Error>> {
        self.branches += extra;
        if self.max_branches > 0 && self.branches > self.max_branches {
            return Err(SolveError::TooManyBranches {
                limit: self.max_branches,
            });
        }
        Ok(())
    }

    fn fail(
        &mut self,
        origin: Option<SourceLocation>,
        var: Option<LogicVarId>,
        reason: FailureReason,
    ) {
        self.last_failure = Some(Inconsistency { origin, var, reason });
    }

    /// Depth-first walk over the branches of `root`.
    ///
    /// `on_done` receives every branch whose atoms are all collected and
    /// propagated; returning `true` stops the walk.
    fn explore<F>(
        &mut self,
        root: &'e Equation<V>,
        initial: Vec<Dom<V>>,
        mut on_done: F,
    ) -> Result<(), SolveError<P::Error>>
    where
        F: FnMut(&mut Self, Branch<'e, V>) -> Result<bool, SolveError<P::Error>>,
    {
        let mut stack = vec![Branch {
            domains: initial,
            atoms: Vec::new(),
            pending: vec![root],
            vars: Vec::new(),
        }];

        while let Some(mut branch) = stack.pop() {
            match self.advance(&mut branch)? {
                Step::Dead => {}
                Step::Fork(alternatives) => {
                    self.charge(alternatives.len().saturating_sub(1))?;
                    tracing::trace!(alternatives = alternatives.len(), "fork");
                    for alternative in alternatives.iter().rev() {
                        let mut next = branch.clone();
                        next.pending.push(alternative);
                        stack.push(next);
                    }
                }
                Step::Done => {
                    if on_done(self, branch)? {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    /// Collect atoms of `branch` until it forks, dies or runs out of work.
    fn advance(
        &mut self,
        branch: &mut Branch<'e, V>,
    ) -> Result<Step<'e, V>, SolveError<P::Error>> {
        while let Some(eq) = branch.pending.pop() {
            match eq {
                Equation::True => {}
                Equation::False => {
                    self.fail(None, None, FailureReason::False);
                    return Ok(Step::Dead);
                }
                Equation::And(children) => branch.pending.extend(children.iter().rev()),
                Equation::Or(alternatives) => match alternatives.len() {
                    0 => {
                        self.fail(None, None, FailureReason::False);
                        return Ok(Step::Dead);
                    }
                    1 => branch.pending.push(&alternatives[0]),
                    _ => return Ok(Step::Fork(alternatives)),
                },
                atom @ (Equation::Domain { .. }
                | Equation::Bind { .. }
                | Equation::Predicate { .. }) => {
                    branch.atoms.push(atom);
                    self.note_vars(branch, atom);
                    if !self.propagate(&branch.atoms, &mut branch.domains)? {
                        return Ok(Step::Dead);
                    }
                }
            }
        }
        Ok(Step::Done)
    }

    fn note_vars(&self, branch: &mut Branch<'e, V>, atom: &Equation<V>) {
        let mentioned = match atom {
            Equation::Domain { var, .. } | Equation::Predicate { var, .. } => [Some(*var), None],
            Equation::Bind { a, b, .. } => [Some(*a), Some(*b)],
            _ => [None, None],
        };
        for var in mentioned.into_iter().flatten() {
            let slot = self.slot(var);
            if let Err(at) = branch.vars.binary_search(&slot) {
                branch.vars.insert(at, slot);
            }
        }
    }

    /// Apply `atoms` until nothing changes. `false` when a domain empties.
    fn propagate(
        &mut self,
        atoms: &[&'e Equation<V>],
        domains: &mut [Dom<V>],
    ) -> Result<bool, SolveError<P::Error>> {
        loop {
            let mut changed = false;
            for atom in atoms {
                match self.apply(atom, domains)? {
                    Effect::Unchanged => {}
                    Effect::Shrunk => changed = true,
                    Effect::Emptied(var) => {
                        self.fail(atom.origin(), Some(var), FailureReason::EmptyDomain);
                        return Ok(false);
                    }
                }
            }
            if !changed {
                return Ok(true);
            }
        }
    }

    fn apply(
        &mut self,
        atom: &Equation<V>,
        domains: &mut [Dom<V>],
    ) -> Result<Effect, SolveError<P::Error>> {
        match atom {
            Equation::Domain { var, values, .. } => {
                let slot = self.slot(*var);
                let next = match &domains[slot] {
                    Dom::Unconstrained => dedup(values),
                    Dom::Values(current) => current
                        .iter()
                        .filter(|v| values.contains(v))
                        .cloned()
                        .collect(),
                };
                Ok(domains[slot].narrow(*var, next))
            }
            Equation::Predicate { var, pred, .. } => {
                let slot = self.slot(*var);
                // Deferred until some other atom supplies candidates.
                if !domains[slot].is_constrained() {
                    return Ok(Effect::Unchanged);
                }
                let mut next = Vec::new();
                for value in domains[slot].values() {
                    if self.unary(*pred, value)? {
                        next.push(value.clone());
                    }
                }
                Ok(domains[slot].narrow(*var, next))
            }
            Equation::Bind { a, b, eq, .. } => self.apply_bind(*a, *b, *eq, domains),
            Equation::True | Equation::False | Equation::And(_) | Equation::Or(_) => {
                Ok(Effect::Unchanged)
            }
        }
    }

    /// Arc consistency for one bind.
    fn apply_bind(
        &mut self,
        a: LogicVarId,
        b: LogicVarId,
        eq: Option<PredId>,
        domains: &mut [Dom<V>],
    ) -> Result<Effect, SolveError<P::Error>> {
        let (sa, sb) = (self.slot(a), self.slot(b));

        if sa == sb {
            if !domains[sa].is_constrained() || eq.is_none() {
                return Ok(Effect::Unchanged);
            }
            let mut next = Vec::new();
            for x in domains[sa].values() {
                if self.related(eq, x, x)? {
                    next.push(x.clone());
                }
            }
            return Ok(domains[sa].narrow(a, next));
        }

        match (domains[sa].is_constrained(), domains[sb].is_constrained()) {
            (false, false) => return Ok(Effect::Unchanged),
            // An eq_prop relates distinct values, so the free side cannot
            // inherit the other side's candidates; it waits for its own.
            (false, true) | (true, false) if eq.is_some() => return Ok(Effect::Unchanged),
            (false, true) => {
                let copy = domains[sb].values().to_vec();
                return Ok(domains[sa].narrow(a, copy));
            }
            (true, false) => {
                let copy = domains[sa].values().to_vec();
                return Ok(domains[sb].narrow(b, copy));
            }
            (true, true) => {}
        }

        let mut next_a = Vec::new();
        for x in domains[sa].values() {
            let mut supported = false;
            for y in domains[sb].values() {
                if self.related(eq, x, y)? {
                    supported = true;
                    break;
                }
            }
            if supported {
                next_a.push(x.clone());
            }
        }

        let mut next_b = Vec::new();
        for y in domains[sb].values() {
            let mut supported = false;
            for x in &next_a {
                if self.related(eq, x, y)? {
                    supported = true;
                    break;
                }
            }
            if supported {
                next_b.push(y.clone());
            }
        }

        let effect_a = domains[sa].narrow(a, next_a);
        let effect_b = domains[sb].narrow(b, next_b);
        Ok(effect_a.then(effect_b))
    }

    fn related(
        &mut self,
        eq: Option<PredId>,
        x: &V,
        y: &V,
    ) -> Result<bool, SolveError<P::Error>> {
        let Some(pred) = eq else {
            return Ok(x == y);
        };
        let key = (pred, x.clone(), y.clone());
        if let Some(&cached) = self.binary_cache.get(&key) {
            return Ok(cached);
        }
        let result = self
            .predicates
            .binary(pred, x, y)
            .map_err(SolveError::Predicate)?;
        self.binary_cache.insert(key, result);
        Ok(result)
    }

    fn unary(&mut self, pred: PredId, value: &V) -> Result<bool, SolveError<P::Error>> {
        let key = (pred, value.clone());
        if let Some(&cached) = self.unary_cache.get(&key) {
            return Ok(cached);
        }
        let result = self
            .predicates
            .unary(pred, value)
            .map_err(SolveError::Predicate)?;
        self.unary_cache.insert(key, result);
        Ok(result)
    }

    /// Check a fully collected branch and label it.
    ///
    /// Returns singleton domains for every variable of the branch, or `None`
    /// when no labeling satisfies it.
    fn complete(
        &mut self,
        branch: &Branch<'e, V>,
    ) -> Result<Option<Vec<Dom<V>>>, SolveError<P::Error>> {
        for &slot in &branch.vars {
            if !branch.domains[slot].is_constrained() {
                let var = self.vars[slot];
                let origin = branch
                    .atoms
                    .iter()
                    .find(|&&atom| mentions(atom, var))
                    .and_then(|atom| atom.origin());
                self.fail(origin, Some(var), FailureReason::Unconstrained);
                return Ok(None);
            }
        }
        self.label(&branch.atoms, branch.domains.clone(), &branch.vars)
    }

    fn label(
        &mut self,
        atoms: &[&'e Equation<V>],
        domains: Vec<Dom<V>>,
        vars: &[usize],
    ) -> Result<Option<Vec<Dom<V>>>, SolveError<P::Error>> {
        let Some(slot) = vars
            .iter()
            .copied()
            .find(|&slot| domains[slot].len().is_some_and(|len| len > 1))
        else {
            return Ok(Some(domains));
        };

        let candidates = domains[slot].values().to_vec();
        self.charge(candidates.len() - 1)?;
        for value in candidates {
            let mut next = domains.clone();
            next[slot] = Dom::Values(vec![value]);
            if self.propagate(atoms, &mut next)? {
                if let Some(done) = self.label(atoms, next, vars)? {
                    return Ok(Some(done));
                }
            }
        }
        Ok(None)
    }
}

fn mentions<V>(atom: &Equation<V>, var: LogicVarId) -> bool {
    match atom {
        Equation::Domain { var: v, .. } | Equation::Predicate { var: v, .. } => *v == var,
        Equation::Bind { a, b, .. } => *a == var || *b == var,
        _ => false,
    }
}

#[cfg(test)]
mod tests;
