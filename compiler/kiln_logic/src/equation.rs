//! Equation combinator tree.
//!
//! Equations are immutable and cheap to clone: composite nodes share their
//! children through `Rc`. Atoms remember where they were built so a failed
//! solve can point at the constraint that emptied a domain.

use std::fmt;
use std::rc::Rc;

use kiln_ir::{LogicVarId, SourceLocation};
use rustc_hash::FxHashSet;

/// Handle of a predicate callback, interpreted by [`crate::Predicates`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct PredId(u32);

impl PredId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        PredId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for PredId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pred#{}", self.0)
    }
}

/// A constraint over logic variables whose values are `V`.
#[derive(Clone)]
pub enum Equation<V> {
    /// Always satisfied.
    True,
    /// Never satisfied.
    False,
    /// Restrict `var` to `values`.
    Domain {
        var: LogicVarId,
        values: Rc<[V]>,
        origin: Option<SourceLocation>,
    },
    /// Relate two variables. Without `eq` the values must be equal.
    Bind {
        a: LogicVarId,
        b: LogicVarId,
        eq: Option<PredId>,
        origin: Option<SourceLocation>,
    },
    /// Keep only values of `var` accepted by a unary predicate.
    Predicate {
        var: LogicVarId,
        pred: PredId,
        origin: Option<SourceLocation>,
    },
    And(Rc<[Equation<V>]>),
    Or(Rc<[Equation<V>]>),
}

impl<V> Equation<V> {
    #[track_caller]
    pub fn domain(var: LogicVarId, values: impl IntoIterator<Item = V>) -> Self {
        Equation::Domain {
            var,
            values: values.into_iter().collect(),
            origin: Some(SourceLocation::caller()),
        }
    }

    /// Equality bind.
    #[track_caller]
    pub fn bind(a: LogicVarId, b: LogicVarId) -> Self {
        Equation::Bind {
            a,
            b,
            eq: None,
            origin: Some(SourceLocation::caller()),
        }
    }

    /// Bind compared through a binary predicate.
    #[track_caller]
    pub fn bind_with(a: LogicVarId, b: LogicVarId, eq: PredId) -> Self {
        Equation::Bind {
            a,
            b,
            eq: Some(eq),
            origin: Some(SourceLocation::caller()),
        }
    }

    #[track_caller]
    pub fn predicate(var: LogicVarId, pred: PredId) -> Self {
        Equation::Predicate {
            var,
            pred,
            origin: Some(SourceLocation::caller()),
        }
    }

    /// Conjunction. Nested conjunctions are flattened, `True` operands dropped.
    pub fn all(operands: impl IntoIterator<Item = Equation<V>>) -> Self
    where
        V: Clone,
    {
        let mut flat = Vec::new();
        for op in operands {
            match op {
                Equation::True => {}
                Equation::And(children) => flat.extend(children.iter().cloned()),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Equation::True,
            1 => flat.pop().unwrap_or(Equation::True),
            _ => Equation::And(flat.into()),
        }
    }

    /// Disjunction. Nested disjunctions are flattened, `False` operands dropped.
    pub fn any(operands: impl IntoIterator<Item = Equation<V>>) -> Self
    where
        V: Clone,
    {
        let mut flat = Vec::new();
        for op in operands {
            match op {
                Equation::False => {}
                Equation::Or(children) => flat.extend(children.iter().cloned()),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Equation::False,
            1 => flat.pop().unwrap_or(Equation::False),
            _ => Equation::Or(flat.into()),
        }
    }

    #[must_use]
    pub fn and(self, other: Equation<V>) -> Self
    where
        V: Clone,
    {
        Equation::all([self, other])
    }

    #[must_use]
    pub fn or(self, other: Equation<V>) -> Self
    where
        V: Clone,
    {
        Equation::any([self, other])
    }

    /// Where this atom was built. `None` for composites.
    pub fn origin(&self) -> Option<SourceLocation> {
        match self {
            Equation::Domain { origin, .. }
            | Equation::Bind { origin, .. }
            | Equation::Predicate { origin, .. } => *origin,
            Equation::True | Equation::False | Equation::And(_) | Equation::Or(_) => None,
        }
    }

    pub fn is_atom(&self) -> bool {
        matches!(
            self,
            Equation::Domain { .. } | Equation::Bind { .. } | Equation::Predicate { .. }
        )
    }

    /// Every variable mentioned, in order of first appearance.
    pub fn vars(&self) -> Vec<LogicVarId> {
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(eq) = stack.pop() {
            match eq {
                Equation::True | Equation::False => {}
                Equation::Domain { var, .. } | Equation::Predicate { var, .. } => {
                    if seen.insert(*var) {
                        out.push(*var);
                    }
                }
                Equation::Bind { a, b, .. } => {
                    for var in [*a, *b] {
                        if seen.insert(var) {
                            out.push(var);
                        }
                    }
                }
                Equation::And(children) | Equation::Or(children) => {
                    stack.extend(children.iter().rev());
                }
            }
        }
        out
    }
}

impl<V: fmt::Debug> fmt::Debug for Equation<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Equation::True => write!(f, "True"),
            Equation::False => write!(f, "False"),
            Equation::Domain { var, values, .. } => write!(f, "Domain({var}, {values:?})"),
            Equation::Bind { a, b, eq: None, .. } => write!(f, "Bind({a}, {b})"),
            Equation::Bind {
                a, b, eq: Some(eq), ..
            } => write!(f, "Bind({a}, {b}, {eq:?})"),
            Equation::Predicate { var, pred, .. } => write!(f, "Predicate({var}, {pred:?})"),
            Equation::And(children) => f.debug_tuple("And").field(&&children[..]).finish(),
            Equation::Or(children) => f.debug_tuple("Or").field(&&children[..]).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn var(n: u32) -> LogicVarId {
        LogicVarId::from_raw(n)
    }

    #[test]
    fn all_flattens_and_drops_true() {
        let eq = Equation::all([
            Equation::True,
            Equation::domain(var(0), [1]),
            Equation::all([Equation::domain(var(1), [2]), Equation::bind(var(0), var(1))]),
        ]);
        match eq {
            Equation::And(children) => assert_eq!(children.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn empty_combinators_are_constants() {
        assert!(matches!(Equation::<i32>::all([]), Equation::True));
        assert!(matches!(Equation::<i32>::any([]), Equation::False));
    }

    #[test]
    fn vars_in_first_appearance_order() {
        let eq = Equation::any([
            Equation::bind(var(3), var(1)),
            Equation::domain(var(2), [0]).and(Equation::domain(var(3), [0])),
        ]);
        assert_eq!(eq.vars(), vec![var(3), var(1), var(2)]);
    }

    #[test]
    fn atoms_record_their_origin() {
        let line = line!() + 1;
        let eq = Equation::<i32>::bind(var(0), var(1));
        assert_eq!(eq.origin().map(|o| o.line), Some(line));
        assert!(Equation::<i32>::True.origin().is_none());
    }
}
