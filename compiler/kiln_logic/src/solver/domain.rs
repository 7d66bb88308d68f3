//! Per-branch candidate sets.

use kiln_ir::LogicVarId;

/// Candidates of one variable inside one branch.
///
/// `Unconstrained` means no constraint has supplied candidates yet. Once a
/// variable has values, every later update can only remove some of them.
#[derive(Clone, Debug)]
pub(super) enum Dom<V> {
    Unconstrained,
    Values(Vec<V>),
}

/// What applying a constraint did to a domain.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(super) enum Effect {
    Unchanged,
    Shrunk,
    Emptied(LogicVarId),
}

impl Effect {
    /// Combined effect of two updates; emptiness wins.
    pub(super) fn then(self, other: Effect) -> Effect {
        match (self, other) {
            (Effect::Emptied(var), _) | (_, Effect::Emptied(var)) => Effect::Emptied(var),
            (Effect::Shrunk, _) | (_, Effect::Shrunk) => Effect::Shrunk,
            (Effect::Unchanged, Effect::Unchanged) => Effect::Unchanged,
        }
    }
}

impl<V> Dom<V> {
    pub(super) fn values(&self) -> &[V] {
        match self {
            Dom::Unconstrained => &[],
            Dom::Values(values) => values,
        }
    }

    pub(super) fn is_constrained(&self) -> bool {
        matches!(self, Dom::Values(_))
    }

    /// Number of candidates, `None` while unconstrained.
    pub(super) fn len(&self) -> Option<usize> {
        match self {
            Dom::Unconstrained => None,
            Dom::Values(values) => Some(values.len()),
        }
    }

    /// Replace the candidates with `next`, a subset of the current ones.
    pub(super) fn narrow(&mut self, var: LogicVarId, next: Vec<V>) -> Effect {
        let changed = match self {
            Dom::Unconstrained => true,
            Dom::Values(current) => {
                debug_assert!(next.len() <= current.len(), "domain of {var} grew");
                next.len() != current.len()
            }
        };
        let emptied = next.is_empty();
        *self = Dom::Values(next);
        if emptied {
            Effect::Emptied(var)
        } else if changed {
            Effect::Shrunk
        } else {
            Effect::Unchanged
        }
    }
}

/// `values` without duplicates, keeping first occurrences in order.
pub(super) fn dedup<V: PartialEq + Clone>(values: &[V]) -> Vec<V> {
    let mut out: Vec<V> = Vec::with_capacity(values.len());
    for value in values {
        if !out.contains(value) {
            out.push(value.clone());
        }
    }
    out
}
