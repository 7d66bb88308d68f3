//! Dynamic variable bindings, threaded explicitly through every call.

use kiln_ir::DynVarId;
use smallvec::SmallVec;

use crate::Value;

/// Bound dynamic variables, sorted by id.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct DynVars {
    bindings: SmallVec<[(DynVarId, Value); 2]>,
}

impl DynVars {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, var: DynVarId, value: Value) -> Self {
        self.set(var, value);
        self
    }

    pub fn set(&mut self, var: DynVarId, value: Value) {
        match self.bindings.binary_search_by_key(&var, |(v, _)| *v) {
            Ok(pos) => self.bindings[pos].1 = value,
            Err(pos) => self.bindings.insert(pos, (var, value)),
        }
    }

    pub fn get(&self, var: DynVarId) -> Option<&Value> {
        self.bindings
            .binary_search_by_key(&var, |(v, _)| *v)
            .ok()
            .map(|pos| &self.bindings[pos].1)
    }

    /// Only the bindings of `required`, or the first one missing.
    pub fn restrict(&self, required: &[DynVarId]) -> Result<DynVars, DynVarId> {
        let mut out = DynVars::new();
        for &var in required {
            let value = self.get(var).ok_or(var)?;
            out.set(var, value.clone());
        }
        Ok(out)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DynVarId, &Value)> {
        self.bindings.iter().map(|(var, value)| (*var, value))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
