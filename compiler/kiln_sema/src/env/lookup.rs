//! Symbol lookup and referenced-environment resolution.
//!
//! Lookup order for one environment:
//! 1. direct bindings, most recent first
//! 2. referenced environments, in registration order
//! 3. the parent, recursively
//!
//! Entities found through a reference have the reference's metadata and
//! rebinding added to their context. An environment already being searched
//! higher up in the same lookup contributes nothing a second time, so
//! reference cycles terminate.

use kiln_diagnostic::{DiagnosticSink, ErrorCode, Location};
use kiln_ir::{EnvId, Entity, Metadata, Rebindings, Span, Symbol};

use super::{EnvThunk, RefState};
use crate::eval::{Analysis, DynVars, PropertyError, PropertyErrorKind};
use crate::stack::ensure_sufficient_stack;
use crate::{EnvValue, Value};

/// Search state for one lookup.
struct Search {
    symbol: Symbol,
    require: Metadata,
    first: bool,
    visiting: Vec<EnvId>,
    found: Vec<Entity>,
}

impl Search {
    fn done(&self) -> bool {
        self.first && !self.found.is_empty()
    }
}

impl Analysis {
    /// Every entity bound to `symbol` in `env`, in precedence order.
    ///
    /// Only bindings whose combined metadata contains `require` are
    /// returned.
    ///
    /// There is no separate origin-entity argument. The context a lookup
    /// is made from travels in `env`: its rebindings rewrite the envs the
    /// search reaches, and its metadata is merged into every binding found
    /// before `require` is checked.
    pub fn lookup(
        &mut self,
        env: &EnvValue,
        symbol: Symbol,
        require: Metadata,
    ) -> Result<Vec<Entity>, PropertyError> {
        self.search(env, symbol, require, false)
    }

    /// First entity bound to `symbol` in `env`, if any.
    pub fn lookup_first(
        &mut self,
        env: &EnvValue,
        symbol: Symbol,
        require: Metadata,
    ) -> Result<Option<Entity>, PropertyError> {
        Ok(self.search(env, symbol, require, true)?.into_iter().next())
    }

    fn search(
        &mut self,
        env: &EnvValue,
        symbol: Symbol,
        require: Metadata,
        first: bool,
    ) -> Result<Vec<Entity>, PropertyError> {
        let mut search = Search {
            symbol,
            require,
            first,
            visiting: Vec::new(),
            found: Vec::new(),
        };
        self.search_env(env.env, env.metadata, &env.rebindings, &mut search)?;
        tracing::trace!(?symbol, found = search.found.len(), "lookup");
        Ok(search.found)
    }

    fn search_env(
        &mut self,
        env: EnvId,
        metadata: Metadata,
        rebindings: &Rebindings,
        search: &mut Search,
    ) -> Result<(), PropertyError> {
        let env = rebindings.rewrite(env);
        if env == EnvId::EMPTY || search.visiting.contains(&env) || search.done() {
            return Ok(());
        }
        search.visiting.push(env);
        let result =
            ensure_sufficient_stack(|| self.search_env_inner(env, metadata, rebindings, search));
        search.visiting.pop();
        result
    }

    fn search_env_inner(
        &mut self,
        env: EnvId,
        metadata: Metadata,
        rebindings: &Rebindings,
        search: &mut Search,
    ) -> Result<(), PropertyError> {
        for binding in self.envs.bindings(env, search.symbol).iter().rev() {
            let info = binding
                .entity
                .info
                .extend(metadata.combine(binding.metadata), rebindings);
            if info.metadata.contains(search.require) {
                search.found.push(Entity::new(binding.entity.node, info));
                if search.done() {
                    return Ok(());
                }
            }
        }

        for index in 0..self.envs.reference_count(env) {
            let referenced = self.resolve_reference(env, index)?;
            let Some(reference) = self.envs.reference(env, index) else {
                continue;
            };
            let crossing = reference.crossing.clone();

            let metadata = metadata
                .combine(crossing.metadata)
                .combine(referenced.metadata);
            let mut rebindings = rebindings.compose(&referenced.rebindings);
            if let Some((old, new)) = crossing.rebind {
                rebindings = rebindings.push(old, new);
            }
            self.search_env(referenced.env, metadata, &rebindings, search)?;
            if search.done() {
                return Ok(());
            }
        }

        if let Some(parent) = self.envs.parent(env) {
            self.search_env(parent, metadata, rebindings, search)?;
        }
        Ok(())
    }

    /// Environment produced by reference `index` of `env`.
    ///
    /// The thunk runs at most once. Re-entering a reference while it is
    /// being resolved reports a cycle and yields the empty environment,
    /// without memoizing it. A failed thunk leaves the reference
    /// unresolved.
    pub fn resolve_reference(
        &mut self,
        env: EnvId,
        index: usize,
    ) -> Result<EnvValue, PropertyError> {
        let Some(reference) = self.envs.reference(env, index) else {
            return Ok(EnvValue::EMPTY);
        };
        let thunk = match &reference.state {
            RefState::Resolved(value) => return Ok(value.clone()),
            RefState::Resolving => {
                self.report_cycle(env, index);
                return Ok(EnvValue::EMPTY);
            }
            RefState::Unresolved => reference.thunk.clone(),
        };

        self.envs.set_reference_state(env, index, RefState::Resolving);
        match self.force_thunk(thunk) {
            Ok(value) => {
                tracing::trace!(?env, index, resolved = ?value.env, "referenced env resolved");
                self.envs
                    .set_reference_state(env, index, RefState::Resolved(value.clone()));
                Ok(value)
            }
            Err(err) => {
                self.envs.set_reference_state(env, index, RefState::Unresolved);
                Err(err)
            }
        }
    }

    fn force_thunk(&mut self, thunk: EnvThunk) -> Result<EnvValue, PropertyError> {
        match thunk {
            EnvThunk::Env(value) => Ok(value),
            EnvThunk::Property { entity, prop } => {
                match self.call_entity(&entity, prop, &[], &DynVars::new())? {
                    Value::Env(value) => Ok(value),
                    Value::Null => Ok(EnvValue::EMPTY),
                    other => Err(PropertyError::new(PropertyErrorKind::TypeMismatch {
                        expected: "env".into(),
                        found: other.type_name(),
                    })
                    .at(entity.node, prop)),
                }
            }
            EnvThunk::Unit(name) => {
                let unit = self.load_unit(name)?;
                Ok(self.unit_env(unit).map_or(EnvValue::EMPTY, EnvValue::plain))
            }
            EnvThunk::Custom(f) => f(self),
        }
    }

    fn report_cycle(&mut self, env: EnvId, index: usize) {
        let location = self
            .envs
            .owner(env)
            .map(|node| {
                let span = self.tree.get(node).map_or(Span::DUMMY, |n| n.span);
                Location::Node { node, span }
            })
            .unwrap_or_default();
        tracing::warn!(?env, index, "cyclic referenced environment");
        self.sink.fail(
            ErrorCode::K2002,
            format!("referenced environment {index} of {env} depends on itself"),
            location,
        );
    }
}
