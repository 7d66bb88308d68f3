//! Incremental construction of a [`Language`].
//!
//! Declarations are registered one at a time. Each registration call checks
//! what it can immediately and fails with [`Severity::Error`]; checks that
//! need the whole definition run in [`LanguageBuilder::build`] and are
//! reported together at its checkpoint.

use std::rc::Rc;

use kiln_diagnostic::{DefinitionDiagnostics, DefinitionError, ErrorCode, Severity};
use kiln_ir::{
    DynVarId, KindId, Metadata, PropertyId, SharedSymbols, SourceLocation, Symbol, SymbolTable,
};
use rustc_hash::FxHashMap;

use super::check::Checker;
use super::{
    Body, Dispatch, DynVarInfo, ExternalFn, Implementation, KindInfo, Language, MetadataInfo,
    PropertyInfo,
};
use crate::env::{EnvSpec, KindEnvSpec};
use crate::eval::{Analysis, ExternalCall, PropertyError};
use crate::{Expr, Value, ValueType};

/// Declaration of a node kind.
#[derive(Clone, Debug)]
pub struct KindDecl {
    name: String,
    parent: Option<KindId>,
    fields: Vec<String>,
    logic_vars: Vec<String>,
    is_abstract: bool,
    is_list: bool,
    is_token: bool,
    location: SourceLocation,
}

impl KindDecl {
    #[track_caller]
    pub fn new(name: impl Into<String>) -> Self {
        KindDecl {
            name: name.into(),
            parent: None,
            fields: Vec::new(),
            logic_vars: Vec::new(),
            is_abstract: false,
            is_list: false,
            is_token: false,
            location: SourceLocation::caller(),
        }
    }

    #[must_use]
    pub fn parent(mut self, parent: KindId) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn logic_vars<S: Into<String>>(mut self, vars: impl IntoIterator<Item = S>) -> Self {
        self.logic_vars.extend(vars.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn abstract_kind(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    #[must_use]
    pub fn list(mut self) -> Self {
        self.is_list = true;
        self
    }

    #[must_use]
    pub fn token(mut self) -> Self {
        self.is_token = true;
        self
    }
}

/// Declaration of a property, or of an override when an ancestor of `owner`
/// already declares a property with the same name.
#[derive(Clone, Debug)]
pub struct PropertyDecl {
    owner: KindId,
    name: String,
    params: Vec<(String, ValueType)>,
    returns: ValueType,
    dynamic_vars: Vec<DynVarId>,
    memoized: bool,
    public: bool,
    body: Body,
    location: SourceLocation,
}

impl PropertyDecl {
    #[track_caller]
    pub fn new(owner: KindId, name: impl Into<String>) -> Self {
        PropertyDecl {
            owner,
            name: name.into(),
            params: Vec::new(),
            returns: ValueType::Unit,
            dynamic_vars: Vec::new(),
            memoized: false,
            public: false,
            body: Body::Pending,
            location: SourceLocation::caller(),
        }
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.params.push((name.into(), ty));
        self
    }

    #[must_use]
    pub fn returns(mut self, ty: ValueType) -> Self {
        self.returns = ty;
        self
    }

    #[must_use]
    pub fn dynamic_vars(mut self, vars: impl IntoIterator<Item = DynVarId>) -> Self {
        self.dynamic_vars.extend(vars);
        self
    }

    #[must_use]
    pub fn memoized(mut self) -> Self {
        self.memoized = true;
        self
    }

    #[must_use]
    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    #[must_use]
    pub fn body(mut self, body: Expr) -> Self {
        self.body = Body::Expr(body);
        self
    }

    /// Body implemented by the host.
    #[must_use]
    pub fn external<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Analysis, &ExternalCall<'_>) -> Result<Value, PropertyError> + 'static,
    {
        let f: ExternalFn = Rc::new(f);
        self.body = Body::External(f);
        self
    }

    #[must_use]
    pub fn abstract_property(mut self) -> Self {
        self.body = Body::Abstract {
            runtime_check: false,
        };
        self
    }

    /// Abstract, with missing overrides reported when called rather than
    /// when the language is built.
    #[must_use]
    pub fn runtime_check(mut self) -> Self {
        self.body = Body::Abstract {
            runtime_check: true,
        };
        self
    }
}

/// Declaration of the environment metadata struct.
#[derive(Clone, Debug)]
pub struct MetadataDecl {
    name: String,
    fields: Vec<(String, ValueType)>,
    location: SourceLocation,
}

impl MetadataDecl {
    #[track_caller]
    pub fn new(name: impl Into<String>) -> Self {
        MetadataDecl {
            name: name.into(),
            fields: Vec::new(),
            location: SourceLocation::caller(),
        }
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.fields.push((name.into(), ty));
        self
    }
}

/// Builder for a [`Language`].
pub struct LanguageBuilder {
    symbols: SharedSymbols,
    diagnostics: DefinitionDiagnostics,
    kinds: Vec<KindInfo>,
    properties: Vec<PropertyInfo>,
    impls: Vec<Implementation>,
    dynvars: Vec<DynVarInfo>,
    env_specs: Vec<KindEnvSpec>,
    metadata: Option<MetadataInfo>,
}

impl Default for LanguageBuilder {
    fn default() -> Self {
        Self::new(SharedSymbols::new(SymbolTable::new()))
    }
}

impl LanguageBuilder {
    pub fn new(symbols: SharedSymbols) -> Self {
        LanguageBuilder {
            symbols,
            diagnostics: DefinitionDiagnostics::new(),
            kinds: Vec::new(),
            properties: Vec::new(),
            impls: Vec::new(),
            dynvars: Vec::new(),
            env_specs: Vec::new(),
            metadata: None,
        }
    }

    pub fn symbols(&self) -> &SharedSymbols {
        &self.symbols
    }

    pub fn intern(&self, text: &str) -> Symbol {
        self.symbols.intern(text)
    }

    pub fn diagnostics(&self) -> &DefinitionDiagnostics {
        &self.diagnostics
    }

    /// Run `f` with a located context frame pushed.
    fn in_context<R>(
        &mut self,
        message: String,
        location: SourceLocation,
        category: &'static str,
        f: impl FnOnce(&mut Self) -> Result<R, DefinitionError>,
    ) -> Result<R, DefinitionError> {
        self.diagnostics
            .context_mut()
            .push(message, Some(location), Some(category));
        let result = f(self);
        self.diagnostics.context_mut().pop();
        result
    }

    fn kind_info(&self, id: KindId) -> Option<&KindInfo> {
        self.kinds.get(id.index())
    }

    pub fn kind(&mut self, decl: KindDecl) -> Result<KindId, DefinitionError> {
        let message = format!("in kind {}", decl.name);
        self.in_context(message, decl.location, "kind", |b| b.add_kind(decl))
    }

    fn add_kind(&mut self, decl: KindDecl) -> Result<KindId, DefinitionError> {
        let duplicate = self.kinds.iter().any(|k| k.name == decl.name);
        self.diagnostics.check(
            !duplicate,
            ErrorCode::K1008,
            format!("kind {} is already declared", decl.name),
            Severity::Error,
        )?;
        self.diagnostics.check(
            !(decl.is_list && !decl.fields.is_empty()),
            ErrorCode::K1011,
            "list kinds cannot declare fields",
            Severity::Error,
        )?;

        let id = KindId::from_len(self.kinds.len());
        let mut fields = Vec::new();
        let mut logic_vars = Vec::new();
        let mut ancestors = vec![id];
        let mut is_list = decl.is_list;
        if let Some(parent) = decl.parent {
            let Some(parent_info) = self.kind_info(parent) else {
                return Err(self
                    .diagnostics
                    .error(ErrorCode::K1009, format!("unknown parent kind {parent}")));
            };
            let parent_is_list = parent_info.is_list;
            fields.clone_from(&parent_info.fields);
            logic_vars.clone_from(&parent_info.logic_vars);
            ancestors.extend(parent_info.ancestors.iter().copied());
            is_list |= parent_is_list;
            self.diagnostics.check(
                !parent_is_list,
                ErrorCode::K1011,
                "list kinds cannot be derived from",
                Severity::Error,
            )?;
        }

        for field in decl.fields {
            self.diagnostics.check(
                !fields.contains(&field),
                ErrorCode::K1008,
                format!("field {field} is already declared"),
                Severity::Error,
            )?;
            fields.push(field);
        }
        for var in decl.logic_vars {
            self.diagnostics.check(
                !logic_vars.contains(&var),
                ErrorCode::K1008,
                format!("logic variable {var} is already declared"),
                Severity::Error,
            )?;
            logic_vars.push(var);
        }

        self.kinds.push(KindInfo {
            id,
            name: decl.name,
            parent: decl.parent,
            is_abstract: decl.is_abstract,
            fields,
            is_list,
            is_token: decl.is_token,
            logic_vars,
            ancestors,
            location: decl.location,
        });
        Ok(id)
    }

    /// Declare a dynamic variable.
    #[track_caller]
    pub fn dynamic_var(
        &mut self,
        name: impl Into<String>,
        ty: ValueType,
    ) -> Result<DynVarId, DefinitionError> {
        let name = name.into();
        let location = SourceLocation::caller();
        let message = format!("in dynamic variable {name}");
        self.in_context(message, location, "dynvar", |b| {
            let duplicate = b.dynvars.iter().any(|d| d.name == name);
            b.diagnostics.check(
                !duplicate,
                ErrorCode::K1008,
                format!("dynamic variable {name} is already declared"),
                Severity::Error,
            )?;
            let id = DynVarId::from_len(b.dynvars.len());
            b.dynvars.push(DynVarInfo {
                id,
                name,
                ty,
                location,
            });
            Ok(id)
        })
    }

    /// Declare a property or override one declared on an ancestor.
    ///
    /// Overrides return the id of the overridden property.
    pub fn property(&mut self, decl: PropertyDecl) -> Result<PropertyId, DefinitionError> {
        let owner_name = self
            .kind_info(decl.owner)
            .map_or_else(|| decl.owner.to_string(), |k| k.name.clone());
        let message = format!("in property {owner_name}.{}", decl.name);
        self.in_context(message, decl.location, "property", |b| b.add_property(decl))
    }

    fn add_property(&mut self, decl: PropertyDecl) -> Result<PropertyId, DefinitionError> {
        let Some(owner) = self.kind_info(decl.owner) else {
            return Err(self
                .diagnostics
                .error(ErrorCode::K1009, format!("unknown owner kind {}", decl.owner)));
        };
        let ancestors = owner.ancestors.clone();

        for &var in &decl.dynamic_vars {
            self.diagnostics.check(
                var.index() < self.dynvars.len(),
                ErrorCode::K1009,
                format!("unknown dynamic variable {var}"),
                Severity::Error,
            )?;
        }
        for (_, ty) in &decl.params {
            self.check_type(ty)?;
        }
        self.check_type(&decl.returns)?;

        let same_name: Vec<PropertyId> = self
            .properties
            .iter()
            .filter(|p| p.name == decl.name)
            .map(|p| p.id)
            .collect();

        for &id in &same_name {
            let existing = &self.properties[id.index()];
            let existing_owner = existing.owner;
            let existing_impl_owners: Vec<KindId> = existing
                .impls
                .iter()
                .map(|&i| self.impls[i].owner)
                .collect();

            self.diagnostics.check(
                !existing_impl_owners.contains(&decl.owner),
                ErrorCode::K1008,
                format!("property {} is already declared on this kind", decl.name),
                Severity::Error,
            )?;
            let descendant = self
                .kind_info(existing_owner)
                .is_some_and(|k| k.ancestors.contains(&decl.owner));
            self.diagnostics.check(
                !descendant,
                ErrorCode::K1008,
                format!(
                    "property {} is declared on a descendant kind before its base",
                    decl.name
                ),
                Severity::Error,
            )?;
        }

        let base = same_name
            .iter()
            .copied()
            .find(|id| ancestors.contains(&self.properties[id.index()].owner));

        let impl_index = self.impls.len();
        let implementation = Implementation {
            prop: base.unwrap_or_else(|| PropertyId::from_len(self.properties.len())),
            owner: decl.owner,
            body: decl.body,
            frame_size: 0,
            location: decl.location,
        };

        if let Some(base) = base {
            let base_info = &self.properties[base.index()];
            let same_signature = base_info
                .params
                .iter()
                .map(|(_, ty)| ty)
                .eq(decl.params.iter().map(|(_, ty)| ty))
                && base_info.returns == decl.returns
                && base_info.dynamic_vars == decl.dynamic_vars;
            self.diagnostics.check(
                same_signature,
                ErrorCode::K1007,
                format!(
                    "override of {} does not match the base signature or dynamic variables",
                    decl.name
                ),
                Severity::Error,
            )?;
            self.impls.push(implementation);
            self.properties[base.index()].impls.push(impl_index);
            return Ok(base);
        }

        let id = PropertyId::from_len(self.properties.len());
        self.impls.push(implementation);
        self.properties.push(PropertyInfo {
            id,
            name: decl.name,
            owner: decl.owner,
            params: decl.params,
            returns: decl.returns,
            dynamic_vars: decl.dynamic_vars,
            memoized: decl.memoized,
            public: decl.public,
            impls: vec![impl_index],
            location: decl.location,
        });
        Ok(id)
    }

    fn check_type(&mut self, ty: &ValueType) -> Result<(), DefinitionError> {
        match ty {
            ValueType::Entity(kind) => self.diagnostics.check(
                kind.index() < self.kinds.len(),
                ErrorCode::K1009,
                format!("unknown kind {kind} in type"),
                Severity::Error,
            ),
            ValueType::Array(element) => self.check_type(element),
            _ => Ok(()),
        }
    }

    /// Supply the body of a property declared without one, for bodies that
    /// refer to the property itself.
    #[track_caller]
    pub fn set_body(
        &mut self,
        prop: PropertyId,
        owner: KindId,
        body: Expr,
    ) -> Result<(), DefinitionError> {
        let location = SourceLocation::caller();
        let message = format!("in body of {prop}");
        self.in_context(message, location, "property", |b| {
            let slot = b.properties.get(prop.index()).and_then(|p| {
                p.impls
                    .iter()
                    .copied()
                    .find(|&i| b.impls[i].owner == owner)
            });
            let pending = slot.is_some_and(|i| matches!(b.impls[i].body, Body::Pending));
            b.diagnostics.check(
                pending,
                ErrorCode::K1009,
                format!("{prop} has no pending body on {owner}"),
                Severity::Error,
            )?;
            if let Some(i) = slot {
                b.impls[i].body = Body::Expr(body);
            }
            Ok(())
        })
    }

    /// Register the environment spec of a kind. Descendants without their
    /// own spec inherit it.
    pub fn env_spec(&mut self, kind: KindId, spec: EnvSpec) -> Result<(), DefinitionError> {
        let location = spec.location;
        self.in_context(format!("in env spec of {kind}"), location, "env_spec", |b| {
            b.diagnostics.check(
                kind.index() < b.kinds.len(),
                ErrorCode::K1009,
                format!("unknown kind {kind}"),
                Severity::Error,
            )?;
            let duplicate = b.env_specs.iter().any(|s| s.kind == kind);
            b.diagnostics.check(
                !duplicate,
                ErrorCode::K1008,
                "kind already has an env spec",
                Severity::Error,
            )?;
            b.env_specs.push(KindEnvSpec {
                kind,
                frame_size: spec.frame_size(),
                spec,
            });
            Ok(())
        })
    }

    /// Declare the environment metadata struct.
    ///
    /// A rejected declaration leaves nothing registered.
    pub fn env_metadata(&mut self, decl: MetadataDecl) -> Result<(), DefinitionError> {
        let message = format!("in metadata {}", decl.name);
        self.in_context(message, decl.location, "metadata", |b| {
            b.diagnostics.check_multiple(
                [
                    (
                        b.metadata.is_none(),
                        ErrorCode::K1005,
                        "only one env metadata struct can be declared".to_owned(),
                    ),
                    (
                        decl.name == "Metadata",
                        ErrorCode::K1005,
                        format!("env metadata struct must be named Metadata, not {}", decl.name),
                    ),
                    (
                        decl.fields.iter().all(|(_, ty)| *ty == ValueType::Bool),
                        ErrorCode::K1005,
                        "env metadata fields must be booleans".to_owned(),
                    ),
                    (
                        decl.fields.len() <= Metadata::MAX_FIELDS,
                        ErrorCode::K1005,
                        format!(
                            "env metadata has {} fields, at most {} are allowed",
                            decl.fields.len(),
                            Metadata::MAX_FIELDS
                        ),
                    ),
                ],
                Severity::Error,
            )?;
            b.metadata = Some(MetadataInfo {
                name: decl.name,
                fields: decl.fields.into_iter().map(|(name, _)| name).collect(),
            });
            Ok(())
        })
    }

    /// Metadata with the named field set.
    pub fn metadata_flag(&self, field: &str) -> Option<Metadata> {
        let index = self.metadata.as_ref()?.fields.iter().position(|f| f == field)?;
        Some(Metadata::EMPTY.with_field(index))
    }

    pub fn field_index(&self, kind: KindId, name: &str) -> Option<usize> {
        self.kind_info(kind)?.fields.iter().position(|f| f == name)
    }

    pub fn logic_var_index(&self, kind: KindId, name: &str) -> Option<usize> {
        self.kind_info(kind)?.logic_vars.iter().position(|f| f == name)
    }

    /// Check the whole definition and resolve dispatch.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn build(mut self) -> Result<Language, DefinitionError> {
        for imp in &mut self.impls {
            if let Body::Expr(expr) = &imp.body {
                imp.frame_size = expr.frame_size();
            }
        }

        self.check_bodies_present()?;
        let dispatch = self.resolve_dispatch()?;

        let mut lang = Language {
            symbols: self.symbols,
            kinds: self.kinds,
            properties: self.properties,
            impls: self.impls,
            dynvars: self.dynvars,
            env_specs: self.env_specs,
            metadata: self.metadata,
            dispatch,
            warnings: Vec::new(),
        };

        let mut diagnostics = self.diagnostics;
        Checker::new(&lang, &mut diagnostics).run()?;
        diagnostics.errors_checkpoint()?;

        lang.warnings = diagnostics.warnings().cloned().collect();
        tracing::debug!(
            kinds = lang.kinds.len(),
            properties = lang.properties.len(),
            warnings = lang.warnings.len(),
            "language built"
        );
        Ok(lang)
    }

    fn check_bodies_present(&mut self) -> Result<(), DefinitionError> {
        let pending: Vec<(String, SourceLocation)> = self
            .impls
            .iter()
            .filter(|imp| matches!(imp.body, Body::Pending))
            .map(|imp| (self.properties[imp.prop.index()].name.clone(), imp.location))
            .collect();
        for (name, location) in pending {
            self.in_context(format!("in property {name}"), location, "property", |b| {
                b.diagnostics.check(
                    false,
                    ErrorCode::K1013,
                    format!("property {name} has no body"),
                    Severity::NonBlockingError,
                )
            })?;
        }
        Ok(())
    }

    /// Most-derived implementation of every property for every concrete
    /// kind.
    fn resolve_dispatch(
        &mut self,
    ) -> Result<FxHashMap<(KindId, PropertyId), Dispatch>, DefinitionError> {
        let mut dispatch = FxHashMap::default();
        let mut missing = Vec::new();

        for kind in self.kinds.iter().filter(|k| !k.is_abstract) {
            for prop in &self.properties {
                if !kind.ancestors.contains(&prop.owner) {
                    continue;
                }
                let most_derived = kind.ancestors.iter().find_map(|ancestor| {
                    prop.impls
                        .iter()
                        .copied()
                        .find(|&i| self.impls[i].owner == *ancestor)
                });
                let Some(index) = most_derived else {
                    continue;
                };
                let resolved = match self.impls[index].body {
                    Body::Abstract {
                        runtime_check: true,
                    } => Dispatch::Missing,
                    Body::Abstract {
                        runtime_check: false,
                    } => {
                        missing.push((kind.name.clone(), prop.name.clone(), kind.location));
                        Dispatch::Missing
                    }
                    _ => Dispatch::Impl(index),
                };
                dispatch.insert((kind.id, prop.id), resolved);
            }
        }

        for (kind, prop, location) in missing {
            self.in_context(format!("in kind {kind}"), location, "kind", |b| {
                b.diagnostics.check(
                    false,
                    ErrorCode::K1006,
                    format!("concrete kind {kind} does not override abstract property {prop}"),
                    Severity::NonBlockingError,
                )
            })?;
        }
        Ok(dispatch)
    }
}
