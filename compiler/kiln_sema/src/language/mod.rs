//! Language definitions.
//!
//! A [`Language`] is the immutable result of [`LanguageBuilder::build`]:
//! node kinds, properties with their implementations, dynamic variables,
//! environment specs and the environment metadata layout. Polymorphic
//! dispatch is resolved once per concrete kind into a table keyed by
//! `(kind, property)`.

mod builder;
mod check;
mod equation;

use std::fmt;
use std::rc::Rc;

use kiln_diagnostic::Diagnostic;
use kiln_ir::{DynVarId, KindId, Metadata, PropertyId, SharedSymbols, SourceLocation};
use rustc_hash::FxHashMap;

use crate::env::KindEnvSpec;
use crate::eval::{Analysis, ExternalCall, PropertyError};
use crate::{Expr, Value, ValueType};

pub use builder::{KindDecl, LanguageBuilder, MetadataDecl, PropertyDecl};
pub use equation::EquationBuilder;
pub(crate) use equation::{pred_of, prop_of};

/// Host implementation of an external property.
pub type ExternalFn = Rc<dyn Fn(&mut Analysis, &ExternalCall<'_>) -> Result<Value, PropertyError>>;

/// Body of one property implementation.
#[derive(Clone)]
pub enum Body {
    Expr(Expr),
    External(ExternalFn),
    /// No body. Concrete kinds must override it unless `runtime_check` is
    /// set, in which case calls on kinds without an override fail.
    Abstract { runtime_check: bool },
    /// Declared now, body supplied later with `LanguageBuilder::set_body`.
    Pending,
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Expr(expr) => f.debug_tuple("Expr").field(expr).finish(),
            Body::External(_) => write!(f, "External(..)"),
            Body::Abstract { runtime_check } => f
                .debug_struct("Abstract")
                .field("runtime_check", runtime_check)
                .finish(),
            Body::Pending => write!(f, "Pending"),
        }
    }
}

/// A node kind.
#[derive(Clone, Debug)]
pub struct KindInfo {
    pub id: KindId,
    pub name: String,
    pub parent: Option<KindId>,
    pub is_abstract: bool,
    /// Child fields, inherited ones first.
    pub fields: Vec<String>,
    /// List kinds have any number of children and no named fields.
    pub is_list: bool,
    pub is_token: bool,
    /// Logic variable fields, inherited ones first.
    pub logic_vars: Vec<String>,
    /// Self first, root last.
    pub ancestors: Vec<KindId>,
    pub location: SourceLocation,
}

/// A property as declared on its owner kind.
#[derive(Clone, Debug)]
pub struct PropertyInfo {
    pub id: PropertyId,
    pub name: String,
    pub owner: KindId,
    pub params: Vec<(String, ValueType)>,
    pub returns: ValueType,
    pub dynamic_vars: Vec<DynVarId>,
    pub memoized: bool,
    pub public: bool,
    /// Implementations, root declaration first.
    pub impls: Vec<usize>,
    pub location: SourceLocation,
}

impl PropertyInfo {
    /// Whether `other` has the same calling convention.
    pub fn same_signature(&self, other: &PropertyInfo) -> bool {
        self.params.iter().map(|(_, ty)| ty).eq(other.params.iter().map(|(_, ty)| ty))
            && self.returns == other.returns
            && self.dynamic_vars == other.dynamic_vars
    }
}

/// One body of a property, attached to the kind that declares it.
#[derive(Clone, Debug)]
pub struct Implementation {
    pub prop: PropertyId,
    pub owner: KindId,
    pub body: Body,
    /// Local slots needed to evaluate `body`.
    pub frame_size: usize,
    pub location: SourceLocation,
}

/// A dynamic variable.
#[derive(Clone, Debug)]
pub struct DynVarInfo {
    pub id: DynVarId,
    pub name: String,
    pub ty: ValueType,
    pub location: SourceLocation,
}

/// The environment metadata struct.
#[derive(Clone, Debug)]
pub struct MetadataInfo {
    pub name: String,
    pub fields: Vec<String>,
}

/// Resolved dispatch for a `(kind, property)` pair.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Dispatch {
    Impl(usize),
    /// Abstract with runtime checking and no override.
    Missing,
}

/// An immutable, checked language definition.
pub struct Language {
    pub(crate) symbols: SharedSymbols,
    pub(crate) kinds: Vec<KindInfo>,
    pub(crate) properties: Vec<PropertyInfo>,
    pub(crate) impls: Vec<Implementation>,
    pub(crate) dynvars: Vec<DynVarInfo>,
    pub(crate) env_specs: Vec<KindEnvSpec>,
    pub(crate) metadata: Option<MetadataInfo>,
    pub(crate) dispatch: FxHashMap<(KindId, PropertyId), Dispatch>,
    pub(crate) warnings: Vec<Diagnostic>,
}

impl Language {
    pub fn symbols(&self) -> &SharedSymbols {
        &self.symbols
    }

    pub fn kind(&self, id: KindId) -> Option<&KindInfo> {
        self.kinds.get(id.index())
    }

    pub fn kinds(&self) -> &[KindInfo] {
        &self.kinds
    }

    pub fn kind_by_name(&self, name: &str) -> Option<KindId> {
        self.kinds.iter().find(|k| k.name == name).map(|k| k.id)
    }

    /// Whether `kind` is `ancestor` or derives from it.
    pub fn is_subkind(&self, kind: KindId, ancestor: KindId) -> bool {
        self.kind(kind)
            .is_some_and(|info| info.ancestors.contains(&ancestor))
    }

    pub fn field_index(&self, kind: KindId, name: &str) -> Option<usize> {
        self.kind(kind)?.fields.iter().position(|f| f == name)
    }

    pub fn logic_var_index(&self, kind: KindId, name: &str) -> Option<usize> {
        self.kind(kind)?.logic_vars.iter().position(|f| f == name)
    }

    pub fn property(&self, id: PropertyId) -> Option<&PropertyInfo> {
        self.properties.get(id.index())
    }

    pub fn implementation(&self, index: usize) -> Option<&Implementation> {
        self.impls.get(index)
    }

    /// Property `name` visible on `kind`.
    pub fn property_by_name(&self, kind: KindId, name: &str) -> Option<PropertyId> {
        let ancestors = &self.kind(kind)?.ancestors;
        self.properties
            .iter()
            .find(|p| p.name == name && ancestors.contains(&p.owner))
            .map(|p| p.id)
    }

    /// Properties visible on `kind`, in declaration order.
    pub fn properties_of(&self, kind: KindId) -> Vec<&PropertyInfo> {
        let Some(info) = self.kind(kind) else {
            return Vec::new();
        };
        self.properties
            .iter()
            .filter(|p| info.ancestors.contains(&p.owner))
            .collect()
    }

    /// Introspection record for a property.
    pub fn property_info(&self, id: PropertyId) -> Option<PropertyDescription> {
        let prop = self.property(id)?;
        let root = self.impls.get(*prop.impls.first()?)?;
        let external = prop
            .impls
            .iter()
            .filter_map(|&i| self.impls.get(i))
            .any(|imp| matches!(imp.body, Body::External(_)));
        Some(PropertyDescription {
            name: prop.name.clone(),
            owner: self.kind(prop.owner).map(|k| k.name.clone()).unwrap_or_default(),
            params: prop
                .params
                .iter()
                .map(|(name, ty)| (name.clone(), ty.to_string()))
                .collect(),
            returns: prop.returns.to_string(),
            dynamic_vars: prop
                .dynamic_vars
                .iter()
                .filter_map(|&dv| self.dynvar(dv).map(|d| d.name.clone()))
                .collect(),
            public: prop.public,
            memoized: prop.memoized,
            external,
            is_abstract: matches!(root.body, Body::Abstract { .. }),
            overrides: prop.impls.len().saturating_sub(1),
        })
    }

    pub fn dynvar(&self, id: DynVarId) -> Option<&DynVarInfo> {
        self.dynvars.get(id.index())
    }

    pub fn metadata(&self) -> Option<&MetadataInfo> {
        self.metadata.as_ref()
    }

    /// Metadata with the named field set.
    pub fn metadata_flag(&self, field: &str) -> Option<Metadata> {
        let index = self.metadata.as_ref()?.fields.iter().position(|f| f == field)?;
        Some(Metadata::EMPTY.with_field(index))
    }

    /// Implementation of `prop` for nodes of `kind`.
    pub fn dispatch(&self, kind: KindId, prop: PropertyId) -> Option<Dispatch> {
        self.dispatch.get(&(kind, prop)).copied()
    }

    /// Env spec of the closest kind in `kind`'s ancestry that has one.
    pub fn env_spec(&self, kind: KindId) -> Option<&KindEnvSpec> {
        let ancestors = &self.kind(kind)?.ancestors;
        ancestors
            .iter()
            .find_map(|k| self.env_specs.iter().find(|spec| spec.kind == *k))
    }

    /// Warnings reported while building the definition.
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }
}

impl fmt::Debug for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Language")
            .field("kinds", &self.kinds.len())
            .field("properties", &self.properties.len())
            .field("dynvars", &self.dynvars.len())
            .finish_non_exhaustive()
    }
}

/// Human-oriented description of a property, for introspection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PropertyDescription {
    pub name: String,
    pub owner: String,
    pub params: Vec<(String, String)>,
    pub returns: String,
    pub dynamic_vars: Vec<String>,
    pub public: bool,
    pub memoized: bool,
    pub external: bool,
    pub is_abstract: bool,
    /// Number of overriding implementations.
    pub overrides: usize,
}

#[cfg(test)]
mod tests;
