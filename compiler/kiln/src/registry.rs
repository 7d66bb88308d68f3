//! Unit providers and the loader built on them.
//!
//! A referenced unit is built, rooted and populated the first time an
//! environment lookup crosses a `ReferenceUnit` action naming it. Later
//! references reuse the populated unit.

use std::cell::RefCell;
use std::rc::Rc;

use kiln_ir::{NodeId, Symbol, TreeError, UnitId};
use kiln_sema::{
    Analysis, NodeBuildError, PopulateError, PropertyError, PropertyErrorKind, UnitLoader,
};
use rustc_hash::FxHashMap;

/// Builds the tree of one analysis unit on demand.
///
/// Implemented for closures `Fn(&mut Analysis, UnitId) -> Result<NodeId, NodeBuildError>`.
pub trait UnitProvider {
    /// Create the nodes of `unit` and return its root. The root is set and
    /// populated by the caller.
    fn build(&self, analysis: &mut Analysis, unit: UnitId) -> Result<NodeId, NodeBuildError>;
}

impl<F> UnitProvider for F
where
    F: Fn(&mut Analysis, UnitId) -> Result<NodeId, NodeBuildError>,
{
    fn build(&self, analysis: &mut Analysis, unit: UnitId) -> Result<NodeId, NodeBuildError> {
        self(analysis, unit)
    }
}

/// Providers by unit name.
///
/// Shared between the context, which registers providers, and the loader
/// installed in the analysis.
#[derive(Clone, Default)]
pub(crate) struct UnitRegistry {
    providers: Rc<RefCell<FxHashMap<Symbol, Rc<dyn UnitProvider>>>>,
}

impl UnitRegistry {
    /// Register `provider` for `name`. Returns `true` if it replaced one.
    pub(crate) fn register(&self, name: Symbol, provider: Rc<dyn UnitProvider>) -> bool {
        self.providers.borrow_mut().insert(name, provider).is_some()
    }

    pub(crate) fn contains(&self, name: Symbol) -> bool {
        self.providers.borrow().contains_key(&name)
    }

    fn provider(&self, name: Symbol) -> Option<Rc<dyn UnitProvider>> {
        self.providers.borrow().get(&name).cloned()
    }
}

impl UnitLoader for UnitRegistry {
    fn load(&mut self, analysis: &mut Analysis, name: Symbol) -> Result<UnitId, PropertyError> {
        let text = analysis.symbols().lookup(name);
        let Some(provider) = self.provider(name) else {
            return Err(PropertyError::new(PropertyErrorKind::UnitLoad(text.to_owned())));
        };

        let unit = match analysis.unit_by_name(name) {
            Some(unit) => unit,
            None => analysis.new_unit(text),
        };
        let root = match analysis.root(unit) {
            Some(root) => root,
            None => {
                let root = provider.build(analysis, unit).map_err(|err| {
                    PropertyError::new(PropertyErrorKind::UnitLoad(format!("{text}: {err}")))
                })?;
                analysis.set_root(unit, root)?;
                tracing::debug!(unit = text, nodes = analysis.tree().len(), "unit built");
                root
            }
        };

        if !analysis.tree().get(root)?.is_populated() {
            analysis.populate(root).map_err(|err| match err {
                PopulateError::Property(err) => err,
                PopulateError::Tree(err) => err.into(),
                PopulateError::AlreadyPopulated(node) => TreeError::AlreadyPopulated(node).into(),
            })?;
        }
        Ok(unit)
    }
}

impl std::fmt::Debug for UnitRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitRegistry")
            .field("providers", &self.providers.borrow().len())
            .finish()
    }
}
