//! The analysis session: tree, environments, memo table and diagnostics for
//! one language, plus the property evaluator driving them.
//!
//! # Architecture
//!
//! ```text
//! Analysis
//!     ├── populate   (env specs → LexicalEnvs, once per node)
//!     ├── call       (dispatch → memo → Expr interpreter / external body)
//!     ├── lookup     (LexicalEnvs + lazy referenced envs)
//!     └── solve      (Equation<Entity> → kiln_logic::Solver → logic vars)
//! ```
//!
//! Everything is single-threaded and re-entrant: a property call may look
//! symbols up, which may resolve referenced environments, which may call
//! further properties.

mod call;
mod dynvars;
mod error;
mod expr;
mod logic;
mod memo;
mod populate;

use std::rc::Rc;

use kiln_diagnostic::{DiagnosticBag, DiagnosticConfig};
use kiln_ir::{
    EnvId, Entity, KindId, LogicVarId, NewNode, NodeEnvs, NodeId, SharedSymbols, Span, Symbol,
    Tree, TreeError, UnitId,
};
use kiln_logic::SolverConfig;
use rustc_hash::FxHashMap;

use crate::env::LexicalEnvs;
use crate::Language;
use memo::Memo;

pub use call::ExternalCall;
pub use dynvars::DynVars;
pub use error::{PropertyError, PropertyErrorKind};
pub use memo::MemoStats;
pub use populate::PopulateError;

/// Evaluator settings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EvalConfig {
    /// Cache results of memoized properties.
    pub memoize: bool,
    /// Maximum nesting of property calls (0 = unlimited).
    pub max_call_depth: usize,
    pub solver: SolverConfig,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            memoize: true,
            max_call_depth: 10_000,
            solver: SolverConfig::default(),
        }
    }
}

/// Resolves references to other analysis units.
///
/// Implementations must return a unit whose root is populated.
pub trait UnitLoader {
    fn load(&mut self, analysis: &mut Analysis, name: Symbol) -> Result<UnitId, PropertyError>;
}

/// A node could not be created.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum NodeBuildError {
    #[error("unknown kind {0}")]
    UnknownKind(KindId),
    #[error("kind {0} is abstract")]
    AbstractKind(String),
    #[error("kind {kind} has {expected} fields, {found} children given")]
    FieldCount {
        kind: String,
        expected: usize,
        found: usize,
    },
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// One analysis session over a language.
pub struct Analysis {
    lang: Rc<Language>,
    pub(crate) tree: Tree,
    pub(crate) envs: LexicalEnvs,
    pub(crate) memo: Memo,
    pub(crate) sink: DiagnosticBag,
    loader: Option<Box<dyn UnitLoader>>,
    config: EvalConfig,
    depth: usize,
    unit_envs: FxHashMap<UnitId, EnvId>,
}

impl Analysis {
    pub fn new(lang: Rc<Language>) -> Self {
        Self::with_config(lang, EvalConfig::default(), DiagnosticConfig::default())
    }

    pub fn with_config(
        lang: Rc<Language>,
        config: EvalConfig,
        diagnostics: DiagnosticConfig,
    ) -> Self {
        Analysis {
            lang,
            tree: Tree::new(),
            envs: LexicalEnvs::new(),
            memo: Memo::default(),
            sink: DiagnosticBag::with_config(diagnostics),
            loader: None,
            config,
            depth: 0,
            unit_envs: FxHashMap::default(),
        }
    }

    pub fn language(&self) -> &Rc<Language> {
        &self.lang
    }

    pub fn symbols(&self) -> &SharedSymbols {
        self.lang.symbols()
    }

    pub fn intern(&self, text: &str) -> Symbol {
        self.lang.symbols().intern(text)
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn envs(&self) -> &LexicalEnvs {
        &self.envs
    }

    /// Direct access to the environment store, for hosts wiring extra
    /// bindings or references.
    pub fn envs_mut(&mut self) -> &mut LexicalEnvs {
        &mut self.envs
    }

    pub fn diagnostics(&self) -> &DiagnosticBag {
        &self.sink
    }

    pub fn diagnostics_mut(&mut self) -> &mut DiagnosticBag {
        &mut self.sink
    }

    pub fn memo_stats(&self) -> MemoStats {
        self.memo.stats()
    }

    pub fn set_loader(&mut self, loader: Box<dyn UnitLoader>) {
        self.loader = Some(loader);
    }

    pub fn new_unit(&mut self, name: &str) -> UnitId {
        let name = self.intern(name);
        self.tree.add_unit(name)
    }

    pub fn unit_by_name(&self, name: Symbol) -> Option<UnitId> {
        self.tree
            .units()
            .find(|(_, unit)| unit.name == name)
            .map(|(id, _)| id)
    }

    pub fn root(&self, unit: UnitId) -> Option<NodeId> {
        self.tree.unit(unit).ok()?.root
    }

    pub fn set_root(&mut self, unit: UnitId, root: NodeId) -> Result<(), TreeError> {
        self.tree.set_root(unit, root)
    }

    /// Top-level environment of a populated unit.
    pub fn unit_env(&self, unit: UnitId) -> Option<EnvId> {
        self.unit_envs.get(&unit).copied()
    }

    /// Create a node of a concrete kind over already created children.
    pub fn new_node(
        &mut self,
        unit: UnitId,
        kind: KindId,
        children: Vec<NodeId>,
    ) -> Result<NodeId, NodeBuildError> {
        self.add_node(unit, kind, children, Symbol::EMPTY, Span::DUMMY)
    }

    /// Create a token node carrying `text`.
    pub fn new_token(
        &mut self,
        unit: UnitId,
        kind: KindId,
        text: &str,
    ) -> Result<NodeId, NodeBuildError> {
        let text = self.intern(text);
        self.add_node(unit, kind, Vec::new(), text, Span::DUMMY)
    }

    pub fn add_node(
        &mut self,
        unit: UnitId,
        kind: KindId,
        children: Vec<NodeId>,
        text: Symbol,
        span: Span,
    ) -> Result<NodeId, NodeBuildError> {
        let info = self.lang.kind(kind).ok_or(NodeBuildError::UnknownKind(kind))?;
        if info.is_abstract {
            return Err(NodeBuildError::AbstractKind(info.name.clone()));
        }
        if !info.is_list && children.len() != info.fields.len() {
            return Err(NodeBuildError::FieldCount {
                kind: info.name.clone(),
                expected: info.fields.len(),
                found: children.len(),
            });
        }
        let logic_var_count = info.logic_vars.len();
        let id = self.tree.add_node(NewNode {
            kind,
            unit,
            children,
            text,
            span,
            logic_var_count,
        })?;
        Ok(id)
    }

    /// Environments assigned to `node` by population.
    pub fn node_envs(&self, node: NodeId) -> Result<NodeEnvs, PropertyError> {
        self.tree
            .get(node)?
            .envs()
            .ok_or_else(|| PropertyError::new(PropertyErrorKind::NotPopulated(node)))
    }

    /// Value of a solved logic variable.
    pub fn logic_value(&self, var: LogicVarId) -> Result<Entity, PropertyError> {
        self.tree
            .logic_var(var)
            .cloned()
            .ok_or_else(|| PropertyError::new(PropertyErrorKind::UnboundLogicVar(var)))
    }

    /// Find or load the unit named `name`, with its root populated.
    pub fn load_unit(&mut self, name: Symbol) -> Result<UnitId, PropertyError> {
        if let Some(unit) = self.unit_by_name(name) {
            if self.unit_env(unit).is_some() {
                return Ok(unit);
            }
        }
        let Some(mut loader) = self.loader.take() else {
            return Err(self.unit_load_error(name));
        };
        let result = loader.load(self, name);
        self.loader = Some(loader);
        let unit = result?;
        tracing::debug!(unit = ?unit, "analysis unit loaded");
        Ok(unit)
    }

    fn unit_load_error(&self, name: Symbol) -> PropertyError {
        let text = self.symbols().lookup(name);
        PropertyError::new(PropertyErrorKind::UnitLoad(text.to_owned()))
    }

    fn kind_name(&self, kind: KindId) -> String {
        self.lang
            .kind(kind)
            .map_or_else(|| kind.to_string(), |k| k.name.clone())
    }

    fn property_name(&self, prop: kiln_ir::PropertyId) -> String {
        self.lang
            .property(prop)
            .map_or_else(|| prop.to_string(), |p| p.name.clone())
    }
}

impl std::fmt::Debug for Analysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analysis")
            .field("nodes", &self.tree.len())
            .field("envs", &self.envs.len())
            .field("diagnostics", &self.sink.len())
            .finish_non_exhaustive()
    }
}
