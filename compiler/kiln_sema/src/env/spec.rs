//! Declarative environment specifications.
//!
//! An [`EnvSpec`] is the ordered list of actions population runs for every
//! node of a kind. Actions see the *ambient* environment at their position
//! in the list: additions before an `AddEnv` land in the node's own
//! environment, additions after it land in the new one.

use kiln_ir::{KindId, Metadata, PropertyId, SourceLocation, Symbol};

use crate::Expr;

/// Substitution applied to entities found through a referenced environment.
#[derive(Clone, Debug, Default)]
pub struct RefTransform {
    /// Metadata combined into every entity found through the reference.
    pub metadata: Metadata,
    /// `(old, new)` environments pushed onto the rebindings of every
    /// entity found through the reference. Both expressions must produce
    /// environments.
    pub rebind: Option<(Expr, Expr)>,
}

/// One population action.
#[derive(Clone, Debug)]
pub enum EnvAction {
    /// Replace the ambient environment before anything else happens.
    SetInitialEnv(Expr),
    /// Bind `value` (an entity) under `key` (a symbol).
    AddToEnv {
        key: Expr,
        value: Expr,
        metadata: Metadata,
        /// Target environment; the ambient one when absent.
        dest: Option<Expr>,
    },
    /// Open a new environment whose parent is the ambient one. It becomes
    /// the ambient environment for the remaining actions and the children.
    AddEnv,
    /// Reference the environments produced by calling `through` on each
    /// entity `nodes` evaluates to (one entity or an array).
    Reference {
        nodes: Expr,
        through: PropertyId,
        transform: RefTransform,
    },
    /// Reference the top-level environment of another analysis unit.
    ReferenceUnit { name: Symbol },
}

/// Ordered environment actions for one node kind.
#[derive(Clone, Debug)]
pub struct EnvSpec {
    pub actions: Vec<EnvAction>,
    pub location: SourceLocation,
}

impl EnvSpec {
    #[track_caller]
    pub fn new() -> Self {
        EnvSpec {
            actions: Vec::new(),
            location: SourceLocation::caller(),
        }
    }

    #[must_use]
    pub fn set_initial_env(mut self, env: Expr) -> Self {
        self.actions.push(EnvAction::SetInitialEnv(env));
        self
    }

    /// Bind the node itself under `key`.
    #[must_use]
    pub fn add_to_env(self, key: Expr) -> Self {
        self.add_to_env_with(key, Expr::SelfEntity, Metadata::EMPTY, None)
    }

    #[must_use]
    pub fn add_to_env_with(
        mut self,
        key: Expr,
        value: Expr,
        metadata: Metadata,
        dest: Option<Expr>,
    ) -> Self {
        self.actions.push(EnvAction::AddToEnv {
            key,
            value,
            metadata,
            dest,
        });
        self
    }

    #[must_use]
    pub fn add_env(mut self) -> Self {
        self.actions.push(EnvAction::AddEnv);
        self
    }

    #[must_use]
    pub fn reference(mut self, nodes: Expr, through: PropertyId, transform: RefTransform) -> Self {
        self.actions.push(EnvAction::Reference {
            nodes,
            through,
            transform,
        });
        self
    }

    #[must_use]
    pub fn reference_unit(mut self, name: Symbol) -> Self {
        self.actions.push(EnvAction::ReferenceUnit { name });
        self
    }

    /// Expressions evaluated by the actions, in action order.
    pub fn exprs(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        for action in &self.actions {
            match action {
                EnvAction::SetInitialEnv(env) => out.push(env),
                EnvAction::AddToEnv {
                    key, value, dest, ..
                } => {
                    out.push(key);
                    out.push(value);
                    out.extend(dest);
                }
                EnvAction::Reference {
                    nodes, transform, ..
                } => {
                    out.push(nodes);
                    if let Some((old, new)) = &transform.rebind {
                        out.push(old);
                        out.push(new);
                    }
                }
                EnvAction::AddEnv | EnvAction::ReferenceUnit { .. } => {}
            }
        }
        out
    }

    pub fn frame_size(&self) -> usize {
        self.exprs()
            .into_iter()
            .map(Expr::frame_size)
            .max()
            .unwrap_or(0)
    }
}

impl Default for EnvSpec {
    #[track_caller]
    fn default() -> Self {
        Self::new()
    }
}

/// An env spec registered for a kind.
#[derive(Clone, Debug)]
pub struct KindEnvSpec {
    pub kind: KindId,
    pub spec: EnvSpec,
    pub frame_size: usize,
}
