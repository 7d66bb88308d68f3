//! Environment population.
//!
//! A depth-first walk runs the env spec of every node's kind. Each action
//! sees the ambient environment at its position in the spec; `AddEnv`
//! replaces the ambient environment for the remaining actions and for the
//! children. Population of a node happens exactly once.

use std::rc::Rc;

use kiln_diagnostic::{DiagnosticSink, ErrorCode, Location};
use kiln_ir::{EnvId, Entity, Metadata, NodeEnvs, NodeId, PropertyId, TreeError};

use super::expr::Frame;
use super::{Analysis, DynVars, PropertyError};
use crate::env::{Crossing, EnvAction, EnvThunk, RefTransform};
use crate::stack::ensure_sufficient_stack;
use crate::{Expr, Value};

/// Population of a subtree failed.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum PopulateError {
    #[error("environments of {0} are already populated")]
    AlreadyPopulated(NodeId),
    #[error(transparent)]
    Property(#[from] PropertyError),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl PopulateError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PopulateError::AlreadyPopulated(_)
            | PopulateError::Tree(TreeError::AlreadyPopulated(_)) => ErrorCode::K2003,
            PopulateError::Property(err) => err.code(),
            PopulateError::Tree(_) => ErrorCode::K3004,
        }
    }
}

impl Analysis {
    /// Populate the environments of `root` and its whole subtree.
    ///
    /// Nothing is mutated when any node of the subtree is already
    /// populated. A root without a populated parent starts from a fresh
    /// top-level environment; when `root` is its unit's root, that
    /// environment becomes the unit's environment.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn populate(&mut self, root: NodeId) -> Result<(), PopulateError> {
        if let Some(populated) = self.first_populated(root)? {
            let span = self.tree.get(populated)?.span;
            self.sink.fail(
                ErrorCode::K2003,
                format!("environments of {populated} are already populated"),
                Location::Node {
                    node: populated,
                    span,
                },
            );
            return Err(PopulateError::AlreadyPopulated(populated));
        }

        let node = self.tree.get(root)?;
        let unit = node.unit;
        let parent_envs = node
            .parent
            .and_then(|parent| self.tree.get(parent).ok()?.envs());
        let ambient = match parent_envs {
            Some(envs) => envs.children_env,
            None => {
                let env = self.envs.create_env(None, Some(root));
                if self.tree.unit(unit)?.root == Some(root) {
                    self.unit_envs.entry(unit).or_insert(env);
                }
                env
            }
        };

        let envs_before = self.envs.len();
        self.populate_node(root, ambient)?;
        tracing::debug!(new_envs = self.envs.len() - envs_before, "populated");
        Ok(())
    }

    /// First node of the subtree under `root`, in pre-order, whose
    /// environments are already set.
    fn first_populated(&self, root: NodeId) -> Result<Option<NodeId>, TreeError> {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.tree.get(id)?;
            if node.is_populated() {
                return Ok(Some(id));
            }
            stack.extend(node.children.iter().rev().copied());
        }
        Ok(None)
    }

    fn populate_node(&mut self, node: NodeId, ambient: EnvId) -> Result<(), PopulateError> {
        ensure_sufficient_stack(|| self.populate_node_inner(node, ambient))
    }

    fn populate_node_inner(
        &mut self,
        node: NodeId,
        mut ambient: EnvId,
    ) -> Result<(), PopulateError> {
        let lang = Rc::clone(&self.lang);
        let (kind, children) = {
            let n = self.tree.get(node)?;
            (n.kind, n.children.clone())
        };

        let mut node_env = ambient;
        if let Some(spec) = lang.env_spec(kind) {
            let mut frame =
                Frame::new(Entity::bare(node), Vec::new(), DynVars::new(), spec.frame_size);
            let actions = &spec.spec.actions;

            for action in actions {
                if let EnvAction::SetInitialEnv(expr) = action {
                    ambient = match self.eval(expr, &mut frame)? {
                        Value::Env(env) => env.env,
                        Value::Null => EnvId::EMPTY,
                        other => {
                            let err = PropertyError::type_mismatch("env", other.type_name());
                            return Err(err.into());
                        }
                    };
                }
            }
            node_env = ambient;

            for action in actions {
                match action {
                    EnvAction::SetInitialEnv(_) => {}
                    EnvAction::AddToEnv {
                        key,
                        value,
                        metadata,
                        dest,
                    } => {
                        let dest = dest.as_ref();
                        self.add_to_env(node, ambient, key, value, *metadata, dest, &mut frame)?;
                    }
                    EnvAction::AddEnv => {
                        ambient = self.envs.create_env(Some(ambient), Some(node));
                    }
                    EnvAction::Reference {
                        nodes,
                        through,
                        transform,
                    } => self.add_references(ambient, nodes, *through, transform, &mut frame)?,
                    EnvAction::ReferenceUnit { name } => {
                        self.envs
                            .add_reference(ambient, EnvThunk::Unit(*name), Crossing::default())
                            .map_err(PropertyError::from)?;
                    }
                }
            }
        }

        self.tree.set_envs(
            node,
            NodeEnvs {
                node_env,
                children_env: ambient,
            },
        )?;

        for child in children {
            self.populate_node(child, ambient)?;
        }
        Ok(())
    }

    #[expect(clippy::too_many_arguments, reason = "unpacked AddToEnv action")]
    fn add_to_env(
        &mut self,
        node: NodeId,
        ambient: EnvId,
        key: &Expr,
        value: &Expr,
        metadata: Metadata,
        dest: Option<&Expr>,
        frame: &mut Frame,
    ) -> Result<(), PopulateError> {
        let symbol = match self.eval(key, frame)? {
            Value::Symbol(symbol) if !symbol.is_empty() => symbol,
            Value::Symbol(_) | Value::Null => {
                let span = self.tree.get(node)?.span;
                self.sink.fail(
                    ErrorCode::K2001,
                    format!("null key for a binding of {node}"),
                    Location::Node { node, span },
                );
                return Ok(());
            }
            other => return Err(PropertyError::type_mismatch("symbol", other.type_name()).into()),
        };
        let entity = match self.eval(value, frame)? {
            Value::Entity(entity) => entity,
            Value::Null => return Ok(()),
            other => return Err(PropertyError::type_mismatch("entity", other.type_name()).into()),
        };
        let target = match dest {
            None => ambient,
            Some(dest) => match self.eval(dest, frame)? {
                Value::Env(env) => env.env,
                other => return Err(PropertyError::type_mismatch("env", other.type_name()).into()),
            },
        };

        tracing::trace!(?symbol, env = %target, entity = %entity.node, "binding added");
        self.envs
            .add_binding(target, symbol, entity, metadata)
            .map_err(PropertyError::from)?;
        Ok(())
    }

    /// One reference per target entity, each producing the environment
    /// returned by `through`.
    fn add_references(
        &mut self,
        ambient: EnvId,
        nodes: &Expr,
        through: PropertyId,
        transform: &RefTransform,
        frame: &mut Frame,
    ) -> Result<(), PopulateError> {
        let targets: Vec<Entity> = match self.eval(nodes, frame)? {
            Value::Entity(entity) => vec![entity],
            Value::Null => Vec::new(),
            Value::Array(values) => values
                .iter()
                .filter_map(|v| v.as_entity().cloned())
                .collect(),
            other => return Err(PropertyError::type_mismatch("entity", other.type_name()).into()),
        };

        let rebind = match &transform.rebind {
            Some((old, new)) => {
                let old = self.eval_env(old, frame)?;
                let new = self.eval_env(new, frame)?;
                Some((old, new))
            }
            None => None,
        };
        let crossing = Crossing {
            metadata: transform.metadata,
            rebind,
        };

        for entity in targets {
            self.envs
                .add_reference(
                    ambient,
                    EnvThunk::Property {
                        entity,
                        prop: through,
                    },
                    crossing.clone(),
                )
                .map_err(PropertyError::from)?;
        }
        Ok(())
    }

    fn eval_env(&mut self, expr: &Expr, frame: &mut Frame) -> Result<EnvId, PropertyError> {
        match self.eval(expr, frame)? {
            Value::Env(env) => Ok(env.env),
            Value::Null => Ok(EnvId::EMPTY),
            other => Err(PropertyError::type_mismatch("env", other.type_name())),
        }
    }
}
