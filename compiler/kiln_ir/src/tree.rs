//! AST arena.
//!
//! Nodes are created bottom-up by the parser collaborator and are immutable
//! afterwards, with two exceptions: the environment slots written once by
//! population, and the logic variable values written by equation solving.

use smallvec::SmallVec;

use crate::{EnvId, Entity, KindId, LogicVarId, NodeId, Span, Symbol, UnitId};

/// Error raised when the tree is built or populated inconsistently.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum TreeError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("unknown analysis unit {0}")]
    UnknownUnit(UnitId),
    #[error("node {child} already has a parent")]
    AlreadyParented { child: NodeId },
    #[error("node {child} belongs to {child_unit}, not {unit}")]
    ForeignChild {
        child: NodeId,
        child_unit: UnitId,
        unit: UnitId,
    },
    #[error("environments of node {0} are already populated")]
    AlreadyPopulated(NodeId),
    #[error("analysis unit {0} already has a root")]
    RootAlreadySet(UnitId),
}

/// A single AST element.
#[derive(Clone, Debug)]
pub struct Node {
    pub kind: KindId,
    pub children: SmallVec<[NodeId; 4]>,
    pub parent: Option<NodeId>,
    pub unit: UnitId,
    /// Token text for token nodes, `Symbol::EMPTY` otherwise.
    pub text: Symbol,
    pub span: Span,
    pub logic_vars: SmallVec<[LogicVarId; 2]>,
    envs: Option<NodeEnvs>,
}

/// Environments assigned to a node by population.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NodeEnvs {
    /// Environment the node itself lives in.
    pub node_env: EnvId,
    /// Environment its children are populated against.
    pub children_env: EnvId,
}

impl Node {
    pub fn envs(&self) -> Option<NodeEnvs> {
        self.envs
    }

    pub fn is_populated(&self) -> bool {
        self.envs.is_some()
    }

    pub fn is_token(&self) -> bool {
        !self.text.is_empty()
    }
}

/// Input for [`Tree::add_node`].
#[derive(Clone, Debug)]
pub struct NewNode {
    pub kind: KindId,
    pub unit: UnitId,
    pub children: Vec<NodeId>,
    pub text: Symbol,
    pub span: Span,
    pub logic_var_count: usize,
}

/// An analysis unit: one parsed source buffer.
#[derive(Clone, Debug)]
pub struct Unit {
    pub name: Symbol,
    pub root: Option<NodeId>,
}

/// Arena owning every node, unit and logic variable of an analysis session.
#[derive(Debug, Default)]
pub struct Tree {
    nodes: Vec<Node>,
    units: Vec<Unit>,
    logic_vars: Vec<Option<Entity>>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_unit(&mut self, name: Symbol) -> UnitId {
        let id = UnitId::from_len(self.units.len());
        self.units.push(Unit { name, root: None });
        id
    }

    pub fn unit(&self, id: UnitId) -> Result<&Unit, TreeError> {
        self.units.get(id.index()).ok_or(TreeError::UnknownUnit(id))
    }

    pub fn units(&self) -> impl Iterator<Item = (UnitId, &Unit)> {
        self.units
            .iter()
            .enumerate()
            .map(|(idx, unit)| (UnitId::from_len(idx), unit))
    }

    pub fn set_root(&mut self, unit: UnitId, root: NodeId) -> Result<(), TreeError> {
        self.get(root)?;
        let slot = self
            .units
            .get_mut(unit.index())
            .ok_or(TreeError::UnknownUnit(unit))?;
        if slot.root.is_some() {
            return Err(TreeError::RootAlreadySet(unit));
        }
        slot.root = Some(root);
        Ok(())
    }

    /// Add a node whose children were created earlier.
    ///
    /// Children are adopted: their parent link is set to the new node.
    pub fn add_node(&mut self, new: NewNode) -> Result<NodeId, TreeError> {
        self.unit(new.unit)?;
        for &child in &new.children {
            let node = self.get(child)?;
            if node.parent.is_some() {
                return Err(TreeError::AlreadyParented { child });
            }
            if node.unit != new.unit {
                return Err(TreeError::ForeignChild {
                    child,
                    child_unit: node.unit,
                    unit: new.unit,
                });
            }
        }

        let id = NodeId::from_len(self.nodes.len());
        for &child in &new.children {
            self.nodes[child.index()].parent = Some(id);
        }

        let logic_vars = (0..new.logic_var_count)
            .map(|_| {
                let var = LogicVarId::from_len(self.logic_vars.len());
                self.logic_vars.push(None);
                var
            })
            .collect();

        self.nodes.push(Node {
            kind: new.kind,
            children: new.children.into_iter().collect(),
            parent: None,
            unit: new.unit,
            text: new.text,
            span: new.span,
            logic_vars,
            envs: None,
        });
        Ok(id)
    }

    pub fn get(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.nodes.get(id.index()).ok_or(TreeError::UnknownNode(id))
    }

    /// Node by handle.
    ///
    /// # Panics
    /// Panics if `id` was not produced by this tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Record the environments of a node. Allowed exactly once per node.
    pub fn set_envs(&mut self, id: NodeId, envs: NodeEnvs) -> Result<(), TreeError> {
        let node = self
            .nodes
            .get_mut(id.index())
            .ok_or(TreeError::UnknownNode(id))?;
        if node.envs.is_some() {
            return Err(TreeError::AlreadyPopulated(id));
        }
        node.envs = Some(envs);
        Ok(())
    }

    /// Pre-order walk starting at `root`.
    pub fn preorder(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = self.nodes.get(id.index()) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    pub fn logic_var(&self, var: LogicVarId) -> Option<&Entity> {
        self.logic_vars.get(var.index()).and_then(Option::as_ref)
    }

    pub fn set_logic_var(&mut self, var: LogicVarId, value: Entity) {
        if let Some(slot) = self.logic_vars.get_mut(var.index()) {
            *slot = Some(value);
        }
    }

    pub fn logic_var_count(&self) -> usize {
        self.logic_vars.len()
    }
}
