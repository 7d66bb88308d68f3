//! Entities: nodes as seen from a particular context.
//!
//! The same node can be reached through different environment chains. An
//! [`Entity`] pairs the node with the [`Metadata`] and [`Rebindings`]
//! accumulated along the chain that reached it.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::{EnvId, NodeId};

/// Environment metadata attached to bindings and entities.
///
/// The language defines at most one metadata struct whose fields are all
/// booleans; each field is one bit here. Combining two metadata values is
/// field-wise `or`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
#[repr(transparent)]
pub struct Metadata(u32);

impl Metadata {
    pub const EMPTY: Metadata = Metadata(0);

    /// Maximum number of fields a metadata struct may declare.
    pub const MAX_FIELDS: usize = 32;

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Metadata(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Metadata with field `index` set.
    ///
    /// Indices at or beyond [`Metadata::MAX_FIELDS`] are ignored.
    #[must_use]
    pub const fn with_field(self, index: usize) -> Self {
        if index < Self::MAX_FIELDS {
            Metadata(self.0 | (1 << index))
        } else {
            self
        }
    }

    #[inline]
    pub const fn field(self, index: usize) -> bool {
        index < Self::MAX_FIELDS && self.0 & (1 << index) != 0
    }

    #[inline]
    #[must_use]
    pub const fn combine(self, other: Metadata) -> Self {
        Metadata(self.0 | other.0)
    }

    /// Whether every field set in `required` is also set here.
    #[inline]
    pub const fn contains(self, required: Metadata) -> bool {
        self.0 & required.0 == required.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Metadata({:#b})", self.0)
    }
}

struct RebindingLink {
    old: EnvId,
    new: EnvId,
    prev: Option<Rc<RebindingLink>>,
    len: usize,
}

/// Chain of `(old, new)` environment substitutions.
///
/// Persistent: pushing returns a new chain sharing the tail. The most
/// recently pushed pair takes precedence in [`Rebindings::rewrite`].
#[derive(Clone, Default)]
pub struct Rebindings(Option<Rc<RebindingLink>>);

impl Rebindings {
    pub const NONE: Rebindings = Rebindings(None);

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn len(&self) -> usize {
        self.0.as_ref().map_or(0, |link| link.len)
    }

    /// Chain with `(old, new)` appended as the newest pair.
    #[must_use]
    pub fn push(&self, old: EnvId, new: EnvId) -> Self {
        Rebindings(Some(Rc::new(RebindingLink {
            old,
            new,
            prev: self.0.clone(),
            len: self.len() + 1,
        })))
    }

    /// Pairs from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = (EnvId, EnvId)> + '_ {
        std::iter::successors(self.0.as_deref(), |link| link.prev.as_deref())
            .map(|link| (link.old, link.new))
    }

    /// Pairs from oldest to newest.
    pub fn pairs(&self) -> Vec<(EnvId, EnvId)> {
        let mut pairs: Vec<_> = self.iter().collect();
        pairs.reverse();
        pairs
    }

    /// Chain with all of `later`'s pairs appended after this chain's.
    ///
    /// Used when an entity that already carries rebindings is reached
    /// through further substitution boundaries: the boundaries crossed on
    /// the way (`later`) are newer than the entity's own.
    #[must_use]
    pub fn compose(&self, later: &Rebindings) -> Rebindings {
        if later.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return later.clone();
        }
        later
            .pairs()
            .into_iter()
            .fold(self.clone(), |acc, (old, new)| acc.push(old, new))
    }

    /// Substitute `env` according to the newest matching pair.
    pub fn rewrite(&self, env: EnvId) -> EnvId {
        self.iter()
            .find_map(|(old, new)| (old == env).then_some(new))
            .unwrap_or(env)
    }
}

impl PartialEq for Rebindings {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) if Rc::ptr_eq(a, b) => true,
            _ => self.len() == other.len() && self.iter().eq(other.iter()),
        }
    }
}

impl Eq for Rebindings {}

impl Hash for Rebindings {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for pair in self.iter() {
            pair.hash(state);
        }
    }
}

impl fmt::Debug for Rebindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.pairs()).finish()
    }
}

/// Context carried alongside a node reference.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct EntityInfo {
    pub metadata: Metadata,
    pub rebindings: Rebindings,
}

impl EntityInfo {
    pub const EMPTY: EntityInfo = EntityInfo {
        metadata: Metadata::EMPTY,
        rebindings: Rebindings::NONE,
    };

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty() && self.rebindings.is_empty()
    }

    /// Info reached by crossing a boundary that adds `metadata` and `rebindings`.
    #[must_use]
    pub fn extend(&self, metadata: Metadata, rebindings: &Rebindings) -> EntityInfo {
        EntityInfo {
            metadata: self.metadata.combine(metadata),
            rebindings: self.rebindings.compose(rebindings),
        }
    }
}

/// A node reference paired with contextual metadata and a rebinding chain.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Entity {
    pub node: NodeId,
    pub info: EntityInfo,
}

impl Entity {
    /// The node with no context.
    #[inline]
    pub fn bare(node: NodeId) -> Self {
        Entity {
            node,
            info: EntityInfo::EMPTY,
        }
    }

    #[inline]
    pub fn new(node: NodeId, info: EntityInfo) -> Self {
        Entity { node, info }
    }

    /// Another node seen through this entity's context.
    #[must_use]
    pub fn sibling(&self, node: NodeId) -> Entity {
        Entity {
            node,
            info: self.info.clone(),
        }
    }

    /// Drop the context, keeping only the node.
    #[must_use]
    pub fn to_bare(&self) -> Entity {
        Entity::bare(self.node)
    }

    #[inline]
    pub fn is_bare(&self) -> bool {
        self.info.is_empty()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bare() {
            write!(f, "<{}>", self.node)
        } else {
            write!(
                f,
                "<{} md={:?} rb={:?}>",
                self.node, self.info.metadata, self.info.rebindings
            )
        }
    }
}
