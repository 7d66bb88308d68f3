//! Lexical environments.
//!
//! Environments live in an arena owned by the analysis session and are
//! addressed by [`EnvId`]. Slot 0 is the permanently empty environment.
//!
//! Each environment holds its direct bindings (per symbol, in declaration
//! order), an optional parent, and referenced environments. References
//! are thunks resolved on first lookup and memoized; the tri-state
//! [`RefState`] makes re-entrant resolution detectable.

mod lookup;
mod spec;

use std::fmt;
use std::rc::Rc;

use kiln_ir::{EnvId, Entity, Metadata, NodeId, PropertyId, Symbol};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::eval::{Analysis, PropertyError};
use crate::EnvValue;

pub use spec::{EnvAction, EnvSpec, KindEnvSpec, RefTransform};

/// Misuse of the environment store.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum EnvError {
    #[error("cannot bind the empty symbol")]
    InvalidKey,
    #[error("unknown environment {0}")]
    UnknownEnv(EnvId),
    #[error("the empty environment cannot be modified")]
    EmptyEnv,
}

/// One binding of a symbol.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Binding {
    pub entity: Entity,
    pub metadata: Metadata,
}

/// Host closure producing a referenced environment.
pub type EnvThunkFn = Rc<dyn Fn(&mut Analysis) -> Result<EnvValue, PropertyError>>;

/// How a referenced environment is produced.
#[derive(Clone)]
pub enum EnvThunk {
    /// Already known.
    Env(EnvValue),
    /// Result of calling `prop` on `entity`.
    Property { entity: Entity, prop: PropertyId },
    /// Top-level environment of another analysis unit.
    Unit(Symbol),
    Custom(EnvThunkFn),
}

impl fmt::Debug for EnvThunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvThunk::Env(env) => f.debug_tuple("Env").field(env).finish(),
            EnvThunk::Property { entity, prop } => f
                .debug_struct("Property")
                .field("entity", entity)
                .field("prop", prop)
                .finish(),
            EnvThunk::Unit(name) => f.debug_tuple("Unit").field(name).finish(),
            EnvThunk::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Context applied to entities found through a reference.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Crossing {
    pub metadata: Metadata,
    /// `(old, new)` pushed onto the rebindings of found entities.
    pub rebind: Option<(EnvId, EnvId)>,
}

/// Resolution state of a referenced environment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RefState {
    Unresolved,
    Resolving,
    Resolved(EnvValue),
}

#[derive(Clone, Debug)]
struct Reference {
    thunk: EnvThunk,
    crossing: Crossing,
    state: RefState,
}

#[derive(Clone, Debug, Default)]
struct EnvData {
    parent: Option<EnvId>,
    owner: Option<NodeId>,
    bindings: FxHashMap<Symbol, SmallVec<[Binding; 2]>>,
    references: Vec<Reference>,
}

/// Arena of lexical environments.
#[derive(Clone, Debug)]
pub struct LexicalEnvs {
    envs: Vec<EnvData>,
}

impl Default for LexicalEnvs {
    fn default() -> Self {
        Self::new()
    }
}

impl LexicalEnvs {
    pub fn new() -> Self {
        LexicalEnvs {
            envs: vec![EnvData::default()],
        }
    }

    /// Allocate an environment chained to `parent`.
    pub fn create_env(&mut self, parent: Option<EnvId>, owner: Option<NodeId>) -> EnvId {
        let id = EnvId::from_len(self.envs.len());
        self.envs.push(EnvData {
            parent: parent.filter(|p| *p != EnvId::EMPTY),
            owner,
            ..EnvData::default()
        });
        id
    }

    fn data(&self, env: EnvId) -> Result<&EnvData, EnvError> {
        self.envs.get(env.index()).ok_or(EnvError::UnknownEnv(env))
    }

    fn data_mut(&mut self, env: EnvId) -> Result<&mut EnvData, EnvError> {
        if env == EnvId::EMPTY {
            return Err(EnvError::EmptyEnv);
        }
        self.envs.get_mut(env.index()).ok_or(EnvError::UnknownEnv(env))
    }

    /// Append a binding for `symbol`. Later bindings shadow earlier ones.
    pub fn add_binding(
        &mut self,
        env: EnvId,
        symbol: Symbol,
        entity: Entity,
        metadata: Metadata,
    ) -> Result<(), EnvError> {
        if symbol.is_empty() {
            return Err(EnvError::InvalidKey);
        }
        self.data_mut(env)?
            .bindings
            .entry(symbol)
            .or_default()
            .push(Binding { entity, metadata });
        Ok(())
    }

    /// Register a referenced environment, resolved on first lookup.
    pub fn add_reference(
        &mut self,
        env: EnvId,
        thunk: EnvThunk,
        crossing: Crossing,
    ) -> Result<usize, EnvError> {
        let data = self.data_mut(env)?;
        data.references.push(Reference {
            thunk,
            crossing,
            state: RefState::Unresolved,
        });
        Ok(data.references.len() - 1)
    }

    pub fn parent(&self, env: EnvId) -> Option<EnvId> {
        self.data(env).ok()?.parent
    }

    /// Node whose population created `env`.
    pub fn owner(&self, env: EnvId) -> Option<NodeId> {
        self.data(env).ok()?.owner
    }

    /// Direct bindings of `symbol`, in declaration order.
    pub fn bindings(&self, env: EnvId, symbol: Symbol) -> &[Binding] {
        self.data(env)
            .ok()
            .and_then(|data| data.bindings.get(&symbol))
            .map_or(&[][..], |b| b.as_slice())
    }

    pub fn reference_count(&self, env: EnvId) -> usize {
        self.data(env).map_or(0, |data| data.references.len())
    }

    pub fn reference_state(&self, env: EnvId, index: usize) -> Option<&RefState> {
        Some(&self.data(env).ok()?.references.get(index)?.state)
    }

    fn reference(&self, env: EnvId, index: usize) -> Option<&Reference> {
        self.data(env).ok()?.references.get(index)
    }

    fn set_reference_state(&mut self, env: EnvId, index: usize, state: RefState) {
        if let Some(reference) = self
            .envs
            .get_mut(env.index())
            .and_then(|data| data.references.get_mut(index))
        {
            reference.state = state;
        }
    }

    pub fn len(&self) -> usize {
        self.envs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envs.len() <= 1
    }
}
