//! Runtime errors raised while evaluating properties.

use kiln_diagnostic::ErrorCode;
use kiln_ir::{LogicVarId, NodeId, PropertyId, TreeError};

use crate::env::EnvError;

/// What went wrong in a property call chain.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum PropertyErrorKind {
    #[error("no implementation of {prop} for kind {kind}")]
    Dispatch { kind: String, prop: String },
    #[error("{0}")]
    Raised(String),
    #[error("dynamic variable {0} is not bound")]
    MissingDynVar(String),
    #[error("expected {expected}, got {found}")]
    TypeMismatch {
        expected: String,
        found: &'static str,
    },
    #[error("infinite recursion in {0}")]
    InfiniteRecursion(String),
    #[error("logic variable {0} is not solved")]
    UnboundLogicVar(LogicVarId),
    #[error("call depth limit of {0} exceeded")]
    DepthExceeded(usize),
    #[error("property called on null")]
    NullReceiver,
    #[error("{0} is private")]
    PrivateProperty(String),
    #[error("equation needs more than {0} branches")]
    TooManyBranches(usize),
    #[error("environments of {0} are not populated")]
    NotPopulated(NodeId),
    #[error("cannot load analysis unit {0}")]
    UnitLoad(String),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Env(#[from] EnvError),
}

/// A property call failed.
///
/// Carries the innermost node and property of the failing call chain.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{kind}")]
pub struct PropertyError {
    pub node: Option<NodeId>,
    pub prop: Option<PropertyId>,
    pub kind: PropertyErrorKind,
}

impl PropertyError {
    pub fn new(kind: PropertyErrorKind) -> Self {
        PropertyError {
            node: None,
            prop: None,
            kind,
        }
    }

    pub fn raised(message: impl Into<String>) -> Self {
        Self::new(PropertyErrorKind::Raised(message.into()))
    }

    pub fn type_mismatch(expected: impl Into<String>, found: &'static str) -> Self {
        Self::new(PropertyErrorKind::TypeMismatch {
            expected: expected.into(),
            found,
        })
    }

    /// Attach the failing call, keeping an innermost one already attached.
    #[must_use]
    pub fn at(mut self, node: NodeId, prop: PropertyId) -> Self {
        if self.node.is_none() {
            self.node = Some(node);
            self.prop = Some(prop);
        }
        self
    }

    pub fn code(&self) -> ErrorCode {
        match &self.kind {
            PropertyErrorKind::Dispatch { .. } => ErrorCode::K3001,
            PropertyErrorKind::Raised(_) => ErrorCode::K3002,
            PropertyErrorKind::MissingDynVar(_) => ErrorCode::K3003,
            PropertyErrorKind::TypeMismatch { .. }
            | PropertyErrorKind::NullReceiver
            | PropertyErrorKind::Tree(_) => ErrorCode::K3004,
            PropertyErrorKind::InfiniteRecursion(_) => ErrorCode::K3005,
            PropertyErrorKind::UnboundLogicVar(_) => ErrorCode::K3006,
            PropertyErrorKind::DepthExceeded(_) => ErrorCode::K3007,
            PropertyErrorKind::PrivateProperty(_) => ErrorCode::K3008,
            PropertyErrorKind::UnitLoad(_) => ErrorCode::K3009,
            PropertyErrorKind::TooManyBranches(_) => ErrorCode::K4003,
            PropertyErrorKind::NotPopulated(_) => ErrorCode::K2004,
            PropertyErrorKind::Env(EnvError::InvalidKey) => ErrorCode::K2001,
            PropertyErrorKind::Env(_) => ErrorCode::K3004,
        }
    }
}

impl From<TreeError> for PropertyError {
    fn from(err: TreeError) -> Self {
        PropertyError::new(err.into())
    }
}

impl From<EnvError> for PropertyError {
    fn from(err: EnvError) -> Self {
        PropertyError::new(err.into())
    }
}
