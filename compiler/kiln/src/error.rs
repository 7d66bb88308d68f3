//! Errors surfaced by the analysis context.

use kiln_diagnostic::{DefinitionError, ErrorCode};
use kiln_ir::TreeError;
use kiln_sema::{NodeBuildError, PopulateError, PropertyError};

/// Any failure of a host-facing operation.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("invalid language definition: {0}")]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Populate(#[from] PopulateError),
    #[error(transparent)]
    Property(#[from] PropertyError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("cannot build node: {0}")]
    NodeBuild(#[from] NodeBuildError),
}

impl AnalysisError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AnalysisError::Definition(err) => err.code(),
            AnalysisError::Populate(err) => err.code(),
            AnalysisError::Property(err) => err.code(),
            AnalysisError::Tree(TreeError::AlreadyPopulated(_)) => ErrorCode::K2003,
            AnalysisError::Tree(_) | AnalysisError::NodeBuild(_) => ErrorCode::K3004,
        }
    }

    /// The property error behind this failure, if any.
    pub fn as_property(&self) -> Option<&PropertyError> {
        match self {
            AnalysisError::Property(err)
            | AnalysisError::Populate(PopulateError::Property(err)) => Some(err),
            _ => None,
        }
    }
}
