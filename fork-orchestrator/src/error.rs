use crate::model::EntityKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForkError>;

#[derive(Error, Debug)]
pub enum ForkError {
    #[error("No resource found with {kind} id: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Forking this application is not allowed")]
    ForkingNotAllowed,

    #[error("Fork execution failed: {0}")]
    ExecutionFailure(#[source] anyhow::Error),

    #[error("Lookup failed: {0}")]
    Lookup(#[source] anyhow::Error),

    #[error("Projection failed: {0}")]
    Projection(#[source] anyhow::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Fork task ended without reporting an outcome")]
    Interrupted,
}

impl ForkError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        ForkError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// True for errors the caller caused, as opposed to collaborator failures
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ForkError::NotFound { .. } | ForkError::ForkingNotAllowed | ForkError::InvalidInput(_)
        )
    }
}
