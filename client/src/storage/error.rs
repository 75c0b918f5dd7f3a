use thiserror::Error;

/// Errors from the persistent object-store collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("object store is not initialised")]
    NotInitialised,

    #[error("object store is already initialised")]
    AlreadyInitialised,

    #[error("object store has no collection `{0}`")]
    UnknownCollection(String),

    #[error("object store backend failure: {message}")]
    Backend { message: String },
}
