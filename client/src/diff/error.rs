use thiserror::Error;

/// A detected mutation shape the diff engine cannot represent as a remote
/// operation. Logged and dropped by the owner rather than corrupting the
/// operation stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
    /// More than one element was removed from a nested array in one batch
    #[error("unsupported batch removal of {count} elements at `{path}`")]
    UnsupportedBatchRemoval { path: String, count: usize },
}
