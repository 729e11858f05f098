//! Storage errors shared by every backend.

/// Errors reported by a persistence provider, sequence tracker or deferred mutation.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StorageError {
    /// The requested event or stream does not exist (yet).
    #[error("not found")]
    NotFound,

    /// A write targeted a sequence number other than the current end of the log.
    #[error("Invalid sequence id: expected {expected}, got {actual}")]
    SequenceConflict { expected: u64, actual: u64 },

    #[error("Storage backend error: {0}")]
    Backend(String),
}
