/// Why the engine refused an import
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    /// The engine ran and reported a failure (e.g. type mismatch)
    #[error("{0}")]
    Engine(String),
    /// The engine did not finish before the configured deadline
    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

/// Error types for resource import sessions
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// A type string that the schema catalog does not know
    #[error("Invalid resource type {resource_type:?}")]
    InvalidType { resource_type: String },

    /// The mapping file exists but cannot be parsed
    #[error("Mapping file {path} is corrupt: {message}")]
    CorruptMapping { path: String, message: String },

    /// The engine process could not be started or reached
    #[error("Engine unavailable while importing {cloud_id}: {message}")]
    EngineUnavailable { cloud_id: String, message: String },

    /// The engine refused to import the resource as the given type
    #[error("Import of {cloud_id} as {address} rejected: {reason}")]
    ImportRejected {
        cloud_id: String,
        address: String,
        reason: RejectReason,
    },

    /// Removing a previously imported address from engine state failed
    #[error("Failed to remove {address} from state before re-import: {message}")]
    CompensationFailed { address: String, message: String },

    /// A status change the item state machine does not allow
    #[error("Illegal transition for {cloud_id}: {from} -> {to}")]
    IllegalTransition {
        cloud_id: String,
        from: String,
        to: String,
    },

    /// A transition was recorded out of order for an item
    #[error("Stale transition for {cloud_id}: expected revision {expected}, got {actual}")]
    StaleTransition {
        cloud_id: String,
        expected: u64,
        actual: u64,
    },

    /// Resource discovery failed
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ImportError {
    /// Whether the error must end the whole session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ImportError::EngineUnavailable { .. } | ImportError::CorruptMapping { .. }
        )
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::Serialization(err.to_string())
    }
}

/// Result type for import operations
pub type ImportResult<T> = Result<T, ImportError>;
