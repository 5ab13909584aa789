//! Error types shared across the strata node.
//!
//! Two layers are distinguished:
//!
//! - [`Error`]: infrastructure failures (configuration, RPC transport,
//!   HTTP, I/O) that the dispatcher translates before they ever reach the
//!   coordinator.
//! - [`TaskError`]: the terminal outcome of a single task, carrying enough
//!   context to build a finish report. Workers never propagate these
//!   upward; every task produces exactly one report.

use crate::protocol::FinishStatus;

/// The result type used throughout strata crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Result of a single task-level operation.
pub type TaskResult<T> = std::result::Result<T, TaskError>;

/// Infrastructure errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or missing configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// A coordinator or peer RPC failed at the transport level.
    #[error("rpc error: {message}")]
    Rpc {
        /// Description of the transport failure.
        message: String,
    },

    /// An HTTP request to the tablet file service failed.
    #[error("http error: {message}")]
    Http {
        /// Description of the HTTP failure.
        message: String,
    },

    /// A local filesystem operation failed.
    #[error("io error: {message}")]
    Io {
        /// Description of the I/O failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<std::io::Error>,
    },

    /// A serialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// The external transfer tool exited unsuccessfully.
    #[error("transfer tool error: {message}")]
    Transfer {
        /// Captured stderr or exit description.
        message: String,
    },
}

impl Error {
    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new RPC error.
    #[must_use]
    pub fn rpc(message: impl Into<String>) -> Self {
        Self::Rpc {
            message: message.into(),
        }
    }

    /// Creates a new HTTP error.
    #[must_use]
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
        }
    }

    /// Creates a new I/O error without a source.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new I/O error wrapping a `std::io::Error`.
    #[must_use]
    pub fn io_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a new serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a new transfer-tool error.
    #[must_use]
    pub fn transfer(message: impl Into<String>) -> Self {
        Self::Transfer {
            message: message.into(),
        }
    }
}

/// Terminal outcome of a failed task.
///
/// The variant determines the coordinator-visible status code: request
/// validation problems map to `ANALYSIS_ERROR`, everything else to
/// `RUNTIME_ERROR`. `TabletExists` is special-cased by the clone
/// orchestrator, which treats it as idempotent success.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    /// The request failed validation (wrong subtype, missing field).
    #[error("invalid task request: {reason}")]
    InvalidRequest {
        /// Why the request was rejected.
        reason: String,
    },

    /// The target tablet already exists locally.
    #[error("tablet {tablet_id} (schema hash {schema_hash}) already exists")]
    TabletExists {
        /// Tablet identifier.
        tablet_id: i64,
        /// Schema hash of the existing tablet.
        schema_hash: i64,
    },

    /// A remote file could not be fetched or failed size verification.
    #[error("file download failed: {message}")]
    DownloadFailed {
        /// Description of the download failure.
        message: String,
    },

    /// The storage engine rejected or failed the operation.
    ///
    /// This is the transient-internal class: the push pipeline retries it
    /// once before giving up.
    #[error("engine operation failed: {message}")]
    Engine {
        /// Description of the engine failure.
        message: String,
    },

    /// An RPC to a peer backend failed.
    #[error("peer rpc failed: {message}")]
    Peer {
        /// Description of the peer failure.
        message: String,
    },

    /// A local filesystem operation failed mid-task.
    #[error("io failure: {message}")]
    Io {
        /// Description of the I/O failure.
        message: String,
    },
}

impl TaskError {
    /// Creates an invalid-request error.
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Creates an engine error.
    #[must_use]
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }

    /// Creates a download-failed error.
    #[must_use]
    pub fn download(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    /// Creates a peer-RPC error.
    #[must_use]
    pub fn peer(message: impl Into<String>) -> Self {
        Self::Peer {
            message: message.into(),
        }
    }

    /// Creates an I/O error.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Coordinator-visible status code for this outcome.
    #[must_use]
    pub const fn finish_status(&self) -> FinishStatus {
        match self {
            Self::InvalidRequest { .. } => FinishStatus::AnalysisError,
            _ => FinishStatus::RuntimeError,
        }
    }

    /// Whether this is the transient internal class the push pipeline
    /// retries.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Engine { .. })
    }
}
