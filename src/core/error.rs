//! Error types for the logging pipeline

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// IO error with context
    #[error("IO error while {operation}: {message}")]
    IoOperation {
        operation: String,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Store open/create error
    #[error("Store error: {0}")]
    StoreDatabase(#[from] redb::DatabaseError),

    /// Store transaction error
    #[error("Store transaction error: {0}")]
    StoreTransaction(#[from] redb::TransactionError),

    /// Store table error
    #[error("Store table error: {0}")]
    StoreTable(#[from] redb::TableError),

    /// Store read/write error
    #[error("Store access error: {0}")]
    StoreAccess(#[from] redb::StorageError),

    /// Store commit error
    #[error("Store commit error: {0}")]
    StoreCommit(#[from] redb::CommitError),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Remote collector rejected the batch
    #[error("Remote collector returned status {status}")]
    RemoteStatus { status: u16 },

    /// Remote batch exhausted its retry budget
    #[error("Remote send failed after {attempts} attempts; {entries} entries moved to offline queue")]
    RetriesExhausted { attempts: u32, entries: usize },

    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// Transport already closed
    #[error("Transport '{0}' is closed")]
    TransportClosed(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Create an IO operation error with context
    pub fn io_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        PipelineError::IoOperation {
            operation: operation.into(),
            message: message.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a remote-status error from an HTTP status code
    pub fn remote_status(status: u16) -> Self {
        PipelineError::RemoteStatus { status }
    }

    /// Create a retries-exhausted error
    pub fn retries_exhausted(attempts: u32, entries: usize) -> Self {
        PipelineError::RetriesExhausted { attempts, entries }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        PipelineError::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PipelineError::config("RemoteTransport", "endpoint missing");
        assert!(matches!(err, PipelineError::InvalidConfiguration { .. }));

        let err = PipelineError::retries_exhausted(5, 42);
        assert!(matches!(err, PipelineError::RetriesExhausted { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = PipelineError::remote_status(503);
        assert_eq!(err.to_string(), "Remote collector returned status 503");

        let err = PipelineError::retries_exhausted(3, 10);
        assert_eq!(
            err.to_string(),
            "Remote send failed after 3 attempts; 10 entries moved to offline queue"
        );
    }

    #[test]
    fn test_io_operation_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = PipelineError::io_operation("persisting session id", "cannot write file", io_err);

        assert!(matches!(err, PipelineError::IoOperation { .. }));
        assert!(err.to_string().contains("persisting session id"));
    }
}
