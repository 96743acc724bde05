use thiserror::Error;

/// Boxed cause attached to transport-level failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, StateError>;

/// Errors returned by state store operations.
///
/// Every variant that concerns a single key carries the physical key, so a
/// failure can be traced straight to the backend keyspace.
#[derive(Debug, Error)]
pub enum StateError {
    /// The backend could not be reached or failed its connectivity check.
    #[error("failed to connect to state backend at {address}")]
    Connection {
        address: String,
        #[source]
        source: BoxError,
    },

    /// A data operation was issued before `configure`.
    #[error("state store used before configure() set a namespace")]
    NotConfigured,

    /// A flow name or request id would make namespaces ambiguous.
    #[error("invalid namespace segment '{segment}': {reason}")]
    InvalidNamespace {
        segment: String,
        reason: &'static str,
    },

    #[error("invalid state key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("state key {key} not found")]
    NotFound { key: String },

    /// The stored value no longer matched the expected value.
    #[error("compare-and-swap conflict on key {key}")]
    CasConflict { key: String },

    #[error("state backend failed on key {key}")]
    Store {
        key: String,
        #[source]
        source: BoxError,
    },

    /// One or more keys could not be removed. Carries the last failure seen.
    #[error("cleanup of {namespace} left {failures} failure(s)")]
    Cleanup {
        namespace: String,
        failures: usize,
        #[source]
        last: Box<StateError>,
    },

    #[error("update of key {key} still conflicting after {attempts} attempt(s)")]
    RetriesExhausted { key: String, attempts: u32 },
}

impl StateError {
    pub(crate) fn store(key: &str, source: impl Into<BoxError>) -> Self {
        StateError::Store {
            key: key.to_string(),
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StateError::CasConflict { .. })
    }
}
