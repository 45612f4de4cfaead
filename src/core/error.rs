//! TW-002: Error taxonomy for tree construction and synthesis.
//!
//! Construction-time violations abort synthesis; there is no partial mode.

use thiserror::Error;

/// Errors raised while declaring or synthesizing a construct tree.
#[derive(Debug, Error)]
pub enum SynthError {
    /// A sibling (or manifest service) with this id already exists
    #[error("duplicate id '{id}' under '{parent}'")]
    DuplicateId { parent: String, id: String },

    /// A derived value was read before the phase that produces it ran
    #[error("{what} not initialized for '{path}'")]
    NotInitialized { path: String, what: &'static str },

    /// Ordering or service operation on a construct without runtime presence
    #[error("unsupported operation on '{path}': {reason}")]
    UnsupportedOperation { path: String, reason: String },

    /// A singleton was requested again while its builder was still running
    #[error("singleton '{id}' requested while it is being built in stack '{stack}'")]
    SingletonReentrancy { stack: String, id: String },

    /// A singleton id is registered with a different construct type
    #[error("singleton '{id}' in stack '{stack}' is registered with another type")]
    SingletonTypeMismatch { stack: String, id: String },

    /// Every port in the allocatable range is taken
    #[error("port range {low}-{high} exhausted after {allocated} allocations")]
    AllocationExhausted { low: u16, high: u16, allocated: usize },

    /// A fixed port was reserved after being handed out
    #[error("port {0} is already allocated")]
    PortInUse(u16),

    /// A `healthy` condition against a service with no health check
    #[error("'{dependent}' waits for '{dependency}' to be healthy, but it has no health check")]
    MissingHealthCheck {
        dependent: String,
        dependency: String,
    },

    /// Construct or service id that cannot be used in generated names
    #[error("invalid id '{0}'")]
    InvalidId(String),

    /// Local service dependencies form a cycle
    #[error("dependency cycle detected involving: {0}")]
    DependencyCycle(String),

    /// `synthesize()` was called a second time on the same app
    #[error("app has already been synthesized; start a new session")]
    AlreadySynthesized,

    /// Declaration attempted after synthesis started
    #[error("construct tree is sealed; cannot add '{0}' after synthesis")]
    Sealed(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The local manifest could not be written
    #[error("cannot write manifest {path}: {source}")]
    ManifestWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization of an artifact failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Failure reported by the cloud synthesizer, unchanged
    #[error("cloud synthesis failed: {0}")]
    Cloud(String),
}

/// Result type for construction and synthesis.
pub type SynthResult<T> = Result<T, SynthError>;

impl From<serde_yaml_ng::Error> for SynthError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        SynthError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for SynthError {
    fn from(err: serde_json::Error) -> Self {
        SynthError::Serialization(err.to_string())
    }
}

impl SynthError {
    pub(crate) fn not_initialized(path: &str, what: &'static str) -> Self {
        Self::NotInitialized {
            path: path.to_string(),
            what,
        }
    }

    pub(crate) fn unsupported(path: &str, reason: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}
