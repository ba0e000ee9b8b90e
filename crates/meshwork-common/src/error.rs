//! Error types for the Meshwork operator
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the context a user needs to act on a status
//! condition without log access: tenant names, object kind/name pairs,
//! or the offending reference string.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for Meshwork operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for Tenant specs
    #[error("validation error for {tenant}: {message}")]
    Validation {
        /// Name of the tenant with invalid configuration
        tenant: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.components")
        field: Option<String>,
    },

    /// Deep-merge failure on malformed value trees
    #[error("merge failed: {message}")]
    Merge {
        /// Description of what failed
        message: String,
    },

    /// Artifact/OCI reference that matched no known grammar
    #[error("invalid {kind} reference: {input:?}")]
    InvalidReference {
        /// The original, unmodified input string
        input: String,
        /// Reference kind attempted ("artifact" or "oci")
        kind: String,
    },

    /// No RESTMapping exists for a manifest's kind
    #[error("no RESTMapping for kind {kind} in group {group:?}")]
    RestMapping {
        /// The unresolvable kind
        kind: String,
        /// API group the kind was looked up in
        group: String,
    },

    /// Single-object apply failure, wrapped with the offending identity
    #[error("failed to apply {kind}/{name}: {message}")]
    Apply {
        /// Kind of the object that failed to apply
        kind: String,
        /// Name of the object that failed to apply
        name: String,
        /// Description of what failed
        message: String,
        /// Whether this error is retryable
        retryable: bool,
    },

    /// A watched dependency has not converged yet
    #[error("{resource} not ready: {message}")]
    NotReady {
        /// The resource being waited on (e.g., "workspace/acme")
        resource: String,
        /// Description of what is still pending
        message: String,
    },

    /// Bounded wait expired before the dependency converged
    #[error("timed out after {seconds}s waiting for {operation}")]
    Timeout {
        /// What was being waited on
        operation: String,
        /// Configured timeout in seconds
        seconds: u64,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "orchestrator", "renderer")
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            tenant: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with tenant context
    pub fn validation_for(tenant: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            tenant: tenant.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with tenant context and field path
    pub fn validation_for_field(
        tenant: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            tenant: tenant.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a merge error with the given message
    pub fn merge(msg: impl Into<String>) -> Self {
        Self::Merge {
            message: msg.into(),
        }
    }

    /// Create an invalid-reference error for an artifact reference
    pub fn invalid_artifact_reference(input: impl Into<String>) -> Self {
        Self::InvalidReference {
            input: input.into(),
            kind: "artifact".to_string(),
        }
    }

    /// Create an invalid-reference error for an OCI reference
    pub fn invalid_oci_reference(input: impl Into<String>) -> Self {
        Self::InvalidReference {
            input: input.into(),
            kind: "oci".to_string(),
        }
    }

    /// Create a RESTMapping error for an unresolvable kind
    pub fn rest_mapping(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::RestMapping {
            kind: kind.into(),
            group: group.into(),
        }
    }

    /// Create a retryable apply error wrapped with the object identity
    pub fn apply(kind: impl Into<String>, name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Apply {
            kind: kind.into(),
            name: name.into(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable apply error (e.g., schema rejection)
    pub fn apply_permanent(
        kind: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Apply {
            kind: kind.into(),
            name: name.into(),
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create a not-ready error for a pending dependency
    pub fn not_ready(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::NotReady {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a timeout error for a bounded wait
    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            seconds,
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Whether a retry can plausibly fix this error.
    ///
    /// Non-retryable errors require a spec change to re-trigger
    /// reconciliation; they are surfaced only through status conditions.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                // Retry on transient K8s errors (connection, timeout, conflict)
                // Don't retry on 4xx errors (validation, forbidden, bad request),
                // except 404/409 which resolve as dependencies converge.
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code)
                        && ae.code != 404
                        && ae.code != 409
                )
            }
            Error::Validation { .. } => false,
            Error::Merge { .. } => false,
            Error::InvalidReference { .. } => false,
            Error::RestMapping { .. } => false,
            Error::Apply { retryable, .. } => *retryable,
            Error::NotReady { .. } => true,
            Error::Timeout { .. } => true,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }
}
