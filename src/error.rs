//! Error types for the Control Plane Operator
//!
//! Provides structured error types for hypervisor scheduling, port
//! allocation, versioned resource encoding and registry management.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Scheduling Errors
    // =========================================================================
    #[error("No hypervisor available for scheduling")]
    EmptyPool,

    #[error("No free port on hypervisor {hypervisor} in range {low}-{high}")]
    PortExhaustion { hypervisor: String, low: u16, high: u16 },

    #[error("Port {port} on hypervisor {hypervisor} is already held by {holder}")]
    PortConflict {
        hypervisor: String,
        port: u16,
        holder: String,
    },

    #[error("Port {port} is outside the range {low}-{high} of hypervisor {hypervisor}")]
    PortOutOfRange {
        hypervisor: String,
        port: u16,
        low: u16,
        high: u16,
    },

    #[error("Invalid port {port} for resource {resource} on node {node}")]
    InvalidPort {
        node: String,
        resource: String,
        port: i64,
    },

    // =========================================================================
    // Registry Errors
    // =========================================================================
    #[error("Hypervisor not found: {name}")]
    HypervisorNotFound { name: String },

    #[error("Hypervisor already registered: {name}")]
    HypervisorAlreadyRegistered { name: String },

    #[error("Cluster not found: {name}")]
    ClusterNotFound { name: String },

    #[error("Cluster already registered: {name}")]
    ClusterAlreadyRegistered { name: String },

    #[error("Node not found: {cluster}/{name}")]
    NodeNotFound { cluster: String, name: String },

    #[error("Node already registered: {cluster}/{name}")]
    NodeAlreadyRegistered { cluster: String, name: String },

    // =========================================================================
    // Versioned Representation Errors
    // =========================================================================
    #[error("Unrecognized role {role:?} on node {node}")]
    UnrecognizedRole { node: String, role: String },

    #[error("Could not encode {kind} {name:?}: {source}")]
    Encoding {
        kind: &'static str,
        name: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Could not aggregate {collection} specs: {source}")]
    Aggregation {
        collection: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("Unknown resource kind: {api_version}/{kind}")]
    UnknownKind { api_version: String, kind: String },

    #[error("Manifest decode error: {0}")]
    Decode(#[from] serde_yaml::Error),

    // =========================================================================
    // Metrics Errors
    // =========================================================================
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action to take on error during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Capacity problems clear up when hypervisors are added or nodes removed
            Error::EmptyPool | Error::PortExhaustion { .. } => {
                ErrorAction::RequeueAfter(Duration::from_secs(60))
            }

            // Another owner may release the port
            Error::PortConflict { .. } => ErrorAction::RequeueAfter(Duration::from_secs(30)),

            // Bad input - don't retry automatically
            Error::Configuration(_)
            | Error::UnrecognizedRole { .. }
            | Error::InvalidPort { .. }
            | Error::PortOutOfRange { .. }
            | Error::UnknownKind { .. }
            | Error::Decode(_)
            | Error::HypervisorAlreadyRegistered { .. }
            | Error::ClusterAlreadyRegistered { .. }
            | Error::NodeAlreadyRegistered { .. } => ErrorAction::NoRequeue,

            Error::Aggregation { source, .. } => source.action(),

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is a capacity shortage on the hypervisor pool
    pub fn is_capacity(&self) -> bool {
        matches!(self, Error::EmptyPool | Error::PortExhaustion { .. })
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_actions() {
        assert_eq!(
            Error::EmptyPool.action(),
            ErrorAction::RequeueAfter(Duration::from_secs(60))
        );

        let err = Error::PortExhaustion {
            hypervisor: "hv-1".into(),
            low: 30000,
            high: 30001,
        };
        assert_eq!(err.action(), ErrorAction::RequeueAfter(Duration::from_secs(60)));

        let err = Error::Configuration("bad config".into());
        assert_eq!(err.action(), ErrorAction::NoRequeue);

        let err = Error::ClusterNotFound { name: "c1".into() };
        assert_eq!(err.action(), ErrorAction::RequeueWithBackoff);
    }

    #[test]
    fn test_aggregation_inherits_action() {
        let err = Error::Aggregation {
            collection: "nodes",
            source: Box::new(Error::UnrecognizedRole {
                node: "n1".into(),
                role: "worker".into(),
            }),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("nodes"));
    }

    #[test]
    fn test_error_retryable() {
        assert!(Error::EmptyPool.is_retryable());
        assert!(Error::EmptyPool.is_capacity());

        let config_err = Error::Configuration("invalid".into());
        assert!(!config_err.is_retryable());
        assert!(!config_err.is_capacity());
    }
}
