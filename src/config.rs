//! Operator Configuration

use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the operator binary
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Manifest file holding hypervisors, clusters and nodes
    pub manifests: Option<PathBuf>,
    /// Time between reconciliation passes
    pub reconcile_interval: Duration,
    /// Upper bound for a single reconciliation pass
    pub pass_timeout: Duration,
    /// Write the aggregated specs back to the manifest file after every pass
    pub persist: bool,
    /// Health server bind address
    pub health_addr: SocketAddr,
    /// Metrics server bind address
    pub metrics_addr: SocketAddr,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            manifests: None,
            reconcile_interval: Duration::from_secs(30),
            pass_timeout: Duration::from_secs(20),
            persist: false,
            health_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl OperatorConfig {
    /// Check the configuration for inconsistent values
    pub fn validate(&self) -> Result<()> {
        if self.reconcile_interval.is_zero() {
            return Err(Error::Configuration(
                "reconcile interval must be greater than zero".into(),
            ));
        }
        if self.pass_timeout.is_zero() {
            return Err(Error::Configuration(
                "pass timeout must be greater than zero".into(),
            ));
        }
        if self.persist && self.manifests.is_none() {
            return Err(Error::Configuration(
                "persisting specs requires a manifest file".into(),
            ));
        }
        Ok(())
    }
}
