//! Domain Ports - Core trait definitions for the operator
//!
//! These traits define the boundaries between the reconciliation engine and
//! the collaborators that act on individual nodes.

use crate::cluster::Inquirer;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

// =============================================================================
// Node Reconciler Trait
// =============================================================================

/// Converges a single node towards its desired state.
///
/// The cluster reconciler calls this once per node and pass. Failures are
/// the implementation's to report (status changes on the node, logging);
/// the engine logs a returned error and moves on to the next node without
/// surfacing it to its own caller.
///
/// Passes may overlap in time. Implementations that are not reentrant for
/// the same node must guard against that themselves.
#[async_trait]
pub trait NodeReconciler: Send + Sync {
    /// Reconcile the node exposed by `inquirer`
    async fn reconcile(&self, inquirer: &Inquirer<'_>) -> Result<()>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: NodeReconciler + ?Sized> NodeReconciler for Arc<T> {
    async fn reconcile(&self, inquirer: &Inquirer<'_>) -> Result<()> {
        (**self).reconcile(inquirer).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
