//! Cluster Module
//!
//! Clusters, their registry and the reconciliation engine that drives every
//! node towards its desired state.

#[allow(clippy::module_inception)]
pub mod cluster;
pub mod reconciler;
pub mod registry;

pub use cluster::*;
pub use reconciler::*;
pub use registry::*;
