//! Control Plane Operator
//!
//! Schedules control plane nodes onto a pool of hypervisors, tracks the host
//! ports reserved for them and reconciles the desired cluster topology.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                    Versioned manifests (YAML CRDs)                     │
//! └───────────────┬───────────────────────────────────────▲──────────────┘
//!                 │ decode / import                        │ export / specs
//! ┌───────────────▼───────────────────────────────────────┴──────────────┐
//! │  ┌────────────────────┐  ┌──────────────────┐  ┌──────────────────┐  │
//! │  │ Hypervisor Registry│  │ Cluster Registry │  │  Node Registry   │  │
//! │  │ (sampling, ports)  │  │                  │  │ (port release)   │  │
//! │  └─────────┬──────────┘  └────────┬─────────┘  └────────┬─────────┘  │
//! │            └──────────────────────┼─────────────────────┘            │
//! │                        ┌──────────┴──────────┐                       │
//! │                        │  Cluster Reconciler │                       │
//! │                        └──────────┬──────────┘                       │
//! └───────────────────────────────────┼──────────────────────────────────┘
//!                                     │ Inquirer (per node)
//!                          ┌──────────▼──────────┐
//!                          │   Node Reconciler   │
//!                          └─────────────────────┘
//! ```
//!
//! The cluster reconciler borrows the registries; whoever creates it owns
//! them. Failures of individual node reconciliations never fail a pass:
//! they are logged and counted, and it is up to the [`NodeReconciler`]
//! implementation to surface them (for example through node status).
//!
//! # Modules
//!
//! - [`infra`]: Hypervisors, port reservations and random placement
//! - [`node`]: Control plane nodes and their registry
//! - [`cluster`]: Clusters and the reconciliation engine
//! - [`crd`]: Versioned resource definitions
//! - [`specs`]: YAML encoding and manifest decoding
//! - [`domain`]: Traits at the engine's boundary
//! - [`error`]: Error types and handling

pub mod cluster;
pub mod config;
pub mod crd;
pub mod domain;
pub mod error;
pub mod infra;
pub mod metrics;
pub mod node;
pub mod specs;

// Re-export commonly used types
pub use cluster::{Cluster, ClusterReconciler, ClusterRegistry, Inquirer, ReconcileSummary};

pub use config::OperatorConfig;

pub use domain::ports::NodeReconciler;

pub use error::{Error, ErrorAction, Result};

pub use infra::{Hypervisor, HypervisorRegistry, PortOwner, PortRange};

pub use metrics::Metrics;

pub use node::{
    Node, NodeEvent, NodeKey, NodeRegistry, PortReservationReconciler, Role, SharedNode,
    APISERVER_RESOURCE,
};

pub use specs::{decode_manifests, Manifests, Registries};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
