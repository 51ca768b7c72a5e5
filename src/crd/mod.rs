//! Versioned resource definitions
//!
//! This module contains all CRD types:
//! - Hypervisor: execution host and its port reservations
//! - Cluster: a control plane cluster
//! - Node: a control plane node bound to a hypervisor

pub mod cluster;
pub mod hypervisor;
pub mod node;

pub use cluster::*;
pub use hypervisor::*;
pub use node::*;
