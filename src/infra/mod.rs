//! Infrastructure Module
//!
//! Hypervisors, their host port reservations and the registry that
//! schedules nodes onto them.

pub mod hypervisor;
pub mod registry;

pub use hypervisor::*;
pub use registry::*;
