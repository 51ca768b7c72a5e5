//! Node Module
//!
//! Control plane nodes, the registry holding them and the bundled
//! per-node reconciler.

pub mod events;
#[allow(clippy::module_inception)]
pub mod node;
pub mod reconciler;
pub mod registry;

pub use events::*;
pub use node::*;
pub use reconciler::*;
pub use registry::*;
