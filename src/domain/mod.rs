//! Domain layer - seams between the reconciliation engine and the
//! collaborators it drives.

pub mod ports;

pub use ports::*;
