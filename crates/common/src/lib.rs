//! Shared types and utilities for certfleet crates.

pub mod ids;
pub mod logging;

pub use ids::{HostGuid, SweepId};
pub use logging::{init_tracing, LogFormat};
