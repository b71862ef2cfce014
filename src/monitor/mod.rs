//! Service monitoring core.
//!
//! Maintenance windows, the status registry and the per-service state
//! machine.

mod downtime;
mod maintenance;
mod models;
mod registry;
mod service_loop;
mod snapshot;

pub use downtime::*;
pub use maintenance::*;
pub use models::*;
pub use registry::*;
pub use service_loop::*;
pub use snapshot::*;

#[cfg(test)]
pub(crate) use service_loop::testing;
