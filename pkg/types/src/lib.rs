//! Shared data model for the external load-balancer controller.

pub mod config;
pub mod diff;
pub mod endpoint;
pub mod validate;

pub use diff::{Diff, diff, diff_targets};
pub use endpoint::{EndpointConfig, EndpointMap, OwnershipScope, PoolName, Target};
