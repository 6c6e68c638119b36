//! Reconciliation of provider state against metadata-derived desired state.
//!
//! [`Reconciler`] runs a single pass; [`LbController`] decides when passes run.

pub mod engine;
pub mod scheduler;
pub mod source;

#[cfg(test)]
mod testing;

pub use engine::{FqdnMap, Reconciler};
pub use scheduler::{LbController, LbControllerConfig, TickOutcome};
pub use source::{FqdnRegistrar, MetadataSource};
