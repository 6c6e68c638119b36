//! Centralized constants for the external-lb project.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod metadata;
pub mod network;
pub mod reconcile;
