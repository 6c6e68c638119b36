//! Reconciliation loop constants.

/// How often the metadata version token is polled, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// If the metadata version hasn't changed for this many minutes, a forced
/// reconciliation pass is executed anyway.
pub const DEFAULT_FORCE_UPDATE_INTERVAL_MIN: u64 = 1;

/// Trailing token of every target pool name owned by this controller.
pub const DEFAULT_TARGET_POOL_SUFFIX: &str = "rancher.internal";

/// Initial value of the version token before the first successful poll.
pub const INITIAL_VERSION_TOKEN: &str = "init";
