//! Package-level constants.

/// Current version of the gateway (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "hoist";

/// Object key prefix for uploaded device snapshots.
pub const SNAPSHOT_KEY_PREFIX: &str = "snapshots";

/// Reference handed to the control plane when an upload could not be stored.
pub const DEFAULT_PLACEHOLDER_URL: &str = "https://via.placeholder.com/150.jpg";
