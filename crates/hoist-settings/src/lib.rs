//! # hoist-settings
//!
//! Configuration for the hoist gateway, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`GatewaySettings::default()`]
//! 2. **Settings file**: `~/.hoist/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `HOIST_*` overrides (highest priority)
//!
//! The loaded value is validated and then passed explicitly to whatever needs
//! it; there is no global settings instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
