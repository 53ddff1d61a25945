//! TOML-based settings.
//!
//! Settings are loaded from `~/.config/bugzilla-mi/settings.toml` with
//! environment variable interpolation support. Command line flags override
//! them; existing environment variables keep working through the
//! `get_with_env_fallback` helper.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::settings::SettingsManager;
//!
//! let manager = SettingsManager::new().await?;
//! let url = &manager.get().bugzilla.url;
//! let api_key = manager.api_key();
//! ```

pub mod loader;
pub mod schema;

pub use loader::{get_with_env_fallback, SettingsManager};
pub use schema::Settings;
