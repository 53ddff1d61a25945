//! Settings schema definitions.
//!
//! All settings structs use `#[serde(default)]` to allow partial configuration files.
//! Missing fields are filled with sensible defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root settings structure.
///
/// Loaded from `~/.config/bugzilla-mi/settings.toml` with environment variable
/// interpolation support. Version field enables future migrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Schema version for migrations
    pub version: u32,

    /// Bugzilla instance and session defaults
    pub bugzilla: BugzillaSettings,

    /// Credential cache locations
    pub credentials: CredentialSettings,

    /// Log verbosity
    pub logging: LoggingSettings,
}

/// Which Bugzilla to talk to and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BugzillaSettings {
    /// Service URL used when `--bugzilla` is not given
    pub url: String,

    /// Verify the server certificate
    pub sslverify: bool,

    /// PEM client certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert: Option<PathBuf>,

    /// Read and write the token/API key caches
    pub cache_credentials: bool,

    /// API key; supports `$ENV_VAR` references
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Credential cache file locations. Unset means the per-user default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rcfile: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokenfile: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookiefile: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level used when neither `--debug` nor `--verbose` is given
    pub level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: 1,
            bugzilla: BugzillaSettings::default(),
            credentials: CredentialSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for BugzillaSettings {
    fn default() -> Self {
        Self {
            url: bugzilla_rest::DEFAULT_URL.to_string(),
            sslverify: true,
            cert: None,
            cache_credentials: true,
            api_key: None,
            timeout_secs: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}
