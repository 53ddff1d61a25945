//! Settings loading and environment variable interpolation.
//!
//! The `SettingsManager` handles:
//! - Loading settings from `~/.config/bugzilla-mi/settings.toml`
//! - Resolving `$VAR` and `${VAR}` environment variable references
//! - Expanding a leading `~/` in path settings
//! - First-run template generation

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use super::schema::Settings;

/// Embedded template for first-run generation.
const TEMPLATE: &str = include_str!("template.toml");

/// Overrides the settings file location.
pub const CONFIG_ENV: &str = "BUGZILLA_MI_CONFIG";

/// Get the path to the settings file.
pub fn settings_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bugzilla-mi")
        .join("settings.toml")
}

/// Loads settings once and answers the derived lookups.
pub struct SettingsManager {
    /// Settings with env vars resolved
    settings: Settings,

    /// Path to the settings file
    path: PathBuf,
}

impl SettingsManager {
    /// Load from the default location.
    pub async fn new() -> Result<Self> {
        Self::from_path(settings_path()).await
    }

    /// Load from a specific path; a missing file means defaults.
    pub async fn from_path(path: PathBuf) -> Result<Self> {
        let settings = Self::load_from_path(&path).await?;
        Ok(Self { settings, path })
    }

    async fn load_from_path(path: &Path) -> Result<Settings> {
        if !path.exists() {
            tracing::debug!("Settings file not found at {:?}, using defaults", path);
            return Ok(Settings::default());
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .context("Failed to read settings file")?;

        let mut settings: Settings =
            toml::from_str(&contents).context("Failed to deserialize settings")?;

        Self::resolve_env_vars(&mut settings);

        tracing::info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Resolve $ENV_VAR references and `~/` prefixes.
    fn resolve_env_vars(settings: &mut Settings) {
        fn resolve_opt(value: &mut Option<String>) {
            if let Some(v) = value {
                if let Some(resolved) = resolve_env_ref(v) {
                    *v = resolved;
                }
            }
        }

        fn expand_opt(value: &mut Option<PathBuf>) {
            if let Some(p) = value {
                *p = expand_home(p);
            }
        }

        if let Some(url) = resolve_env_ref(&settings.bugzilla.url) {
            settings.bugzilla.url = url;
        }
        resolve_opt(&mut settings.bugzilla.api_key);

        expand_opt(&mut settings.bugzilla.cert);
        expand_opt(&mut settings.credentials.rcfile);
        expand_opt(&mut settings.credentials.tokenfile);
        expand_opt(&mut settings.credentials.cookiefile);
    }

    /// Get the current settings.
    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// Get the settings file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// API key: settings, then `BUGZILLA_API_KEY`.
    pub fn api_key(&self) -> Option<String> {
        get_with_env_fallback(&self.settings.bugzilla.api_key, &["BUGZILLA_API_KEY"], None)
    }

    /// Request timeout: settings, then `BUGZILLA_REQUESTS_TIMEOUT`.
    pub fn timeout(&self) -> Option<Duration> {
        if let Some(secs) = self.settings.bugzilla.timeout_secs {
            return Some(Duration::from_secs(secs));
        }
        let raw = get_with_env_fallback(&None, &["BUGZILLA_REQUESTS_TIMEOUT"], None)?;
        let timeout = parse_timeout(&raw);
        if timeout.is_none() {
            tracing::warn!("Ignoring invalid BUGZILLA_REQUESTS_TIMEOUT '{}'", raw);
        }
        timeout
    }

    /// Ensure settings file exists, creating from template if needed.
    ///
    /// Returns `true` if a new file was created.
    pub async fn ensure_settings_file(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("toml.tmp");
        tokio::fs::write(&temp_path, TEMPLATE).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        tracing::info!("Generated settings template at {:?}", self.path);
        Ok(true)
    }
}

/// Resolve a $ENV_VAR or ${ENV_VAR} reference.
///
/// Returns `Some(resolved)` if the value starts with `$` and the env var exists.
/// Returns `None` if no env var reference or env var not set.
fn resolve_env_ref(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let var_name = trimmed.strip_prefix('$')?;
    let var_name = var_name
        .strip_prefix('{')
        .and_then(|v| v.strip_suffix('}'))
        .unwrap_or(var_name);
    std::env::var(var_name).ok()
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Get a setting value with environment variable fallback.
///
/// Priority order:
/// 1. Settings value (if set and non-empty)
/// 2. Environment variable (first match from list)
/// 3. Default value
pub fn get_with_env_fallback(
    setting: &Option<String>,
    env_vars: &[&str],
    default: Option<String>,
) -> Option<String> {
    if let Some(v) = setting {
        if !v.is_empty() {
            return Some(v.clone());
        }
    }

    for env_var in env_vars {
        if let Ok(v) = std::env::var(env_var) {
            if !v.is_empty() {
                return Some(v);
            }
        }
    }

    default
}

/// Seconds as a positive, finite, representable duration.
fn parse_timeout(raw: &str) -> Option<Duration> {
    let secs = raw.trim().parse::<f64>().ok().filter(|secs| *secs > 0.0)?;
    Duration::try_from_secs_f64(secs).ok()
}
