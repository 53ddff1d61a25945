//! On-disk caches for session tokens and API keys.
//!
//! Each cache is a small TOML document mapping a Bugzilla host to a secret:
//!
//! ```toml
//! "bugzilla.redhat.com" = "1234-abcdef"
//! ```
//!
//! Writes go to a temp file that is renamed over the original.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{BugzillaError, Result};

const APP_DIR: &str = "bugzilla-mi";

/// Default location of the session token cache.
pub fn default_token_file() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("bugzillatoken")
}

/// Default location of the legacy cookie file.
pub fn default_cookie_file() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("bugzillacookies")
}

/// Default location of the API key store.
pub fn default_rc_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("bugzillarc")
}

/// A host-keyed secret cache backed by one TOML file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialCache {
    path: PathBuf,
}

impl CredentialCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Secret stored for `host`, if any. A missing file is an empty cache.
    pub async fn load(&self, host: &str) -> Result<Option<String>> {
        Ok(self.read_all().await?.remove(host))
    }

    /// Store `value` for `host`, keeping entries for other hosts.
    pub async fn store(&self, host: &str, value: &str) -> Result<()> {
        let mut entries = self.read_all().await?;
        entries.insert(host.to_string(), value.to_string());
        self.write_all(&entries).await?;
        tracing::debug!("Stored credential for {} in {:?}", host, self.path);
        Ok(())
    }

    /// Forget the secret for `host`.
    pub async fn remove(&self, host: &str) -> Result<()> {
        let mut entries = self.read_all().await?;
        if entries.remove(host).is_some() {
            self.write_all(&entries).await?;
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = tokio::fs::read_to_string(&self.path).await?;
        toml::from_str(&contents).map_err(|e| self.cache_error(e))
    }

    async fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let contents = toml::to_string(entries).map_err(|e| self.cache_error(e))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, contents).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    fn cache_error(&self, err: impl std::fmt::Display) -> BugzillaError {
        BugzillaError::CredentialCache {
            path: self.path.display().to_string(),
            message: err.to_string(),
        }
    }
}
