//! The one live client handle and when to rebuild it.

use std::path::PathBuf;

use bugzilla_rest::credentials::{default_cookie_file, default_token_file};

use crate::cli::GlobalOptions;
use crate::error::{MiError, Result};
use crate::settings::Settings;
use crate::tracker::{ClientFactory, Tracker};

/// Everything that identifies a client session. Two commands share a
/// handle only when their configurations are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfiguration {
    pub url: String,
    pub cookie_cache: Option<PathBuf>,
    pub token_cache: Option<PathBuf>,
    pub verify_tls: bool,
    pub use_stored_credentials: bool,
    pub client_certificate: Option<PathBuf>,
}

impl ClientConfiguration {
    /// Command line flags over settings over built-in defaults.
    pub fn from_options(global: &GlobalOptions, settings: &Settings) -> Self {
        if global.bztype != "auto" {
            tracing::info!("Explicit --bztype is no longer supported, ignoring");
        }

        let use_stored_credentials =
            settings.bugzilla.cache_credentials && !global.no_cache_credentials;
        let (cookie_cache, token_cache) = if use_stored_credentials {
            let cookie = global
                .cookiefile
                .clone()
                .or_else(|| settings.credentials.cookiefile.clone())
                .unwrap_or_else(default_cookie_file);
            let token = global
                .tokenfile
                .clone()
                .or_else(|| settings.credentials.tokenfile.clone())
                .unwrap_or_else(default_token_file);
            (Some(cookie), Some(token))
        } else {
            (None, None)
        };

        Self {
            url: global
                .bugzilla
                .clone()
                .unwrap_or_else(|| settings.bugzilla.url.clone()),
            cookie_cache,
            token_cache,
            verify_tls: settings.bugzilla.sslverify && !global.nosslverify,
            use_stored_credentials,
            client_certificate: global
                .cert
                .clone()
                .or_else(|| settings.bugzilla.cert.clone()),
        }
    }
}

/// A handle together with the configuration it was built for.
pub struct CachedClient {
    pub config: ClientConfiguration,
    pub handle: Box<dyn Tracker>,
}

/// State carried from one command line to the next.
#[derive(Default)]
pub struct LoopState {
    pub cached: Option<CachedClient>,
    /// Rebuild the handle on the next command regardless of configuration.
    pub force_refresh: bool,
}

impl LoopState {
    pub fn cached_config(&self) -> Option<&ClientConfiguration> {
        self.cached.as_ref().map(|c| &c.config)
    }
}

/// Builds handles through a factory and reuses them while the
/// configuration stays the same.
pub struct ClientCache<F> {
    factory: F,
}

impl<F: ClientFactory> ClientCache<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// The handle for `config`, connecting a new one when there is none,
    /// the configuration changed, or a refresh was requested.
    ///
    /// A failed construction leaves `state` exactly as it was.
    pub async fn resolve<'s>(
        &self,
        state: &'s mut LoopState,
        config: ClientConfiguration,
    ) -> Result<&'s mut dyn Tracker> {
        let reusable = !state.force_refresh
            && state
                .cached
                .as_ref()
                .is_some_and(|cached| cached.config == config);

        if !reusable {
            tracing::debug!(
                "Building client for {} (refresh requested: {})",
                config.url,
                state.force_refresh
            );
            let handle = self
                .factory
                .connect(&config)
                .await
                .map_err(|source| MiError::ClientConstruction {
                    url: config.url.clone(),
                    source,
                })?;
            state.cached = Some(CachedClient { config, handle });
            state.force_refresh = false;
        }

        match state.cached.as_mut() {
            Some(cached) => Ok(cached.handle.as_mut()),
            None => Err(MiError::Internal("client cache is empty".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::mock::{CountingFactory, MockServer};
    use bugzilla_rest::BugzillaError;

    fn config(url: &str) -> ClientConfiguration {
        ClientConfiguration {
            url: url.to_string(),
            cookie_cache: None,
            token_cache: None,
            verify_tls: true,
            use_stored_credentials: false,
            client_certificate: None,
        }
    }

    #[test]
    fn test_from_options_precedence() {
        let mut settings = Settings::default();
        settings.bugzilla.url = "https://bugs.example.org".to_string();
        settings.credentials.tokenfile = Some(PathBuf::from("/settings/token"));

        let mut global = GlobalOptions {
            bztype: "auto".to_string(),
            ..Default::default()
        };
        let cfg = ClientConfiguration::from_options(&global, &settings);
        assert_eq!(cfg.url, "https://bugs.example.org");
        assert!(cfg.verify_tls);
        assert!(cfg.use_stored_credentials);
        assert_eq!(cfg.token_cache, Some(PathBuf::from("/settings/token")));
        assert_eq!(cfg.cookie_cache, Some(default_cookie_file()));

        global.bugzilla = Some("https://bugzilla.mozilla.org".to_string());
        global.nosslverify = true;
        global.tokenfile = Some(PathBuf::from("/flag/token"));
        let cfg = ClientConfiguration::from_options(&global, &settings);
        assert_eq!(cfg.url, "https://bugzilla.mozilla.org");
        assert!(!cfg.verify_tls);
        assert_eq!(cfg.token_cache, Some(PathBuf::from("/flag/token")));

        global.no_cache_credentials = true;
        let cfg = ClientConfiguration::from_options(&global, &settings);
        assert!(!cfg.use_stored_credentials);
        assert_eq!(cfg.token_cache, None);
        assert_eq!(cfg.cookie_cache, None);
    }

    #[tokio::test]
    async fn test_same_configuration_reuses_handle() {
        let factory = CountingFactory::new(MockServer::default());
        let cache = ClientCache::new(factory.clone());
        let mut state = LoopState::default();

        cache.resolve(&mut state, config("https://a")).await.unwrap();
        cache.resolve(&mut state, config("https://a")).await.unwrap();
        assert_eq!(factory.constructions(), 1);

        cache.resolve(&mut state, config("https://b")).await.unwrap();
        assert_eq!(factory.constructions(), 2);
        assert_eq!(state.cached_config().unwrap().url, "https://b");
    }

    #[tokio::test]
    async fn test_force_refresh_rebuilds_once() {
        let factory = CountingFactory::new(MockServer::default());
        let cache = ClientCache::new(factory.clone());
        let mut state = LoopState::default();

        cache.resolve(&mut state, config("https://a")).await.unwrap();
        state.force_refresh = true;
        cache.resolve(&mut state, config("https://a")).await.unwrap();
        assert!(!state.force_refresh);
        cache.resolve(&mut state, config("https://a")).await.unwrap();
        assert_eq!(factory.constructions(), 2);
    }

    #[tokio::test]
    async fn test_failed_construction_leaves_state_alone() {
        let factory = CountingFactory::new(MockServer::default());
        let cache = ClientCache::new(factory.clone());
        let mut state = LoopState::default();
        cache.resolve(&mut state, config("https://a")).await.unwrap();

        state.force_refresh = true;
        factory.fail_next_connect(BugzillaError::Connection("refused".into()));
        let err = match cache.resolve(&mut state, config("https://b")).await {
            Err(err) => err,
            Ok(_) => panic!("expected construction failure"),
        };
        assert!(matches!(err, MiError::ClientConstruction { .. }));
        assert_eq!(state.cached_config().unwrap().url, "https://a");
        assert!(state.force_refresh);
        assert_eq!(factory.constructions(), 1);
    }
}
