//! The seam between the command loop and the Bugzilla client.
//!
//! The loop and the command handlers only see `dyn Tracker`; the REST client
//! implements it for real use and `mock::MockTracker` for tests. Clients are
//! built through a [`ClientFactory`] so the cache can be exercised without a
//! server.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bugzilla_rest::{
    Attachment, Bug, BugChange, BugzillaError, Client, ClientOptions, FieldSelection,
    LoginOutcome, NewAttachment, Product, Result,
};
use serde_json::{Map, Value};

use crate::mi::ClientConfiguration;

/// Operations the command handlers need from a Bugzilla session.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Normalized service URL.
    fn url(&self) -> &str;

    fn api_key(&self) -> Option<&str>;

    fn set_api_key(&mut self, api_key: String);

    /// Major.minor server version, `0.0` when unknown.
    fn version_number(&self) -> f64;

    /// Drop the connection and contact the server again with the current
    /// credentials.
    async fn reconnect(&mut self) -> Result<()>;

    async fn logged_in(&self) -> Result<bool>;

    async fn login(&mut self, user: &str, password: &str, restrict: bool)
        -> Result<LoginOutcome>;

    /// Persist the current API key; returns the file written.
    async fn save_api_key(&self) -> Result<Option<PathBuf>>;

    async fn products(&self, names: &[String], include_fields: &[String])
        -> Result<Vec<Product>>;

    async fn search(&self, params: &[(String, String)]) -> Result<Vec<Bug>>;

    async fn get_bugs(&self, ids: &[String], fields: &FieldSelection) -> Result<Vec<Bug>>;

    async fn create_bug(&self, body: &Map<String, Value>) -> Result<u64>;

    async fn update_bugs(
        &self,
        ids: &[String],
        changes: &Map<String, Value>,
    ) -> Result<Vec<BugChange>>;

    async fn bug_attachments(&self, bug_ids: &[String]) -> Result<Vec<Attachment>>;

    async fn attachments(&self, ids: &[String]) -> Result<Vec<Attachment>>;

    async fn add_attachment(&self, bug_id: &str, upload: &NewAttachment) -> Result<Vec<u64>>;
}

#[async_trait]
impl Tracker for Client {
    fn url(&self) -> &str {
        Client::url(self)
    }

    fn api_key(&self) -> Option<&str> {
        Client::api_key(self)
    }

    fn set_api_key(&mut self, api_key: String) {
        Client::set_api_key(self, api_key)
    }

    fn version_number(&self) -> f64 {
        Client::version_number(self)
    }

    async fn reconnect(&mut self) -> Result<()> {
        Client::reconnect(self).await
    }

    async fn logged_in(&self) -> Result<bool> {
        Client::logged_in(self).await
    }

    async fn login(
        &mut self,
        user: &str,
        password: &str,
        restrict: bool,
    ) -> Result<LoginOutcome> {
        Client::login(self, user, password, restrict).await
    }

    async fn save_api_key(&self) -> Result<Option<PathBuf>> {
        Client::save_api_key(self).await
    }

    async fn products(
        &self,
        names: &[String],
        include_fields: &[String],
    ) -> Result<Vec<Product>> {
        Client::products(self, names, include_fields).await
    }

    async fn search(&self, params: &[(String, String)]) -> Result<Vec<Bug>> {
        Client::search(self, params).await
    }

    async fn get_bugs(&self, ids: &[String], fields: &FieldSelection) -> Result<Vec<Bug>> {
        Client::get_bugs(self, ids, fields).await
    }

    async fn create_bug(&self, body: &Map<String, Value>) -> Result<u64> {
        Client::create_bug(self, body).await
    }

    async fn update_bugs(
        &self,
        ids: &[String],
        changes: &Map<String, Value>,
    ) -> Result<Vec<BugChange>> {
        Client::update_bugs(self, ids, changes).await
    }

    async fn bug_attachments(&self, bug_ids: &[String]) -> Result<Vec<Attachment>> {
        Client::bug_attachments(self, bug_ids).await
    }

    async fn attachments(&self, ids: &[String]) -> Result<Vec<Attachment>> {
        Client::attachments(self, ids).await
    }

    async fn add_attachment(&self, bug_id: &str, upload: &NewAttachment) -> Result<Vec<u64>> {
        Client::add_attachment(self, bug_id, upload).await
    }
}

/// Builds a connected session for a configuration.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn connect(
        &self,
        config: &ClientConfiguration,
    ) -> std::result::Result<Box<dyn Tracker>, BugzillaError>;
}

/// Connects [`bugzilla_rest::Client`]s.
///
/// Holds the settings that apply to every session but are not part of a
/// configuration's identity.
#[derive(Debug, Clone, Default)]
pub struct RestClientFactory {
    pub api_key: Option<String>,
    pub timeout: Option<Duration>,
    pub rc_file: Option<PathBuf>,
}

#[async_trait]
impl ClientFactory for RestClientFactory {
    async fn connect(
        &self,
        config: &ClientConfiguration,
    ) -> std::result::Result<Box<dyn Tracker>, BugzillaError> {
        let options = ClientOptions {
            url: config.url.clone(),
            sslverify: config.verify_tls,
            cert: config.client_certificate.clone(),
            cookie_file: config.cookie_cache.clone(),
            token_file: config.token_cache.clone(),
            rc_file: self.rc_file.clone(),
            use_creds: config.use_stored_credentials,
            api_key: self.api_key.clone(),
            timeout: self.timeout,
        };
        tracing::info!("Connecting to {}", config.url);
        let client = Client::connect(options).await?;
        Ok(Box::new(client))
    }
}

#[cfg(test)]
pub mod mock {
    //! In-memory tracker and a factory that counts constructions.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    /// Server-side state shared by every mock session of one factory.
    #[derive(Debug, Default)]
    pub struct MockServer {
        pub products: Vec<Product>,
        pub bugs: Vec<Bug>,
        pub attachments: Vec<Attachment>,
        /// API key every new session starts with.
        pub stored_api_key: Option<String>,
        /// Keys that identify a user.
        pub valid_api_keys: Vec<String>,
        /// Returned by the next network call of any session, once.
        pub next_error: Option<BugzillaError>,
        pub calls: Vec<String>,
        pub logins: Vec<(String, String)>,
        pub searches: Vec<Vec<(String, String)>>,
        pub created: Vec<Map<String, Value>>,
        pub updates: Vec<(Vec<String>, Map<String, Value>)>,
        pub uploads: Vec<(String, NewAttachment)>,
        pub saved_api_key: Option<String>,
    }

    impl MockServer {
        fn record(&mut self, call: &str) -> Result<()> {
            self.calls.push(call.to_string());
            match self.next_error.take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    pub struct MockTracker {
        url: String,
        api_key: Option<String>,
        token: bool,
        server: Arc<Mutex<MockServer>>,
    }

    #[async_trait]
    impl Tracker for MockTracker {
        fn url(&self) -> &str {
            &self.url
        }

        fn api_key(&self) -> Option<&str> {
            self.api_key.as_deref()
        }

        fn set_api_key(&mut self, api_key: String) {
            self.api_key = Some(api_key);
        }

        fn version_number(&self) -> f64 {
            5.0
        }

        async fn reconnect(&mut self) -> Result<()> {
            self.server.lock().record("reconnect")
        }

        async fn logged_in(&self) -> Result<bool> {
            let mut server = self.server.lock();
            server.record("logged_in")?;
            let key_ok = self
                .api_key
                .as_ref()
                .is_some_and(|k| server.valid_api_keys.contains(k));
            Ok(key_ok || self.token)
        }

        async fn login(
            &mut self,
            user: &str,
            password: &str,
            _restrict: bool,
        ) -> Result<LoginOutcome> {
            {
                let mut server = self.server.lock();
                server.record("login")?;
                server.logins.push((user.to_string(), password.to_string()));
            }
            self.token = true;
            Ok(LoginOutcome {
                user_id: 1,
                token_returned: true,
                token_file: Some(PathBuf::from("/tmp/bugzillatoken")),
            })
        }

        async fn save_api_key(&self) -> Result<Option<PathBuf>> {
            let mut server = self.server.lock();
            server.record("save_api_key")?;
            server.saved_api_key = self.api_key.clone();
            Ok(Some(PathBuf::from("/tmp/bugzillarc")))
        }

        async fn products(
            &self,
            names: &[String],
            _include_fields: &[String],
        ) -> Result<Vec<Product>> {
            let mut server = self.server.lock();
            server.record("products")?;
            Ok(server
                .products
                .iter()
                .filter(|p| names.is_empty() || names.contains(&p.name))
                .cloned()
                .collect())
        }

        async fn search(&self, params: &[(String, String)]) -> Result<Vec<Bug>> {
            let mut server = self.server.lock();
            server.record("search")?;
            server.searches.push(params.to_vec());
            let ids: Vec<&str> = params
                .iter()
                .filter(|(k, _)| k == "id")
                .flat_map(|(_, v)| v.split(','))
                .collect();
            Ok(server
                .bugs
                .iter()
                .filter(|b| ids.is_empty() || ids.contains(&b.id.to_string().as_str()))
                .cloned()
                .collect())
        }

        async fn get_bugs(&self, ids: &[String], _fields: &FieldSelection) -> Result<Vec<Bug>> {
            let mut server = self.server.lock();
            server.record("get_bugs")?;
            Ok(server
                .bugs
                .iter()
                .filter(|b| ids.contains(&b.id.to_string()))
                .cloned()
                .collect())
        }

        async fn create_bug(&self, body: &Map<String, Value>) -> Result<u64> {
            let mut server = self.server.lock();
            server.record("create_bug")?;
            server.created.push(body.clone());
            let id = 1000 + server.created.len() as u64;
            let mut fields = body.clone();
            fields.insert("status".to_string(), Value::from("NEW"));
            server.bugs.push(Bug { id, fields });
            Ok(id)
        }

        async fn update_bugs(
            &self,
            ids: &[String],
            changes: &Map<String, Value>,
        ) -> Result<Vec<BugChange>> {
            let mut server = self.server.lock();
            server.record("update_bugs")?;
            server.updates.push((ids.to_vec(), changes.clone()));
            Ok(ids
                .iter()
                .filter_map(|id| id.parse().ok())
                .map(|id| {
                    let mut reported = Map::new();
                    for (field, value) in changes {
                        if field == "comment" {
                            continue;
                        }
                        reported.insert(
                            field.clone(),
                            serde_json::json!({"added": value, "removed": ""}),
                        );
                    }
                    BugChange {
                        id,
                        changes: reported,
                    }
                })
                .collect())
        }

        async fn bug_attachments(&self, bug_ids: &[String]) -> Result<Vec<Attachment>> {
            let mut server = self.server.lock();
            server.record("bug_attachments")?;
            Ok(server
                .attachments
                .iter()
                .filter(|a| bug_ids.contains(&a.bug_id.to_string()))
                .cloned()
                .collect())
        }

        async fn attachments(&self, ids: &[String]) -> Result<Vec<Attachment>> {
            let mut server = self.server.lock();
            server.record("attachments")?;
            Ok(server
                .attachments
                .iter()
                .filter(|a| ids.contains(&a.id.to_string()))
                .cloned()
                .collect())
        }

        async fn add_attachment(
            &self,
            bug_id: &str,
            upload: &NewAttachment,
        ) -> Result<Vec<u64>> {
            let mut server = self.server.lock();
            server.record("add_attachment")?;
            server.uploads.push((bug_id.to_string(), upload.clone()));
            Ok(vec![500 + server.uploads.len() as u64])
        }
    }

    /// Factory handing out [`MockTracker`]s over one shared [`MockServer`].
    #[derive(Clone, Default)]
    pub struct CountingFactory {
        pub server: Arc<Mutex<MockServer>>,
        constructions: Arc<AtomicUsize>,
        /// Returned by the next `connect`, once.
        pub connect_error: Arc<Mutex<Option<BugzillaError>>>,
    }

    impl CountingFactory {
        pub fn new(server: MockServer) -> Self {
            Self {
                server: Arc::new(Mutex::new(server)),
                ..Default::default()
            }
        }

        /// Number of successful client constructions so far.
        pub fn constructions(&self) -> usize {
            self.constructions.load(Ordering::SeqCst)
        }

        pub fn fail_next_connect(&self, err: BugzillaError) {
            *self.connect_error.lock() = Some(err);
        }

        pub fn fail_next_call(&self, err: BugzillaError) {
            self.server.lock().next_error = Some(err);
        }
    }

    #[async_trait]
    impl ClientFactory for CountingFactory {
        async fn connect(
            &self,
            config: &ClientConfiguration,
        ) -> std::result::Result<Box<dyn Tracker>, BugzillaError> {
            if let Some(err) = self.connect_error.lock().take() {
                return Err(err);
            }
            self.constructions.fetch_add(1, Ordering::SeqCst);
            let api_key = self.server.lock().stored_api_key.clone();
            Ok(Box::new(MockTracker {
                url: config.url.clone(),
                api_key,
                token: false,
                server: Arc::clone(&self.server),
            }))
        }
    }

    /// A bug with a handful of the usual fields.
    pub fn bug(id: u64, summary: &str) -> Bug {
        let mut fields = Map::new();
        fields.insert("summary".to_string(), Value::from(summary));
        fields.insert("status".to_string(), Value::from("NEW"));
        fields.insert("assigned_to".to_string(), Value::from("dev@example.com"));
        fields.insert("component".to_string(), Value::from("kernel"));
        Bug { id, fields }
    }

    pub fn product(name: &str) -> Product {
        Product {
            id: 0,
            name: name.to_string(),
            components: Vec::new(),
            versions: Vec::new(),
        }
    }
}
