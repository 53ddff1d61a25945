//! Client for the Bugzilla REST API.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use url::Url;

use crate::credentials::CredentialCache;
use crate::error::{BugzillaError, Result};
use crate::types::{
    fault_from_body, Attachment, AttachmentIdsResponse, AttachmentsResponse, Bug, BugChange,
    BugsResponse, CreatedResponse, FieldSelection, LoginOutcome, LoginResponse, NewAttachment,
    Product, ProductsResponse, UpdateResponse, VersionResponse,
};

/// Header carrying an API key.
const API_KEY_HEADER: &str = "X-BUGZILLA-API-KEY";

/// Header carrying a login token.
const TOKEN_HEADER: &str = "X-BUGZILLA-TOKEN";

/// Fault codes Bugzilla uses for "you are not logged in".
const NOT_LOGGED_IN_CODES: &[i64] = &[410, 505, 307, 32000];

/// Everything needed to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Service URL; a bare host or an `xmlrpc.cgi` URL is accepted.
    pub url: String,
    /// Verify the server certificate.
    pub sslverify: bool,
    /// PEM file holding a client certificate and its key.
    pub cert: Option<PathBuf>,
    /// Legacy cookie file. Sessions keep cookies in memory.
    pub cookie_file: Option<PathBuf>,
    /// Session token cache.
    pub token_file: Option<PathBuf>,
    /// API key store.
    pub rc_file: Option<PathBuf>,
    /// Read and write the credential caches at all.
    pub use_creds: bool,
    /// API key supplied by configuration; wins over the rc file.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Option<Duration>,
}

impl ClientOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sslverify: true,
            cert: None,
            cookie_file: None,
            token_file: None,
            rc_file: None,
            use_creds: false,
            api_key: None,
            timeout: None,
        }
    }
}

/// A session with one Bugzilla instance.
pub struct Client {
    http: reqwest::Client,
    base: Url,
    options: ClientOptions,
    api_key: Option<String>,
    token: Option<String>,
    version: Option<String>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base", &self.base.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("version", &self.version)
            .finish()
    }
}

impl Client {
    /// Build the HTTP client, load cached credentials and contact the server.
    ///
    /// # Errors
    /// `InvalidUrl` for an unusable URL, `Certificate` for an unreadable
    /// client certificate, and any transport or fault error from the
    /// initial version request.
    pub async fn connect(options: ClientOptions) -> Result<Self> {
        let base = normalize_url(&options.url)?;
        let http = build_http_client(&options).await?;

        let mut client = Self {
            http,
            base,
            api_key: None,
            token: None,
            version: None,
            options,
        };
        client.load_credentials().await?;
        client.open().await?;
        Ok(client)
    }

    /// Normalized REST base URL.
    pub fn url(&self) -> &str {
        self.base.as_str()
    }

    /// Host key used by the credential caches.
    pub fn host(&self) -> String {
        match (self.base.host_str(), self.base.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => String::new(),
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn set_api_key(&mut self, api_key: impl Into<String>) {
        self.api_key = Some(api_key.into());
    }

    /// Major.minor server version as a float, `0.0` when unknown.
    pub fn version_number(&self) -> f64 {
        self.version
            .as_deref()
            .and_then(|v| {
                let mut parts = v.split('.');
                let major = parts.next()?.trim();
                let minor = parts.next().unwrap_or("0").trim();
                format!("{}.{}", major, minor).parse().ok()
            })
            .unwrap_or(0.0)
    }

    /// Drop the server connection state. Credentials are kept.
    pub fn disconnect(&mut self) {
        self.version = None;
    }

    /// Disconnect, then contact the server again with current credentials.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.disconnect();
        self.open().await
    }

    /// Whether the current credentials identify a user.
    pub async fn logged_in(&self) -> Result<bool> {
        if self.api_key.is_none() && self.token.is_none() {
            return Ok(false);
        }
        match self.call::<Value>(Method::GET, "whoami", &[], None).await {
            Ok(_) => Ok(true),
            Err(BugzillaError::Fault { code, .. }) if NOT_LOGGED_IN_CODES.contains(&code) => {
                Ok(false)
            }
            Err(BugzillaError::Http { status: 401, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Log in with username and password, caching the token when enabled.
    pub async fn login(
        &mut self,
        user: &str,
        password: &str,
        restrict_login: bool,
    ) -> Result<LoginOutcome> {
        let mut query = vec![
            ("login".to_string(), user.to_string()),
            ("password".to_string(), password.to_string()),
        ];
        if restrict_login {
            query.push(("restrict_login".to_string(), "true".to_string()));
        }

        let response: LoginResponse = self.call(Method::GET, "login", &query, None).await?;
        tracing::info!("Logged in to {} as user id {}", self.host(), response.id);

        let mut outcome = LoginOutcome {
            user_id: response.id,
            token_returned: response.token.is_some(),
            token_file: None,
        };
        if let Some(token) = response.token {
            if let Some(cache) = self.token_cache() {
                cache.store(&self.host(), &token).await?;
                outcome.token_file = Some(cache.path().to_path_buf());
            }
            self.token = Some(token);
        }
        Ok(outcome)
    }

    /// Persist the current API key to the rc file.
    ///
    /// Returns the file written, or `None` when credential caching is off.
    pub async fn save_api_key(&self) -> Result<Option<PathBuf>> {
        let (Some(key), Some(cache)) = (self.api_key.as_deref(), self.rc_cache()) else {
            return Ok(None);
        };
        cache.store(&self.host(), key).await?;
        Ok(Some(cache.path().to_path_buf()))
    }

    /// Products by name, or every accessible product when `names` is empty.
    pub async fn products(
        &self,
        names: &[String],
        include_fields: &[String],
    ) -> Result<Vec<Product>> {
        let mut query: Vec<(String, String)> = if names.is_empty() {
            vec![("type".to_string(), "accessible".to_string())]
        } else {
            names
                .iter()
                .map(|n| ("names".to_string(), n.clone()))
                .collect()
        };
        if !include_fields.is_empty() {
            query.push(("include_fields".to_string(), include_fields.join(",")));
        }
        let response: ProductsResponse = self.call(Method::GET, "product", &query, None).await?;
        Ok(response.products)
    }

    /// Run a bug search with raw REST parameters.
    pub async fn search(&self, params: &[(String, String)]) -> Result<Vec<Bug>> {
        let response: BugsResponse = self.call(Method::GET, "bug", params, None).await?;
        Ok(response.bugs)
    }

    /// Fetch specific bugs.
    pub async fn get_bugs(&self, ids: &[String], fields: &FieldSelection) -> Result<Vec<Bug>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = vec![("id".to_string(), ids.join(","))];
        query.extend(fields.to_query());
        let response: BugsResponse = self.call(Method::GET, "bug", &query, None).await?;
        Ok(response.bugs)
    }

    /// File a new bug and return its id.
    pub async fn create_bug(&self, body: &Map<String, Value>) -> Result<u64> {
        let body = Value::Object(body.clone());
        let response: CreatedResponse = self.call(Method::POST, "bug", &[], Some(&body)).await?;
        Ok(response.id)
    }

    /// Apply the same change set to every bug in `ids`.
    pub async fn update_bugs(
        &self,
        ids: &[String],
        changes: &Map<String, Value>,
    ) -> Result<Vec<BugChange>> {
        let Some(first) = ids.first() else {
            return Ok(Vec::new());
        };
        let mut body = changes.clone();
        body.insert("ids".to_string(), Value::from(ids.to_vec()));
        let body = Value::Object(body);
        let path = format!("bug/{}", first);
        let response: UpdateResponse = self.call(Method::PUT, &path, &[], Some(&body)).await?;
        Ok(response.bugs)
    }

    /// All attachments (with data) of the given bugs.
    pub async fn bug_attachments(&self, bug_ids: &[String]) -> Result<Vec<Attachment>> {
        let mut found = Vec::new();
        for bug_id in bug_ids {
            let path = format!("bug/{}/attachment", bug_id);
            let response: AttachmentsResponse = self.call(Method::GET, &path, &[], None).await?;
            for value in response.bugs.into_values() {
                let list: Vec<Attachment> = serde_json::from_value(value)?;
                found.extend(list);
            }
        }
        Ok(found)
    }

    /// Specific attachments (with data).
    pub async fn attachments(&self, ids: &[String]) -> Result<Vec<Attachment>> {
        let Some((first, rest)) = ids.split_first() else {
            return Ok(Vec::new());
        };
        let query: Vec<(String, String)> = rest
            .iter()
            .map(|id| ("attachment_ids".to_string(), id.clone()))
            .collect();
        let path = format!("bug/attachment/{}", first);
        let response: AttachmentsResponse = self.call(Method::GET, &path, &query, None).await?;
        response
            .attachments
            .into_values()
            .map(|value| serde_json::from_value(value).map_err(BugzillaError::from))
            .collect()
    }

    /// Upload an attachment to one bug and return the new attachment ids.
    pub async fn add_attachment(&self, bug_id: &str, upload: &NewAttachment) -> Result<Vec<u64>> {
        let body = upload.to_body(bug_id);
        let path = format!("bug/{}/attachment", bug_id);
        let response: AttachmentIdsResponse =
            self.call(Method::POST, &path, &[], Some(&body)).await?;

        let mut ids = Vec::with_capacity(response.ids.len());
        for value in &response.ids {
            let id = match value {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            };
            ids.push(id.ok_or_else(|| {
                BugzillaError::Parse(format!("unexpected attachment id {}", value))
            })?);
        }
        Ok(ids)
    }

    async fn open(&mut self) -> Result<()> {
        let response: VersionResponse = self.call(Method::GET, "version", &[], None).await?;
        tracing::debug!("Connected to {} (Bugzilla {})", self.base, response.version);
        self.version = Some(response.version);
        Ok(())
    }

    async fn load_credentials(&mut self) -> Result<()> {
        if let Some(key) = self.options.api_key.clone() {
            self.api_key = Some(key);
        } else if let Some(cache) = self.rc_cache() {
            self.api_key = cache.load(&self.host()).await?;
        }
        if let Some(cache) = self.token_cache() {
            self.token = cache.load(&self.host()).await?;
        }
        tracing::debug!(
            "Credentials for {}: api_key={} token={}",
            self.host(),
            self.api_key.is_some(),
            self.token.is_some()
        );
        Ok(())
    }

    fn token_cache(&self) -> Option<CredentialCache> {
        if !self.options.use_creds {
            return None;
        }
        self.options.token_file.clone().map(CredentialCache::new)
    }

    fn rc_cache(&self) -> Option<CredentialCache> {
        if !self.options.use_creds {
            return None;
        }
        self.options.rc_file.clone().map(CredentialCache::new)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<T> {
        let url = self
            .base
            .join(path)
            .map_err(|e| BugzillaError::InvalidUrl {
                url: format!("{}{}", self.base, path),
                message: e.to_string(),
            })?;

        let mut request = self.http.request(method.clone(), url.clone()).query(query);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        } else if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!("{} {}", method, url.path());
        let response = request.send().await.map_err(BugzillaError::from_transport)?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(BugzillaError::from_transport)?;

        let value: Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(_) if !status.is_success() => {
                return Err(BugzillaError::Http {
                    status: status.as_u16(),
                    url: url.to_string(),
                })
            }
            Err(e) => return Err(BugzillaError::Parse(e.to_string())),
        };

        if let Some(fault) = fault_from_body(&value) {
            tracing::debug!("Bugzilla fault from {}: {}", url.path(), fault);
            return Err(fault);
        }
        if !status.is_success() {
            return Err(BugzillaError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(serde_json::from_value(value)?)
    }
}

async fn build_http_client(options: &ClientOptions) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .cookie_store(true)
        .danger_accept_invalid_certs(!options.sslverify)
        .user_agent(concat!("bugzilla-rest/", env!("CARGO_PKG_VERSION")));

    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(cert) = &options.cert {
        let cert_error = |message: String| BugzillaError::Certificate {
            path: cert.display().to_string(),
            message,
        };
        let pem = tokio::fs::read(cert)
            .await
            .map_err(|e| cert_error(e.to_string()))?;
        let identity = reqwest::Identity::from_pem(&pem).map_err(|e| cert_error(e.to_string()))?;
        builder = builder.identity(identity);
    }

    builder.build().map_err(BugzillaError::from_transport)
}

/// Turn whatever the user typed into the REST base URL, with trailing slash.
///
/// `bugzilla.example.com`, `https://bugzilla.example.com/xmlrpc.cgi` and
/// `https://bugzilla.example.com/rest` all map to
/// `https://bugzilla.example.com/rest/`.
pub fn normalize_url(raw: &str) -> Result<Url> {
    let invalid = |message: String| BugzillaError::InvalidUrl {
        url: raw.to_string(),
        message,
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty URL".to_string()));
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }

    let path = url.path().trim_end_matches('/');
    let path = ["/xmlrpc.cgi", "/jsonrpc.cgi"]
        .iter()
        .find_map(|suffix| path.strip_suffix(suffix))
        .unwrap_or(path);
    let path = if path.ends_with("/rest") || path.ends_with("/rest.cgi") {
        path.to_string()
    } else {
        format!("{}/rest", path)
    };
    url.set_path(&format!("{}/", path));
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
