//! Error types for the Bugzilla REST client.

use std::error::Error as StdError;

use thiserror::Error;

/// Broad failure class of a [`BugzillaError`].
///
/// Callers decide recovery on this alone and never need to look at
/// transport internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The server answered with an application-level fault.
    Server,
    /// Certificate or TLS handshake failure.
    Tls,
    /// Socket, HTTP or protocol-level failure, including malformed URLs.
    Connection,
    /// Local failure (credential cache, client certificate file).
    Local,
}

/// Errors that can occur when talking to a Bugzilla instance.
#[derive(Debug, Error)]
pub enum BugzillaError {
    /// The service URL could not be understood
    #[error("invalid Bugzilla URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// Bugzilla returned an error document
    #[error("Bugzilla fault {code}: {message}")]
    Fault { code: i64, message: String },

    /// TLS handshake or certificate verification failed
    #[error("{0}")]
    Tls(String),

    /// Transport failed before a response was received
    #[error("{0}")]
    Connection(String),

    /// Non-success HTTP status without a Bugzilla error document
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// Response body was not the JSON we expected
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Client certificate could not be loaded
    #[error("failed to load client certificate from {path}: {message}")]
    Certificate { path: String, message: String },

    /// Credential cache could not be read or written
    #[error("credential cache {path}: {message}")]
    CredentialCache { path: String, message: String },

    /// Local I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BugzillaError {
    /// Classify a `reqwest` failure.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if let Some(message) = tls_cause(&err) {
            return BugzillaError::Tls(message);
        }
        if let Some(status) = err.status() {
            return BugzillaError::Http {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            };
        }
        if err.is_decode() {
            return BugzillaError::Parse(render_chain(&err));
        }
        if err.is_builder() {
            return BugzillaError::InvalidUrl {
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                message: render_chain(&err),
            };
        }
        BugzillaError::Connection(render_chain(&err))
    }

    /// Failure class used for recovery decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BugzillaError::Fault { .. } => ErrorKind::Server,
            BugzillaError::Tls(_) => ErrorKind::Tls,
            BugzillaError::InvalidUrl { .. }
            | BugzillaError::Connection(_)
            | BugzillaError::Http { .. }
            | BugzillaError::Parse(_) => ErrorKind::Connection,
            BugzillaError::Certificate { .. }
            | BugzillaError::CredentialCache { .. }
            | BugzillaError::Io(_) => ErrorKind::Local,
        }
    }

    /// Short name of the variant, used in user-facing reports.
    pub fn kind_name(&self) -> &'static str {
        match self {
            BugzillaError::InvalidUrl { .. } => "InvalidURL",
            BugzillaError::Fault { .. } => "Fault",
            BugzillaError::Tls(_) => "SSLError",
            BugzillaError::Connection(_) => "ConnectionError",
            BugzillaError::Http { .. } => "HTTPError",
            BugzillaError::Parse(_) => "ProtocolError",
            BugzillaError::Certificate { .. } => "CertificateError",
            BugzillaError::CredentialCache { .. } => "CredentialCacheError",
            BugzillaError::Io(_) => "IOError",
        }
    }
}

impl From<serde_json::Error> for BugzillaError {
    fn from(err: serde_json::Error) -> Self {
        BugzillaError::Parse(err.to_string())
    }
}

/// Result type alias using BugzillaError.
pub type Result<T> = std::result::Result<T, BugzillaError>;

/// Walk the source chain looking for a rustls failure.
///
/// `std::io::Error` hides its payload from `source()`, so it is unwrapped
/// explicitly.
fn tls_cause(err: &(dyn StdError + 'static)) -> Option<String> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(tls) = e.downcast_ref::<rustls::Error>() {
            return Some(tls.to_string());
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if let Some(tls) = io.get_ref().and_then(|inner| inner.downcast_ref::<rustls::Error>())
            {
                return Some(tls.to_string());
            }
        }
        current = e.source();
    }

    let rendered = render_chain(err).to_lowercase();
    if rendered.contains("certificate") || rendered.contains("handshake") {
        return Some(render_chain(err));
    }
    None
}

/// Render an error with all of its causes, `outer: inner: innermost`.
fn render_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        let text = e.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        current = e.source();
    }
    out
}
