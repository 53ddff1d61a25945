use bugzilla_rest::BugzillaError;
use thiserror::Error;

/// Everything that can go wrong while serving one command line.
#[derive(Debug, Error)]
pub enum MiError {
    /// Tokenizing, parsing or validating the command line failed.
    /// The text is the parser's full diagnostic output.
    #[error("{0}")]
    Argument(String),

    /// The command line parsed but its options cannot be used together.
    #[error("{0}")]
    Usage(String),

    /// No client could be built for the requested configuration.
    #[error("cannot create a Bugzilla client for {url}: {source}")]
    ClientConstruction {
        url: String,
        #[source]
        source: BugzillaError,
    },

    /// Credentials were supplied but did not produce a session.
    #[error("{0}")]
    Login(String),

    /// A tracker call made while logging in failed.
    #[error(transparent)]
    LoginCall(BugzillaError),

    /// A tracker call failed after the client was built.
    #[error(transparent)]
    Tracker(#[from] BugzillaError),

    /// A downloaded attachment could not be written.
    #[error("{path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The process was asked to stop.
    #[error("interrupted")]
    Interrupted,

    /// The command or output channel failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MiError {
    /// Name of the failure reported to the controller, e.g. `Fault` or
    /// `ConnectionError`.
    pub fn kind_name(&self) -> &'static str {
        match self {
            MiError::Argument(_) | MiError::Usage(_) => "ArgumentError",
            MiError::ClientConstruction { source, .. } => source.kind_name(),
            MiError::Login(_) => "LoginError",
            MiError::LoginCall(e) => e.kind_name(),
            MiError::Tracker(e) => e.kind_name(),
            MiError::File { .. } => "OSError",
            MiError::Interrupted => "Interrupted",
            MiError::Io(_) => "IOError",
            MiError::Internal(_) => "InternalError",
        }
    }

    /// Mark a failure as coming from the login stage.
    pub fn during_login(self) -> Self {
        match self {
            MiError::Tracker(e) => MiError::LoginCall(e),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, MiError>;
