//! Failure categories and what the loop does about each.

use bugzilla_rest::{BugzillaError, ErrorKind};

use super::frame::FrameKind;
use crate::error::MiError;

/// Text of the closing frame after an interrupt.
pub const EXIT_MESSAGE: &str = "Exited at user request";

const TLS_HINT: &str =
    "If you trust the remote server, you can work around this error with `--nosslverify`";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Argument,
    ClientConstruction,
    Login,
    ServerFault,
    TlsFailure,
    ConnectionFailure,
    UserInterrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Report and wait for the next line; nothing else changes.
    Reprompt,
    /// Report, then rebuild the client on the next command.
    RefreshAndReprompt,
    /// Report, then stop with this status.
    Exit(i32),
}

/// How one failure is reported and recovered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub category: Category,
    pub frame: FrameKind,
    pub report: String,
    pub recovery: Recovery,
    /// Process exit status in single-shot mode.
    pub exit_code: i32,
}

/// Exit status for a tracker failure class.
fn exit_code_for(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Connection => 2,
        ErrorKind::Server => 3,
        ErrorKind::Tls => 4,
        ErrorKind::Local => 1,
    }
}

fn tracker_verdict(err: &BugzillaError) -> Verdict {
    let (category, report) = match err.kind() {
        ErrorKind::Server => (
            Category::ServerFault,
            format!("Server error - {}: {}", err.kind_name(), err),
        ),
        ErrorKind::Tls => (
            Category::TlsFailure,
            format!("SSL error: {}\n{}", err, TLS_HINT),
        ),
        ErrorKind::Connection | ErrorKind::Local => (
            Category::ConnectionFailure,
            format!("Connection lost/failed - {}: {}", err.kind_name(), err),
        ),
    };
    Verdict {
        category,
        frame: FrameKind::Except,
        report,
        recovery: Recovery::RefreshAndReprompt,
        exit_code: exit_code_for(err.kind()),
    }
}

/// Decide what to do about `err`.
///
/// `None` means the failure is not one the loop knows how to survive; the
/// caller logs it and terminates.
pub fn classify(err: &MiError) -> Option<Verdict> {
    let verdict = match err {
        MiError::Argument(text) | MiError::Usage(text) => Verdict {
            category: Category::Argument,
            frame: FrameKind::Arginf,
            report: text.clone(),
            recovery: Recovery::Reprompt,
            exit_code: 2,
        },
        MiError::ClientConstruction { url, source } => Verdict {
            category: Category::ClientConstruction,
            frame: FrameKind::Except,
            report: format!(
                "CANNOT create the Bugzilla client for {} because of {}: {}",
                url,
                source.kind_name(),
                source
            ),
            recovery: Recovery::Reprompt,
            exit_code: exit_code_for(source.kind()),
        },
        MiError::Login(message) => Verdict {
            category: Category::Login,
            frame: FrameKind::Except,
            report: format!("Hit {}:\n{}", err.kind_name(), message),
            recovery: Recovery::RefreshAndReprompt,
            exit_code: 1,
        },
        MiError::LoginCall(source) => Verdict {
            category: Category::Login,
            frame: FrameKind::Except,
            report: format!("Hit {}:\n{}", err.kind_name(), source),
            recovery: Recovery::RefreshAndReprompt,
            exit_code: exit_code_for(source.kind()),
        },
        MiError::Tracker(inner) => tracker_verdict(inner),
        MiError::File { .. } => Verdict {
            category: Category::ConnectionFailure,
            frame: FrameKind::Except,
            report: format!("Connection lost/failed - {}: {}", err.kind_name(), err),
            recovery: Recovery::RefreshAndReprompt,
            exit_code: 2,
        },
        MiError::Interrupted => Verdict {
            category: Category::UserInterrupt,
            frame: FrameKind::String,
            report: EXIT_MESSAGE.to_string(),
            recovery: Recovery::Exit(0),
            exit_code: 0,
        },
        MiError::Io(_) | MiError::Internal(_) => return None,
    };
    Some(verdict)
}
