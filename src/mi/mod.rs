//! The Machine Interface: a long-lived command loop speaking framed output.
//!
//! A controller writes one shell-quoted command per line on our stdin and
//! reads sentinel-delimited frames from our stdout:
//!
//! ```text
//! controller                      bugzilla-mi
//!     |   <- ARGINF "waiting"          |
//!     |   info --products ->           |
//!     |   <- STRING "EPEL\nFedora\n"   |
//!     |   <- ARGINF "waiting"          |
//! ```
//!
//! Everything the process logs goes to a file, never to stdout.

pub mod cache;
pub mod classify;
pub mod dispatch;
pub mod frame;
pub mod login;
pub mod reader;


pub use cache::{ClientCache, ClientConfiguration, LoopState};
pub use classify::{classify, Category, Recovery, Verdict};
pub use dispatch::{Console, MiLoop};
pub use frame::{
    FrameDecoder, FrameKind, FrameSink, FrameWriter, PlainWriter, SecretReader, TerminalSecret,
};
pub use reader::{tokenize, LineReader, REFRESH_DIRECTIVE};

/// What a stage of the loop wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopSignal {
    /// Go on with the next stage of this command.
    Continue,
    /// Abandon this command and wait for the next line.
    Reprompt,
    /// This command is finished; wait for the next line.
    Done,
    /// Stop the process with this status.
    Exit(i32),
}
