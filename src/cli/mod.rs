//! Command line front end shared by both binaries.
//!
//! `bugzilla` parses its process arguments once and prints plain output;
//! `bugzilla-mi` feeds every input line through the same grammar and frames
//! the output.
//!
//! ```text
//! +-----------+     +---------------+     +--------------+
//! | args.rs   | --> | commands/*    | --> | FrameSink    |
//! | parser.rs |     | (shared work) |     | plain/framed |
//! +-----------+     +---------------+     +--------------+
//! ```

mod args;
mod bootstrap;
pub mod output;
mod parser;
mod runner;

pub use args::{
    AttachArgs, BugFieldArgs, Command, GlobalOptions, InfoArgs, LoginArgs, ModifyArgs, NewArgs,
    Options, OutputArgs, OutputMode, QueryArgs,
};
pub use bootstrap::{initialize, level_for, log_file_path, CliContext, LogControl, LogTarget};
pub use parser::{CapturedDiagnostics, CommandParser, DiagnosticSink, TerminalDiagnostics};
pub use runner::SingleShot;
