//! Argument parsing with pluggable diagnostic output.
//!
//! clap never writes to the terminal or exits the process here. Usage text,
//! help and errors are handed to a [`DiagnosticSink`]; single-shot mode prints
//! them, the MI loop turns them into one `ARGINF` frame.

use clap::{CommandFactory, Parser};

use super::args::Options;

/// Program name used in usage lines.
const PROGRAM: &str = "bugzilla";

/// Receives what the argument parser would otherwise print.
pub trait DiagnosticSink: Send {
    /// Usage, help or error text.
    fn report_diagnostic(&mut self, text: &str);

    /// The parser is done with this command line. `status` is 0 after
    /// `--help`/`--version` and 2 after an error.
    fn request_exit(&mut self, status: i32);
}

/// Keeps diagnostics for the caller to pick up.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CapturedDiagnostics {
    text: String,
    exit_status: Option<i32>,
}

impl CapturedDiagnostics {
    /// Everything reported since the last call, followed by the exit status
    /// line when the parser stopped with an error.
    pub fn take(&mut self) -> String {
        let mut text = std::mem::take(&mut self.text);
        if let Some(status) = self.exit_status.take().filter(|s| *s != 0) {
            text.push_str(&format!("\nArgumentParser exit with status {}", status));
        }
        text
    }
}

impl DiagnosticSink for CapturedDiagnostics {
    fn report_diagnostic(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn request_exit(&mut self, status: i32) {
        self.exit_status = Some(status);
    }
}

/// Prints diagnostics the way a terminal program does: help to stdout,
/// errors to stderr.
#[derive(Debug, Default)]
pub struct TerminalDiagnostics {
    pending: String,
    exit_status: Option<i32>,
}

impl TerminalDiagnostics {
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }
}

impl DiagnosticSink for TerminalDiagnostics {
    fn report_diagnostic(&mut self, text: &str) {
        self.pending.push_str(text);
    }

    fn request_exit(&mut self, status: i32) {
        let text = std::mem::take(&mut self.pending);
        if status == 0 {
            print!("{}", text);
        } else {
            eprint!("{}", text);
        }
        self.exit_status = Some(status);
    }
}

/// Parses tokenized command lines into [`Options`].
pub struct CommandParser<S> {
    sink: S,
}

impl<S: DiagnosticSink> CommandParser<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Parse argv-style words, without the program name.
    ///
    /// Returns `None` when the parser reported something and asked to stop.
    pub fn parse(&mut self, words: &[String]) -> Option<Options> {
        let argv = std::iter::once(PROGRAM.to_string()).chain(words.iter().cloned());
        match Options::try_parse_from(argv) {
            Ok(options) => Some(options),
            Err(err) => {
                self.sink.report_diagnostic(&err.render().to_string());
                self.sink.request_exit(err.exit_code());
                None
            }
        }
    }

    /// Report a validation failure found after parsing, in the parser's
    /// usage + error format, and stop with status 2.
    pub fn error(&mut self, message: &str) {
        let usage = Options::command().render_usage().to_string();
        self.sink
            .report_diagnostic(&format!("{}\n\n{}: error: {}\n", usage.trim_end(), PROGRAM, message));
        self.sink.request_exit(2);
    }
}
