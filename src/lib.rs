//! Bugzilla command line tool with a framed Machine Interface.
//!
//! Two front ends share one command grammar and one set of handlers:
//!
//! - `bugzilla`: runs the command given on the command line and exits with
//!   a status describing the outcome.
//! - `bugzilla-mi`: reads one command per line from stdin and answers with
//!   sentinel-delimited frames on stdout, keeping the Bugzilla session alive
//!   between commands. See [`mi`].

pub mod cli;
pub mod commands;
pub mod error;
pub mod mi;
pub mod settings;
pub mod tracker;

pub use error::{MiError, Result};
