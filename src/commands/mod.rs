//! Command handlers shared by the MI loop and single-shot mode.
//!
//! Each handler talks to the tracker through `dyn Tracker` and writes its
//! result through a [`FrameSink`], so the same code produces framed output
//! in the loop and plain output on a terminal.

pub mod attach;
pub mod info;
pub mod modify;
pub mod new;
pub mod query;

use std::path::PathBuf;

use crate::cli::output::emit_buglist;
use crate::cli::{Command, Options};
use crate::error::Result;
use crate::mi::FrameSink;
use crate::tracker::Tracker;

/// What a command may use from its surroundings besides the tracker.
#[derive(Debug, Clone, Default)]
pub struct CommandEnv {
    /// Directory downloaded attachments are written to; empty means the
    /// working directory.
    pub download_dir: PathBuf,
    /// Upload data piped on stdin. Only single-shot mode has any; in the MI
    /// loop stdin is the command channel.
    pub piped_input: Option<Vec<u8>>,
}

/// Run the command in `options` and emit its result.
pub async fn execute_command(
    options: &Options,
    tracker: &dyn Tracker,
    env: &CommandEnv,
    output: &mut dyn FrameSink,
) -> Result<()> {
    tracing::debug!("Executing '{}'", options.command.name());
    match &options.command {
        Command::Info(args) => info::run(tracker, args, output).await,
        Command::Query(args) => {
            let bugs = query::run(tracker, args).await?;
            emit_buglist(tracker, &args.output, bugs, output).await
        }
        Command::New(args) => {
            let bugs = new::run(tracker, args).await?;
            emit_buglist(tracker, &args.output, bugs, output).await
        }
        Command::Modify(args) => modify::run(tracker, args, output).await,
        Command::Attach(args) => attach::run(tracker, args, env, output).await,
        // Fully handled before execution.
        Command::Login(_) => Ok(()),
    }
}
