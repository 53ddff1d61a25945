//! Single-shot execution: one command from the process arguments.

use std::future::Future;

use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite};

use super::args::{Command, Options};
use super::bootstrap::LogControl;
use super::parser::{CommandParser, TerminalDiagnostics};
use crate::commands::{execute_command, CommandEnv};
use crate::error::{MiError, Result};
use crate::mi::classify::classify;
use crate::mi::{ClientConfiguration, FrameKind, FrameSink, LineReader, LoopSignal, PlainWriter};
use crate::settings::Settings;
use crate::tracker::ClientFactory;

/// Runs one command with plain output and maps the outcome to an exit
/// status.
pub struct SingleShot<F> {
    factory: F,
    settings: Settings,
    log_control: Option<LogControl>,
    /// Whether stdin is a terminal; otherwise `attach` may read the upload
    /// from it.
    stdin_is_tty: bool,
}

impl<F: ClientFactory> SingleShot<F> {
    pub fn new(factory: F, settings: Settings) -> Self {
        Self {
            factory,
            settings,
            log_control: None,
            stdin_is_tty: true,
        }
    }

    pub fn with_log_control(mut self, control: Option<LogControl>) -> Self {
        self.log_control = control;
        self
    }

    pub fn with_stdin_is_tty(mut self, is_tty: bool) -> Self {
        self.stdin_is_tty = is_tty;
        self
    }

    /// Parse `words` (without the program name), run the command and return
    /// the exit status.
    pub async fn run<R, O, E>(
        &self,
        words: &[String],
        input: R,
        output: &mut PlainWriter<O, E>,
        shutdown: impl Future<Output = ()>,
    ) -> i32
    where
        R: AsyncBufRead + Unpin + Send,
        O: AsyncWrite + Unpin + Send,
        E: AsyncWrite + Unpin + Send,
    {
        let mut parser = CommandParser::new(TerminalDiagnostics::default());
        let Some(options) = parser.parse(words) else {
            return parser.sink_mut().exit_status().unwrap_or(2);
        };
        if let Some(control) = &self.log_control {
            control.apply(&options.global);
        }

        let result = tokio::select! {
            biased;
            _ = shutdown => Err(MiError::Interrupted),
            result = self.execute(&options, input, &mut *output) => result,
        };

        match result {
            Ok(code) => code,
            Err(MiError::Usage(message)) => {
                parser.error(&message);
                parser.sink_mut().exit_status().unwrap_or(2)
            }
            Err(err) => report(err, output).await,
        }
    }

    async fn execute<R>(&self, options: &Options, input: R, output: &mut dyn FrameSink) -> Result<i32>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let config = ClientConfiguration::from_options(&options.global, &self.settings);
        let mut tracker = self.factory.connect(&config).await.map_err(|source| {
            MiError::ClientConstruction {
                url: config.url.clone(),
                source,
            }
        })?;

        let mut input = LineReader::new(input);
        match crate::mi::login::handle_login(options, tracker.as_mut(), &mut input, output)
            .await?
        {
            LoopSignal::Continue => {}
            LoopSignal::Done => return Ok(0),
            LoopSignal::Reprompt => return Ok(1),
            LoopSignal::Exit(code) => return Ok(code),
        }

        let mut env = CommandEnv::default();
        if self.wants_piped_upload(options) {
            let mut data = Vec::new();
            input.into_inner().read_to_end(&mut data).await?;
            tracing::debug!("Read {} bytes of attachment data from stdin", data.len());
            env.piped_input = Some(data);
        }

        execute_command(options, tracker.as_ref(), &env, output).await?;
        Ok(0)
    }

    fn wants_piped_upload(&self, options: &Options) -> bool {
        match &options.command {
            Command::Attach(args) => {
                !self.stdin_is_tty
                    && args.file.is_none()
                    && args.get.is_empty()
                    && args.getall.is_empty()
            }
            _ => false,
        }
    }
}

/// Print a failure and pick the exit status for it.
async fn report(err: MiError, output: &mut dyn FrameSink) -> i32 {
    let Some(verdict) = classify(&err) else {
        tracing::error!("Unrecoverable failure ({}): {}", err.kind_name(), err);
        if let Err(e) = output
            .emit(FrameKind::Except, &format!("{}: {}", err.kind_name(), err))
            .await
        {
            tracing::warn!("Cannot report failure: {}", e);
        }
        return 1;
    };
    tracing::debug!("{:?}: {}", verdict.category, err);
    if let Err(e) = output.emit(verdict.frame, &verdict.report).await {
        tracing::warn!("Cannot report failure: {}", e);
    }
    verdict.exit_code
}
