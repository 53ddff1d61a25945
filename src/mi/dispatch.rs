//! The command loop.
//!
//! One turn: announce readiness, read a line, tokenize, parse, resolve the
//! client, run login handling, execute. Any failure is classified and
//! reported as a frame; only unclassified failures end the loop.

use std::future::Future;

use tokio::io::AsyncBufRead;

use super::cache::{ClientCache, ClientConfiguration, LoopState};
use super::classify::{classify, Recovery, EXIT_MESSAGE};
use super::frame::{FrameKind, FrameSink};
use super::login::handle_login;
use super::reader::{tokenize, LineReader, REFRESH_DIRECTIVE};
use super::LoopSignal;
use crate::cli::{CapturedDiagnostics, CommandParser, LogControl};
use crate::commands::{execute_command, CommandEnv};
use crate::error::{MiError, Result};
use crate::settings::Settings;
use crate::tracker::ClientFactory;

/// Payload of the idle frame sent before each read.
pub const WAITING_MESSAGE: &str = "ArgumentParser waiting";

/// The command channel and the output channel.
pub struct Console<R, S> {
    pub input: LineReader<R>,
    pub output: S,
}

impl<R, S> Console<R, S>
where
    R: AsyncBufRead + Unpin + Send,
    S: FrameSink,
{
    pub fn new(input: R, output: S) -> Self {
        Self {
            input: LineReader::new(input),
            output,
        }
    }

    pub fn into_output(self) -> S {
        self.output
    }
}

/// Long-lived loop state: the client cache, the parser and settings.
pub struct MiLoop<F> {
    cache: ClientCache<F>,
    state: LoopState,
    parser: CommandParser<CapturedDiagnostics>,
    settings: Settings,
    env: CommandEnv,
    log_control: Option<LogControl>,
}

impl<F: ClientFactory> MiLoop<F> {
    pub fn new(factory: F, settings: Settings) -> Self {
        Self {
            cache: ClientCache::new(factory),
            state: LoopState::default(),
            parser: CommandParser::new(CapturedDiagnostics::default()),
            settings,
            env: CommandEnv::default(),
            log_control: None,
        }
    }

    /// Re-level logging from each command's `--debug`/`--verbose`.
    pub fn with_log_control(mut self, control: LogControl) -> Self {
        self.log_control = Some(control);
        self
    }

    pub fn with_env(mut self, env: CommandEnv) -> Self {
        self.env = env;
        self
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn factory(&self) -> &F {
        self.cache.factory()
    }

    /// Serve commands until the input ends or `shutdown` completes.
    ///
    /// Returns the process exit status. Errors are the unclassified failures
    /// that end the loop.
    pub async fn run<R, S>(
        &mut self,
        console: &mut Console<R, S>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<i32>
    where
        R: AsyncBufRead + Unpin + Send,
        S: FrameSink,
    {
        tokio::pin!(shutdown);
        loop {
            let turn = tokio::select! {
                biased;
                _ = &mut shutdown => Err(MiError::Interrupted),
                signal = self.turn(console) => signal,
            };
            let outcome = match turn {
                Ok(signal) => signal,
                Err(err) => self.recover(err, &mut console.output).await?,
            };
            if let LoopSignal::Exit(code) = outcome {
                tracing::info!("Leaving command loop with status {}", code);
                return Ok(code);
            }
        }
    }

    async fn turn<R, S>(&mut self, console: &mut Console<R, S>) -> Result<LoopSignal>
    where
        R: AsyncBufRead + Unpin + Send,
        S: FrameSink,
    {
        if console.output.is_framed() {
            console
                .output
                .emit(FrameKind::Arginf, WAITING_MESSAGE)
                .await?;
        }

        let Some(line) = console.input.read_command_line().await? else {
            tracing::info!("Command channel closed");
            console.output.emit(FrameKind::String, EXIT_MESSAGE).await?;
            return Ok(LoopSignal::Exit(0));
        };

        if line.trim() == REFRESH_DIRECTIVE {
            tracing::debug!("Client refresh requested");
            self.state.force_refresh = true;
            return Ok(LoopSignal::Reprompt);
        }

        let words = tokenize(&line).map_err(|e| MiError::Argument(e.to_string()))?;
        let Some(options) = self.parser.parse(&words) else {
            return Err(MiError::Argument(self.parser.sink_mut().take()));
        };
        tracing::info!("Running '{}'", options.command.name());

        if let Some(control) = &self.log_control {
            control.apply(&options.global);
        }

        let config = ClientConfiguration::from_options(&options.global, &self.settings);
        let tracker = self.cache.resolve(&mut self.state, config).await?;

        match handle_login(&options, &mut *tracker, &mut console.input, &mut console.output)
            .await?
        {
            LoopSignal::Continue => {}
            signal => return Ok(signal),
        }

        execute_command(&options, &*tracker, &self.env, &mut console.output).await?;
        Ok(LoopSignal::Done)
    }

    /// Report `err` and decide how the loop goes on.
    async fn recover(&mut self, err: MiError, output: &mut dyn FrameSink) -> Result<LoopSignal> {
        let err = match err {
            MiError::Usage(message) => {
                self.parser.error(&message);
                MiError::Argument(self.parser.sink_mut().take())
            }
            other => other,
        };

        let Some(verdict) = classify(&err) else {
            tracing::error!("Unrecoverable failure ({}): {}", err.kind_name(), err);
            return Err(err);
        };
        tracing::warn!("{:?}: {}", verdict.category, err);

        output.emit(verdict.frame, &verdict.report).await?;
        match verdict.recovery {
            Recovery::Reprompt => Ok(LoopSignal::Reprompt),
            Recovery::RefreshAndReprompt => {
                self.state.force_refresh = true;
                Ok(LoopSignal::Reprompt)
            }
            Recovery::Exit(code) => Ok(LoopSignal::Exit(code)),
        }
    }
}
