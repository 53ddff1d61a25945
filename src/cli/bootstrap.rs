//! Process startup: TLS provider, settings and logging.
//!
//! The MI binary logs to a file because stdout is the frame channel;
//! single-shot mode logs to stderr. Either way the level can be changed per
//! command through [`LogControl`].

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use super::args::GlobalOptions;
use crate::settings::{Settings, SettingsManager};
use crate::tracker::RestClientFactory;

/// Selects the MI log file.
pub const LOG_FILE_ENV: &str = "BUGZILLA_MI_LOG_FILE";

/// Where log output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    File,
    Stderr,
}

/// Changes the log level of the running subscriber.
pub struct LogControl {
    handle: reload::Handle<EnvFilter, Registry>,
    default_level: String,
}

impl LogControl {
    /// Level for one command: `--debug`, then `--verbose`, then the default.
    pub fn apply(&self, global: &GlobalOptions) {
        let level = level_for(global, &self.default_level);
        if let Err(e) = self.handle.reload(build_filter(level)) {
            tracing::warn!("Cannot change log level: {}", e);
        }
    }
}

pub fn level_for<'a>(global: &GlobalOptions, default_level: &'a str) -> &'a str {
    if global.debug {
        "debug"
    } else if global.verbose {
        "info"
    } else {
        default_level
    }
}

/// `level`, with `RUST_LOG` directives layered on top.
fn build_filter(level: &str) -> EnvFilter {
    let mut directives = level.to_string();
    if let Ok(extra) = std::env::var(EnvFilter::DEFAULT_ENV) {
        if !extra.trim().is_empty() {
            directives.push(',');
            directives.push_str(&extra);
        }
    }
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(level))
}

/// `$BUGZILLA_MI_LOG_FILE`, else `BZMI<timestamp>.log` one level above the
/// executable's directory.
pub fn log_file_path() -> PathBuf {
    if let Some(path) = std::env::var_os(LOG_FILE_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    let name = format!("BZMI{}.log", chrono::Local::now().format("%y%m%d%H%M%S"));
    match std::env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("..").join(&name))
            .unwrap_or_else(|| PathBuf::from(&name)),
        Err(_) => std::env::temp_dir().join(name),
    }
}

/// Everything set up before the first command runs.
pub struct CliContext {
    pub settings_manager: SettingsManager,

    /// `None` when another subscriber was already installed.
    pub log_control: Option<LogControl>,

    pub log_file: Option<PathBuf>,

    /// Flushes the file writer when dropped.
    _log_guard: Option<WorkerGuard>,
}

impl CliContext {
    pub fn settings(&self) -> &Settings {
        self.settings_manager.get()
    }

    /// Connects REST clients with the session-wide settings.
    pub fn client_factory(&self) -> RestClientFactory {
        RestClientFactory {
            api_key: self.settings_manager.api_key(),
            timeout: self.settings_manager.timeout(),
            rc_file: self.settings().credentials.rcfile.clone(),
        }
    }

    pub fn take_log_control(&mut self) -> Option<LogControl> {
        self.log_control.take()
    }
}

fn init_logging(
    target: LogTarget,
    default_level: &str,
) -> Result<(Option<LogControl>, Option<WorkerGuard>, Option<PathBuf>)> {
    let (filter, handle) = reload::Layer::new(build_filter(default_level));
    let control = LogControl {
        handle,
        default_level: default_level.to_string(),
    };

    let (installed, guard, path) = match target {
        LogTarget::File => {
            let path = log_file_path();
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let installed = tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .try_init()
                .is_ok();
            (installed, Some(guard), Some(path))
        }
        LogTarget::Stderr => {
            let installed = tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .is_ok();
            (installed, None, None)
        }
    };
    Ok((installed.then_some(control), guard, path))
}

/// Install the TLS provider, load settings and start logging.
pub async fn initialize(target: LogTarget) -> Result<CliContext> {
    // Install TLS provider (required for rustls 0.23+)
    let _ = rustls::crypto::ring::default_provider().install_default();

    let settings_manager = SettingsManager::new()
        .await
        .context("Failed to initialize settings manager")?;

    let (log_control, log_guard, log_file) =
        init_logging(target, &settings_manager.get().logging.level)?;
    if let Some(path) = &log_file {
        tracing::info!("Logging to {}", path.display());
    }

    // Ensure settings file exists (creates template on first run)
    if let Err(e) = settings_manager.ensure_settings_file().await {
        tracing::warn!("Failed to create settings template: {}", e);
    }
    tracing::debug!("Settings loaded from {}", settings_manager.path().display());

    Ok(CliContext {
        settings_manager,
        log_control,
        log_file,
        _log_guard: log_guard,
    })
}
