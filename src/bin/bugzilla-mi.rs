//! `bugzilla-mi`: the Machine Interface.
//!
//! Reads shell-quoted commands from stdin, one per line, and writes framed
//! results to stdout. Logs go to `$BUGZILLA_MI_LOG_FILE` or a timestamped
//! `BZMI*.log` next to the install directory.
//!
//! # Usage
//!
//! ```bash
//! printf 'info --products\n' | bugzilla-mi
//! ```

use anyhow::Result;

use bugzilla_mi::cli::{initialize, LogTarget};
use bugzilla_mi::mi::{Console, FrameWriter, MiLoop};

#[tokio::main]
async fn main() -> Result<()> {
    let mut ctx = initialize(LogTarget::File).await?;

    let mut mi = MiLoop::new(ctx.client_factory(), ctx.settings().clone());
    if let Some(control) = ctx.take_log_control() {
        mi = mi.with_log_control(control);
    }

    let mut console = Console::new(
        tokio::io::BufReader::new(tokio::io::stdin()),
        FrameWriter::new(tokio::io::stdout()),
    );
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let result = mi.run(&mut console, shutdown).await;

    // Flush logs before leaving. Exit explicitly: a pending blocking read
    // on stdin would otherwise hold up runtime shutdown.
    drop(ctx);
    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("bugzilla-mi: {} ({})", e, e.kind_name());
            std::process::exit(1)
        }
    }
}
