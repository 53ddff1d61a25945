//! `bugzilla`: run one command and exit.
//!
//! # Usage
//!
//! ```bash
//! bugzilla info --products
//! bugzilla query --bug_id 12345 --json
//! bugzilla --bugzilla bugzilla.example.com modify 12345 --status ASSIGNED
//! cat build.log | bugzilla attach 12345 --desc "build log"
//! ```
//!
//! Exit status: 0 on success, 2 for argument and connection failures, 3 for
//! server faults, 4 for TLS failures.

use anyhow::Result;

use bugzilla_mi::cli::{initialize, LogTarget, SingleShot};
use bugzilla_mi::mi::{PlainWriter, TerminalSecret};

#[tokio::main]
async fn main() -> Result<()> {
    let words: Vec<String> = std::env::args().skip(1).collect();

    let mut ctx = initialize(LogTarget::Stderr).await?;

    let stdin_is_tty = atty::is(atty::Stream::Stdin);
    let shot = SingleShot::new(ctx.client_factory(), ctx.settings().clone())
        .with_log_control(ctx.take_log_control())
        .with_stdin_is_tty(stdin_is_tty);

    let mut output = PlainWriter::new(tokio::io::stdout(), tokio::io::stderr());
    if stdin_is_tty {
        output = output.with_secret_reader(TerminalSecret);
    }
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let code = shot.run(&words, stdin, &mut output, shutdown).await;

    // Flush logs before leaving
    drop(ctx);
    std::process::exit(code);
}
