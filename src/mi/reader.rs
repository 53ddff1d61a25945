//! Command channel input.

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Control line that forces the next command to build a fresh client.
pub const REFRESH_DIRECTIVE: &str = "__REFRESH__";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot split command line: {0}")]
pub struct TokenizeError(String);

/// Reads one command per line from the input channel.
pub struct LineReader<R> {
    inner: R,
}

impl<R: AsyncBufRead + Unpin + Send> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// The underlying reader, positioned after the last line read.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Next line without its line terminator, or `None` at end of input.
    pub async fn read_command_line(&mut self) -> std::io::Result<Option<String>> {
        let mut line = String::new();
        if self.inner.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }
}

/// Split a command line into words with shell quoting rules.
pub fn tokenize(line: &str) -> Result<Vec<String>, TokenizeError> {
    shell_words::split(line).map_err(|e| TokenizeError(e.to_string()))
}
