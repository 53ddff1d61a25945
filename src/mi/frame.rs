//! Sentinel-delimited output frames.
//!
//! Every frame on the output channel looks like
//!
//! ```text
//! \n|v>KIND<v|\n<payload>\n|^>KIND<^|\n
//! ```
//!
//! The payload is written verbatim. A payload that itself contains a tail
//! sentinel for its own kind will confuse a reader; that limitation is part
//! of the wire format.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

const HEAD_PREFIX: &str = "\n|v>";
const HEAD_SUFFIX: &str = "<v|\n";
const TAIL_PREFIX: &str = "\n|^>";
const TAIL_SUFFIX: &str = "<^|\n";

/// What a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// A failure report.
    Except,
    /// Status text or a raw/JSON data payload.
    String,
    /// Templated bug list output.
    Format,
    /// Attachment download/upload report.
    Attach,
    /// Argument parser output, including the idle "waiting" marker.
    Arginf,
    /// Interactive login prompts and results.
    Ilogin,
}

impl FrameKind {
    pub const ALL: [FrameKind; 6] = [
        FrameKind::Except,
        FrameKind::String,
        FrameKind::Format,
        FrameKind::Attach,
        FrameKind::Arginf,
        FrameKind::Ilogin,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            FrameKind::Except => "EXCEPT",
            FrameKind::String => "STRING",
            FrameKind::Format => "FORMAT",
            FrameKind::Attach => "ATTACH",
            FrameKind::Arginf => "ARGINF",
            FrameKind::Ilogin => "ILOGIN",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }

    pub fn head(self) -> String {
        format!("{}{}{}", HEAD_PREFIX, self.tag(), HEAD_SUFFIX)
    }

    pub fn tail(self) -> String {
        format!("{}{}{}", TAIL_PREFIX, self.tag(), TAIL_SUFFIX)
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Encode one complete frame.
pub fn encode(kind: FrameKind, payload: &str) -> String {
    let mut out = String::with_capacity(payload.len() + 32);
    out.push_str(&kind.head());
    out.push_str(payload);
    out.push_str(&kind.tail());
    out
}

/// Destination for command output.
///
/// The MI loop writes framed output; single-shot mode writes the same
/// payloads plainly.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one complete unit of output and flush it.
    async fn emit(&mut self, kind: FrameKind, payload: &str) -> std::io::Result<()>;

    /// Ask the user for input. Framed output sends prompts as `ILOGIN`
    /// frames.
    async fn prompt(&mut self, text: &str) -> std::io::Result<()> {
        self.emit(FrameKind::Ilogin, text).await
    }

    /// Ask for a secret. `None` means the answer is to be read from the
    /// command channel like any other.
    async fn prompt_secret(&mut self, text: &str) -> std::io::Result<Option<String>> {
        self.prompt(text).await?;
        Ok(None)
    }

    /// Whether the idle "waiting" marker should be shown between commands.
    fn is_framed(&self) -> bool {
        true
    }
}

/// Reads a secret without echoing it.
pub trait SecretReader: Send + Sync {
    /// Blocks until the user answers.
    fn read_secret(&self, prompt: &str) -> std::io::Result<String>;
}

/// Masked input on the controlling terminal.
pub struct TerminalSecret;

impl SecretReader for TerminalSecret {
    fn read_secret(&self, prompt: &str) -> std::io::Result<String> {
        dialoguer::Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .map_err(|e| std::io::Error::other(e.to_string()))
    }
}

/// Writes frames to the output channel, one `write_all` + `flush` per frame.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FrameSink for FrameWriter<W> {
    async fn emit(&mut self, kind: FrameKind, payload: &str) -> std::io::Result<()> {
        let frame = encode(kind, payload);
        self.inner.write_all(frame.as_bytes()).await?;
        self.inner.flush().await?;
        tracing::trace!("Emitted {} frame ({} bytes)", kind, payload.len());
        Ok(())
    }
}

/// Unframed output for single-shot mode.
///
/// Failures and parser output go to `err`, everything else to `out`.
pub struct PlainWriter<O, E> {
    out: O,
    err: E,
    secrets: Option<Arc<dyn SecretReader>>,
}

impl<O, E> PlainWriter<O, E>
where
    O: AsyncWrite + Unpin + Send,
    E: AsyncWrite + Unpin + Send,
{
    pub fn new(out: O, err: E) -> Self {
        Self {
            out,
            err,
            secrets: None,
        }
    }

    /// Read passwords through `reader` instead of the input stream.
    pub fn with_secret_reader(mut self, reader: impl SecretReader + 'static) -> Self {
        self.secrets = Some(Arc::new(reader));
        self
    }

    pub fn into_inner(self) -> (O, E) {
        (self.out, self.err)
    }
}

#[async_trait]
impl<O, E> FrameSink for PlainWriter<O, E>
where
    O: AsyncWrite + Unpin + Send,
    E: AsyncWrite + Unpin + Send,
{
    async fn emit(&mut self, kind: FrameKind, payload: &str) -> std::io::Result<()> {
        if payload.is_empty() {
            return Ok(());
        }
        let mut text = payload.to_string();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        let stream: &mut (dyn AsyncWrite + Unpin + Send) = match kind {
            FrameKind::Except | FrameKind::Arginf | FrameKind::Ilogin => &mut self.err,
            FrameKind::String | FrameKind::Format | FrameKind::Attach => &mut self.out,
        };
        stream.write_all(text.as_bytes()).await?;
        stream.flush().await
    }

    async fn prompt(&mut self, text: &str) -> std::io::Result<()> {
        self.err.write_all(text.as_bytes()).await?;
        self.err.flush().await
    }

    async fn prompt_secret(&mut self, text: &str) -> std::io::Result<Option<String>> {
        let Some(reader) = self.secrets.clone() else {
            self.prompt(text).await?;
            return Ok(None);
        };
        let prompt = text.trim_end().trim_end_matches(':').to_string();
        let secret = tokio::task::spawn_blocking(move || reader.read_secret(&prompt))
            .await
            .map_err(std::io::Error::other)??;
        Ok(Some(secret))
    }

    fn is_framed(&self) -> bool {
        false
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown frame kind '{0}'")]
    UnknownKind(String),

    #[error("unexpected output outside a frame: {0:?}")]
    Stray(String),
}

#[derive(Debug, Clone, Copy)]
enum State {
    WaitingForHead,
    InPayload(FrameKind),
}

/// Controller-side decoder for the MI output stream.
///
/// Output may arrive in arbitrary chunks; complete frames are returned as
/// soon as their tail sentinel has been seen.
pub struct FrameDecoder {
    buffer: BytesMut,
    state: State,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            state: State::WaitingForHead,
        }
    }

    /// Feed bytes and collect every frame they complete.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>, FrameError> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Bytes received but not yet part of a complete frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn try_extract_one(&mut self) -> Result<Option<Frame>, FrameError> {
        match self.state {
            State::WaitingForHead => {
                let Some(start) = find(&self.buffer, HEAD_PREFIX.as_bytes()) else {
                    return Ok(None);
                };
                if start > 0 {
                    let stray = String::from_utf8_lossy(&self.buffer[..start]).into_owned();
                    self.buffer.advance(start);
                    return Err(FrameError::Stray(stray));
                }
                let after_prefix = HEAD_PREFIX.len();
                let Some(end) = find(&self.buffer[after_prefix..], HEAD_SUFFIX.as_bytes()) else {
                    return Ok(None);
                };
                let tag = String::from_utf8_lossy(&self.buffer[after_prefix..after_prefix + end])
                    .into_owned();
                self.buffer.advance(after_prefix + end + HEAD_SUFFIX.len());
                let kind = FrameKind::from_tag(&tag).ok_or(FrameError::UnknownKind(tag))?;
                self.state = State::InPayload(kind);
                self.try_extract_one()
            }
            State::InPayload(kind) => {
                let tail = kind.tail();
                let Some(end) = find(&self.buffer, tail.as_bytes()) else {
                    return Ok(None);
                };
                let payload = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
                self.buffer.advance(end + tail.len());
                self.state = State::WaitingForHead;
                Ok(Some(Frame { kind, payload }))
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Decode a complete output capture. Test and tooling helper.
pub fn decode_all(output: &[u8]) -> Result<Vec<Frame>, FrameError> {
    let mut decoder = FrameDecoder::new();
    let frames = decoder.push(output)?;
    if decoder.pending() > 0 {
        let rest = String::from_utf8_lossy(&decoder.buffer).into_owned();
        return Err(FrameError::Stray(rest));
    }
    Ok(frames)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::SecretReader;

    /// Answers every secret prompt with the same text and records the
    /// prompts it saw.
    #[derive(Clone, Default)]
    pub struct FixedSecret {
        pub answer: String,
        pub prompts: Arc<Mutex<Vec<String>>>,
    }

    impl FixedSecret {
        pub fn new(answer: &str) -> Self {
            Self {
                answer: answer.to_string(),
                ..Default::default()
            }
        }
    }

    impl SecretReader for FixedSecret {
        fn read_secret(&self, prompt: &str) -> std::io::Result<String> {
            self.prompts.lock().push(prompt.to_string());
            Ok(self.answer.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FixedSecret;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_head_and_tail_are_bit_exact() {
        assert_eq!(FrameKind::String.head(), "\n|v>STRING<v|\n");
        assert_eq!(FrameKind::String.tail(), "\n|^>STRING<^|\n");
        assert_eq!(
            encode(FrameKind::Arginf, "ArgumentParser waiting"),
            "\n|v>ARGINF<v|\nArgumentParser waiting\n|^>ARGINF<^|\n"
        );
    }

    #[test]
    fn test_tags_round_trip() {
        for kind in FrameKind::ALL {
            assert_eq!(FrameKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(FrameKind::from_tag("BOGUS"), None);
    }

    #[tokio::test]
    async fn test_frame_writer_flushes_whole_frames() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.emit(FrameKind::Except, "boom").await.unwrap();
        writer.emit(FrameKind::String, "").await.unwrap();
        let out = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(
            out,
            "\n|v>EXCEPT<v|\nboom\n|^>EXCEPT<^|\n\n|v>STRING<v|\n\n|^>STRING<^|\n"
        );
    }

    #[tokio::test]
    async fn test_plain_writer_routes_streams() {
        let mut writer = PlainWriter::new(Vec::new(), Vec::new());
        writer.emit(FrameKind::String, "Fedora\n").await.unwrap();
        writer.emit(FrameKind::Format, "#1 NEW").await.unwrap();
        writer.emit(FrameKind::Except, "Server error").await.unwrap();
        writer.prompt("Bugzilla Username: ").await.unwrap();
        let (out, err) = writer.into_inner();
        assert_eq!(String::from_utf8(out).unwrap(), "Fedora\n#1 NEW\n");
        assert_eq!(
            String::from_utf8(err).unwrap(),
            "Server error\nBugzilla Username: "
        );
    }

    #[tokio::test]
    async fn test_plain_writer_reads_secrets_without_echo() {
        let secret = FixedSecret::new("hunter2");
        let mut writer =
            PlainWriter::new(Vec::new(), Vec::new()).with_secret_reader(secret.clone());
        let answer = writer.prompt_secret("Bugzilla Password: ").await.unwrap();
        assert_eq!(answer.as_deref(), Some("hunter2"));
        assert_eq!(*secret.prompts.lock(), vec!["Bugzilla Password".to_string()]);
        let (out, err) = writer.into_inner();
        assert!(out.is_empty());
        assert!(err.is_empty());
    }

    #[tokio::test]
    async fn test_secret_prompts_fall_back_to_the_input_stream() {
        let mut plain = PlainWriter::new(Vec::new(), Vec::new());
        assert_eq!(plain.prompt_secret("Bugzilla Password: ").await.unwrap(), None);
        assert_eq!(plain.into_inner().1, b"Bugzilla Password: ");

        let mut framed = FrameWriter::new(Vec::new());
        assert_eq!(framed.prompt_secret("Bugzilla Password: ").await.unwrap(), None);
        let frames = decode_all(&framed.into_inner()).unwrap();
        assert_eq!(frames[0].kind, FrameKind::Ilogin);
        assert_eq!(frames[0].payload, "Bugzilla Password: ");
    }

    #[test]
    fn test_decoder_handles_split_input() {
        let stream = format!(
            "{}{}",
            encode(FrameKind::Arginf, "ArgumentParser waiting"),
            encode(FrameKind::String, "EPEL\nFedora\n")
        );
        let bytes = stream.as_bytes();
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for chunk in bytes.chunks(5) {
            frames.extend(decoder.push(chunk).unwrap());
        }
        assert_eq!(decoder.pending(), 0);
        assert_eq!(
            frames,
            vec![
                Frame {
                    kind: FrameKind::Arginf,
                    payload: "ArgumentParser waiting".to_string()
                },
                Frame {
                    kind: FrameKind::String,
                    payload: "EPEL\nFedora\n".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_decoder_rejects_unknown_kind() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(
            decoder.push(b"\n|v>NOPE<v|\nx\n|^>NOPE<^|\n"),
            Err(FrameError::UnknownKind("NOPE".to_string()))
        );
    }

    #[test]
    fn test_decode_all_reports_stray_output() {
        assert!(matches!(
            decode_all(b"hello\n|v>STRING<v|\nx\n|^>STRING<^|\n"),
            Err(FrameError::Stray(_))
        ));
        assert!(matches!(
            decode_all(b"\n|v>STRING<v|\nunterminated"),
            Err(FrameError::Stray(_))
        ));
    }

    fn any_kind() -> impl Strategy<Value = FrameKind> {
        prop::sample::select(FrameKind::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_frames_are_well_formed(
            frames in prop::collection::vec((any_kind(), "[^|]{0,64}"), 0..8)
        ) {
            let mut stream = String::new();
            for (kind, payload) in &frames {
                stream.push_str(&encode(*kind, payload));
            }
            let decoded = decode_all(stream.as_bytes()).unwrap();
            prop_assert_eq!(decoded.len(), frames.len());
            for (frame, (kind, payload)) in decoded.iter().zip(frames.iter()) {
                prop_assert_eq!(frame.kind, *kind);
                prop_assert_eq!(&frame.payload, payload);
            }
        }
    }
}
