//! `attach`: download attachments or upload a file to bugs.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bugzilla_rest::NewAttachment;
use tokio::io::AsyncWriteExt;

use super::CommandEnv;
use crate::cli::AttachArgs;
use crate::error::{MiError, Result};
use crate::mi::{FrameKind, FrameSink};
use crate::tracker::Tracker;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const PATCH_CONTENT_TYPE: &str = "text/x-patch";

/// Name used when the upload comes from piped input.
const STDIN_FILE_NAME: &str = "stdin";

pub async fn run(
    tracker: &dyn Tracker,
    args: &AttachArgs,
    env: &CommandEnv,
    output: &mut dyn FrameSink,
) -> Result<()> {
    let report = if !args.get.is_empty() || !args.getall.is_empty() {
        if !args.ids.is_empty() {
            return Err(MiError::Usage(format!(
                "Bug IDs '{:?}' not used for getting attachments",
                args.ids
            )));
        }
        download(tracker, args, &env.download_dir).await?
    } else {
        upload(tracker, args, env.piped_input.as_deref()).await?
    };
    output.emit(FrameKind::Attach, &report).await?;
    Ok(())
}

async fn download(tracker: &dyn Tracker, args: &AttachArgs, dir: &Path) -> Result<String> {
    let mut wanted: BTreeSet<u64> = BTreeSet::new();
    for id in &args.get {
        let id = id
            .trim()
            .parse::<u64>()
            .map_err(|_| MiError::Usage(format!("Invalid attachment id '{}'", id)))?;
        wanted.insert(id);
    }
    if !args.getall.is_empty() {
        for attachment in tracker.bug_attachments(&args.getall).await? {
            wanted.insert(attachment.id);
        }
    }
    if wanted.is_empty() {
        return Ok(String::new());
    }

    let ids: Vec<String> = wanted.iter().map(|id| id.to_string()).collect();
    let mut attachments = tracker.attachments(&ids).await?;
    attachments.sort_by_key(|a| a.id);

    let mut report = String::new();
    for attachment in attachments {
        if args.ignore_obsolete && attachment.is_obsolete {
            tracing::debug!("Skipping obsolete attachment {}", attachment.id);
            continue;
        }
        let data = attachment.decode_data()?;
        let name = safe_file_name(&attachment.file_name, attachment.id);
        let written = write_without_clobber(dir, &name, &data).await?;
        tracing::info!("Wrote attachment {} to {:?}", attachment.id, written);
        report.push_str(&format!("Wrote {}\n", written.display()));
    }
    Ok(report)
}

/// The last path component of a server-supplied name.
fn safe_file_name(name: &str, id: u64) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("attachment-{}", id))
}

/// Write `data` to `dir/name`, or `name.1`, `name.2`, ... when taken.
pub async fn write_without_clobber(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf> {
    let mut suffix = 0usize;
    loop {
        let candidate = if suffix == 0 {
            dir.join(name)
        } else {
            dir.join(format!("{}.{}", name, suffix))
        };
        let opened = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await;
        match opened {
            Ok(mut file) => {
                let to_file_error = |source| MiError::File {
                    path: candidate.display().to_string(),
                    source,
                };
                file.write_all(data).await.map_err(to_file_error)?;
                file.flush().await.map_err(to_file_error)?;
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
            Err(source) => {
                return Err(MiError::File {
                    path: candidate.display().to_string(),
                    source,
                })
            }
        }
    }
}

async fn upload(tracker: &dyn Tracker, args: &AttachArgs, piped: Option<&[u8]>) -> Result<String> {
    if args.ids.is_empty() {
        return Err(MiError::Usage(
            "Bug ID must be specified for setting attachments".to_string(),
        ));
    }

    let (data, file_name) = match (&args.file, piped) {
        (Some(path), _) => {
            let data = tokio::fs::read(path).await.map_err(|e| {
                MiError::Usage(format!("Cannot read --file {}: {}", path.display(), e))
            })?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            (data, name)
        }
        (None, Some(data)) => {
            if args.desc.is_none() {
                return Err(MiError::Usage(
                    "--description must be specified if passing file on stdin".to_string(),
                ));
            }
            (data.to_vec(), STDIN_FILE_NAME.to_string())
        }
        (None, None) => return Err(MiError::Usage("--file must be specified".to_string())),
    };

    let is_patch = args.content_type.as_deref() == Some(PATCH_CONTENT_TYPE);
    let upload = NewAttachment {
        summary: args.desc.clone().unwrap_or_else(|| file_name.clone()),
        file_name,
        content_type: args
            .content_type
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        comment: args.comment.clone(),
        is_patch,
        is_private: args.private,
        data,
    };

    let mut report = String::new();
    for bug_id in &args.ids {
        for attachment_id in tracker.add_attachment(bug_id, &upload).await? {
            tracing::info!("Created attachment {} on bug {}", attachment_id, bug_id);
            report.push_str(&format!(
                "Created attachment {} on bug {}\n",
                attachment_id, bug_id
            ));
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{frames, tracker_with, writer};
    use crate::tracker::mock::MockServer;
    use bugzilla_rest::Attachment;

    fn attachment(id: u64, bug_id: u64, name: &str, obsolete: bool, data: &str) -> Attachment {
        Attachment {
            id,
            bug_id,
            file_name: name.to_string(),
            summary: name.to_string(),
            content_type: "text/plain".to_string(),
            is_obsolete: obsolete,
            data: Some(data.to_string()),
        }
    }

    fn server() -> MockServer {
        MockServer {
            attachments: vec![
                // "first", "second", "third"
                attachment(10, 1, "log.txt", false, "Zmlyc3Q="),
                attachment(11, 1, "log.txt", true, "c2Vjb25k"),
                attachment(12, 2, "../../etc/passwd", false, "dGhpcmQ="),
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_write_without_clobber() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"existing").unwrap();

        let first = write_without_clobber(dir.path(), "a.txt", b"one").await.unwrap();
        let second = write_without_clobber(dir.path(), "a.txt", b"two").await.unwrap();
        assert_eq!(first, dir.path().join("a.txt.1"));
        assert_eq!(second, dir.path().join("a.txt.2"));
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"existing");
        assert_eq!(std::fs::read(second).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_getall_skips_obsolete_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let (_factory, tracker) = tracker_with(server()).await;
        let args = AttachArgs {
            get: vec!["10".into()],
            getall: vec!["1".into()],
            ignore_obsolete: true,
            ..Default::default()
        };
        let env = CommandEnv {
            download_dir: dir.path().to_path_buf(),
            piped_input: None,
        };
        let mut out = writer();
        run(tracker.as_ref(), &args, &env, &mut out).await.unwrap();

        let frames = frames(out);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::Attach);
        assert_eq!(
            frames[0].payload,
            format!("Wrote {}\n", dir.path().join("log.txt").display())
        );
        assert_eq!(std::fs::read(dir.path().join("log.txt")).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_ignore_obsolete_applies_to_named_attachments() {
        let dir = tempfile::tempdir().unwrap();
        let (_factory, tracker) = tracker_with(server()).await;
        let args = AttachArgs {
            get: vec!["10".into(), "11".into()],
            ignore_obsolete: true,
            ..Default::default()
        };
        let env = CommandEnv {
            download_dir: dir.path().to_path_buf(),
            piped_input: None,
        };
        let mut out = writer();
        run(tracker.as_ref(), &args, &env, &mut out).await.unwrap();

        let frames = frames(out);
        assert_eq!(
            frames[0].payload,
            format!("Wrote {}\n", dir.path().join("log.txt").display())
        );
        assert!(!dir.path().join("log.txt.1").exists());
    }

    #[tokio::test]
    async fn test_bug_ids_are_rejected_when_downloading() {
        let (factory, tracker) = tracker_with(server()).await;
        let args = AttachArgs {
            ids: vec!["123".into()],
            get: vec!["10".into()],
            ..Default::default()
        };
        let mut out = writer();
        let result = run(tracker.as_ref(), &args, &CommandEnv::default(), &mut out).await;
        match result {
            Err(MiError::Usage(msg)) => {
                assert_eq!(msg, "Bug IDs '[\"123\"]' not used for getting attachments")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(frames(out).is_empty());
        assert!(factory.server.lock().calls.is_empty());
    }

    #[tokio::test]
    async fn test_download_strips_directories() {
        let dir = tempfile::tempdir().unwrap();
        let (_factory, tracker) = tracker_with(server()).await;
        let args = AttachArgs {
            get: vec!["12".into()],
            ..Default::default()
        };
        let env = CommandEnv {
            download_dir: dir.path().to_path_buf(),
            piped_input: None,
        };
        let mut out = writer();
        run(tracker.as_ref(), &args, &env, &mut out).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("passwd")).unwrap(), b"third");
    }

    #[tokio::test]
    async fn test_upload_to_each_bug() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fix.patch");
        std::fs::write(&path, b"--- a\n+++ b\n").unwrap();
        let (factory, tracker) = tracker_with(MockServer::default()).await;
        let args = AttachArgs {
            ids: vec!["1".into(), "2".into()],
            file: Some(path),
            content_type: Some(PATCH_CONTENT_TYPE.into()),
            ..Default::default()
        };
        let mut out = writer();
        run(tracker.as_ref(), &args, &CommandEnv::default(), &mut out)
            .await
            .unwrap();

        let frames = frames(out);
        assert_eq!(
            frames[0].payload,
            "Created attachment 501 on bug 1\nCreated attachment 502 on bug 2\n"
        );
        let server = factory.server.lock();
        let (bug, upload) = &server.uploads[0];
        assert_eq!(bug, "1");
        assert_eq!(upload.file_name, "fix.patch");
        assert_eq!(upload.summary, "fix.patch");
        assert!(upload.is_patch);
        assert_eq!(upload.data, b"--- a\n+++ b\n");
    }

    #[tokio::test]
    async fn test_upload_argument_errors() {
        let (factory, tracker) = tracker_with(MockServer::default()).await;
        let mut out = writer();

        let no_ids = AttachArgs::default();
        let result = run(tracker.as_ref(), &no_ids, &CommandEnv::default(), &mut out).await;
        assert!(matches!(result, Err(MiError::Usage(_))));

        let no_file = AttachArgs {
            ids: vec!["1".into()],
            ..Default::default()
        };
        let result = run(tracker.as_ref(), &no_file, &CommandEnv::default(), &mut out).await;
        match result {
            Err(MiError::Usage(msg)) => assert_eq!(msg, "--file must be specified"),
            other => panic!("unexpected {:?}", other),
        }

        let piped = CommandEnv {
            piped_input: Some(b"data".to_vec()),
            ..Default::default()
        };
        let result = run(tracker.as_ref(), &no_file, &piped, &mut out).await;
        assert!(matches!(result, Err(MiError::Usage(_))));
        assert!(factory.server.lock().uploads.is_empty());
    }

    #[tokio::test]
    async fn test_piped_upload() {
        let (factory, tracker) = tracker_with(MockServer::default()).await;
        let args = AttachArgs {
            ids: vec!["7".into()],
            desc: Some("build log".into()),
            ..Default::default()
        };
        let env = CommandEnv {
            piped_input: Some(b"log".to_vec()),
            ..Default::default()
        };
        let mut out = writer();
        run(tracker.as_ref(), &args, &env, &mut out).await.unwrap();
        let server = factory.server.lock();
        assert_eq!(server.uploads[0].1.summary, "build log");
        assert_eq!(server.uploads[0].1.content_type, DEFAULT_CONTENT_TYPE);
    }
}
