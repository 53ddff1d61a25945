//! Login handling before a command runs.

use tokio::io::AsyncBufRead;

use super::frame::{FrameKind, FrameSink};
use super::reader::LineReader;
use super::LoopSignal;
use crate::cli::{Command, Options};
use crate::error::{MiError, Result};
use crate::tracker::Tracker;

/// Run the login steps `options` ask for.
///
/// Prompts go out through `output` and answers are read from `input`, the
/// same channel commands arrive on, unless the sink reads secrets itself.
/// Secrets are never logged. Tracker failures come back as
/// [`MiError::LoginCall`].
pub async fn handle_login<R>(
    options: &Options,
    tracker: &mut dyn Tracker,
    input: &mut LineReader<R>,
    output: &mut dyn FrameSink,
) -> Result<LoopSignal>
where
    R: AsyncBufRead + Unpin + Send,
{
    login_steps(options, tracker, input, output)
        .await
        .map_err(MiError::during_login)
}

async fn login_steps<R>(
    options: &Options,
    tracker: &mut dyn Tracker,
    input: &mut LineReader<R>,
    output: &mut dyn FrameSink,
) -> Result<LoopSignal>
where
    R: AsyncBufRead + Unpin + Send,
{
    let global = &options.global;
    let login_args = match &options.command {
        Command::Login(args) => Some(args),
        _ => None,
    };
    let is_login_command = login_args.is_some();
    let username = login_args
        .and_then(|a| a.pos_username.clone())
        .or_else(|| global.username.clone());
    let password = login_args
        .and_then(|a| a.pos_password.clone())
        .or_else(|| global.password.clone());
    let use_key = login_args.is_some_and(|a| a.api_key);
    let interactive =
        is_login_command || global.login || global.username.is_some() || global.password.is_some();

    if use_key {
        save_api_key(tracker, input, output).await?;
    } else if interactive {
        if tracker.api_key().is_some() {
            output
                .emit(
                    FrameKind::Ilogin,
                    &format!(
                        "You already have an API key configured for {}\n\
                         There is no need to cache a login token.",
                        tracker.url()
                    ),
                )
                .await?;
            return Ok(LoopSignal::Done);
        }
        output
            .emit(
                FrameKind::Ilogin,
                &format!("Logging into {}", host_of(tracker.url())),
            )
            .await?;
        interactive_login(
            tracker,
            username,
            password,
            global.restrict_login,
            input,
            output,
        )
        .await?;
    }

    if global.ensure_logged_in && !tracker.logged_in().await? {
        output
            .emit(
                FrameKind::Ilogin,
                &format!(
                    "--ensure-logged-in passed but you aren't logged in to {}",
                    tracker.url()
                ),
            )
            .await?;
        return Ok(LoopSignal::Reprompt);
    }

    if is_login_command {
        return Ok(LoopSignal::Done);
    }
    Ok(LoopSignal::Continue)
}

async fn save_api_key<R>(
    tracker: &mut dyn Tracker,
    input: &mut LineReader<R>,
    output: &mut dyn FrameSink,
) -> Result<()>
where
    R: AsyncBufRead + Unpin + Send,
{
    output.prompt("API Key: ").await?;
    let api_key = read_answer(input).await?;

    tracker.set_api_key(api_key);
    tracing::info!("Checking API key...");
    tracker.reconnect().await?;

    if !tracker.logged_in().await? {
        return Err(MiError::Login("Login with API_KEY failed".to_string()));
    }
    tracing::info!("API Key accepted");

    let written = tracker.save_api_key().await?;
    tracing::info!("API key written to filename={:?}", written);

    let mut message = String::from("Login successful.");
    if let Some(path) = written {
        message.push_str(&format!(" API key written to {}", path.display()));
    }
    output.emit(FrameKind::Ilogin, &message).await?;
    Ok(())
}

async fn interactive_login<R>(
    tracker: &mut dyn Tracker,
    username: Option<String>,
    password: Option<String>,
    restrict_login: bool,
    input: &mut LineReader<R>,
    output: &mut dyn FrameSink,
) -> Result<()>
where
    R: AsyncBufRead + Unpin + Send,
{
    let username = match username {
        Some(user) => user,
        None => {
            output.prompt("Bugzilla Username: ").await?;
            read_answer(input).await?
        }
    };
    let password = match password {
        Some(password) => password,
        None => match output.prompt_secret("Bugzilla Password: ").await? {
            Some(password) => password,
            None => read_answer(input).await?,
        },
    };

    tracing::info!("Logging in as {}", username);
    let outcome = tracker.login(&username, &password, restrict_login).await?;

    let mut message = String::from("Login successful.");
    if !outcome.token_returned {
        message.push_str(" However no token was returned.");
    } else {
        match &outcome.token_file {
            Some(path) => message.push_str(&format!(" Token cache saved to {}", path.display())),
            None => message.push_str(" Token not saved to disk."),
        }
        if tracker.version_number() >= 5.0 {
            message.push_str(
                "\nToken usage is deprecated. \
                 Consider using bugzilla API keys instead.",
            );
        }
    }
    output.emit(FrameKind::Ilogin, &message).await?;
    Ok(())
}

async fn read_answer<R>(input: &mut LineReader<R>) -> Result<String>
where
    R: AsyncBufRead + Unpin + Send,
{
    match input.read_command_line().await? {
        Some(line) => Ok(line.trim().to_string()),
        None => Err(MiError::Login(
            "input closed while waiting for an answer".to_string(),
        )),
    }
}

fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mi::frame::{decode_all, Frame, FrameWriter};
    use crate::mi::ClientConfiguration;
    use crate::tracker::mock::{CountingFactory, MockServer};
    use crate::tracker::ClientFactory;
    use bugzilla_rest::BugzillaError;
    use clap::Parser;

    async fn tracker(server: MockServer) -> (CountingFactory, Box<dyn Tracker>) {
        let factory = CountingFactory::new(server);
        let config = ClientConfiguration {
            url: "https://bugzilla.example.com/rest/".to_string(),
            cookie_cache: None,
            token_cache: None,
            verify_tls: true,
            use_stored_credentials: true,
            client_certificate: None,
        };
        let handle = match factory.connect(&config).await {
            Ok(handle) => handle,
            Err(e) => panic!("connect failed: {}", e),
        };
        (factory, handle)
    }

    async fn run(
        line: &str,
        answers: &str,
        handle: &mut dyn Tracker,
    ) -> (Result<LoopSignal>, Vec<Frame>) {
        let options = Options::try_parse_from(
            std::iter::once("bugzilla".to_string()).chain(shell_words::split(line).unwrap()),
        )
        .unwrap();
        let mut input = LineReader::new(answers.as_bytes());
        let mut output = FrameWriter::new(Vec::new());
        let signal = handle_login(&options, handle, &mut input, &mut output).await;
        let frames = decode_all(&output.into_inner()).unwrap();
        (signal, frames)
    }

    #[tokio::test]
    async fn test_plain_command_continues() {
        let (factory, mut handle) = tracker(MockServer::default()).await;
        let (signal, frames) = run("info --products", "", handle.as_mut()).await;
        assert_eq!(signal.unwrap(), LoopSignal::Continue);
        assert!(frames.is_empty());
        assert!(factory.server.lock().calls.is_empty());
    }

    #[tokio::test]
    async fn test_login_with_existing_api_key_is_a_no_op() {
        let server = MockServer {
            stored_api_key: Some("key".into()),
            ..Default::default()
        };
        let (factory, mut handle) = tracker(server).await;
        let (signal, frames) = run("login me@example.com pw", "", handle.as_mut()).await;

        assert_eq!(signal.unwrap(), LoopSignal::Done);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::Ilogin);
        assert!(frames[0]
            .payload
            .starts_with("You already have an API key configured for"));
        assert!(factory.server.lock().logins.is_empty());
    }

    #[tokio::test]
    async fn test_login_prompts_for_missing_password() {
        let (factory, mut handle) = tracker(MockServer::default()).await;
        let (signal, frames) = run("login me@example.com", "hunter2\n", handle.as_mut()).await;

        assert_eq!(signal.unwrap(), LoopSignal::Done);
        let payloads: Vec<&str> = frames.iter().map(|f| f.payload.as_str()).collect();
        assert_eq!(payloads[0], "Logging into bugzilla.example.com");
        assert_eq!(payloads[1], "Bugzilla Password: ");
        assert!(payloads[2].starts_with("Login successful. Token cache saved to"));
        assert!(frames.iter().all(|f| f.kind == FrameKind::Ilogin));
        assert_eq!(
            factory.server.lock().logins,
            vec![("me@example.com".to_string(), "hunter2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_login_flag_before_other_command_continues() {
        let (_factory, mut handle) = tracker(MockServer::default()).await;
        let (signal, frames) = run("--login info --products", "me\npw\n", handle.as_mut()).await;
        assert_eq!(signal.unwrap(), LoopSignal::Continue);
        assert_eq!(frames[1].payload, "Bugzilla Username: ");
        assert_eq!(frames[2].payload, "Bugzilla Password: ");
    }

    #[tokio::test]
    async fn test_api_key_flow_saves_valid_key() {
        let server = MockServer {
            valid_api_keys: vec!["good-key".into()],
            ..Default::default()
        };
        let (factory, mut handle) = tracker(server).await;
        let (signal, frames) = run("login --api-key", "good-key\n", handle.as_mut()).await;

        assert_eq!(signal.unwrap(), LoopSignal::Done);
        assert_eq!(frames[0].payload, "API Key: ");
        assert_eq!(
            frames[1].payload,
            "Login successful. API key written to /tmp/bugzillarc"
        );
        assert_eq!(
            factory.server.lock().saved_api_key.as_deref(),
            Some("good-key")
        );
    }

    #[tokio::test]
    async fn test_api_key_flow_rejects_bad_key() {
        let (factory, mut handle) = tracker(MockServer::default()).await;
        let (signal, _) = run("login --api-key", "bad-key\n", handle.as_mut()).await;
        assert!(matches!(signal, Err(MiError::Login(_))));
        assert!(factory.server.lock().saved_api_key.is_none());
    }

    #[tokio::test]
    async fn test_ensure_logged_in_reprompts() {
        let (_factory, mut handle) = tracker(MockServer::default()).await;
        let (signal, frames) =
            run("--ensure-logged-in info --products", "", handle.as_mut()).await;
        assert_eq!(signal.unwrap(), LoopSignal::Reprompt);
        assert_eq!(frames.len(), 1);
        assert!(frames[0]
            .payload
            .starts_with("--ensure-logged-in passed but you aren't logged in"));
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_tagged_as_login_failures() {
        let (factory, mut handle) = tracker(MockServer::default()).await;
        factory.fail_next_call(BugzillaError::Fault {
            code: 300,
            message: "The username or password you entered is not valid.".into(),
        });
        let (signal, _) = run("login me@example.com wrong", "", handle.as_mut()).await;
        assert!(matches!(
            signal,
            Err(MiError::LoginCall(BugzillaError::Fault { code: 300, .. }))
        ));
    }

    #[tokio::test]
    async fn test_eof_while_prompting_is_a_login_error() {
        let (_factory, mut handle) = tracker(MockServer::default()).await;
        let (signal, _) = run("login", "", handle.as_mut()).await;
        assert!(matches!(signal, Err(MiError::Login(_))));
    }
}
