//! High-level engine for prompt-answering sessions.
//!
//! The driver layer provides the main API: an [`Engine`] spawns a command
//! under a pseudo-terminal, relays its I/O and answers password and
//! host-key prompts with the configured secret.

mod builder;
mod config;
mod outcome;
mod responder;
mod session;

pub use builder::EngineBuilder;
pub use config::ExecOptions;
pub use outcome::{AUTH_FAILURE_CODE, ExitOutcome, INTERRUPTED_CODE, SIGNAL_FALLBACK_CODE, SessionResult};
pub use responder::{Inspection, Reply, Responder};

use std::ffi::OsStr;
use std::future::Future;
use std::sync::Arc;

use log::debug;
use secrecy::SecretString;
use tokio::io::{AsyncRead, AsyncWrite};

use self::session::Session;
use crate::channel::{OutputFilter, PatternSet, PtyProcess};
use crate::error::Result;

/// Something that can run a command to completion with a secret.
///
/// [`Engine`] is the real implementation; the remote helpers are generic
/// over this trait so they can be exercised without a network.
pub trait Runner: Send + Sync {
    /// Run `argv` with the given options and return the session result.
    fn run(
        &self,
        argv: &[String],
        secret: &SecretString,
        options: &ExecOptions,
    ) -> impl Future<Output = Result<SessionResult>> + Send;

    /// Default options for sessions started by this runner.
    fn options(&self) -> &ExecOptions;
}

/// Session engine: spawns commands under a pty and answers their prompts.
///
/// An engine is cheap to clone and may run any number of sessions, one after
/// another or concurrently; sessions share nothing mutable.
///
/// # Example
///
/// ```rust,no_run
/// use ptypass::driver::Engine;
/// use secrecy::SecretString;
///
/// # async fn example() -> Result<(), ptypass::Error> {
/// let engine = Engine::default();
/// let secret = SecretString::from("secret".to_string());
/// let result = engine.execute(&["ssh", "root@router", "reboot"], &secret).await?;
/// std::process::exit(result.code());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Engine {
    pub(crate) options: ExecOptions,
    pub(crate) patterns: Arc<PatternSet>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Run `argv` to completion using the process's own stdin and stdout.
    ///
    /// Stdin is forwarded only when `forward_input` is set.
    pub async fn execute<S: AsRef<OsStr> + Sync>(
        &self,
        argv: &[S],
        secret: &SecretString,
    ) -> Result<SessionResult> {
        self.execute_with_options(argv, secret, &self.options).await
    }

    /// Run `argv` with explicit operator input and output streams.
    ///
    /// `input` is forwarded to the child until it reaches end of file; pass
    /// `None` to forward nothing.
    pub async fn execute_with_io<S, R, W>(
        &self,
        argv: &[S],
        secret: &SecretString,
        input: Option<R>,
        output: W,
    ) -> Result<SessionResult>
    where
        S: AsRef<OsStr>,
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.run_session(argv, secret, &self.options, input, output)
            .await
    }

    async fn execute_with_options<S: AsRef<OsStr> + Sync>(
        &self,
        argv: &[S],
        secret: &SecretString,
        options: &ExecOptions,
    ) -> Result<SessionResult> {
        let input = options.forward_input.then(tokio::io::stdin);
        self.run_session(argv, secret, options, input, tokio::io::stdout())
            .await
    }

    async fn run_session<S, R, W>(
        &self,
        argv: &[S],
        secret: &SecretString,
        options: &ExecOptions,
        input: Option<R>,
        output: W,
    ) -> Result<SessionResult>
    where
        S: AsRef<OsStr>,
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        options.validate()?;

        let process = PtyProcess::spawn(argv)?;
        debug!(
            "Session started for '{}' (max retries {})",
            process.command(),
            options.max_retries
        );

        let responder = Responder::new(Arc::clone(&self.patterns), options.max_retries);
        let filter = OutputFilter::new(self.patterns.filter_signatures());

        Session::new(process, secret, options, responder, filter, input, output)
            .run()
            .await
    }
}

impl Runner for Engine {
    fn run(
        &self,
        argv: &[String],
        secret: &SecretString,
        options: &ExecOptions,
    ) -> impl Future<Output = Result<SessionResult>> + Send {
        self.execute_with_options(argv, secret, options)
    }

    fn options(&self) -> &ExecOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::{Error, SpawnError};

    const SECRET: &str = "hunter2";

    fn sh(script: &str) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn secret() -> SecretString {
        SecretString::from(SECRET.to_string())
    }

    fn test_options() -> ExecOptions {
        ExecOptions::captured().with_handle_interrupt(false)
    }

    async fn capture(script: &str, options: ExecOptions) -> SessionResult {
        Engine::builder()
            .options(options)
            .build()
            .unwrap()
            .execute_with_io(&sh(script), &secret(), None::<tokio::io::Empty>, tokio::io::sink())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_password_round_trip() {
        let result = capture(
            r#"stty -echo; printf 'Password: '; read pw; echo; [ "$pw" = hunter2 ] && echo OK"#,
            test_options(),
        )
        .await;

        assert_eq!(result.outcome, ExitOutcome::Exited(0));
        assert_eq!(result.secrets_sent, 1);
        assert!(result.contains("OK"));
        assert!(!result.contains("Password:"));
        assert!(!result.contains(SECRET));
    }

    #[tokio::test]
    async fn test_verbose_session() {
        let _ = env_logger::builder()
            .is_test(true)
            .filter_level(log::LevelFilter::Debug)
            .try_init();

        let result = capture(
            r#"stty -echo; printf 'Password: '; read pw; echo; [ "$pw" = hunter2 ] && echo OK"#,
            test_options().with_verbose(true),
        )
        .await;

        assert_eq!(result.outcome, ExitOutcome::Exited(0));
        assert_eq!(result.secrets_sent, 1);
        assert!(result.contains("OK"));
        assert!(!result.contains(SECRET));
    }

    #[tokio::test]
    async fn test_authentication_failure() {
        let result = capture(
            r#"stty -echo; printf 'Password: '; read pw; echo; echo 'Login incorrect'; sleep 2; exit 0"#,
            test_options(),
        )
        .await;

        assert_eq!(result.outcome, ExitOutcome::AuthenticationFailed);
        assert_eq!(result.code(), AUTH_FAILURE_CODE);
        assert_eq!(result.secrets_sent, 1);
        assert!(result.contains("Login incorrect"));
    }

    #[tokio::test]
    async fn test_no_reply_after_failure() {
        let options = test_options().with_failure_grace(Duration::from_millis(500));
        let result = capture(
            r#"stty -echo; echo 'Permission denied'; sleep 0.1; printf 'Password: '; read pw; echo "got:$pw""#,
            options,
        )
        .await;

        assert_eq!(result.outcome, ExitOutcome::AuthenticationFailed);
        assert_eq!(result.secrets_sent, 0);
        assert!(!result.contains("got:"));
    }

    #[tokio::test]
    async fn test_host_key_then_password() {
        let script = r#"stty -echo
printf 'Are you sure you want to continue connecting (yes/no)? '
read answer; echo
[ "$answer" = yes ] || exit 9
printf "root@host's password: "
read pw; echo
[ "$pw" = hunter2 ] || exit 8
echo welcome
printf 'Are you sure you want to continue connecting (yes/no)? '
sleep 0.2; echo"#;
        let result = capture(script, test_options()).await;

        assert_eq!(result.outcome, ExitOutcome::Exited(0));
        assert!(result.host_key_answered);
        assert_eq!(result.secrets_sent, 1);
        assert!(result.contains("welcome"));
        assert!(!result.contains("yes/no"));
        assert!(!result.contains("password"));
    }

    #[tokio::test]
    async fn test_retry_limit_still_filters() {
        let script = r#"stty -echo
printf 'Password: '; read pw; echo
printf 'Password: '; sleep 0.5; echo
echo done"#;
        let result = capture(script, test_options().with_max_retries(0)).await;

        assert_eq!(result.outcome, ExitOutcome::Exited(0));
        assert_eq!(result.secrets_sent, 1);
        assert!(result.contains("done"));
        assert!(!result.contains("Password"));
    }

    #[tokio::test]
    async fn test_split_prompt_is_filtered() {
        let script = r#"stty -echo; printf 'alpha\nPass'; sleep 0.3; printf 'word: '; read pw; echo; echo beta"#;
        let result = capture(script, test_options()).await;

        assert_eq!(result.outcome, ExitOutcome::Exited(0));
        assert_eq!(result.secrets_sent, 1);
        assert_eq!(result.output(), "alpha\r\nbeta\r\n");
    }

    #[tokio::test]
    async fn test_exit_code_passthrough() {
        let result = capture("echo bye; exit 42", test_options()).await;
        assert_eq!(result.outcome, ExitOutcome::Exited(42));
        assert_eq!(result.code(), 42);
        assert!(result.contains("bye"));
    }

    #[tokio::test]
    async fn test_streaming_output() {
        let engine = Engine::builder()
            .forward_input(false)
            .handle_interrupt(false)
            .build()
            .unwrap();

        let mut relayed = Vec::new();
        let result = engine
            .execute_with_io(
                &sh("printf 'Password: '; read pw; echo; echo streamed"),
                &secret(),
                None::<tokio::io::Empty>,
                &mut relayed,
            )
            .await
            .unwrap();

        assert!(result.is_success());
        assert!(result.output.is_none());
        let relayed = String::from_utf8_lossy(&relayed);
        assert!(relayed.contains("streamed"));
        assert!(!relayed.contains("Password"));
    }

    #[tokio::test]
    async fn test_silent_relays_nothing() {
        let engine = Engine::builder()
            .silent(true)
            .forward_input(false)
            .handle_interrupt(false)
            .build()
            .unwrap();

        let mut relayed = Vec::new();
        let result = engine
            .execute_with_io(
                &sh("echo quiet"),
                &secret(),
                None::<tokio::io::Empty>,
                &mut relayed,
            )
            .await
            .unwrap();

        assert!(result.is_success());
        assert!(relayed.is_empty());
    }

    #[tokio::test]
    async fn test_operator_input_forwarded() {
        let engine = Engine::builder()
            .options(test_options())
            .build()
            .unwrap();

        let result = engine
            .execute_with_io(
                &sh(r#"stty -echo; read line; echo "got:$line""#),
                &secret(),
                Some(&b"ping\n"[..]),
                tokio::io::sink(),
            )
            .await
            .unwrap();

        assert!(result.is_success());
        assert!(result.contains("got:ping"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = Engine::default()
            .execute_with_io(
                &["/nonexistent/ptypass-missing"],
                &secret(),
                None::<tokio::io::Empty>,
                tokio::io::sink(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Spawn(ref e) if e.is_exec_failure()));
    }

    #[tokio::test]
    async fn test_runner_uses_given_options() {
        let engine = Engine::default();
        let result = engine
            .run(&sh("echo via-runner"), &secret(), &test_options())
            .await
            .unwrap();

        assert!(result.contains("via-runner"));
        assert!(matches!(
            engine.run(&[], &secret(), &test_options()).await,
            Err(Error::Spawn(SpawnError::EmptyCommand))
        ));
    }
}
