//! Commands and file transfers against one remote host over `ssh`/`scp`.

use std::path::Path;

use log::{debug, warn};
use secrecy::SecretString;

use super::marker::{parse_exit_marker, strip_exit_marker, with_exit_marker};
use crate::driver::{Engine, ExecOptions, Runner, SessionResult};
use crate::error::Result;

/// Login used when none is given.
pub const DEFAULT_USER: &str = "root";

/// Words in `scp` output that mean the copy did not work.
const TRANSFER_ERRORS: &[&str] = &["error", "failed", "permission denied"];

/// Output and exit status of a remote command run with an exit marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatus {
    /// Exit status reported by the marker, if one was found.
    pub code: Option<i32>,

    /// Captured output without the marker line.
    pub output: String,
}

impl RemoteStatus {
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A host reached through `ssh` with password authentication.
///
/// Every operation runs one session through the configured [`Runner`].
///
/// # Example
///
/// ```rust,no_run
/// use ptypass::remote::RemoteHost;
/// use secrecy::SecretString;
///
/// # async fn example() -> Result<(), ptypass::Error> {
/// let router = RemoteHost::new("192.168.178.1", SecretString::from("secret".to_string()));
/// let status = router.run_with_status("mkdir -p /var/media/update").await?;
/// assert!(status.is_success());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RemoteHost<R: Runner = Engine> {
    host: String,
    user: String,
    secret: SecretString,
    runner: R,
}

impl RemoteHost<Engine> {
    /// A host reached as [`DEFAULT_USER`] through a default engine.
    pub fn new(host: impl Into<String>, secret: SecretString) -> Self {
        Self::with_runner(host, secret, Engine::default())
    }
}

impl<R: Runner> RemoteHost<R> {
    /// A host whose sessions go through `runner`.
    pub fn with_runner(host: impl Into<String>, secret: SecretString, runner: R) -> Self {
        Self {
            host: host.into(),
            user: DEFAULT_USER.to_string(),
            secret,
            runner,
        }
    }

    /// Set the login name (default: `root`).
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn username(&self) -> &str {
        &self.user
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// `user@host`.
    pub fn target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Command line running `command` on the host.
    pub fn ssh_argv(&self, command: &str) -> Vec<String> {
        vec![
            "ssh".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            self.target(),
            command.to_string(),
        ]
    }

    /// Command line copying `local` to `remote` on the host.
    pub fn scp_argv(&self, local: &Path, remote: &str) -> Vec<String> {
        vec![
            "scp".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
            "-q".to_string(),
            local.display().to_string(),
            format!("{}:{}", self.target(), remote),
        ]
    }

    /// Run `command` and capture its output.
    pub async fn run(&self, command: &str) -> Result<SessionResult> {
        let options = self
            .runner
            .options()
            .clone()
            .with_capture_output(true)
            .with_forward_input(false);
        self.run_ssh(command, &options).await
    }

    /// Run `command` with its output streamed to the operator.
    pub async fn run_streaming(&self, command: &str) -> Result<SessionResult> {
        let options = self.runner.options().clone().with_capture_output(false);
        self.run_ssh(command, &options).await
    }

    /// Run `command` and report the remote command's own exit status.
    pub async fn run_with_status(&self, command: &str) -> Result<RemoteStatus> {
        let result = self.run(&with_exit_marker(command)).await?;
        let output = result.output();
        let code = parse_exit_marker(output);
        if code.is_none() {
            warn!(
                "No exit status from '{}' on {} ({})",
                command, self.host, result.outcome
            );
        }
        Ok(RemoteStatus {
            code,
            output: strip_exit_marker(output),
        })
    }

    /// Whether a regular file exists at `path`.
    pub async fn file_exists(&self, path: &str) -> Result<bool> {
        let command = format!(
            "test -f {} && echo exists || echo notfound",
            shell_quote(path)
        );
        let result = self.run(&command).await?;
        Ok(result.output().trim() == "exists")
    }

    /// Remove the file at `path`; `true` if `rm` succeeded.
    pub async fn remove_file(&self, path: &str) -> Result<bool> {
        let status = self
            .run_with_status(&format!("rm -f {}", shell_quote(path)))
            .await?;
        Ok(status.is_success())
    }

    /// Size in bytes of the file at `path`, if it can be determined.
    pub async fn file_size(&self, path: &str) -> Result<Option<u64>> {
        let command = format!(
            "ls -l {} 2>/dev/null | awk '{{print $5}}'",
            shell_quote(path)
        );
        let result = self.run(&command).await?;
        Ok(parse_size(result.output()))
    }

    /// Copy `local` to `remote`; `Ok(false)` if the copy did not succeed.
    pub async fn send_file(&self, local: &Path, remote: &str) -> Result<bool> {
        let argv = self.scp_argv(local, remote);
        debug!("SCP: {}", argv.join(" "));

        let options = self
            .runner
            .options()
            .clone()
            .with_capture_output(true)
            .with_silent(true)
            .with_forward_input(false)
            .with_drop_progress_lines(true);
        let result = self.runner.run(&argv, &self.secret, &options).await?;

        if !result.is_success() {
            warn!("Copy of {} to {} {}", local.display(), remote, result.outcome);
            return Ok(false);
        }

        let output = result.output().to_lowercase();
        if let Some(word) = TRANSFER_ERRORS.iter().find(|word| output.contains(*word)) {
            warn!(
                "Copy of {} to {} reported '{}': {}",
                local.display(),
                remote,
                word,
                result.output().trim()
            );
            return Ok(false);
        }

        Ok(true)
    }

    /// Whether the host answers a single ping within a second.
    pub async fn ping(&self) -> Result<bool> {
        let argv: Vec<String> = ["ping", "-c", "1", "-W", "1", self.host.as_str()]
            .iter()
            .map(|arg| arg.to_string())
            .collect();
        let options = self
            .runner
            .options()
            .clone()
            .with_capture_output(true)
            .with_silent(true)
            .with_forward_input(false);
        let result = self.runner.run(&argv, &self.secret, &options).await?;
        Ok(result.is_success())
    }

    async fn run_ssh(&self, command: &str, options: &ExecOptions) -> Result<SessionResult> {
        let argv = self.ssh_argv(command);
        debug!("SSH: {}", argv.join(" "));
        self.runner.run(&argv, &self.secret, options).await
    }
}

/// Quote `value` as a single shell word.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn parse_size(output: &str) -> Option<u64> {
    let size = output.trim();
    if size.is_empty() || !size.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    size.parse().ok()
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use secrecy::ExposeSecret;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::driver::ExitOutcome;
    use crate::error::{Error, SessionError};

    /// A recorded call to [`FakeRunner::run`].
    #[derive(Debug, Clone)]
    pub(crate) struct Call {
        pub argv: Vec<String>,
        pub secret: String,
        pub options: ExecOptions,
    }

    /// Runner answering with scripted results, in order.
    #[derive(Default)]
    pub(crate) struct FakeRunner {
        options: ExecOptions,
        replies: Mutex<VecDeque<Result<SessionResult>>>,
        pub calls: Mutex<Vec<Call>>,
    }

    impl FakeRunner {
        pub fn reply(self, outcome: ExitOutcome, output: &str) -> Self {
            self.replies.lock().unwrap().push_back(Ok(SessionResult {
                outcome,
                output: Some(output.to_string()),
                secrets_sent: 1,
                host_key_answered: false,
                elapsed: Duration::from_millis(1),
            }));
            self
        }

        pub fn fail(self, error: Error) -> Self {
            self.replies.lock().unwrap().push_back(Err(error));
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Runner for FakeRunner {
        async fn run(
            &self,
            argv: &[String],
            secret: &SecretString,
            options: &ExecOptions,
        ) -> Result<SessionResult> {
            self.calls.lock().unwrap().push(Call {
                argv: argv.to_vec(),
                secret: secret.expose_secret().to_string(),
                options: options.clone(),
            });
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected session")
        }

        fn options(&self) -> &ExecOptions {
            &self.options
        }
    }

    pub(crate) fn host(runner: FakeRunner) -> RemoteHost<FakeRunner> {
        RemoteHost::with_runner("10.0.0.1", SecretString::from("s3cret".to_string()), runner)
    }

    #[test]
    fn test_ssh_argv() {
        let remote = host(FakeRunner::default()).user("admin");
        assert_eq!(
            remote.ssh_argv("uname -a"),
            vec!["ssh", "-o", "StrictHostKeyChecking=no", "admin@10.0.0.1", "uname -a"]
        );
    }

    #[test]
    fn test_scp_argv() {
        let remote = host(FakeRunner::default());
        assert_eq!(
            remote.scp_argv(Path::new("/tmp/fw.image"), "/var/tmp/fw.image"),
            vec![
                "scp",
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "LogLevel=ERROR",
                "-q",
                "/tmp/fw.image",
                "root@10.0.0.1:/var/tmp/fw.image",
            ]
        );
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/var/tmp/a b"), "'/var/tmp/a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1048576\r\n"), Some(1048576));
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("ls: no such file"), None);
        assert_eq!(parse_size("-1"), None);
    }

    #[tokio::test]
    async fn test_run_captures_without_input() {
        let remote = host(FakeRunner::default().reply(ExitOutcome::Exited(0), "/root\r\n"));
        let result = assert_ok!(remote.run("pwd").await);
        assert_eq!(result.output(), "/root\r\n");

        let calls = remote.runner().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].argv.last().map(String::as_str), Some("pwd"));
        assert_eq!(calls[0].secret, "s3cret");
        assert!(calls[0].options.capture_output);
        assert!(!calls[0].options.forward_input);
    }

    #[tokio::test]
    async fn test_run_streaming() {
        let remote = host(FakeRunner::default().reply(ExitOutcome::Exited(0), ""));
        assert_ok!(remote.run_streaming("dmesg").await);
        assert!(!remote.runner().calls()[0].options.capture_output);
    }

    #[tokio::test]
    async fn test_run_with_status() {
        let remote = host(
            FakeRunner::default().reply(ExitOutcome::Exited(0), "created\r\nEXIT_CODE=1\r\n"),
        );
        let status = assert_ok!(remote.run_with_status("mkdir -p /x").await);
        assert_eq!(status.code, Some(1));
        assert_eq!(status.output, "created");
        assert!(!status.is_success());
        assert_eq!(
            remote.runner().calls()[0].argv.last().map(String::as_str),
            Some("mkdir -p /x; echo EXIT_CODE=$?")
        );
    }

    #[tokio::test]
    async fn test_run_with_status_without_marker() {
        let remote = host(FakeRunner::default().reply(ExitOutcome::AuthenticationFailed, ""));
        let status = assert_ok!(remote.run_with_status("true").await);
        assert_eq!(status.code, None);
    }

    #[tokio::test]
    async fn test_file_exists() {
        let remote = host(
            FakeRunner::default()
                .reply(ExitOutcome::Exited(0), "exists\r\n")
                .reply(ExitOutcome::Exited(0), "notfound\r\n"),
        );
        assert!(assert_ok!(remote.file_exists("/var/tmp/fw.image").await));
        assert!(!assert_ok!(remote.file_exists("/var/tmp/it's").await));

        let calls = remote.runner().calls();
        assert_eq!(
            calls[1].argv.last().map(String::as_str),
            Some(r"test -f '/var/tmp/it'\''s' && echo exists || echo notfound")
        );
    }

    #[tokio::test]
    async fn test_remove_file() {
        let remote = host(FakeRunner::default().reply(ExitOutcome::Exited(0), "EXIT_CODE=0\r\n"));
        assert!(assert_ok!(remote.remove_file("/var/tmp/old").await));
        assert_eq!(
            remote.runner().calls()[0].argv.last().map(String::as_str),
            Some("rm -f '/var/tmp/old'; echo EXIT_CODE=$?")
        );
    }

    #[tokio::test]
    async fn test_file_size() {
        let remote = host(
            FakeRunner::default()
                .reply(ExitOutcome::Exited(0), "52428800\r\n")
                .reply(ExitOutcome::Exited(0), "\r\n"),
        );
        assert_eq!(assert_ok!(remote.file_size("/var/tmp/fw").await), Some(52428800));
        assert_eq!(assert_ok!(remote.file_size("/var/tmp/none").await), None);
    }

    #[tokio::test]
    async fn test_send_file() {
        let remote = host(
            FakeRunner::default()
                .reply(ExitOutcome::Exited(0), "")
                .reply(ExitOutcome::Exited(0), "scp: /var/tmp: Permission denied\r\n")
                .reply(ExitOutcome::Exited(1), "")
                .reply(ExitOutcome::AuthenticationFailed, ""),
        );
        let local = Path::new("/tmp/fw.image");
        assert!(assert_ok!(remote.send_file(local, "/var/tmp/fw.image").await));
        assert!(!assert_ok!(remote.send_file(local, "/var/tmp/fw.image").await));
        assert!(!assert_ok!(remote.send_file(local, "/var/tmp/fw.image").await));
        assert!(!assert_ok!(remote.send_file(local, "/var/tmp/fw.image").await));

        let options = &remote.runner().calls()[0].options;
        assert!(options.silent);
        assert!(options.capture_output);
        assert!(options.drop_progress_lines);
        assert_eq!(remote.runner().calls()[0].argv[0], "scp");
    }

    #[tokio::test]
    async fn test_ping() {
        let remote = host(
            FakeRunner::default()
                .reply(ExitOutcome::Exited(0), "")
                .reply(ExitOutcome::Exited(1), ""),
        );
        assert!(assert_ok!(remote.ping().await));
        assert!(!assert_ok!(remote.ping().await));
        assert_eq!(
            remote.runner().calls()[0].argv,
            vec!["ping", "-c", "1", "-W", "1", "10.0.0.1"]
        );
    }

    #[tokio::test]
    async fn test_errors_propagate() {
        let remote = host(FakeRunner::default().fail(Error::Session(SessionError::Read(
            std::io::Error::other("boom"),
        ))));
        assert_err!(remote.run("pwd").await);
    }
}
