//! Waiting for a rebooting host to come back.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::host::RemoteHost;
use crate::driver::Runner;
use crate::error::Result;

/// Command run over `ssh` to check that logins work again.
pub const DEFAULT_PROBE_COMMAND: &str = "pwd";

/// How long and how often to wait in each phase of [`wait_for_boot`].
#[derive(Debug, Clone)]
pub struct BootWait {
    /// Pings before giving up on the network coming back.
    pub ping_attempts: u32,

    /// Pause between pings.
    pub ping_interval: Duration,

    /// Pause after the first ping reply, for the ssh daemon to start.
    pub settle_delay: Duration,

    /// Probe logins before giving up.
    pub probe_attempts: u32,

    /// Pause between probes.
    pub probe_interval: Duration,

    /// Command run by each probe.
    pub probe_command: String,
}

impl Default for BootWait {
    fn default() -> Self {
        Self {
            ping_attempts: 120,
            ping_interval: Duration::from_secs(2),
            settle_delay: Duration::from_secs(5),
            probe_attempts: 30,
            probe_interval: Duration::from_secs(2),
            probe_command: DEFAULT_PROBE_COMMAND.to_string(),
        }
    }
}

impl BootWait {
    pub fn with_ping_attempts(mut self, attempts: u32) -> Self {
        self.ping_attempts = attempts;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_probe_attempts(mut self, attempts: u32) -> Self {
        self.probe_attempts = attempts;
        self
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    pub fn with_probe_command(mut self, command: impl Into<String>) -> Self {
        self.probe_command = command.into();
        self
    }
}

/// Whether a probe's output shows a working login.
pub fn probe_ready(output: &str) -> bool {
    !output.trim().is_empty() && !output.to_lowercase().contains("connection refused")
}

/// Wait until `remote` answers pings and then accepts logins.
///
/// Returns `Ok(false)` if either phase runs out of attempts. Failed probe
/// sessions count as unsuccessful attempts; failing to run `ping` at all is
/// an error.
pub async fn wait_for_boot<R: Runner>(remote: &RemoteHost<R>, wait: &BootWait) -> Result<bool> {
    let started = Instant::now();
    info!("Waiting for {} to boot", remote.host());

    let mut reachable = false;
    for attempt in 1..=wait.ping_attempts {
        if remote.ping().await? {
            reachable = true;
            break;
        }
        debug!(
            "No ping reply from {} ({}/{})",
            remote.host(),
            attempt,
            wait.ping_attempts
        );
        tokio::time::sleep(wait.ping_interval).await;
    }
    if !reachable {
        warn!(
            "{} did not answer ping within {:?}",
            remote.host(),
            started.elapsed()
        );
        return Ok(false);
    }

    info!("{} answers ping; waiting for ssh", remote.host());
    tokio::time::sleep(wait.settle_delay).await;

    for attempt in 1..=wait.probe_attempts {
        match remote.run(&wait.probe_command).await {
            Ok(result) if probe_ready(result.output()) => {
                info!("{} is up after {:?}", remote.host(), started.elapsed());
                return Ok(true);
            }
            Ok(result) => debug!(
                "Probe {}/{} not ready: {}",
                attempt,
                wait.probe_attempts,
                result.output().trim()
            ),
            Err(e) => debug!("Probe {}/{} failed: {}", attempt, wait.probe_attempts, e),
        }
        tokio::time::sleep(wait.probe_interval).await;
    }

    warn!("ssh on {} did not come up", remote.host());
    Ok(false)
}

#[cfg(test)]
mod tests {
    use tokio_test::assert_ok;

    use super::*;
    use crate::driver::ExitOutcome;
    use crate::error::{Error, SpawnError};
    use crate::remote::host::tests::{FakeRunner, host};

    fn fast() -> BootWait {
        BootWait::default()
            .with_ping_attempts(3)
            .with_ping_interval(Duration::from_millis(1))
            .with_settle_delay(Duration::from_millis(1))
            .with_probe_attempts(3)
            .with_probe_interval(Duration::from_millis(1))
    }

    #[test]
    fn test_probe_ready() {
        assert!(probe_ready("/root\r\n"));
        assert!(!probe_ready("\r\n"));
        assert!(!probe_ready(
            "ssh: connect to host 10.0.0.1 port 22: Connection refused\r\n"
        ));
    }

    #[test]
    fn test_defaults() {
        let wait = BootWait::default();
        assert_eq!(wait.ping_attempts, 120);
        assert_eq!(wait.probe_attempts, 30);
        assert_eq!(wait.probe_command, "pwd");
    }

    #[tokio::test]
    async fn test_boot_completes() {
        let remote = host(
            FakeRunner::default()
                .reply(ExitOutcome::Exited(1), "")
                .reply(ExitOutcome::Exited(0), "")
                .reply(ExitOutcome::Exited(255), "ssh: connect to host 10.0.0.1 port 22: Connection refused\r\n")
                .fail(Error::Spawn(SpawnError::EmptyCommand))
                .reply(ExitOutcome::Exited(0), "/root\r\n"),
        );

        assert!(assert_ok!(wait_for_boot(&remote, &fast()).await));

        let calls = remote.runner().calls();
        assert_eq!(calls.len(), 5);
        assert_eq!(calls[0].argv[0], "ping");
        assert_eq!(calls[2].argv.last().map(String::as_str), Some("pwd"));
    }

    #[tokio::test]
    async fn test_ping_timeout() {
        let remote = host(
            FakeRunner::default()
                .reply(ExitOutcome::Exited(1), "")
                .reply(ExitOutcome::Exited(1), "")
                .reply(ExitOutcome::Exited(1), ""),
        );

        assert!(!assert_ok!(wait_for_boot(&remote, &fast()).await));
        assert_eq!(remote.runner().calls().len(), 3);
    }

    #[tokio::test]
    async fn test_probe_timeout() {
        let remote = host(
            FakeRunner::default()
                .reply(ExitOutcome::Exited(0), "")
                .reply(ExitOutcome::Exited(255), "")
                .reply(ExitOutcome::Exited(255), "")
                .reply(ExitOutcome::Exited(255), ""),
        );

        assert!(!assert_ok!(wait_for_boot(&remote, &fast()).await));
        assert_eq!(remote.runner().calls().len(), 4);
    }
}
