//! Result types for a finished session.

use std::time::Duration;

use crate::channel::ChildStatus;

/// Exit code reported after an authentication failure.
pub const AUTH_FAILURE_CODE: i32 = 1;

/// Exit code reported for a child killed by a signal.
pub const SIGNAL_FALLBACK_CODE: i32 = 1;

/// Exit code reported when the operator interrupted the session.
pub const INTERRUPTED_CODE: i32 = 130;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The child exited normally with this code.
    Exited(i32),

    /// The child was terminated by this signal.
    Signaled(i32),

    /// The remote side reported an authentication failure.
    AuthenticationFailed,

    /// The operator interrupted the session.
    Interrupted,
}

impl ExitOutcome {
    /// Numeric exit code for this outcome.
    pub fn code(&self) -> i32 {
        match self {
            ExitOutcome::Exited(code) => *code,
            ExitOutcome::Signaled(_) => SIGNAL_FALLBACK_CODE,
            ExitOutcome::AuthenticationFailed => AUTH_FAILURE_CODE,
            ExitOutcome::Interrupted => INTERRUPTED_CODE,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Exited(0))
    }
}

impl From<ChildStatus> for ExitOutcome {
    fn from(status: ChildStatus) -> Self {
        match status {
            ChildStatus::Exited(code) => ExitOutcome::Exited(code),
            ChildStatus::Signaled(signal) => ExitOutcome::Signaled(signal),
        }
    }
}

impl std::fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitOutcome::Exited(code) => write!(f, "exited with code {}", code),
            ExitOutcome::Signaled(signal) => write!(f, "killed by signal {}", signal),
            ExitOutcome::AuthenticationFailed => write!(f, "authentication failed"),
            ExitOutcome::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Result of one session.
#[derive(Debug, Clone)]
pub struct SessionResult {
    /// How the session ended.
    pub outcome: ExitOutcome,

    /// Filtered output, when captured.
    pub output: Option<String>,

    /// Number of times the secret was written.
    pub secrets_sent: u32,

    /// Whether a host-key question was confirmed.
    pub host_key_answered: bool,

    /// Wall-clock duration of the session.
    pub elapsed: Duration,
}

impl SessionResult {
    /// Numeric exit code of the session.
    pub fn code(&self) -> i32 {
        self.outcome.code()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Captured output, or an empty string when output was streamed.
    pub fn output(&self) -> &str {
        self.output.as_deref().unwrap_or("")
    }

    /// Get the captured output lines as an iterator.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.output().lines()
    }

    /// Check if the captured output contains a substring.
    pub fn contains(&self, pattern: &str) -> bool {
        self.output().contains(pattern)
    }
}

impl std::fmt::Display for SessionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.output())
    }
}
