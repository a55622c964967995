//! Per-session execution options.

use std::time::Duration;

use crate::error::ConfigError;

/// Options controlling one session of the engine.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Trace every raw read as hex through `log`.
    pub verbose: bool,

    /// How many times the secret may be re-sent after the first send.
    pub max_retries: u32,

    /// Collect filtered output and return it instead of streaming it.
    pub capture_output: bool,

    /// Relay nothing to the operator.
    pub silent: bool,

    /// Forward the operator's input to the child.
    pub forward_input: bool,

    /// Drop file-transfer progress lines from relayed output.
    pub drop_progress_lines: bool,

    /// How long output keeps being drained after a failure signature.
    pub failure_grace: Duration,

    /// Quiet period after which withheld partial output is flushed.
    pub flush_interval: Duration,

    /// Stop the session on Ctrl-C.
    pub handle_interrupt: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            max_retries: 2,
            capture_output: false,
            silent: false,
            forward_input: true,
            drop_progress_lines: false,
            failure_grace: Duration::from_millis(50),
            flush_interval: Duration::from_millis(100),
            handle_interrupt: true,
        }
    }
}

impl ExecOptions {
    /// Options for a captured, non-interactive session.
    pub fn captured() -> Self {
        Self {
            capture_output: true,
            forward_input: false,
            ..Self::default()
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn with_forward_input(mut self, forward: bool) -> Self {
        self.forward_input = forward;
        self
    }

    pub fn with_drop_progress_lines(mut self, drop: bool) -> Self {
        self.drop_progress_lines = drop;
        self
    }

    pub fn with_failure_grace(mut self, grace: Duration) -> Self {
        self.failure_grace = grace;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_handle_interrupt(mut self, handle: bool) -> Self {
        self.handle_interrupt = handle;
        self
    }

    /// Whether filtered output goes straight to the operator.
    pub fn is_streaming(&self) -> bool {
        !self.capture_output && !self.silent
    }

    /// Reject settings the relay loop cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval.is_zero() {
            return Err(ConfigError::Invalid {
                message: "flush interval must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
