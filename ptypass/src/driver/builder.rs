//! Builder for creating engines.

use std::sync::Arc;
use std::time::Duration;

use super::Engine;
use super::config::ExecOptions;
use crate::channel::PatternSet;
use crate::error::Result;

/// Builder for constructing an [`Engine`].
///
/// # Example
///
/// ```rust,no_run
/// use ptypass::driver::EngineBuilder;
/// use secrecy::SecretString;
///
/// # async fn example() -> Result<(), ptypass::Error> {
/// let engine = EngineBuilder::new()
///     .max_retries(1)
///     .capture_output(true)
///     .build()?;
///
/// let secret = SecretString::from("secret".to_string());
/// let result = engine
///     .execute(&["ssh", "admin@192.168.1.1", "uname -a"], &secret)
///     .await?;
/// println!("{}", result);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    options: ExecOptions,
    patterns: PatternSet,
}

impl EngineBuilder {
    /// Create a builder with default options and signatures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all options at once.
    pub fn options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the prompt and failure signatures.
    pub fn patterns(mut self, patterns: PatternSet) -> Self {
        self.patterns = patterns;
        self
    }

    /// Trace raw reads as hex.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.options.verbose = verbose;
        self
    }

    /// Set how many times the secret may be re-sent (default: 2).
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.options.max_retries = max_retries;
        self
    }

    /// Collect output instead of streaming it.
    pub fn capture_output(mut self, capture: bool) -> Self {
        self.options.capture_output = capture;
        self
    }

    /// Relay nothing to the operator.
    pub fn silent(mut self, silent: bool) -> Self {
        self.options.silent = silent;
        self
    }

    /// Forward the operator's stdin to the child (default: true).
    pub fn forward_input(mut self, forward: bool) -> Self {
        self.options.forward_input = forward;
        self
    }

    /// Drop file-transfer progress lines from the output.
    pub fn drop_progress_lines(mut self, drop: bool) -> Self {
        self.options.drop_progress_lines = drop;
        self
    }

    /// Set how long output is drained after a failure (default: 50 ms).
    pub fn failure_grace(mut self, grace: Duration) -> Self {
        self.options.failure_grace = grace;
        self
    }

    /// Set the quiet period before withheld output is flushed (default: 100 ms).
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.options.flush_interval = interval;
        self
    }

    /// Stop sessions on Ctrl-C (default: true).
    pub fn handle_interrupt(mut self, handle: bool) -> Self {
        self.options.handle_interrupt = handle;
        self
    }

    /// Build the engine.
    pub fn build(self) -> Result<Engine> {
        self.options.validate()?;
        Ok(Engine {
            options: self.options,
            patterns: Arc::new(self.patterns),
        })
    }
}
