//! Error types for ptypass.

use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Main error type for ptypass operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The child could not be started under a pseudo-terminal
    #[error("Spawn error: {0}")]
    Spawn(#[from] SpawnError),

    /// The relay loop failed while the child was running
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Invalid engine or pattern configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error outside of an active session
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while starting a child under a pseudo-terminal.
#[derive(Error, Debug)]
pub enum SpawnError {
    /// No program was given
    #[error("No command specified")]
    EmptyCommand,

    /// An argument could not be passed to exec
    #[error("Invalid argument (contains NUL byte): {0:?}")]
    InvalidArgument(String),

    /// Failed to allocate the pty pair
    #[error("Failed to allocate pseudo-terminal: {0}")]
    PtyAllocation(#[source] Errno),

    /// Failed to create the exec status pipe
    #[error("Failed to create exec status pipe: {0}")]
    StatusPipe(#[source] Errno),

    /// Failed to fork
    #[error("Failed to fork: {0}")]
    Fork(#[source] Errno),

    /// The child could not exec the program
    #[error("Failed to execute '{command}': {source}")]
    Exec {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Failed to prepare the master side for async I/O
    #[error("Failed to set up pty master: {0}")]
    Setup(#[source] io::Error),
}

impl SpawnError {
    /// Whether the program itself could not be executed.
    pub fn is_exec_failure(&self) -> bool {
        matches!(self, SpawnError::Exec { .. })
    }
}

/// Errors raised by a running session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Reading from the pty master failed for a reason other than hangup
    #[error("Failed to read from pty: {0}")]
    Read(#[source] io::Error),

    /// Writing to the pty master failed
    #[error("Failed to write to pty: {0}")]
    Write(#[source] io::Error),

    /// Relaying output to the operator failed
    #[error("Failed to write output: {0}")]
    Output(#[source] io::Error),

    /// Collecting the child's exit status failed
    #[error("Failed to wait for child {pid}: {source}")]
    Wait {
        pid: i32,
        #[source]
        source: Errno,
    },

    /// The blocking wait task did not complete
    #[error("Wait task failed: {0}")]
    WaitTask(#[from] tokio::task::JoinError),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A signature was empty
    #[error("Empty signature in {set} patterns")]
    EmptySignature { set: &'static str },

    /// Any other invalid setting
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Errors resolving the secret for the command-line tool.
#[derive(Error, Debug)]
pub enum SecretError {
    /// Neither a passfile nor the environment variable was provided
    #[error("password not provided: set {var} or use -f/--passfile")]
    Missing { var: String },

    /// The passfile could not be read
    #[error("cannot read passfile {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type alias using ptypass's Error.
pub type Result<T> = std::result::Result<T, Error>;
