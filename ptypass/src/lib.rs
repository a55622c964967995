//! # ptypass
//!
//! Run terminal programs under a pseudo-terminal and answer their
//! authentication prompts.
//!
//! ptypass spawns a command (typically `ssh` or `scp`) attached to a pty,
//! relays its terminal I/O to the operator, and answers password and
//! host-key prompts with a configured secret, in the spirit of `sshpass`.
//!
//! ## Features
//!
//! - Async relay loop on tokio, one task per session
//! - Case-insensitive prompt signatures with configurable precedence
//! - Prompt banners scrubbed from relayed and captured output, even when a
//!   prompt arrives split across reads
//! - Bounded secret re-sends and early exit on authentication failure
//! - Remote helpers for `ssh`/`scp` sessions, exit-status markers, progress
//!   polling and boot waits
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ptypass::{EngineBuilder, ExitOutcome};
//! use secrecy::SecretString;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ptypass::Error> {
//!     let engine = EngineBuilder::new()
//!         .capture_output(true)
//!         .forward_input(false)
//!         .build()?;
//!
//!     let secret = SecretString::from("secret".to_string());
//!     let result = engine
//!         .execute(&["ssh", "root@192.168.178.1", "uname -a"], &secret)
//!         .await?;
//!
//!     if result.outcome == ExitOutcome::AuthenticationFailed {
//!         eprintln!("wrong password");
//!     }
//!     println!("{}", result);
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod driver;
pub mod error;
pub mod remote;
pub mod secret;

// Re-export main types for convenience
pub use channel::PatternSet;
pub use driver::{Engine, EngineBuilder, ExecOptions, ExitOutcome, Runner, SessionResult};
pub use error::{Error, Result};
pub use remote::{RemoteHost, RemoteStatus};
pub use secrecy::SecretString;
