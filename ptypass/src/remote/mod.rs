//! Remote-host helpers built on the engine.
//!
//! Runs commands and file copies on a host through `ssh`/`scp` sessions,
//! reads back remote exit statuses, polls progress from a side task, and
//! waits for a rebooting host to accept logins again.

mod boot;
mod host;
mod marker;
mod poller;

pub use boot::{BootWait, DEFAULT_PROBE_COMMAND, probe_ready, wait_for_boot};
pub use host::{DEFAULT_USER, RemoteHost, RemoteStatus, shell_quote};
pub use marker::{parse_exit_marker, strip_exit_marker, with_exit_marker};
pub use poller::ProgressPoller;
