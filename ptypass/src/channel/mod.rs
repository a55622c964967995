//! Channel layer: the child's pseudo-terminal and the byte-level tools that
//! operate on its output.
//!
//! This module handles pty allocation and process supervision, prompt and
//! failure signatures, the rolling classification window, and the output
//! filter that keeps prompts away from the operator.

mod buffer;
mod filter;
mod patterns;
mod pty;

pub use buffer::{ROLLING_CAPACITY, RollingBuffer};
pub use filter::{OutputFilter, strip_progress_lines, strip_prompts, trim_leading_whitespace};
pub use patterns::{
    DEFAULT_FAILURES, DEFAULT_HOST_KEY_PROMPTS, DEFAULT_PASSWORD_PROMPTS, PatternSet, Signature,
};
pub use pty::{ChildStatus, EXEC_FAILURE_CODE, PtyProcess, is_hangup};
