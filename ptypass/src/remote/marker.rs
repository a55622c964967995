//! Exit-status markers appended to remote commands.
//!
//! A pty session only reports the exit status of `ssh` itself, so commands
//! whose own status matters are run as `<command>; echo EXIT_CODE=$?` and
//! the marker is read back from the captured output.

use std::sync::LazyLock;

use regex::Regex;

static EXIT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"EXIT_CODE=(-?[0-9]+)").unwrap());

/// Append the exit-status marker to a shell command.
pub fn with_exit_marker(command: &str) -> String {
    format!("{}; echo EXIT_CODE=$?", command)
}

/// Exit status from the last `EXIT_CODE=<n>` marker in `text`.
pub fn parse_exit_marker(text: &str) -> Option<i32> {
    EXIT_MARKER
        .captures_iter(text)
        .last()
        .and_then(|caps| caps.get(1))
        .and_then(|code| code.as_str().parse().ok())
}

/// `text` with every marker line removed.
pub fn strip_exit_marker(text: &str) -> String {
    text.lines()
        .filter(|line| !EXIT_MARKER.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}
