//! Locating the secret to answer prompts with.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use secrecy::SecretString;

use crate::error::SecretError;

/// Environment variable holding the secret when no passfile is given.
pub const SSH_PASS_VAR: &str = "SSH_PASS";

/// Resolve the secret from `passfile` if given, else from `env_var`.
///
/// Only the first line of the passfile is used, without its line ending.
pub fn resolve_secret(passfile: Option<&Path>, env_var: &str) -> Result<SecretString, SecretError> {
    match passfile {
        Some(path) => read_passfile(path),
        None => std::env::var(env_var)
            .map(SecretString::from)
            .map_err(|_| SecretError::Missing {
                var: env_var.to_string(),
            }),
    }
}

/// First line of `path`, with trailing `\r` and `\n` removed.
pub fn read_passfile(path: &Path) -> Result<SecretString, SecretError> {
    let unreadable = |source| SecretError::Unreadable {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(unreadable)?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).map_err(unreadable)?;

    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(SecretString::from(line))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;
    use tempfile::NamedTempFile;

    use super::*;

    fn passfile(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_first_line_only() {
        let file = passfile("hunter2\r\nsecond line\n");
        let secret = read_passfile(file.path()).unwrap();
        assert_eq!(secret.expose_secret(), "hunter2");
    }

    #[test]
    fn test_inner_whitespace_kept() {
        let file = passfile(" pass word \n");
        let secret = read_passfile(file.path()).unwrap();
        assert_eq!(secret.expose_secret(), " pass word ");
    }

    #[test]
    fn test_empty_file() {
        let file = passfile("");
        let secret = read_passfile(file.path()).unwrap();
        assert_eq!(secret.expose_secret(), "");
    }

    #[test]
    fn test_passfile_wins_over_environment() {
        let file = passfile("from-file\n");
        let secret = resolve_secret(Some(file.path()), "PTYPASS_TEST_UNSET_VAR").unwrap();
        assert_eq!(secret.expose_secret(), "from-file");
    }

    #[test]
    fn test_missing_passfile() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_passfile(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, SecretError::Unreadable { .. }));
        assert!(err.to_string().starts_with("cannot read passfile"));
    }

    #[test]
    fn test_missing_environment() {
        let err = resolve_secret(None, "PTYPASS_TEST_UNSET_VAR").unwrap_err();
        assert!(matches!(err, SecretError::Missing { ref var } if var == "PTYPASS_TEST_UNSET_VAR"));
    }

    #[test]
    fn test_environment() {
        // PATH is always present in the test environment.
        let secret = resolve_secret(None, "PATH").unwrap();
        assert!(!secret.expose_secret().is_empty());
    }
}
