//! Prompt classification and reply bookkeeping.
//!
//! The [`Responder`] looks at the lower-cased rolling window after every
//! chunk and decides whether the child is waiting for a host-key
//! confirmation or a password, and whether the remote side has reported an
//! authentication failure. It never writes anything itself; the session
//! performs the write and then clears the window.

use std::sync::Arc;

use log::debug;
use memchr::{memchr, memmem};

use crate::channel::PatternSet;

/// Word looked for when no password signature matched.
const FALLBACK_KEYWORD: &[u8] = b"password";

/// Window after the fallback keyword in which a `:` must appear.
const FALLBACK_WINDOW: usize = 64;

/// Reply the session should write to the child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Confirm an unknown host key with `yes`.
    ConfirmHostKey,

    /// Send the secret.
    Secret {
        /// 1-based number of this send.
        attempt: u32,

        /// Signature that triggered the send.
        prompt: String,
    },
}

impl Reply {
    /// Whether the reply carries the secret (and must not be logged).
    pub fn is_hidden(&self) -> bool {
        matches!(self, Reply::Secret { .. })
    }
}

/// What one inspection of the window found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inspection {
    /// Reply to write, if a prompt was recognized.
    pub reply: Option<Reply>,

    /// Failure signature that was found, if any.
    pub failure: Option<String>,
}

/// Per-session prompt responder.
#[derive(Debug)]
pub struct Responder {
    patterns: Arc<PatternSet>,
    max_retries: u32,
    secrets_sent: u32,
    host_key_answered: bool,
}

impl Responder {
    pub fn new(patterns: Arc<PatternSet>, max_retries: u32) -> Self {
        Self {
            patterns,
            max_retries,
            secrets_sent: 0,
            host_key_answered: false,
        }
    }

    /// Classify the lower-cased window and record the reply, if any.
    ///
    /// A host-key confirmation takes precedence and suppresses the failure
    /// check for the same window. Secrets are sent at most
    /// `max_retries + 1` times.
    pub fn inspect(&mut self, lowered: &[u8]) -> Inspection {
        if !self.host_key_answered {
            if let Some(sig) = self.patterns.find_host_key_prompt(lowered) {
                debug!("Host-key prompt matched '{}'; confirming", sig.text());
                self.host_key_answered = true;
                return Inspection {
                    reply: Some(Reply::ConfirmHostKey),
                    failure: None,
                };
            }
        }

        let mut reply = None;
        if self.secrets_sent <= self.max_retries {
            if let Some(prompt) = self.password_prompt(lowered) {
                self.secrets_sent += 1;
                debug!(
                    "Password prompt matched '{}'; sending secret (attempt {})",
                    prompt, self.secrets_sent
                );
                reply = Some(Reply::Secret {
                    attempt: self.secrets_sent,
                    prompt,
                });
            }
        }

        let failure = self
            .patterns
            .find_failure(lowered)
            .map(|sig| sig.text().to_string());

        Inspection { reply, failure }
    }

    fn password_prompt(&self, lowered: &[u8]) -> Option<String> {
        if let Some(sig) = self.patterns.find_password_prompt(lowered) {
            return Some(sig.text().to_string());
        }

        let start = memmem::find(lowered, FALLBACK_KEYWORD)?;
        let end = lowered.len().min(start + FALLBACK_WINDOW);
        memchr(b':', &lowered[start..end]).map(|_| "password".to_string())
    }

    pub fn secrets_sent(&self) -> u32 {
        self.secrets_sent
    }

    pub fn host_key_answered(&self) -> bool {
        self.host_key_answered
    }

    /// Whether another secret may still be sent.
    pub fn can_send_secret(&self) -> bool {
        self.secrets_sent <= self.max_retries
    }
}
