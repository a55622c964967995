//! Prompt and failure signatures.
//!
//! A [`Signature`] is a case-insensitive literal matched against a
//! lower-cased view of the child's output. A [`PatternSet`] groups the three
//! kinds the engine reacts to; order within each group is precedence.

use memchr::memmem::Finder;

use crate::error::ConfigError;

/// Password prompt signatures, in priority order.
pub const DEFAULT_PASSWORD_PROMPTS: &[&str] = &[
    "password:",
    "passwort:",
    "pass:",
    "'s password:",
    "root password:",
    "root@",
];

/// Host-key trust prompt signatures, in priority order.
pub const DEFAULT_HOST_KEY_PROMPTS: &[&str] = &[
    "are you sure you want to continue connecting",
    "(yes/no)?",
];

/// Authentication failure signatures.
pub const DEFAULT_FAILURES: &[&str] = &[
    "permission denied",
    "authentication failed",
    "authentication error",
    "login incorrect",
    "access denied",
];

/// A case-insensitive literal signature.
#[derive(Debug, Clone)]
pub struct Signature {
    /// The signature as given.
    text: String,

    /// Searcher over the lower-cased signature bytes.
    finder: Finder<'static>,
}

impl Signature {
    /// Create a signature, rejecting empty text.
    pub fn new(text: impl Into<String>, set: &'static str) -> Result<Self, ConfigError> {
        let text = text.into();
        if text.is_empty() {
            return Err(ConfigError::EmptySignature { set });
        }
        Ok(Self::literal(text))
    }

    fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        let lowered = text.to_ascii_lowercase().into_bytes();
        Self {
            finder: Finder::new(&lowered).into_owned(),
            text,
        }
    }

    /// The signature as given.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The lower-cased signature bytes.
    pub fn needle(&self) -> &[u8] {
        self.finder.needle()
    }

    /// Offset of the first occurrence in an already lower-cased haystack.
    pub fn find(&self, lowered: &[u8]) -> Option<usize> {
        self.finder.find(lowered)
    }

    /// Whether an already lower-cased haystack contains this signature.
    pub fn is_match(&self, lowered: &[u8]) -> bool {
        self.find(lowered).is_some()
    }

    /// Whether `tail` is a proper, non-empty prefix of this signature.
    pub fn starts_with_partial(&self, tail: &[u8]) -> bool {
        !tail.is_empty() && tail.len() < self.needle().len() && self.needle().starts_with(tail)
    }
}

/// The signatures a session reacts to.
///
/// Filtering removes password and host-key prompts from the relayed output;
/// classification answers them; failures end the session.
#[derive(Debug, Clone)]
pub struct PatternSet {
    password_prompts: Vec<Signature>,
    host_key_prompts: Vec<Signature>,
    failures: Vec<Signature>,
}

impl PatternSet {
    /// A set with no signatures at all.
    pub fn empty() -> Self {
        Self {
            password_prompts: Vec::new(),
            host_key_prompts: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Append a password prompt signature (lowest priority so far).
    pub fn with_password_prompt(mut self, text: impl Into<String>) -> Result<Self, ConfigError> {
        self.password_prompts
            .push(Signature::new(text, "password prompt")?);
        Ok(self)
    }

    /// Append a host-key prompt signature (lowest priority so far).
    pub fn with_host_key_prompt(mut self, text: impl Into<String>) -> Result<Self, ConfigError> {
        self.host_key_prompts
            .push(Signature::new(text, "host-key prompt")?);
        Ok(self)
    }

    /// Append an authentication failure signature.
    pub fn with_failure(mut self, text: impl Into<String>) -> Result<Self, ConfigError> {
        self.failures.push(Signature::new(text, "failure")?);
        Ok(self)
    }

    pub fn password_prompts(&self) -> &[Signature] {
        &self.password_prompts
    }

    pub fn host_key_prompts(&self) -> &[Signature] {
        &self.host_key_prompts
    }

    pub fn failures(&self) -> &[Signature] {
        &self.failures
    }

    /// Signatures removed from relayed output: password prompts first, then
    /// host-key prompts.
    pub fn filter_signatures(&self) -> impl Iterator<Item = &Signature> + Clone {
        self.password_prompts
            .iter()
            .chain(self.host_key_prompts.iter())
    }

    /// First password prompt (by priority) present in `lowered`.
    pub fn find_password_prompt(&self, lowered: &[u8]) -> Option<&Signature> {
        first_match(&self.password_prompts, lowered)
    }

    /// First host-key prompt (by priority) present in `lowered`.
    pub fn find_host_key_prompt(&self, lowered: &[u8]) -> Option<&Signature> {
        first_match(&self.host_key_prompts, lowered)
    }

    /// First failure signature present in `lowered`.
    pub fn find_failure(&self, lowered: &[u8]) -> Option<&Signature> {
        first_match(&self.failures, lowered)
    }
}

impl Default for PatternSet {
    fn default() -> Self {
        let literals = |texts: &[&str]| -> Vec<Signature> {
            texts.iter().copied().map(Signature::literal).collect()
        };
        Self {
            password_prompts: literals(DEFAULT_PASSWORD_PROMPTS),
            host_key_prompts: literals(DEFAULT_HOST_KEY_PROMPTS),
            failures: literals(DEFAULT_FAILURES),
        }
    }
}

fn first_match<'a>(signatures: &'a [Signature], lowered: &[u8]) -> Option<&'a Signature> {
    signatures.iter().find(|sig| sig.is_match(lowered))
}
