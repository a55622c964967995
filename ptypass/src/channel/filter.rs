//! Removal of prompt banners from relayed output.
//!
//! Each line that carries a prompt signature is cut out of the chunk together
//! with any blank lines right after it, so neither the operator nor a capture
//! ever sees a password prompt or host-key question.

use memchr::{memchr, memmem, memrchr};

use super::patterns::Signature;

/// Longest incomplete line withheld while waiting for the rest of a
/// possible signature, and longest unterminated prompt line swallowed.
const MAX_WITHHELD: usize = 4096;

/// Remove every occurrence of every signature, in the given order, from
/// `data`, taking the enclosing line with it.
///
/// Returns `true` when a removed prompt line had no terminating newline in
/// `data`, so its remainder is still to come.
pub fn strip_prompts<'a>(data: &mut Vec<u8>, signatures: impl IntoIterator<Item = &'a Signature>) -> bool {
    let mut open = false;
    for sig in signatures {
        open |= strip_signature(data, sig);
    }
    open
}

fn strip_signature(data: &mut Vec<u8>, sig: &Signature) -> bool {
    let mut open = false;
    while let Some(found) = sig.find(&data.to_ascii_lowercase()) {
        let start = memrchr(b'\n', &data[..found]);
        let end = memchr(b'\n', &data[found..]).map(|offset| found + offset);

        // Swallow blank lines directly after the prompt line.
        let end = end.map(|mut newline| {
            while data.get(newline + 1) == Some(&b'\n') {
                newline += 1;
            }
            newline
        });

        match (start, end) {
            (Some(start), Some(end)) => {
                data.drain(start..=end);
            }
            (None, Some(end)) => {
                data.drain(found..=end);
            }
            (Some(start), None) => {
                data.truncate(start);
                open = true;
            }
            (None, None) => {
                data.truncate(found);
                open = true;
            }
        }
    }
    open
}

/// Drop leading newlines, carriage returns, spaces and tabs.
pub fn trim_leading_whitespace(data: &mut Vec<u8>) {
    let skip = data
        .iter()
        .position(|b| !matches!(b, b'\n' | b'\r' | b' ' | b'\t'))
        .unwrap_or(data.len());
    data.drain(..skip);
}

/// Remove lines that look like a file-transfer progress meter (a percentage
/// together with an ETA or a transfer rate).
pub fn strip_progress_lines(data: &[u8]) -> Vec<u8> {
    let is_progress = |line: &&[u8]| {
        memchr(b'%', line).is_some()
            && [&b"ETA"[..], b"KB/s", b"MB/s"]
                .iter()
                .any(|marker| memmem::find(line, marker).is_some())
    };

    let kept: Vec<&[u8]> = data.split(|&b| b == b'\n').filter(|line| !is_progress(line)).collect();
    kept.join(&b'\n')
}

/// Stateful filter applied to consecutive output chunks of one session.
///
/// A trailing incomplete line that ends with the beginning of a signature is
/// withheld and prepended to the next chunk, so a prompt split across two
/// reads is still removed as a whole. When a prompt line was removed before
/// its newline arrived, the rest of that line is dropped from the following
/// chunks.
#[derive(Debug)]
pub struct OutputFilter {
    /// Signatures in removal order.
    signatures: Vec<Signature>,

    /// Whether progress-meter lines are dropped too.
    drop_progress_lines: bool,

    /// Withheld incomplete line from the previous chunk.
    pending: Vec<u8>,

    /// Bytes dropped so far from a removed prompt line still waiting for
    /// its newline.
    open_line: Option<usize>,
}

impl OutputFilter {
    /// Create a filter removing `signatures`, in order.
    pub fn new<'a>(signatures: impl IntoIterator<Item = &'a Signature>) -> Self {
        Self {
            signatures: signatures.into_iter().cloned().collect(),
            drop_progress_lines: false,
            pending: Vec::new(),
            open_line: None,
        }
    }

    /// Also drop file-transfer progress lines.
    pub fn with_progress_lines_dropped(mut self, drop: bool) -> Self {
        self.drop_progress_lines = drop;
        self
    }

    /// Filter the next chunk; returns the text to relay now.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<u8> {
        let chunk = self.swallow_open_line(chunk);
        let mut data = std::mem::take(&mut self.pending);
        data.extend_from_slice(chunk);

        let mut data = self.apply(data);
        let withheld = self.withheld_len(&data);
        self.pending = data.split_off(data.len() - withheld);

        trim_leading_whitespace(&mut data);
        data
    }

    /// Release withheld text, filtered; used at end of session or when the
    /// child has been quiet for a while.
    pub fn flush(&mut self) -> Vec<u8> {
        let data = std::mem::take(&mut self.pending);
        let mut data = self.apply(data);
        trim_leading_whitespace(&mut data);
        data
    }

    /// Whether any text is currently withheld.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Whether the rest of a removed prompt line is still being dropped.
    pub fn in_prompt_line(&self) -> bool {
        self.open_line.is_some()
    }

    fn apply(&mut self, data: Vec<u8>) -> Vec<u8> {
        let mut data = if self.drop_progress_lines {
            strip_progress_lines(&data)
        } else {
            data
        };
        if strip_prompts(&mut data, &self.signatures) {
            self.open_line = Some(0);
        }
        data
    }

    /// Drop the remainder of an open prompt line from `chunk`, up to and
    /// including its newline and any blank lines after it.
    fn swallow_open_line<'c>(&mut self, chunk: &'c [u8]) -> &'c [u8] {
        let Some(swallowed) = self.open_line else {
            return chunk;
        };

        match memchr(b'\n', chunk) {
            Some(mut newline) => {
                while chunk.get(newline + 1) == Some(&b'\n') {
                    newline += 1;
                }
                self.open_line = None;
                &chunk[newline + 1..]
            }
            None => {
                let swallowed = swallowed + chunk.len();
                self.open_line = (swallowed < MAX_WITHHELD).then_some(swallowed);
                &[]
            }
        }
    }

    /// How many trailing bytes to hold back.
    fn withheld_len(&self, data: &[u8]) -> usize {
        let line_start = memrchr(b'\n', data).map_or(0, |newline| newline + 1);
        let line = data[line_start..].to_ascii_lowercase();
        if line.is_empty() {
            return 0;
        }

        let longest = self
            .signatures
            .iter()
            .map(|sig| sig.needle().len())
            .max()
            .unwrap_or(0);
        let max_tail = line.len().min(longest.saturating_sub(1));

        let partial = (1..=max_tail).rev().find(|&len| {
            let tail = &line[line.len() - len..];
            self.signatures.iter().any(|sig| sig.starts_with_partial(tail))
        });

        match partial {
            Some(_) if line.len() <= MAX_WITHHELD => line.len(),
            Some(len) => len,
            None => 0,
        }
    }
}
