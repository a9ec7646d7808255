//! Line classifier for the supervisor's stdout filter.
//!
//! Bytes arrive in arbitrary chunks; [`LineFilter`] buffers the unterminated
//! tail so a line split across reads is judged only once it is complete.

/// Verdict for one complete line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// Forward to the real stdout (trimmed, without the newline).
    Forward(String),
    /// Divert to the side log.
    Drop { line: String, reason: DropReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Blank,
    NotAnObject,
    InvalidJson,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Blank => "blank line",
            Self::NotAnObject => "not a JSON object",
            Self::InvalidJson => "invalid JSON",
        })
    }
}

/// A line is forwarded iff, once trimmed, it is non-empty, starts with `{`,
/// ends with `}` and parses as JSON.
pub fn classify_line(raw: &str) -> Classified {
    let line = raw.trim();

    if line.is_empty() {
        return Classified::Drop {
            line: raw.to_string(),
            reason: DropReason::Blank,
        };
    }
    if !(line.starts_with('{') && line.ends_with('}')) {
        return Classified::Drop {
            line: line.to_string(),
            reason: DropReason::NotAnObject,
        };
    }
    match serde_json::from_str::<serde::de::IgnoredAny>(line) {
        Ok(_) => Classified::Forward(line.to_string()),
        Err(_) => Classified::Drop {
            line: line.to_string(),
            reason: DropReason::InvalidJson,
        },
    }
}

/// Accumulates stdout bytes and yields one verdict per complete line.
#[derive(Debug, Default)]
pub struct LineFilter {
    pending: Vec<u8>,
}

impl LineFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns verdicts for every line it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Classified> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let tail = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, tail);

        complete[..complete.len() - 1]
            .split(|&b| b == b'\n')
            .map(|line| classify_line(&String::from_utf8_lossy(line)))
            .collect()
    }

    /// Classify whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<Classified> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(classify_line(&String::from_utf8_lossy(&rest)))
    }

    /// Bytes held back waiting for a newline.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}
