//! Sentinel-framed image payload extraction.
//!
//! The device firmware prints a captured frame as base64 between two
//! literal marker lines. Everything else on the console (boot banners,
//! `I (1234) cam: …` diagnostics, colour escapes) is noise and is dropped.

use crate::{AppError, Result};

/// Marker line that opens an image payload.
pub const BEGIN_SENTINEL: &str = "-----BEGIN IMAGE-----";

/// Marker line that closes an image payload.
pub const END_SENTINEL: &str = "-----END IMAGE-----";

/// Position of a [`SentinelScanner`] within the framed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// No begin sentinel seen yet.
    Seeking,
    /// Between the sentinels; lines are accumulated.
    Capturing,
    /// End sentinel seen; further lines are ignored.
    Complete,
}

/// Incremental scanner fed one monitor line at a time.
///
/// The supervisor's reader task uses it to stop reading as soon as the end
/// sentinel arrives; [`extract_payload`] uses it over a finished line list.
#[derive(Debug)]
pub struct SentinelScanner {
    state: ScanState,
    payload: String,
}

impl SentinelScanner {
    /// Create a scanner in the [`ScanState::Seeking`] state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ScanState::Seeking,
            payload: String::new(),
        }
    }

    /// Feed one line and return the resulting state.
    ///
    /// A repeated begin sentinel while capturing is skipped, not restarted.
    pub fn feed(&mut self, line: &str) -> ScanState {
        match self.state {
            ScanState::Complete => {}
            ScanState::Seeking => {
                if line.contains(BEGIN_SENTINEL) {
                    self.state = ScanState::Capturing;
                }
            }
            ScanState::Capturing => {
                if line.contains(END_SENTINEL) {
                    self.state = ScanState::Complete;
                } else if !line.contains(BEGIN_SENTINEL) {
                    self.payload.push_str(line.trim());
                }
            }
        }
        self.state
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Whether the begin sentinel has been seen.
    #[must_use]
    pub fn saw_begin(&self) -> bool {
        self.state != ScanState::Seeking
    }

    /// Consume the scanner and produce the payload.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NoPayload` if no begin sentinel was seen or the
    /// framed span is empty.
    pub fn finish(self) -> Result<String> {
        if !self.saw_begin() {
            return Err(AppError::NoPayload("begin sentinel not found".into()));
        }
        if self.payload.is_empty() {
            return Err(AppError::NoPayload("empty span between sentinels".into()));
        }
        Ok(self.payload)
    }
}

impl Default for SentinelScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Concatenate the trimmed lines strictly between the sentinels.
///
/// The end sentinel is optional: a span cut short by end-of-output still
/// yields whatever was accumulated. Callers that hit a timeout discard the
/// lines before ever reaching this function.
///
/// # Errors
///
/// Returns `AppError::NoPayload` if no begin sentinel is present or the
/// framed span is empty.
pub fn extract_payload<I, S>(lines: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut scanner = SentinelScanner::new();
    for line in lines {
        if scanner.feed(line.as_ref()) == ScanState::Complete {
            break;
        }
    }
    scanner.finish()
}
