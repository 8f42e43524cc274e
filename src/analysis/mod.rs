//! Vision analysis collaborator.
//!
//! The [`Analyzer`] seam takes a base64 frame plus the previous item's
//! description and returns an [`AnalysisVerdict`]. The production
//! implementation talks to a chat-completions API ([`openai`]); replies are
//! decoded by the two-stage [`decode`] module because vision models do not
//! reliably emit strict JSON.

pub mod decode;
pub mod openai;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Reserved description meaning the frame was obstructed by a hand.
pub const HAND_SENTINEL: &str = "hand";

/// Structured reply from the analysis collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisVerdict {
    /// Whether the item matches the previous description.
    pub is_the_same: bool,
    /// Detailed description of the current item.
    pub description: String,
}

impl AnalysisVerdict {
    /// Whether this verdict is the transient "hand in frame" sentinel.
    ///
    /// Such frames are discarded: neither persisted nor notified.
    #[must_use]
    pub fn is_hand(&self) -> bool {
        self.description.trim().eq_ignore_ascii_case(HAND_SENTINEL)
    }

    /// Whether the collaborator reported a replaced item.
    #[must_use]
    pub fn item_changed(&self) -> bool {
        !self.is_the_same
    }
}

/// Describes a frame and compares it with the previous item.
pub trait Analyzer: Send + Sync {
    /// Analyse `image_base64` in the context of `prior_description`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Analysis` if the call fails or the reply cannot
    /// be decoded into a verdict.
    fn analyze<'a>(
        &'a self,
        image_base64: &'a str,
        prior_description: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<AnalysisVerdict>> + Send + 'a>>;
}
