//! Transcript accumulation
//!
//! Buffers finalized sentence fragments for the in-progress utterance and
//! derives the current transcript from them. The buffer is cleared before
//! the finalized text leaves this module, so a fragment arriving while a
//! finalize callback runs can never corrupt the just-emitted value.

use crate::engine::Fragment;

/// Ordered buffer of finalized fragments plus the derived transcript
#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    fragments: Vec<String>,
    current: String,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finalized fragment and recompute the derived transcript
    pub fn push_final(&mut self, text: &str) -> &str {
        self.fragments.push(text.to_string());
        self.current = self.fragments.join(" ").trim().to_string();
        &self.current
    }

    /// The space-joined, trimmed concatenation of buffered fragments
    pub fn current(&self) -> &str {
        &self.current
    }

    /// Current transcript extended with a transient interim fragment
    pub fn with_interim(&self, interim: &str) -> String {
        if self.current.is_empty() {
            interim.trim().to_string()
        } else {
            format!("{} {}", self.current, interim.trim())
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current.trim().is_empty()
    }

    /// Snapshot the transcript and clear the buffer, in that order
    ///
    /// Returns `None` when the trimmed transcript is empty, which makes
    /// back-to-back finalize attempts a no-op.
    pub fn take_final(&mut self) -> Option<String> {
        let text = self.current.trim().to_string();
        self.fragments.clear();
        self.current.clear();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn clear(&mut self) {
        self.fragments.clear();
        self.current.clear();
    }
}

/// Split an engine result batch into concatenated final and interim text
pub fn split_fragments(fragments: &[Fragment]) -> (String, String) {
    let mut final_text = String::new();
    let mut interim_text = String::new();
    for fragment in fragments {
        let target = if fragment.is_final { &mut final_text } else { &mut interim_text };
        target.push_str(&fragment.text);
    }
    (final_text, interim_text)
}
