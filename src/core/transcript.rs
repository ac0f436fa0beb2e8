//! Transcript accumulation for the live session.
//!
//! Transcription fragments arrive incrementally. They are appended to a single
//! open entry until the turn completes or a fragment from the other speaker
//! arrives, at which point the entry is flushed into the history.

use std::time::SystemTime;

use crate::core::realtime::{TranscriptRole, TranscriptUpdate};

/// One utterance in the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    pub text: String,
    pub started_at: SystemTime,
}

/// Accumulates fragments into utterances. At most one entry is open at a time.
#[derive(Debug, Default)]
pub struct TranscriptAccumulator {
    open: Option<TranscriptEntry>,
    history: Vec<TranscriptEntry>,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment, flushing the open entry first if the speaker changed.
    ///
    /// Returns the update to surface, or `None` for an empty fragment.
    pub fn append(&mut self, role: TranscriptRole, fragment: &str) -> Option<TranscriptUpdate> {
        if fragment.is_empty() {
            return None;
        }

        if self.open.as_ref().is_some_and(|entry| entry.role != role) {
            self.flush();
        }

        let entry = self.open.get_or_insert_with(|| TranscriptEntry {
            role,
            text: String::new(),
            started_at: SystemTime::now(),
        });
        entry.text.push_str(fragment);

        Some(TranscriptUpdate {
            role,
            text: entry.text.clone(),
            is_final: false,
        })
    }

    /// Close the open entry and move it into the history.
    pub fn flush(&mut self) -> Option<TranscriptUpdate> {
        let entry = self.open.take()?;
        let update = TranscriptUpdate {
            role: entry.role,
            text: entry.text.clone(),
            is_final: true,
        };
        self.history.push(entry);
        Some(update)
    }

    pub fn current(&self) -> Option<&TranscriptEntry> {
        self.open.as_ref()
    }

    pub fn history(&self) -> &[TranscriptEntry] {
        &self.history
    }

    /// Drop everything, e.g. before a new session.
    pub fn clear(&mut self) {
        self.open = None;
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_concatenate_into_one_entry() {
        let mut acc = TranscriptAccumulator::new();
        acc.append(TranscriptRole::Model, "Hello");
        let update = acc.append(TranscriptRole::Model, ", how can I help?").unwrap();

        assert_eq!(update.text, "Hello, how can I help?");
        assert!(!update.is_final);
        assert!(acc.history().is_empty());
    }

    #[test]
    fn test_flush_on_turn_end() {
        let mut acc = TranscriptAccumulator::new();
        acc.append(TranscriptRole::Model, "Done.");

        let update = acc.flush().unwrap();
        assert!(update.is_final);
        assert_eq!(update.text, "Done.");
        assert!(acc.current().is_none());
        assert_eq!(acc.history().len(), 1);

        assert!(acc.flush().is_none());
    }

    #[test]
    fn test_role_change_flushes_open_entry() {
        let mut acc = TranscriptAccumulator::new();
        acc.append(TranscriptRole::User, "I need a POS");
        acc.append(TranscriptRole::Model, "Sure");

        assert_eq!(acc.history().len(), 1);
        assert_eq!(acc.history()[0].role, TranscriptRole::User);
        assert_eq!(acc.current().unwrap().role, TranscriptRole::Model);
        assert_eq!(acc.current().unwrap().text, "Sure");
    }

    #[test]
    fn test_empty_fragment_ignored() {
        let mut acc = TranscriptAccumulator::new();
        assert!(acc.append(TranscriptRole::Model, "").is_none());
        assert!(acc.current().is_none());
    }

    #[test]
    fn test_clear() {
        let mut acc = TranscriptAccumulator::new();
        acc.append(TranscriptRole::Model, "a");
        acc.flush();
        acc.append(TranscriptRole::User, "b");
        acc.clear();
        assert!(acc.current().is_none());
        assert!(acc.history().is_empty());
    }
}
