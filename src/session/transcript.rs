//! Append-only conversation transcript
//!
//! Final entries are appended in the order they arrive, which is not
//! necessarily timestamp order. Partial entries are kept per speaker and
//! replaced as refinements arrive; they never enter the log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Interviewer,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "You"),
            Speaker::Interviewer => write!(f, "Interviewer"),
        }
    }
}

/// An immutable, finalized utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub timestamp: DateTime<Utc>,
    pub speaker: Speaker,
    pub text: String,
}

/// A transcript event as emitted by the voice channel.
///
/// For partial updates `text` is the full current hypothesis for the turn,
/// not a delta.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptUpdate {
    pub speaker: Speaker,
    pub text: String,
    pub is_final: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct TranscriptLog {
    entries: Vec<TranscriptEntry>,
    user_partial: Option<TranscriptEntry>,
    interviewer_partial: Option<TranscriptEntry>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a transcript update. Returns the entry if it was appended.
    pub fn apply(&mut self, update: TranscriptUpdate) -> Option<&TranscriptEntry> {
        let entry = TranscriptEntry {
            timestamp: update.timestamp,
            speaker: update.speaker,
            text: update.text,
        };

        if !update.is_final {
            let speaker = entry.speaker;
            *self.partial_slot(speaker) = Some(entry);
            return None;
        }

        *self.partial_slot(entry.speaker) = None;
        if entry.text.trim().is_empty() {
            return None;
        }
        self.entries.push(entry);
        self.entries.last()
    }

    /// Drop the in-flight partial for a speaker (cancelled turn)
    pub fn discard_partial(&mut self, speaker: Speaker) {
        *self.partial_slot(speaker) = None;
    }

    pub fn discard_partials(&mut self) {
        self.user_partial = None;
        self.interviewer_partial = None;
    }

    /// Full ordered list of finalized entries
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn partial(&self, speaker: Speaker) -> Option<&TranscriptEntry> {
        match speaker {
            Speaker::User => self.user_partial.as_ref(),
            Speaker::Interviewer => self.interviewer_partial.as_ref(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn partial_slot(&mut self, speaker: Speaker) -> &mut Option<TranscriptEntry> {
        match speaker {
            Speaker::User => &mut self.user_partial,
            Speaker::Interviewer => &mut self.interviewer_partial,
        }
    }
}

/// Render transcript entries as a Markdown document, in log order
pub fn render_markdown(title: &str, entries: &[TranscriptEntry]) -> String {
    let mut out = format!("# {}\n\n", title);
    for entry in entries {
        out.push_str(&format!(
            "**{}** ({}): {}\n\n",
            entry.speaker,
            entry.timestamp.format("%H:%M:%S"),
            entry.text.trim()
        ));
    }
    out
}
