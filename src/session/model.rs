//! Interview session data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an interview session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::InProgress => write!(f, "in_progress"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Interview track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    #[default]
    Coding,
    SystemDesign,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Submit,
    Timeout,
    GiveUp,
}

impl EndReason {
    /// Status the session lands in for this reason
    pub fn terminal_status(self) -> SessionStatus {
        match self {
            EndReason::Submit | EndReason::Timeout => SessionStatus::Completed,
            EndReason::GiveUp => SessionStatus::Abandoned,
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Submit => write!(f, "submit"),
            EndReason::Timeout => write!(f, "timeout"),
            EndReason::GiveUp => write!(f, "give_up"),
        }
    }
}

/// The user-produced content: code for coding sessions, drawing + notes for
/// system design sessions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drawing_data: Option<serde_json::Value>,
    #[serde(default)]
    pub notes: String,
}

impl Artifact {
    /// Whether the user has produced anything beyond the starter code
    pub fn has_progress(&self, starter_code: &str) -> bool {
        let code = self.code.trim();
        let code_edited = !code.is_empty() && code != starter_code.trim();
        let has_drawing = match &self.drawing_data {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Array(elements)) => !elements.is_empty(),
            Some(serde_json::Value::Object(map)) => map
                .get("elements")
                .and_then(|e| e.as_array())
                .map(|e| !e.is_empty())
                .unwrap_or(!map.is_empty()),
            Some(_) => true,
        };
        code_edited || has_drawing || !self.notes.trim().is_empty()
    }

    /// Merge a partial update into this artifact
    pub fn apply(&mut self, patch: ArtifactPatch) {
        if let Some(code) = patch.code {
            self.code = code;
        }
        if let Some(language) = patch.language {
            self.language = language;
        }
        if let Some(drawing) = patch.drawing_data {
            self.drawing_data = Some(drawing);
        }
        if let Some(notes) = patch.notes {
            self.notes = notes;
        }
    }
}

/// Partial artifact update from the presentation layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactPatch {
    pub code: Option<String>,
    pub language: Option<String>,
    pub drawing_data: Option<serde_json::Value>,
    pub notes: Option<String>,
}

impl ArtifactPatch {
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Default::default()
        }
    }

    pub fn notes(notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
            ..Default::default()
        }
    }

    pub fn language(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_none()
            && self.language.is_none()
            && self.drawing_data.is_none()
            && self.notes.is_none()
    }
}

/// One interview attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewSession {
    pub id: String,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub kind: SessionKind,
    #[serde(default, rename = "time_spent_seconds")]
    pub elapsed_seconds: u64,
    #[serde(rename = "time_limit_seconds")]
    pub time_limit_seconds: u64,
    #[serde(flatten)]
    pub artifact: Artifact,
    #[serde(default)]
    pub run_count: u32,
    #[serde(default)]
    pub submit_count: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl InterviewSession {
    pub fn remaining_seconds(&self) -> u64 {
        self.time_limit_seconds.saturating_sub(self.elapsed_seconds)
    }
}

/// A single test case attached to a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub hidden: bool,
}

/// Question/problem payload loaded alongside the session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub starter_code: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

impl Question {
    pub fn visible_test_cases(&self) -> Vec<TestCase> {
        self.test_cases.iter().filter(|t| !t.hidden).cloned().collect()
    }

    /// Short context string handed to the voice interviewer
    pub fn context(&self) -> String {
        if self.description.is_empty() {
            self.title.clone()
        } else {
            format!("{}\n\n{}", self.title, self.description)
        }
    }
}

/// Whether a session id is a local placeholder that must never be persisted
pub fn is_ephemeral_id(id: &str, prefix: &str) -> bool {
    !prefix.is_empty() && id.starts_with(prefix)
}

/// Session ids are opaque but must be non-empty and URL-path safe
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Format seconds as `mm:ss` (or `h:mm:ss` past an hour)
pub fn format_clock(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_deserialization() {
        let json = r#"{
            "id": "abc123",
            "status": "in_progress",
            "kind": "system_design",
            "time_spent_seconds": 120,
            "time_limit_seconds": 3600,
            "code": "",
            "language": "python",
            "notes": "load balancer first",
            "run_count": 2,
            "created_at": "2026-10-01T12:00:00Z"
        }"#;
        let session: InterviewSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.id, "abc123");
        assert_eq!(session.kind, SessionKind::SystemDesign);
        assert_eq!(session.elapsed_seconds, 120);
        assert_eq!(session.artifact.notes, "load balancer first");
        assert_eq!(session.submit_count, 0);
        assert!(session.started_at.is_none());
        assert_eq!(session.remaining_seconds(), 3480);
    }

    #[test]
    fn test_artifact_progress_ignores_starter_code() {
        let starter = "def solve():\n    pass\n";
        let mut artifact = Artifact {
            code: starter.to_string(),
            ..Default::default()
        };
        assert!(!artifact.has_progress(starter));

        artifact.code = "def solve():\n    return 42\n".into();
        assert!(artifact.has_progress(starter));
    }

    #[test]
    fn test_artifact_progress_drawing_and_notes() {
        let mut artifact = Artifact {
            drawing_data: Some(json!({"elements": []})),
            ..Default::default()
        };
        assert!(!artifact.has_progress(""));

        artifact.drawing_data = Some(json!({"elements": [{"type": "rectangle"}]}));
        assert!(artifact.has_progress(""));

        let notes_only = Artifact {
            notes: "cache in front of db".into(),
            ..Default::default()
        };
        assert!(notes_only.has_progress(""));
    }

    #[test]
    fn test_apply_patch_merges_only_present_fields() {
        let mut artifact = Artifact {
            code: "a".into(),
            language: "python".into(),
            drawing_data: None,
            notes: "n".into(),
        };
        artifact.apply(ArtifactPatch::code("b"));
        assert_eq!(artifact.code, "b");
        assert_eq!(artifact.language, "python");
        assert_eq!(artifact.notes, "n");

        artifact.apply(ArtifactPatch::language("rust"));
        assert_eq!(artifact.language, "rust");
        assert_eq!(artifact.code, "b");
    }

    #[test]
    fn test_end_reason_status() {
        assert_eq!(EndReason::Submit.terminal_status(), SessionStatus::Completed);
        assert_eq!(EndReason::Timeout.terminal_status(), SessionStatus::Completed);
        assert_eq!(EndReason::GiveUp.terminal_status(), SessionStatus::Abandoned);
        assert_eq!(
            serde_json::to_string(&EndReason::GiveUp).unwrap(),
            "\"give_up\""
        );
    }

    #[test]
    fn test_session_ids() {
        assert!(is_valid_session_id("abc-123_x"));
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("../etc"));
        assert!(is_ephemeral_id("local-17", "local-"));
        assert!(!is_ephemeral_id("17", "local-"));
        assert!(!is_ephemeral_id("local-17", ""));
    }

    #[test]
    fn test_visible_test_cases() {
        let question = Question {
            test_cases: vec![
                TestCase {
                    input: "1".into(),
                    expected_output: "1".into(),
                    hidden: false,
                },
                TestCase {
                    input: "2".into(),
                    expected_output: "4".into(),
                    hidden: true,
                },
            ],
            ..Default::default()
        };
        assert_eq!(question.visible_test_cases().len(), 1);
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(125), "02:05");
        assert_eq!(format_clock(3725), "1:02:05");
    }
}
