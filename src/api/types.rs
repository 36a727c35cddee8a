//! Request/response bodies for the backend RPCs

use crate::session::{
    Artifact, EndReason, InterviewSession, Question, TestCase, TranscriptEntry,
};
use serde::{Deserialize, Serialize};

/// `interviews.get` response: the session plus its question payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewRecord {
    pub interview: InterviewSession,
    pub question: Question,
}

/// `interviews.update` body; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InterviewUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drawing_data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_spent_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub increment_run_count: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_entry: Option<TranscriptEntry>,
}

impl InterviewUpdate {
    /// Full artifact + elapsed time, as sent by autosave and the final flush
    pub fn snapshot(artifact: &Artifact, elapsed_seconds: u64) -> Self {
        Self {
            code: Some(artifact.code.clone()),
            drawing_data: artifact.drawing_data.clone(),
            notes: Some(artifact.notes.clone()),
            time_spent_seconds: Some(elapsed_seconds),
            language: Some(artifact.language.clone()),
            ..Default::default()
        }
    }

    pub fn run_count_increment() -> Self {
        Self {
            increment_run_count: Some(true),
            ..Default::default()
        }
    }

    pub fn transcript(entry: TranscriptEntry) -> Self {
        Self {
            transcript_entry: Some(entry),
            ..Default::default()
        }
    }
}

/// `interviews.end` body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndInterviewRequest {
    pub reason: EndReason,
    pub time_spent_seconds: u64,
}

/// `voice/introduce` body
#[derive(Debug, Clone, Serialize)]
pub struct IntroduceRequest {
    pub current_question: String,
    pub include_audio: bool,
}

/// `voice/introduce` response
#[derive(Debug, Clone, Deserialize)]
pub struct IntroduceResponse {
    pub success: bool,
    #[serde(default)]
    pub text: Option<String>,
    /// Base64-encoded audio, present when requested and available
    #[serde(default)]
    pub audio: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    Run,
    Submit,
}

/// `execute` body
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteRequest {
    pub code: String,
    pub language: String,
    pub test_cases: Vec<TestCase>,
    pub execution_type: ExecutionType,
    pub interview_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Error,
    Timeout,
    #[serde(other)]
    Unknown,
}

/// Outcome of a single test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub status: TestStatus,
    #[serde(default)]
    pub actual_output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub execution_time_ms: Option<u64>,
}

impl TestCaseResult {
    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }

    /// Synthesised failure used when the sandbox itself could not be reached
    pub fn execution_failure(message: impl Into<String>) -> Self {
        Self {
            status: TestStatus::Error,
            actual_output: None,
            error: Some(message.into()),
            execution_time_ms: None,
        }
    }
}

/// `execute` response
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteResponse {
    pub results: Vec<TestCaseResult>,
}

/// True when there is at least one result and every result passed
pub fn all_passed(results: &[TestCaseResult]) -> bool {
    !results.is_empty() && results.iter().all(TestCaseResult::passed)
}

/// `evaluations.create` body
#[derive(Debug, Clone, Serialize)]
pub struct CreateEvaluationRequest {
    pub interview_id: String,
}

/// `evaluations.create` response
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationCreated {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_skips_absent_fields() {
        let json = serde_json::to_string(&InterviewUpdate::run_count_increment()).unwrap();
        assert_eq!(json, r#"{"increment_run_count":true}"#);
    }

    #[test]
    fn test_snapshot_update_serialization() {
        let artifact = Artifact {
            code: "print(1)".into(),
            language: "python".into(),
            drawing_data: None,
            notes: String::new(),
        };
        let json = serde_json::to_value(InterviewUpdate::snapshot(&artifact, 42)).unwrap();
        assert_eq!(json["code"], "print(1)");
        assert_eq!(json["time_spent_seconds"], 42);
        assert_eq!(json["language"], "python");
        assert!(json.get("drawing_data").is_none());
        assert!(json.get("transcript_entry").is_none());
    }

    #[test]
    fn test_end_request_serialization() {
        let json = serde_json::to_string(&EndInterviewRequest {
            reason: EndReason::Timeout,
            time_spent_seconds: 3600,
        })
        .unwrap();
        assert_eq!(json, r#"{"reason":"timeout","time_spent_seconds":3600}"#);
    }

    #[test]
    fn test_execute_response_deserialization() {
        let json = r#"{"results": [
            {"status": "passed", "actual_output": "3", "execution_time_ms": 12},
            {"status": "failed", "actual_output": "4", "error": null},
            {"status": "compile_error", "error": "SyntaxError"}
        ]}"#;
        let response: ExecuteResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.results.len(), 3);
        assert!(response.results[0].passed());
        assert_eq!(response.results[2].status, TestStatus::Unknown);
        assert!(!all_passed(&response.results));
    }

    #[test]
    fn test_all_passed_requires_results() {
        assert!(!all_passed(&[]));
        let ok = TestCaseResult {
            status: TestStatus::Passed,
            actual_output: None,
            error: None,
            execution_time_ms: None,
        };
        assert!(all_passed(&[ok.clone(), ok]));
    }

    #[test]
    fn test_introduce_response_without_audio() {
        let json = r#"{"success": true, "text": "Hi, I'm your interviewer."}"#;
        let response: IntroduceResponse = serde_json::from_str(json).unwrap();
        assert!(response.success);
        assert!(response.audio.is_none());
    }
}
