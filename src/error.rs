use crate::session::SessionStatus;
use crate::voice::VoiceState;
use thiserror::Error;

/// Transport-level errors from the backend RPCs
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ApiError {
    /// Whether retrying the same request could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ApiError::ServerError { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }
}

/// Session fetch failed; fatal to the session view
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Invalid session id: {0:?}")]
    InvalidId(String),

    #[error("Session {0} not found")]
    NotFound(String),

    #[error("Session {id} is not active (status: {status})")]
    NotActive { id: String, status: SessionStatus },

    #[error("Failed to fetch session: {0}")]
    Fetch(#[source] ApiError),
}

/// Autosave or final flush failed
#[derive(Debug, Error)]
#[error("Failed to persist session {session_id}: {source}")]
pub struct PersistenceError {
    pub session_id: String,
    #[source]
    pub source: ApiError,
}

/// Voice channel connection errors
#[derive(Debug, Error)]
pub enum VoiceChannelError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection timeout - voice service did not respond within {0} seconds")]
    ConnectionTimeout(u64),

    #[error("Voice channel is closed")]
    Closed,

    #[error("Voice channel is not ready (state: {0})")]
    NotReady(VoiceState),
}

/// Code execution sandbox failed
#[derive(Debug, Error)]
#[error("Code execution failed: {0}")]
pub struct ExecutionError(#[from] pub ApiError);

/// Grading request failed; the session stays completed
#[derive(Debug, Error)]
#[error("Failed to request evaluation: {0}")]
pub struct EvaluationError(#[from] pub ApiError);

/// Errors surfaced from explicit user actions
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session has already ended")]
    Ended,

    #[error("Session controller is no longer running")]
    ControllerGone,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Failed to end session: {0}")]
    EndRpc(#[source] ApiError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error("No evaluation to retry for this session")]
    NoEvaluation,
}

/// Local storage errors with contextual information
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Could not find a data directory")]
    NoDataDir,

    #[error("Transcript is empty")]
    EmptyTranscript,

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    WriteFile {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
