//! Backend RPC collaborators
//!
//! The session orchestrator only talks to the backend through these traits.
//! `HttpApiClient` implements all of them over JSON/HTTP; tests substitute
//! in-memory fakes.

mod client;
mod types;

pub use client::HttpApiClient;
pub use types::{
    all_passed, EndInterviewRequest, ExecuteRequest, ExecutionType, IntroduceRequest,
    IntroduceResponse, InterviewRecord, InterviewUpdate, TestCaseResult,
};
#[cfg(test)]
pub(crate) use types::TestStatus;

use crate::error::ApiError;
use async_trait::async_trait;
use std::sync::Arc;

/// `interviews.*` RPCs
#[async_trait]
pub trait InterviewApi: Send + Sync {
    async fn get(&self, id: &str) -> Result<InterviewRecord, ApiError>;
    async fn update(&self, id: &str, update: &InterviewUpdate) -> Result<(), ApiError>;
    async fn end(&self, id: &str, request: &EndInterviewRequest) -> Result<(), ApiError>;
}

/// Code-execution sandbox
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute(&self, request: &ExecuteRequest) -> Result<Vec<TestCaseResult>, ApiError>;
}

/// Grading engine entry point; returns the evaluation id
#[async_trait]
pub trait EvaluationRequester: Send + Sync {
    async fn create(&self, interview_id: &str) -> Result<String, ApiError>;
}

/// Spoken/textual introduction generator
#[async_trait]
pub trait IntroductionSource: Send + Sync {
    async fn introduce(&self, request: &IntroduceRequest) -> Result<IntroduceResponse, ApiError>;
}

/// Bundle of collaborators handed to the session controller
#[derive(Clone)]
pub struct Collaborators {
    pub interviews: Arc<dyn InterviewApi>,
    pub executor: Arc<dyn CodeExecutor>,
    pub evaluations: Arc<dyn EvaluationRequester>,
    pub introductions: Arc<dyn IntroductionSource>,
}

impl Collaborators {
    /// Use one HTTP client for every collaborator
    pub fn http(client: HttpApiClient) -> Self {
        let client = Arc::new(client);
        Self {
            interviews: client.clone(),
            executor: client.clone(),
            evaluations: client.clone(),
            introductions: client,
        }
    }
}
