//! JSON/HTTP client for the interview backend.
//!
//! One client serves every collaborator trait. Only idempotent reads are
//! retried here; writes are left to their callers (autosave retries by
//! ticking again).

use super::types::{
    CreateEvaluationRequest, EndInterviewRequest, EvaluationCreated, ExecuteRequest,
    ExecuteResponse, IntroduceRequest, IntroduceResponse, InterviewRecord, InterviewUpdate,
    TestCaseResult,
};
use super::{CodeExecutor, EvaluationRequester, IntroductionSource, InterviewApi};
use crate::config::{ApiConfig, Secret};
use crate::error::ApiError;
use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Initial delay between retries (doubles with each attempt).
const INITIAL_RETRY_DELAY_MS: u64 = 1000;

/// Client for the interview backend REST API.
pub struct HttpApiClient {
    base_url: Url,
    api_key: Secret,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpApiClient {
    /// Create a new client from configuration.
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client for HttpApiClient")?;

        // Url::join drops the last path segment unless the base ends with '/'
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).context("Invalid API base URL")?;

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            max_retries: config.load_retries,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path)?)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.header("Authorization", format!("Bearer {}", self.api_key.expose()))
        }
    }

    /// Send a request and decode a JSON body, mapping HTTP failures to `ApiError`.
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, ApiError> {
        let response = self.authorize(request).send().await?;
        let response = Self::check_status(response, what).await?;
        response.json::<T>().await.map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse {} response: {}", what, e))
        })
    }

    /// Send a request whose body we do not need.
    async fn send_empty(&self, request: reqwest::RequestBuilder, what: &str) -> Result<(), ApiError> {
        let response = self.authorize(request).send().await?;
        Self::check_status(response, what).await?;
        Ok(())
    }

    async fn check_status(
        response: reqwest::Response,
        what: &str,
    ) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(what.to_string()));
        }
        let message = response.text().await.unwrap_or_default();
        Err(ApiError::ServerError {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl InterviewApi for HttpApiClient {
    /// Fetch a session and its question, retrying transient failures.
    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> Result<InterviewRecord, ApiError> {
        let url = self.endpoint(&format!("interviews/{}", id))?;
        let mut retry_delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS);
        let mut attempt = 0;

        loop {
            let result = self
                .send_json::<InterviewRecord>(self.client.get(url.clone()), "interview")
                .await;

            match result {
                Ok(record) => {
                    if attempt > 0 {
                        info!(attempt = attempt, "Interview fetch succeeded after retry");
                    }
                    return Ok(record);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        error = %e,
                        attempt = attempt,
                        max_retries = self.max_retries,
                        delay_ms = retry_delay.as_millis(),
                        "Retrying interview fetch after transient failure"
                    );
                    tokio::time::sleep(retry_delay).await;
                    retry_delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    #[instrument(skip(self, update))]
    async fn update(&self, id: &str, update: &InterviewUpdate) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("interviews/{}", id))?;
        self.send_empty(self.client.patch(url).json(update), "interview update")
            .await?;
        debug!("Interview updated");
        Ok(())
    }

    #[instrument(skip(self, request), fields(reason = %request.reason))]
    async fn end(&self, id: &str, request: &EndInterviewRequest) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("interviews/{}/end", id))?;
        self.send_empty(self.client.post(url).json(request), "interview end")
            .await?;
        info!("Interview ended");
        Ok(())
    }
}

#[async_trait]
impl CodeExecutor for HttpApiClient {
    #[instrument(skip(self, request), fields(execution_type = ?request.execution_type, tests = request.test_cases.len()))]
    async fn execute(&self, request: &ExecuteRequest) -> Result<Vec<TestCaseResult>, ApiError> {
        let url = self.endpoint("execute")?;
        let response: ExecuteResponse = self
            .send_json(self.client.post(url).json(request), "execute")
            .await?;
        Ok(response.results)
    }
}

#[async_trait]
impl EvaluationRequester for HttpApiClient {
    #[instrument(skip(self))]
    async fn create(&self, interview_id: &str) -> Result<String, ApiError> {
        let url = self.endpoint("evaluations")?;
        let body = CreateEvaluationRequest {
            interview_id: interview_id.to_string(),
        };
        let created: EvaluationCreated = self
            .send_json(self.client.post(url).json(&body), "evaluation")
            .await?;
        Ok(created.id)
    }
}

#[async_trait]
impl IntroductionSource for HttpApiClient {
    #[instrument(skip(self, request), fields(include_audio = request.include_audio))]
    async fn introduce(&self, request: &IntroduceRequest) -> Result<IntroduceResponse, ApiError> {
        let url = self.endpoint("voice/introduce")?;
        self.send_json(self.client.post(url).json(request), "introduction")
            .await
    }
}
