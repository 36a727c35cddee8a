//! In-memory collaborators for tests

use crate::api::{
    CodeExecutor, Collaborators, EndInterviewRequest, EvaluationRequester, ExecuteRequest,
    IntroduceRequest, IntroduceResponse, IntroductionSource, InterviewApi, InterviewRecord,
    InterviewUpdate, TestCaseResult, TestStatus,
};
use crate::error::{ApiError, StoreError, VoiceChannelError};
use crate::flag_store::FlagStore;
use crate::session::{
    Artifact, InterviewSession, Question, SessionKind, SessionStatus, TestCase,
};
use crate::voice::{VoiceCommand, VoiceHandle, VoiceNotice, VoiceState};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) const STARTER_CODE: &str = "def two_sum(nums, target):\n    pass\n";

/// A fresh session record with one visible and one hidden test case
pub(crate) fn interview_record(id: &str, kind: SessionKind, elapsed: u64) -> InterviewRecord {
    InterviewRecord {
        interview: InterviewSession {
            id: id.to_string(),
            status: SessionStatus::InProgress,
            kind,
            elapsed_seconds: elapsed,
            time_limit_seconds: 3600,
            artifact: Artifact {
                code: STARTER_CODE.to_string(),
                language: "python".to_string(),
                drawing_data: None,
                notes: String::new(),
            },
            run_count: 0,
            submit_count: 0,
            created_at: Utc::now(),
            started_at: None,
        },
        question: Question {
            id: "q1".to_string(),
            title: "Two Sum".to_string(),
            description: "Return indices of the two numbers adding up to target.".to_string(),
            starter_code: STARTER_CODE.to_string(),
            test_cases: vec![
                TestCase {
                    input: "[2,7,11,15], 9".to_string(),
                    expected_output: "[0,1]".to_string(),
                    hidden: false,
                },
                TestCase {
                    input: "[3,3], 6".to_string(),
                    expected_output: "[0,1]".to_string(),
                    hidden: true,
                },
            ],
        },
    }
}

#[derive(Default)]
pub(crate) struct FakeInterviewApi {
    record: Mutex<Option<InterviewRecord>>,
    updates: Mutex<Vec<(String, InterviewUpdate)>>,
    ends: Mutex<Vec<(String, EndInterviewRequest)>>,
    failing_updates: AtomicUsize,
    failing_ends: AtomicUsize,
    update_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    completed: AtomicUsize,
}

impl FakeInterviewApi {
    pub(crate) fn with_record(record: InterviewRecord) -> Self {
        let api = Self::default();
        *api.record.lock().unwrap() = Some(record);
        api
    }

    pub(crate) fn update_calls(&self) -> Vec<(String, InterviewUpdate)> {
        self.updates.lock().unwrap().clone()
    }

    /// Snapshot updates only (autosave and final flush)
    pub(crate) fn snapshot_calls(&self) -> Vec<InterviewUpdate> {
        self.update_calls()
            .into_iter()
            .map(|(_, update)| update)
            .filter(|update| update.time_spent_seconds.is_some())
            .collect()
    }

    pub(crate) fn end_calls(&self) -> Vec<(String, EndInterviewRequest)> {
        self.ends.lock().unwrap().clone()
    }

    /// Fail the next `n` update calls
    pub(crate) fn fail_updates(&self, n: usize) {
        self.failing_updates.store(n, Ordering::SeqCst);
    }

    pub(crate) fn fail_ends(&self, n: usize) {
        self.failing_ends.store(n, Ordering::SeqCst);
    }

    pub(crate) fn set_update_delay(&self, delay: Duration) {
        *self.update_delay.lock().unwrap() = delay;
    }

    pub(crate) fn max_concurrent_updates(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn completed_updates(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn server_error() -> ApiError {
    ApiError::ServerError {
        status: 503,
        message: "unavailable".to_string(),
    }
}

#[async_trait]
impl InterviewApi for FakeInterviewApi {
    async fn get(&self, id: &str) -> Result<InterviewRecord, ApiError> {
        self.record
            .lock()
            .unwrap()
            .clone()
            .filter(|record| record.interview.id == id)
            .ok_or_else(|| ApiError::NotFound(format!("interview {}", id)))
    }

    async fn update(&self, id: &str, update: &InterviewUpdate) -> Result<(), ApiError> {
        self.updates
            .lock()
            .unwrap()
            .push((id.to_string(), update.clone()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.update_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_updates) {
            return Err(server_error());
        }
        Ok(())
    }

    async fn end(&self, id: &str, request: &EndInterviewRequest) -> Result<(), ApiError> {
        self.ends
            .lock()
            .unwrap()
            .push((id.to_string(), request.clone()));
        if take_failure(&self.failing_ends) {
            return Err(server_error());
        }
        Ok(())
    }
}

/// Sandbox that passes or fails every test case it is given
#[derive(Default)]
pub(crate) struct FakeExecutor {
    requests: Mutex<Vec<ExecuteRequest>>,
    failing_tests: AtomicBool,
    unreachable: AtomicBool,
}

impl FakeExecutor {
    pub(crate) fn requests(&self) -> Vec<ExecuteRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn set_failing_tests(&self, failing: bool) {
        self.failing_tests.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl CodeExecutor for FakeExecutor {
    async fn execute(&self, request: &ExecuteRequest) -> Result<Vec<TestCaseResult>, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(server_error());
        }
        let status = if self.failing_tests.load(Ordering::SeqCst) {
            TestStatus::Failed
        } else {
            TestStatus::Passed
        };
        Ok(request
            .test_cases
            .iter()
            .map(|case| TestCaseResult {
                status,
                actual_output: Some(case.expected_output.clone()),
                error: None,
                execution_time_ms: Some(5),
            })
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct FakeEvaluations {
    calls: Mutex<Vec<String>>,
    failing: AtomicUsize,
}

impl FakeEvaluations {
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn fail_next(&self, n: usize) {
        self.failing.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl EvaluationRequester for FakeEvaluations {
    async fn create(&self, interview_id: &str) -> Result<String, ApiError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(interview_id.to_string());
        if take_failure(&self.failing) {
            return Err(server_error());
        }
        Ok(format!("eval-{}", calls.len()))
    }
}

pub(crate) struct FakeIntroductions {
    text: Option<String>,
    calls: AtomicUsize,
}

impl Default for FakeIntroductions {
    fn default() -> Self {
        Self {
            text: Some("Hi! Today we'll work on Two Sum.".to_string()),
            calls: AtomicUsize::new(0),
        }
    }
}

impl FakeIntroductions {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntroductionSource for FakeIntroductions {
    async fn introduce(&self, _request: &IntroduceRequest) -> Result<IntroduceResponse, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(IntroduceResponse {
            success: self.text.is_some(),
            text: self.text.clone(),
            audio: None,
        })
    }
}

#[derive(Default)]
pub(crate) struct MemoryFlagStore {
    flags: Mutex<HashSet<String>>,
}

impl FlagStore for MemoryFlagStore {
    fn is_set(&self, key: &str) -> bool {
        self.flags.lock().unwrap().contains(key)
    }

    fn set(&self, key: &str) -> Result<(), StoreError> {
        self.flags.lock().unwrap().insert(key.to_string());
        Ok(())
    }
}

/// Every fake collaborator, shared with the code under test
#[derive(Clone)]
pub(crate) struct Fakes {
    pub interviews: Arc<FakeInterviewApi>,
    pub executor: Arc<FakeExecutor>,
    pub evaluations: Arc<FakeEvaluations>,
    pub introductions: Arc<FakeIntroductions>,
    pub flags: Arc<MemoryFlagStore>,
}

impl Fakes {
    pub(crate) fn new(record: InterviewRecord) -> Self {
        Self {
            interviews: Arc::new(FakeInterviewApi::with_record(record)),
            executor: Arc::new(FakeExecutor::default()),
            evaluations: Arc::new(FakeEvaluations::default()),
            introductions: Arc::new(FakeIntroductions::default()),
            flags: Arc::new(MemoryFlagStore::default()),
        }
    }

    pub(crate) fn collaborators(&self) -> Collaborators {
        Collaborators {
            interviews: self.interviews.clone(),
            executor: self.executor.clone(),
            evaluations: self.evaluations.clone(),
            introductions: self.introductions.clone(),
        }
    }
}

/// Summary of a command received by [`FakeVoice`]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum VoiceCall {
    Connect(String),
    PlayIntroduction(String),
    Shutdown,
    Other,
}

/// Voice channel stand-in. Accepts introductions only while the published
/// state is `Listening`, like the real driver. Refused requests are recorded
/// as `Other`.
pub(crate) struct FakeVoice {
    pub handle: VoiceHandle,
    calls: Arc<Mutex<Vec<VoiceCall>>>,
    state: Arc<Mutex<VoiceState>>,
    watched_flag: Arc<Mutex<Option<(Arc<dyn FlagStore>, String)>>>,
    flag_at_playback: Arc<Mutex<Vec<bool>>>,
}

impl FakeVoice {
    pub(crate) fn spawn() -> Self {
        let (handle, mut commands) = VoiceHandle::detached();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = Arc::new(Mutex::new(VoiceState::Idle));
        let watched_flag: Arc<Mutex<Option<(Arc<dyn FlagStore>, String)>>> =
            Arc::new(Mutex::new(None));
        let flag_at_playback = Arc::new(Mutex::new(Vec::new()));

        let task_calls = calls.clone();
        let task_state = state.clone();
        let task_watched = watched_flag.clone();
        let task_flag_at_playback = flag_at_playback.clone();
        tokio::spawn(async move {
            while let Some(command) = commands.recv().await {
                let call = match command {
                    VoiceCommand::Connect { instructions } => VoiceCall::Connect(instructions),
                    VoiceCommand::PlayIntroduction { text, reply } => {
                        let state = *task_state.lock().unwrap();
                        if state == VoiceState::Listening {
                            if let Some((flags, key)) = &*task_watched.lock().unwrap() {
                                task_flag_at_playback
                                    .lock()
                                    .unwrap()
                                    .push(flags.is_set(key));
                            }
                            let _ = reply.send(Ok(()));
                            VoiceCall::PlayIntroduction(text)
                        } else {
                            let _ = reply.send(Err(VoiceChannelError::NotReady(state)));
                            VoiceCall::Other
                        }
                    }
                    VoiceCommand::Shutdown { ack } => {
                        *task_state.lock().unwrap() = VoiceState::Idle;
                        let _ = ack.send(());
                        VoiceCall::Shutdown
                    }
                    _ => VoiceCall::Other,
                };
                task_calls.lock().unwrap().push(call);
            }
        });

        Self {
            handle,
            calls,
            state,
            watched_flag,
            flag_at_playback,
        }
    }

    /// Sample `key` each time an introduction is accepted for playback
    pub(crate) fn watch_flag(&self, flags: Arc<dyn FlagStore>, key: &str) {
        *self.watched_flag.lock().unwrap() = Some((flags, key.to_string()));
    }

    pub(crate) fn flag_at_playback(&self) -> Vec<bool> {
        self.flag_at_playback.lock().unwrap().clone()
    }

    /// Publish a state change as the driver would
    pub(crate) fn set_state(&self, state: VoiceState) {
        *self.state.lock().unwrap() = state;
        self.handle.publish(VoiceNotice::State(state));
    }

    pub(crate) fn calls(&self) -> Vec<VoiceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn introductions_played(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                VoiceCall::PlayIntroduction(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn shutdowns(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == VoiceCall::Shutdown)
            .count()
    }
}
