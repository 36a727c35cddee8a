//! Session controller
//!
//! The controller is an actor task and the only code that mutates the
//! `InterviewSession`. Callers talk to it through a [`SessionHandle`]; the
//! timer, the autosave pump, the voice channel and the introduction fetch
//! report back to it over channels. Lifecycle transitions (submit, timeout,
//! give up) are serialized through its command queue, so exactly one of
//! them ends a session.

use super::autosave::{AutosavePump, SaveState};
use super::intro::IntroductionCache;
use super::model::{
    is_ephemeral_id, is_valid_session_id, Artifact, ArtifactPatch, EndReason, InterviewSession,
    Question, SessionKind, SessionStatus,
};
use super::timer::{TimerEvent, TimerService};
use super::transcript::{Speaker, TranscriptEntry, TranscriptLog};
use crate::api::{
    all_passed, Collaborators, EndInterviewRequest, ExecuteRequest, ExecutionType,
    IntroduceResponse, InterviewUpdate, TestCaseResult,
};
use crate::config::SessionConfig;
use crate::error::{
    ApiError, EvaluationError, ExecutionError, LoadError, PersistenceError, SessionError,
};
use crate::flag_store::FlagStore;
use crate::voice::{VoiceHandle, VoiceNotice, VoiceState};
use std::future::pending;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What became of the evaluation request after a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationOutcome {
    NotRequested,
    Requested { evaluation_id: String },
    /// The request failed; it can be retried
    Failed { message: String },
}

/// Record of how a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    pub reason: EndReason,
    pub status: SessionStatus,
    pub elapsed_seconds: u64,
    pub evaluation: EvaluationOutcome,
}

/// Result of a submit attempt
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// The submission ended the session
    Ended {
        results: Vec<TestCaseResult>,
        termination: Termination,
    },
    /// Some tests failed; the session is still active
    Rejected { results: Vec<TestCaseResult> },
}

/// Read-only snapshot of the session for presentation
#[derive(Debug, Clone)]
pub struct SessionView {
    pub id: String,
    pub question_title: String,
    pub status: SessionStatus,
    pub kind: SessionKind,
    pub elapsed_seconds: u64,
    pub time_limit_seconds: u64,
    pub remaining_seconds: u64,
    pub artifact: Artifact,
    pub run_count: u32,
    pub submit_count: u32,
    pub resumed: bool,
    pub voice_state: VoiceState,
    /// The candidate's in-flight utterance, if any
    pub user_partial: Option<String>,
    pub transcript_len: usize,
    pub termination: Option<Termination>,
}

/// Events published to the presentation layer
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Tick {
        elapsed_seconds: u64,
        remaining_seconds: u64,
    },
    IntroductionScheduled,
    Ended(Termination),
}

/// Everything needed to call the sandbox, captured at request time
struct ExecutionPlan {
    request: ExecuteRequest,
    test_count: usize,
}

enum Command {
    UpdateArtifact(ArtifactPatch),
    PlanExecution {
        execution_type: ExecutionType,
        reply: oneshot::Sender<Result<Option<ExecutionPlan>, SessionError>>,
    },
    RecordRun,
    RecordSubmit,
    End {
        reason: EndReason,
        reply: oneshot::Sender<Result<Termination, SessionError>>,
    },
    View {
        reply: oneshot::Sender<SessionView>,
    },
    Transcript {
        reply: oneshot::Sender<Vec<TranscriptEntry>>,
    },
    RetryEvaluation {
        reply: oneshot::Sender<Result<String, SessionError>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
    collaborators: Collaborators,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::ControllerGone)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await.map_err(|_| SessionError::ControllerGone)
    }

    /// Merge an edit into the session. Never touches the network.
    pub async fn update_artifact(&self, patch: ArtifactPatch) -> Result<(), SessionError> {
        if patch.is_empty() {
            return Ok(());
        }
        self.send(Command::UpdateArtifact(patch)).await
    }

    /// Run the code against the visible test cases. System design
    /// sessions have nothing to run.
    pub async fn run_code(&self) -> Result<Vec<TestCaseResult>, SessionError> {
        let plan = self
            .request(|reply| Command::PlanExecution {
                execution_type: ExecutionType::Run,
                reply,
            })
            .await??;
        let Some(plan) = plan else {
            return Ok(Vec::new());
        };
        let results = self.execute(plan).await;
        self.send(Command::RecordRun).await?;
        Ok(results)
    }

    /// Submit the solution. Coding sessions end only when every test passes;
    /// system design sessions always end.
    pub async fn submit(&self) -> Result<SubmitOutcome, SessionError> {
        let plan = self
            .request(|reply| Command::PlanExecution {
                execution_type: ExecutionType::Submit,
                reply,
            })
            .await??;
        self.send(Command::RecordSubmit).await?;

        let (results, ends_session) = match plan {
            Some(plan) => {
                let results = self.execute(plan).await;
                let passed = all_passed(&results);
                (results, passed)
            }
            None => (Vec::new(), true),
        };
        if !ends_session {
            info!(session_id = %self.session_id, "Submission rejected, tests failing");
            return Ok(SubmitOutcome::Rejected { results });
        }

        let termination = self.end(EndReason::Submit).await?;
        Ok(SubmitOutcome::Ended {
            results,
            termination,
        })
    }

    /// Abandon the session. Confirmation happens upstream.
    pub async fn give_up(&self) -> Result<Termination, SessionError> {
        self.end(EndReason::GiveUp).await
    }

    async fn end(&self, reason: EndReason) -> Result<Termination, SessionError> {
        self.request(|reply| Command::End { reason, reply }).await?
    }

    pub async fn view(&self) -> Result<SessionView, SessionError> {
        self.request(|reply| Command::View { reply }).await
    }

    /// Finalized transcript entries in arrival order
    pub async fn transcript(&self) -> Result<Vec<TranscriptEntry>, SessionError> {
        self.request(|reply| Command::Transcript { reply }).await
    }

    /// Re-request grading after a failed evaluation request
    pub async fn retry_evaluation(&self) -> Result<String, SessionError> {
        self.request(|reply| Command::RetryEvaluation { reply })
            .await?
    }

    /// Tear the session down without ending it remotely (the view is going
    /// away). Flushes pending edits first. Safe to call more than once.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    async fn execute(&self, plan: ExecutionPlan) -> Vec<TestCaseResult> {
        let ExecutionPlan {
            request,
            test_count,
        } = plan;
        match self.collaborators.executor.execute(&request).await {
            Ok(results) => results,
            Err(e) => {
                let e = ExecutionError(e);
                warn!(session_id = %self.session_id, "{}", e);
                (0..test_count.max(1))
                    .map(|_| TestCaseResult::execution_failure(e.to_string()))
                    .collect()
            }
        }
    }
}

/// A loaded session, ready to start
pub struct SessionController {
    session: InterviewSession,
    question: Question,
    resumed: bool,
    ephemeral: bool,
    config: SessionConfig,
    collaborators: Collaborators,
    voice: VoiceHandle,
    voice_rx: Option<broadcast::Receiver<VoiceNotice>>,
    voice_state: VoiceState,
    intro: IntroductionCache,
    transcript: TranscriptLog,
    save_tx: watch::Sender<SaveState>,
    timer: Option<TimerService>,
    timer_rx: Option<mpsc::Receiver<TimerEvent>>,
    autosave: Option<AutosavePump>,
    termination: Option<Termination>,
    torn_down: bool,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    /// Fetch the session and its question and decide whether it is resumed
    #[tracing::instrument(skip(collaborators, flags, voice, config))]
    pub(crate) async fn load(
        session_id: &str,
        collaborators: Collaborators,
        flags: Arc<dyn FlagStore>,
        voice: VoiceHandle,
        config: SessionConfig,
    ) -> Result<Self, LoadError> {
        if !is_valid_session_id(session_id) {
            return Err(LoadError::InvalidId(session_id.to_string()));
        }

        let record = collaborators
            .interviews
            .get(session_id)
            .await
            .map_err(|e| match e {
                ApiError::NotFound(_) => LoadError::NotFound(session_id.to_string()),
                e => LoadError::Fetch(e),
            })?;
        let session = record.interview;
        let question = record.question;

        if session.status.is_terminal() {
            return Err(LoadError::NotActive {
                id: session.id,
                status: session.status,
            });
        }

        let resumed = session.elapsed_seconds > config.resume_threshold_secs
            || session.artifact.has_progress(&question.starter_code);
        let ephemeral = is_ephemeral_id(&session.id, &config.ephemeral_prefix);
        let intro = IntroductionCache::new(&session.id, question.context(), resumed, flags);
        info!(
            session_id = %session.id,
            elapsed = session.elapsed_seconds,
            limit = session.time_limit_seconds,
            resumed,
            ephemeral,
            intro_skipped = intro.is_skipped(),
            "Session loaded"
        );

        let (save_tx, _) = watch::channel(SaveState {
            artifact: session.artifact.clone(),
            elapsed_seconds: session.elapsed_seconds,
        });
        let (events, _) = broadcast::channel(100);

        Ok(Self {
            session,
            question,
            resumed,
            ephemeral,
            config,
            collaborators,
            voice_rx: None,
            voice,
            voice_state: VoiceState::Idle,
            intro,
            transcript: TranscriptLog::new(),
            save_tx,
            timer: None,
            timer_rx: None,
            autosave: None,
            termination: None,
            torn_down: false,
            events,
        })
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Start the background loops and the actor. Returns the handle and the
    /// actor task, which finishes after shutdown.
    pub async fn start(mut self) -> (SessionHandle, JoinHandle<()>) {
        let (commands_tx, commands) = mpsc::channel(64);
        let (intro_tx, intro_rx) = mpsc::channel(1);
        let handle = SessionHandle {
            session_id: self.session.id.clone(),
            commands: commands_tx,
            events: self.events.clone(),
            collaborators: self.collaborators.clone(),
        };

        self.start_loops(true);

        self.voice_rx = Some(self.voice.subscribe());
        if let Err(e) = self.voice.connect(self.interviewer_instructions()).await {
            warn!("Voice channel unavailable: {}", e);
        }

        if let Some(request) = self.intro.begin_fetch() {
            let source = self.collaborators.introductions.clone();
            tokio::spawn(async move {
                let result = source.introduce(&request).await;
                let _ = intro_tx.send(result).await;
            });
        }

        let task = tokio::spawn(self.run(commands, intro_rx));
        (handle, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut intro_rx: mpsc::Receiver<Result<IntroduceResponse, ApiError>>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.teardown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle(command).await,
                    None => {
                        self.teardown().await;
                        break;
                    }
                },
                event = next_timer_event(&mut self.timer_rx) => match event {
                    Some(event) => self.on_timer(event).await,
                    None => self.timer_rx = None,
                },
                notice = next_notice(&mut self.voice_rx) => match notice {
                    Some(notice) => self.on_voice(notice).await,
                    None => self.voice_rx = None,
                },
                Some(result) = intro_rx.recv() => {
                    self.intro.fetched(result);
                    self.try_play_intro().await;
                }
            }
        }
        debug!(session_id = %self.session.id, "Session controller stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::UpdateArtifact(patch) => {
                if self.termination.is_some() {
                    debug!("Ignoring edit after session end");
                    return;
                }
                self.session.artifact.apply(patch);
                let artifact = self.session.artifact.clone();
                self.save_tx.send_modify(|state| state.artifact = artifact);
            }
            Command::PlanExecution {
                execution_type,
                reply,
            } => {
                let _ = reply.send(self.plan_execution(execution_type));
            }
            Command::RecordRun => {
                if self.termination.is_some() {
                    return;
                }
                self.session.run_count += 1;
                if !self.ephemeral {
                    self.persist_in_background(InterviewUpdate::run_count_increment());
                }
            }
            Command::RecordSubmit => self.session.submit_count += 1,
            Command::End { reason, reply } => {
                let _ = reply.send(self.terminate(reason).await);
            }
            Command::View { reply } => {
                let _ = reply.send(self.view());
            }
            Command::Transcript { reply } => {
                let _ = reply.send(self.transcript.entries().to_vec());
            }
            Command::RetryEvaluation { reply } => {
                let _ = reply.send(self.retry_evaluation().await);
            }
            Command::Shutdown { reply } => {
                self.teardown().await;
                let _ = reply.send(());
            }
        }
    }

    /// Build the sandbox request. `None` for a system design submission,
    /// which is reviewed without running tests.
    fn plan_execution(
        &self,
        execution_type: ExecutionType,
    ) -> Result<Option<ExecutionPlan>, SessionError> {
        if self.termination.is_some() || self.torn_down {
            return Err(SessionError::Ended);
        }
        if self.session.kind == SessionKind::SystemDesign {
            return Ok(None);
        }
        let test_cases = match execution_type {
            ExecutionType::Run => self.question.visible_test_cases(),
            ExecutionType::Submit => self.question.test_cases.clone(),
        };
        Ok(Some(ExecutionPlan {
            test_count: test_cases.len(),
            request: ExecuteRequest {
                code: self.session.artifact.code.clone(),
                language: self.session.artifact.language.clone(),
                test_cases,
                execution_type,
                interview_id: self.session.id.clone(),
            },
        }))
    }

    async fn on_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::Tick { elapsed } => {
                self.set_elapsed(elapsed);
                let _ = self.events.send(SessionEvent::Tick {
                    elapsed_seconds: elapsed,
                    remaining_seconds: self.session.remaining_seconds(),
                });
            }
            TimerEvent::Expired { elapsed } => {
                self.set_elapsed(elapsed);
                info!(session_id = %self.session.id, "Time limit reached, ending session");
                if let Err(e) = self.terminate(EndReason::Timeout).await {
                    error!("Failed to end timed out session: {}", e);
                }
            }
        }
    }

    async fn on_voice(&mut self, notice: VoiceNotice) {
        if self.termination.is_some() {
            return;
        }
        match notice {
            VoiceNotice::State(state) => {
                self.voice_state = state;
                if state == VoiceState::Listening {
                    self.try_play_intro().await;
                }
            }
            VoiceNotice::Transcript(update) => {
                if let Some(entry) = self.transcript.apply(update).cloned() {
                    debug!(speaker = %entry.speaker, "Transcript entry finalized");
                    if !self.ephemeral {
                        self.persist_in_background(InterviewUpdate::transcript(entry));
                    }
                }
            }
            VoiceNotice::PartialDiscarded(speaker) => self.transcript.discard_partial(speaker),
            VoiceNotice::Error { message } => debug!("Voice error: {}", message),
            VoiceNotice::Mode(_)
            | VoiceNotice::Reconnecting { .. }
            | VoiceNotice::Reconnected
            | VoiceNotice::ReconnectFailed => {}
        }
    }

    async fn try_play_intro(&mut self) {
        if self.termination.is_some() || self.torn_down {
            return;
        }
        let listening = self.voice_state == VoiceState::Listening;
        let Some(text) = self.intro.take_for_playback(listening) else {
            return;
        };
        match self.voice.play_introduction(text.clone()).await {
            Ok(()) => {
                info!(session_id = %self.session.id, "Introduction scheduled");
                let _ = self.events.send(SessionEvent::IntroductionScheduled);
            }
            Err(e) => {
                debug!("Introduction deferred: {}", e);
                self.intro.requeue(text);
            }
        }
    }

    /// End the session. Runs at most once; later calls return the same
    /// record without side effects.
    #[tracing::instrument(skip(self), fields(session_id = %self.session.id))]
    async fn terminate(&mut self, reason: EndReason) -> Result<Termination, SessionError> {
        if let Some(termination) = &self.termination {
            debug!("Session already ended");
            return Ok(termination.clone());
        }
        if self.torn_down {
            return Err(SessionError::Ended);
        }

        // 1. No more ticks or autosaves
        self.stop_loops().await;

        if !self.ephemeral {
            // 2. Final blocking flush
            if let Err(e) = self.flush().await {
                if reason != EndReason::Timeout {
                    error!("{}", e);
                    self.start_loops(false);
                    return Err(e.into());
                }
                error!("Final flush failed on timeout, ending anyway: {}", e);
            }

            // 3. End RPC
            let request = EndInterviewRequest {
                reason,
                time_spent_seconds: self.session.elapsed_seconds,
            };
            if let Err(e) = self
                .collaborators
                .interviews
                .end(&self.session.id, &request)
                .await
            {
                if reason != EndReason::Timeout {
                    error!("Failed to end session: {}", e);
                    self.start_loops(true);
                    return Err(SessionError::EndRpc(e));
                }
                error!("End call failed on timeout, ending locally: {}", e);
            }
        }

        // 4. Close voice, then transition
        self.voice.shutdown().await;
        self.voice_rx = None;
        self.voice_state = VoiceState::Idle;
        self.transcript.discard_partials();
        self.session.status = reason.terminal_status();
        info!(reason = %reason, status = %self.session.status, "Session ended");

        let evaluation = if self.should_evaluate(reason) {
            match self.request_evaluation().await {
                Ok(evaluation_id) => EvaluationOutcome::Requested { evaluation_id },
                Err(e) => EvaluationOutcome::Failed {
                    message: e.to_string(),
                },
            }
        } else {
            EvaluationOutcome::NotRequested
        };

        let termination = Termination {
            reason,
            status: self.session.status,
            elapsed_seconds: self.session.elapsed_seconds,
            evaluation,
        };
        self.termination = Some(termination.clone());
        let _ = self.events.send(SessionEvent::Ended(termination.clone()));
        Ok(termination)
    }

    fn should_evaluate(&self, reason: EndReason) -> bool {
        if self.ephemeral {
            return false;
        }
        match reason {
            EndReason::Submit | EndReason::Timeout => true,
            EndReason::GiveUp => {
                self.session.kind == SessionKind::SystemDesign
                    || self.config.evaluate_coding_give_up
            }
        }
    }

    async fn request_evaluation(&self) -> Result<String, EvaluationError> {
        let evaluation_id = self
            .collaborators
            .evaluations
            .create(&self.session.id)
            .await
            .map_err(EvaluationError)
            .inspect_err(|e| error!("{}", e))?;
        info!(evaluation_id = %evaluation_id, "Evaluation requested");
        Ok(evaluation_id)
    }

    async fn retry_evaluation(&mut self) -> Result<String, SessionError> {
        let Some(termination) = &self.termination else {
            return Err(SessionError::NoEvaluation);
        };
        match &termination.evaluation {
            EvaluationOutcome::NotRequested => Err(SessionError::NoEvaluation),
            EvaluationOutcome::Requested { evaluation_id } => Ok(evaluation_id.clone()),
            EvaluationOutcome::Failed { .. } => {
                let result = self.request_evaluation().await;
                if let (Ok(evaluation_id), Some(termination)) = (&result, &mut self.termination) {
                    termination.evaluation = EvaluationOutcome::Requested {
                        evaluation_id: evaluation_id.clone(),
                    };
                }
                Ok(result?)
            }
        }
    }

    /// Unmount path: stop loops, flush, close voice. Leaves the session
    /// in progress remotely. Idempotent and a no-op after the session ended.
    async fn teardown(&mut self) {
        if self.torn_down || self.termination.is_some() {
            return;
        }
        self.torn_down = true;
        self.stop_loops().await;
        if !self.ephemeral {
            if let Err(e) = self.flush().await {
                error!("Flush on teardown failed: {}", e);
            }
        }
        self.voice.shutdown().await;
        self.voice_rx = None;
        info!(session_id = %self.session.id, "Session torn down");
    }

    fn start_loops(&mut self, baseline_saved: bool) {
        let (timer, timer_rx) = TimerService::start(
            self.session.elapsed_seconds,
            self.session.time_limit_seconds,
            self.config.tick_interval(),
        );
        self.timer = Some(timer);
        self.timer_rx = Some(timer_rx);

        if !self.ephemeral {
            self.autosave = Some(AutosavePump::start(
                self.session.id.clone(),
                self.collaborators.interviews.clone(),
                self.save_tx.subscribe(),
                self.config.autosave_interval(),
                baseline_saved,
            ));
        }
    }

    async fn stop_loops(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            timer.stop();
        }
        self.timer_rx = None;
        if let Some(mut pump) = self.autosave.take() {
            pump.stop().await;
        }
    }

    async fn flush(&self) -> Result<(), PersistenceError> {
        let update = self.save_tx.borrow().to_update();
        self.collaborators
            .interviews
            .update(&self.session.id, &update)
            .await
            .map_err(|source| PersistenceError {
                session_id: self.session.id.clone(),
                source,
            })
    }

    fn persist_in_background(&self, update: InterviewUpdate) {
        let api = self.collaborators.interviews.clone();
        let session_id = self.session.id.clone();
        tokio::spawn(async move {
            if let Err(e) = api.update(&session_id, &update).await {
                warn!(session_id = %session_id, "Background update failed: {}", e);
            }
        });
    }

    fn set_elapsed(&mut self, elapsed: u64) {
        self.session.elapsed_seconds = elapsed;
        self.save_tx
            .send_modify(|state| state.elapsed_seconds = elapsed);
    }

    fn view(&self) -> SessionView {
        SessionView {
            id: self.session.id.clone(),
            question_title: self.question.title.clone(),
            status: self.session.status,
            kind: self.session.kind,
            elapsed_seconds: self.session.elapsed_seconds,
            time_limit_seconds: self.session.time_limit_seconds,
            remaining_seconds: self.session.remaining_seconds(),
            artifact: self.session.artifact.clone(),
            run_count: self.session.run_count,
            submit_count: self.session.submit_count,
            resumed: self.resumed,
            voice_state: self.voice_state,
            user_partial: self
                .transcript
                .partial(Speaker::User)
                .map(|p| p.text.clone()),
            transcript_len: self.transcript.len(),
            termination: self.termination.clone(),
        }
    }

    fn interviewer_instructions(&self) -> String {
        let track = match self.session.kind {
            SessionKind::Coding => "a coding",
            SessionKind::SystemDesign => "a system design",
        };
        format!(
            "You are a friendly but rigorous technical interviewer running {} interview. \
             Ask clarifying questions, give hints only when the candidate is stuck, and \
             never reveal the full solution.\n\nProblem:\n{}",
            track,
            self.question.context()
        )
    }
}

async fn next_timer_event(rx: &mut Option<mpsc::Receiver<TimerEvent>>) -> Option<TimerEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

async fn next_notice(rx: &mut Option<broadcast::Receiver<VoiceNotice>>) -> Option<VoiceNotice> {
    let Some(receiver) = rx else {
        return pending().await;
    };
    loop {
        match receiver.recv().await {
            Ok(notice) => return Some(notice),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Voice notices lagged"),
            Err(RecvError::Closed) => return None,
        }
    }
}
