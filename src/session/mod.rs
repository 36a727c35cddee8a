//! Interview session orchestration
//!
//! [`SessionController`] owns one interview attempt from load to
//! termination and coordinates the timer, autosave, introduction and
//! transcript around it.

mod autosave;
mod controller;
mod intro;
mod model;
mod timer;
mod transcript;

pub use controller::{
    EvaluationOutcome, SessionController, SessionEvent, SessionHandle, SubmitOutcome, Termination,
};
pub use model::{
    format_clock, Artifact, ArtifactPatch, EndReason, InterviewSession, Question, SessionStatus,
    TestCase,
};
#[cfg(test)]
pub(crate) use model::SessionKind;
pub use transcript::{render_markdown, Speaker, TranscriptEntry, TranscriptUpdate};
