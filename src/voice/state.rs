//! Voice channel state machine
//!
//! All channel state lives in [`VoiceMachine`] and changes only through
//! [`VoiceMachine::dispatch`]. The driver feeds it commands and server
//! events, then carries out the returned effects (publish a notice, send a
//! message to the service). Inputs that make no sense in the current state
//! are rejected with [`InvalidTransition`] and leave the machine untouched.

use super::messages::ClientEvent;
use crate::session::{Speaker, TranscriptUpdate};
use chrono::Utc;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceState {
    #[default]
    Idle,
    Connecting,
    Listening,
    SpeechDetected,
    Processing,
    Speaking,
    Error,
}

impl VoiceState {
    /// Whether a live connection to the service exists
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            VoiceState::Listening
                | VoiceState::SpeechDetected
                | VoiceState::Processing
                | VoiceState::Speaking
        )
    }
}

impl fmt::Display for VoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VoiceState::Idle => "idle",
            VoiceState::Connecting => "connecting",
            VoiceState::Listening => "listening",
            VoiceState::SpeechDetected => "speech detected",
            VoiceState::Processing => "processing",
            VoiceState::Speaking => "speaking",
            VoiceState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Which microphone mode is active. At most one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListeningMode {
    #[default]
    Off,
    PushToTalk,
    AlwaysListening,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum VoiceInput {
    Connect,
    Connected,
    ConnectionLost,
    Shutdown,
    SpeechStarted,
    SpeechStopped,
    /// Candidate transcription; `text` is a delta unless final
    UserTranscript { text: String, is_final: bool },
    ResponseStarted,
    /// Interviewer transcription; `text` is a delta unless final
    InterviewerTranscript { text: String, is_final: bool },
    AudioFrame,
    ResponseDone,
    StartListening,
    StopListening,
    EnableAlwaysListening,
    DisableAlwaysListening,
    PlayIntroduction { text: String },
}

impl VoiceInput {
    fn name(&self) -> &'static str {
        match self {
            VoiceInput::Connect => "connect",
            VoiceInput::Connected => "connected",
            VoiceInput::ConnectionLost => "connection lost",
            VoiceInput::Shutdown => "shutdown",
            VoiceInput::SpeechStarted => "speech started",
            VoiceInput::SpeechStopped => "speech stopped",
            VoiceInput::UserTranscript { .. } => "user transcript",
            VoiceInput::ResponseStarted => "response started",
            VoiceInput::InterviewerTranscript { .. } => "interviewer transcript",
            VoiceInput::AudioFrame => "audio frame",
            VoiceInput::ResponseDone => "response done",
            VoiceInput::StartListening => "start listening",
            VoiceInput::StopListening => "stop listening",
            VoiceInput::EnableAlwaysListening => "enable always listening",
            VoiceInput::DisableAlwaysListening => "disable always listening",
            VoiceInput::PlayIntroduction { .. } => "play introduction",
        }
    }
}

/// Work the driver performs after a transition
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum VoiceEffect {
    State(VoiceState),
    Mode(ListeningMode),
    Transcript(TranscriptUpdate),
    PartialDiscarded(Speaker),
    Send(ClientEvent),
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("Invalid voice transition: {input} while {state}")]
pub(crate) struct InvalidTransition {
    pub state: VoiceState,
    pub input: &'static str,
}

#[derive(Debug, Default)]
pub(crate) struct VoiceMachine {
    state: VoiceState,
    mode: ListeningMode,
    user_partial: String,
    interviewer_partial: String,
    // Set when the candidate's current turn was cancelled; late transcription
    // for that turn is dropped until the next speech start
    user_turn_cancelled: bool,
}

impl VoiceMachine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn state(&self) -> VoiceState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn mode(&self) -> ListeningMode {
        self.mode
    }

    /// Whether candidate audio should be forwarded to the service
    pub(crate) fn mic_open(&self) -> bool {
        self.mode != ListeningMode::Off && self.state.is_connected()
    }

    pub(crate) fn dispatch(
        &mut self,
        input: VoiceInput,
    ) -> Result<Vec<VoiceEffect>, InvalidTransition> {
        use VoiceState::*;

        let mut effects = Vec::new();
        match (self.state, input) {
            (Idle | Error, VoiceInput::Connect) => self.set_state(Connecting, &mut effects),
            (Connecting, VoiceInput::Connected) => self.set_state(Listening, &mut effects),
            (state, VoiceInput::ConnectionLost) if state != Idle => {
                self.discard_partials(&mut effects);
                self.set_state(Error, &mut effects);
            }
            (_, VoiceInput::Shutdown) => {
                self.discard_partials(&mut effects);
                self.set_mode(ListeningMode::Off, &mut effects);
                self.set_state(Idle, &mut effects);
            }

            (Listening, VoiceInput::SpeechStarted) => {
                self.user_turn_cancelled = false;
                self.user_partial.clear();
                self.set_state(SpeechDetected, &mut effects);
            }
            (SpeechDetected, VoiceInput::SpeechStopped) => {
                self.set_state(Processing, &mut effects)
            }
            (state, VoiceInput::UserTranscript { text, is_final }) if state.is_connected() => {
                if !self.user_turn_cancelled {
                    Self::transcript(
                        Speaker::User,
                        &mut self.user_partial,
                        text,
                        is_final,
                        &mut effects,
                    );
                }
            }

            (Listening | Processing, VoiceInput::ResponseStarted) => {
                self.interviewer_partial.clear();
                self.set_state(Processing, &mut effects);
            }
            (Processing | Speaking, VoiceInput::AudioFrame) => {
                self.set_state(Speaking, &mut effects)
            }
            (state, VoiceInput::InterviewerTranscript { text, is_final })
                if state.is_connected() =>
            {
                Self::transcript(
                    Speaker::Interviewer,
                    &mut self.interviewer_partial,
                    text,
                    is_final,
                    &mut effects,
                );
                if state == Processing {
                    self.set_state(Speaking, &mut effects);
                }
            }
            (Processing | Speaking, VoiceInput::ResponseDone) => {
                // A response that ends without a final transcript was cut short
                if !self.interviewer_partial.is_empty() {
                    self.interviewer_partial.clear();
                    effects.push(VoiceEffect::PartialDiscarded(Speaker::Interviewer));
                }
                self.set_state(Listening, &mut effects);
            }

            (state, VoiceInput::StartListening) => {
                if state == Speaking {
                    effects.push(VoiceEffect::Send(ClientEvent::ResponseCancel));
                    if !self.interviewer_partial.is_empty() {
                        self.interviewer_partial.clear();
                        effects.push(VoiceEffect::PartialDiscarded(Speaker::Interviewer));
                    }
                    self.set_state(Listening, &mut effects);
                }
                self.set_mode(ListeningMode::PushToTalk, &mut effects);
            }
            (_, VoiceInput::StopListening) => {
                self.cancel_user_turn(&mut effects);
                self.set_mode(ListeningMode::Off, &mut effects);
            }
            (_, VoiceInput::EnableAlwaysListening) => {
                self.set_mode(ListeningMode::AlwaysListening, &mut effects)
            }
            (_, VoiceInput::DisableAlwaysListening) => {
                if self.mode == ListeningMode::AlwaysListening {
                    self.cancel_user_turn(&mut effects);
                    self.set_mode(ListeningMode::Off, &mut effects);
                }
            }

            (Listening, VoiceInput::PlayIntroduction { text }) => {
                effects.push(VoiceEffect::Send(ClientEvent::introduction(&text)));
                effects.push(VoiceEffect::Send(ClientEvent::ResponseCreate));
                self.set_state(Processing, &mut effects);
            }

            (state, input) => {
                return Err(InvalidTransition {
                    state,
                    input: input.name(),
                })
            }
        }
        Ok(effects)
    }

    fn set_state(&mut self, next: VoiceState, effects: &mut Vec<VoiceEffect>) {
        if self.state != next {
            self.state = next;
            effects.push(VoiceEffect::State(next));
        }
    }

    fn set_mode(&mut self, next: ListeningMode, effects: &mut Vec<VoiceEffect>) {
        if self.mode != next {
            self.mode = next;
            effects.push(VoiceEffect::Mode(next));
        }
    }

    fn transcript(
        speaker: Speaker,
        partial: &mut String,
        text: String,
        is_final: bool,
        effects: &mut Vec<VoiceEffect>,
    ) {
        let text = if is_final {
            partial.clear();
            text
        } else {
            partial.push_str(&text);
            partial.clone()
        };
        effects.push(VoiceEffect::Transcript(TranscriptUpdate {
            speaker,
            text,
            is_final,
            timestamp: Utc::now(),
        }));
    }

    /// Abandon the candidate's in-flight utterance without closing the
    /// connection
    fn cancel_user_turn(&mut self, effects: &mut Vec<VoiceEffect>) {
        let mid_utterance = self.state == VoiceState::SpeechDetected;
        if mid_utterance {
            effects.push(VoiceEffect::Send(ClientEvent::InputAudioBufferClear));
            self.set_state(VoiceState::Listening, effects);
        }
        if mid_utterance || !self.user_partial.is_empty() {
            self.user_turn_cancelled = true;
            self.user_partial.clear();
            effects.push(VoiceEffect::PartialDiscarded(Speaker::User));
        }
    }

    fn discard_partials(&mut self, effects: &mut Vec<VoiceEffect>) {
        if !self.user_partial.is_empty() {
            self.user_partial.clear();
            effects.push(VoiceEffect::PartialDiscarded(Speaker::User));
        }
        if !self.interviewer_partial.is_empty() {
            self.interviewer_partial.clear();
            effects.push(VoiceEffect::PartialDiscarded(Speaker::Interviewer));
        }
    }
}
