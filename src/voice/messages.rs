//! Realtime interviewer protocol messages
//!
//! JSON events exchanged with the realtime voice service over the websocket.

use super::state::VoiceInput;
use serde::{Deserialize, Serialize};

/// Model used to transcribe the candidate's speech
pub const INPUT_TRANSCRIBE_MODEL: &str = "whisper-1";

/// Messages sent to the realtime service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub(crate) enum ClientEvent {
    /// Session configuration sent after every (re)connect
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },
    /// Append audio data to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
    /// Drop uncommitted input audio (cancelled turn)
    #[serde(rename = "input_audio_buffer.clear")]
    InputAudioBufferClear,
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
    /// Ask the interviewer to speak
    #[serde(rename = "response.create")]
    ResponseCreate,
    /// Interrupt the interviewer's in-progress response
    #[serde(rename = "response.cancel")]
    ResponseCancel,
}

impl ClientEvent {
    /// Instruction item telling the interviewer to deliver the introduction
    pub(crate) fn introduction(text: &str) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem {
                item_type: "message".to_string(),
                role: "system".to_string(),
                content: vec![ContentPart {
                    part_type: "input_text".to_string(),
                    text: format!(
                        "Greet the candidate and introduce the problem by saying the following, \
                         then wait for them to respond:\n\n{}",
                        text
                    ),
                }],
            },
        }
    }
}

/// Session configuration for the realtime interviewer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct SessionConfig {
    pub modalities: Vec<String>,
    /// Interviewer persona and question context
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub input_audio_transcription: TranscriptionConfig,
    pub turn_detection: TurnDetection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct TranscriptionConfig {
    pub model: String,
}

/// Turn detection configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct TurnDetection {
    /// Detection type: "server_vad" or "semantic_vad"
    #[serde(rename = "type")]
    pub detection_type: String,
    /// Audio volume threshold for speech detection (0.0-1.0)
    pub threshold: f32,
    /// Audio to include before speech starts (ms)
    pub prefix_padding_ms: u32,
    /// Silence duration to mark end of speech (ms)
    pub silence_duration_ms: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ConversationItem {
    #[serde(rename = "type")]
    pub item_type: String,
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ContentPart {
    #[serde(rename = "type")]
    pub part_type: String,
    pub text: String,
}

impl SessionConfig {
    pub fn new(instructions: &str, voice: &str) -> Self {
        Self {
            modalities: vec!["audio".to_string(), "text".to_string()],
            instructions: instructions.to_string(),
            voice: voice.to_string(),
            input_audio_format: "pcm16".to_string(),
            output_audio_format: "pcm16".to_string(),
            input_audio_transcription: TranscriptionConfig {
                model: INPUT_TRANSCRIBE_MODEL.to_string(),
            },
            turn_detection: TurnDetection {
                detection_type: "server_vad".to_string(),
                threshold: 0.5,
                prefix_padding_ms: 300,
                silence_duration_ms: 500,
            },
        }
    }
}

/// Messages received from the realtime service
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub(crate) enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated { session: Option<SessionInfo> },
    #[serde(rename = "session.updated")]
    SessionUpdated { session: Option<SessionInfo> },
    /// Voice activity detector heard the candidate start speaking
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,
    /// Partial transcription of the candidate
    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    InputTranscriptionDelta { delta: Option<String> },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted { transcript: Option<String> },
    #[serde(rename = "response.created")]
    ResponseCreated,
    /// Partial transcript of the interviewer's speech
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta { delta: Option<String> },
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone { transcript: Option<String> },
    /// Base64 PCM16 interviewer audio
    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: Option<String> },
    #[serde(rename = "response.done")]
    ResponseDone,
    #[serde(rename = "error")]
    Error { error: Option<ServerError> },
    /// Catch-all for other message types
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionInfo {
    pub id: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServerError {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub message: Option<String>,
}

impl ServerEvent {
    /// Map a server event onto a state machine input, if it drives one
    pub fn into_input(self) -> Option<VoiceInput> {
        match self {
            ServerEvent::SpeechStarted => Some(VoiceInput::SpeechStarted),
            ServerEvent::SpeechStopped => Some(VoiceInput::SpeechStopped),
            ServerEvent::InputTranscriptionDelta { delta } => {
                delta.filter(|d| !d.is_empty()).map(|text| VoiceInput::UserTranscript {
                    text,
                    is_final: false,
                })
            }
            ServerEvent::InputTranscriptionCompleted { transcript } => {
                Some(VoiceInput::UserTranscript {
                    text: transcript.unwrap_or_default(),
                    is_final: true,
                })
            }
            ServerEvent::ResponseCreated => Some(VoiceInput::ResponseStarted),
            ServerEvent::AudioTranscriptDelta { delta } => {
                delta.filter(|d| !d.is_empty()).map(|text| {
                    VoiceInput::InterviewerTranscript {
                        text,
                        is_final: false,
                    }
                })
            }
            ServerEvent::AudioTranscriptDone { transcript } => {
                Some(VoiceInput::InterviewerTranscript {
                    text: transcript.unwrap_or_default(),
                    is_final: true,
                })
            }
            ServerEvent::AudioDelta { .. } => Some(VoiceInput::AudioFrame),
            ServerEvent::ResponseDone => Some(VoiceInput::ResponseDone),
            _ => None,
        }
    }

    /// Check if this is an error message
    pub fn error_message(&self) -> Option<String> {
        match self {
            ServerEvent::Error { error } => Some(
                error
                    .as_ref()
                    .and_then(|e| e.message.clone().or_else(|| e.error_type.clone()))
                    .unwrap_or_else(|| "unknown error".to_string()),
            ),
            _ => None,
        }
    }
}
