//! One-time spoken introduction of the interview problem
//!
//! The introduction is fetched at most once per session and played as soon
//! as it is ready and the voice channel is listening. A durable flag keeps a
//! reloaded session from hearing it again; the flag is written when playback
//! is scheduled, not when it finishes.

use crate::api::{IntroduceRequest, IntroduceResponse};
use crate::error::ApiError;
use crate::flag_store::{intro_played_key, FlagStore};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    /// Already played in an earlier run, or skipped for a resumed session
    Skipped,
    NotFetched,
    Fetching,
    Ready(String),
    Scheduled,
    /// Fetch failed or returned nothing playable
    Unavailable,
}

pub(crate) struct IntroductionCache {
    session_id: String,
    question_context: String,
    flags: Arc<dyn FlagStore>,
    phase: Phase,
}

impl IntroductionCache {
    pub(crate) fn new(
        session_id: &str,
        question_context: String,
        resumed: bool,
        flags: Arc<dyn FlagStore>,
    ) -> Self {
        let key = intro_played_key(session_id);
        let phase = if flags.is_set(&key) {
            debug!(session_id = %session_id, "Introduction already played");
            Phase::Skipped
        } else if resumed {
            info!(session_id = %session_id, "Resumed session, skipping introduction");
            if let Err(e) = flags.set(&key) {
                warn!("Failed to record skipped introduction: {}", e);
            }
            Phase::Skipped
        } else {
            Phase::NotFetched
        };
        Self {
            session_id: session_id.to_string(),
            question_context,
            flags,
            phase,
        }
    }

    /// The request to issue, the first time only. Playback goes through
    /// the realtime session, so only the text is requested.
    pub(crate) fn begin_fetch(&mut self) -> Option<IntroduceRequest> {
        if self.phase != Phase::NotFetched {
            return None;
        }
        self.phase = Phase::Fetching;
        Some(IntroduceRequest {
            current_question: self.question_context.clone(),
            include_audio: false,
        })
    }

    pub(crate) fn fetched(&mut self, result: Result<IntroduceResponse, ApiError>) {
        if self.phase != Phase::Fetching {
            return;
        }
        self.phase = match result {
            Ok(IntroduceResponse {
                success: true,
                text: Some(text),
                ..
            }) if !text.trim().is_empty() => {
                info!(session_id = %self.session_id, "Introduction ready");
                Phase::Ready(text)
            }
            Ok(_) => {
                warn!(session_id = %self.session_id, "Introduction service returned no text");
                Phase::Unavailable
            }
            Err(e) => {
                warn!(session_id = %self.session_id, "Failed to fetch introduction: {}", e);
                Phase::Unavailable
            }
        };
    }

    /// Hand out the payload for playback once both it and the voice channel
    /// are ready. Records the durable flag before returning.
    pub(crate) fn take_for_playback(&mut self, voice_listening: bool) -> Option<String> {
        if !voice_listening {
            return None;
        }
        let Phase::Ready(text) = &self.phase else {
            return None;
        };
        let text = text.clone();
        self.phase = Phase::Scheduled;
        if let Err(e) = self.flags.set(&intro_played_key(&self.session_id)) {
            error!("Failed to record introduction as played: {}", e);
        }
        Some(text)
    }

    /// The voice channel refused the playback; keep the payload for the next
    /// time it is listening
    pub(crate) fn requeue(&mut self, text: String) {
        if self.phase == Phase::Scheduled {
            self.phase = Phase::Ready(text);
        }
    }

    pub(crate) fn is_skipped(&self) -> bool {
        self.phase == Phase::Skipped
    }

    #[cfg(test)]
    pub(crate) fn was_scheduled(&self) -> bool {
        self.phase == Phase::Scheduled
    }
}
