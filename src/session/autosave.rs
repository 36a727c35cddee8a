//! Periodic dirty-checked persistence of the session artifact
//!
//! The pump only reads the session through a `watch` channel published by
//! the controller; it never mutates the session.

use super::model::Artifact;
use crate::api::{InterviewApi, InterviewUpdate};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// The part of the session the pump persists
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SaveState {
    pub artifact: Artifact,
    pub elapsed_seconds: u64,
}

impl SaveState {
    pub(crate) fn to_update(&self) -> InterviewUpdate {
        InterviewUpdate::snapshot(&self.artifact, self.elapsed_seconds)
    }

    /// Canonical serialization used for the dirty-check
    pub(crate) fn serialize(&self) -> String {
        // Serializing a struct of strings, integers and JSON values can't fail
        serde_json::to_string(&self.to_update()).unwrap_or_default()
    }
}

/// Tracks the last successfully persisted serialization
#[derive(Debug, Default)]
pub(crate) struct DirtyTracker {
    last_saved: Option<String>,
    in_flight: bool,
}

impl DirtyTracker {
    /// Start from a state already known to be persisted
    pub(crate) fn saved(serialized: String) -> Self {
        Self {
            last_saved: Some(serialized),
            in_flight: false,
        }
    }

    /// Decide whether a tick should send. Returns the payload to send, or
    /// `None` when nothing changed or a request is still outstanding.
    pub(crate) fn begin(&mut self, serialized: String) -> Option<String> {
        if self.in_flight {
            return None;
        }
        if self.last_saved.as_deref() == Some(serialized.as_str()) {
            return None;
        }
        self.in_flight = true;
        Some(serialized)
    }

    /// Record the outcome. The snapshot only advances to what was sent, and
    /// only on success.
    pub(crate) fn complete(&mut self, sent: String, ok: bool) {
        self.in_flight = false;
        if ok {
            self.last_saved = Some(sent);
        }
    }

    #[cfg(test)]
    pub(crate) fn last_saved(&self) -> Option<&str> {
        self.last_saved.as_deref()
    }
}

pub(crate) struct AutosavePump {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl AutosavePump {
    /// Spawn the pump. When `baseline_saved` is set, the current state is
    /// treated as already persisted and the first tick only sends on change.
    pub(crate) fn start(
        session_id: String,
        api: Arc<dyn InterviewApi>,
        state: watch::Receiver<SaveState>,
        period: Duration,
        baseline_saved: bool,
    ) -> Self {
        let tracker = if baseline_saved {
            DirtyTracker::saved(state.borrow().serialize())
        } else {
            DirtyTracker::default()
        };
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run_pump(
            session_id,
            api,
            state,
            period,
            tracker,
            shutdown_rx,
        ));
        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Stop ticking. An in-flight request is allowed to finish first.
    /// Safe to call repeatedly.
    pub(crate) async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Autosave task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for AutosavePump {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[tracing::instrument(skip(api, state, tracker, shutdown_rx), fields(session_id = %session_id))]
async fn run_pump(
    session_id: String,
    api: Arc<dyn InterviewApi>,
    state: watch::Receiver<SaveState>,
    period: Duration,
    mut tracker: DirtyTracker,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    info!(period_secs = period.as_secs(), "Autosave started");
    let mut ticker = interval_at(Instant::now() + period, period);
    // Ticks that fall due during a request are dropped rather than queued
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => {}
        }

        let snapshot = state.borrow().clone();
        let Some(sent) = tracker.begin(snapshot.serialize()) else {
            debug!("Autosave skipped, nothing changed");
            continue;
        };

        match api.update(&session_id, &snapshot.to_update()).await {
            Ok(()) => {
                debug!(elapsed = snapshot.elapsed_seconds, "Autosaved");
                tracker.complete(sent, true);
            }
            Err(e) => {
                warn!("Autosave failed, will retry on next tick: {}", e);
                tracker.complete(sent, false);
            }
        }
    }
    debug!("Autosave stopped");
}
