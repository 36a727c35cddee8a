//! Session wall clock
//!
//! Ticks once per period while the session is active, incrementing elapsed
//! seconds by exactly one per tick. On reaching the limit it emits a single
//! `Expired` event and stops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerEvent {
    Tick { elapsed: u64 },
    /// Elapsed reached the limit; fired at most once
    Expired { elapsed: u64 },
}

/// Pure elapsed-time accumulator
#[derive(Debug, Clone)]
pub(crate) struct TimerState {
    elapsed: u64,
    limit: u64,
    expired: bool,
}

impl TimerState {
    pub(crate) fn new(elapsed: u64, limit: u64) -> Self {
        Self {
            elapsed,
            limit,
            expired: false,
        }
    }

    pub(crate) fn elapsed(&self) -> u64 {
        self.elapsed
    }

    /// If the limit is already reached, consume the one expiry without ticking
    pub(crate) fn expire_if_due(&mut self) -> Option<TimerEvent> {
        if !self.expired && self.elapsed >= self.limit {
            self.expired = true;
            return Some(TimerEvent::Expired {
                elapsed: self.elapsed,
            });
        }
        None
    }

    /// Advance by one tick. Returns `None` once expired.
    pub(crate) fn advance(&mut self) -> Option<TimerEvent> {
        if self.expired {
            return None;
        }
        self.elapsed += 1;
        if self.elapsed >= self.limit {
            self.expired = true;
            Some(TimerEvent::Expired {
                elapsed: self.elapsed,
            })
        } else {
            Some(TimerEvent::Tick {
                elapsed: self.elapsed,
            })
        }
    }
}

/// Handle to the running timer task
pub(crate) struct TimerService {
    handle: Option<JoinHandle<()>>,
    should_stop: Arc<AtomicBool>,
}

impl TimerService {
    /// Spawn the timer. Events are delivered on the returned receiver, which
    /// is fresh per start so stale ticks from a previous run can't leak in.
    pub(crate) fn start(
        elapsed: u64,
        limit: u64,
        period: Duration,
    ) -> (Self, mpsc::Receiver<TimerEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let should_stop = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run_timer(
            TimerState::new(elapsed, limit),
            period,
            tx,
            should_stop.clone(),
        ));
        (
            Self {
                handle: Some(handle),
                should_stop,
            },
            rx,
        )
    }

    /// Cancel the timer. Safe to call repeatedly.
    pub(crate) fn stop(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Timer stopped");
        }
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        self.stop();
    }
}

#[tracing::instrument(skip(state, tx, should_stop), fields(elapsed = state.elapsed(), limit = state.limit))]
async fn run_timer(
    mut state: TimerState,
    period: Duration,
    tx: mpsc::Sender<TimerEvent>,
    should_stop: Arc<AtomicBool>,
) {
    if let Some(event) = state.expire_if_due() {
        info!("Time limit already reached at start");
        let _ = tx.send(event).await;
        return;
    }

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if should_stop.load(Ordering::SeqCst) {
            break;
        }
        let Some(event) = state.advance() else {
            break;
        };
        if tx.send(event).await.is_err() {
            debug!("Timer receiver dropped");
            break;
        }
        if let TimerEvent::Expired { elapsed } = event {
            info!(elapsed = elapsed, "Time limit reached");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_is_monotonic_and_expires_once() {
        let mut state = TimerState::new(0, 3);
        assert_eq!(state.advance(), Some(TimerEvent::Tick { elapsed: 1 }));
        assert_eq!(state.advance(), Some(TimerEvent::Tick { elapsed: 2 }));
        assert_eq!(state.advance(), Some(TimerEvent::Expired { elapsed: 3 }));
        assert_eq!(state.advance(), None);
        assert_eq!(state.advance(), None);
        assert_eq!(state.elapsed(), 3);
    }

    #[test]
    fn test_expire_if_due_fires_once() {
        let mut state = TimerState::new(3600, 3600);
        assert_eq!(
            state.expire_if_due(),
            Some(TimerEvent::Expired { elapsed: 3600 })
        );
        assert_eq!(state.expire_if_due(), None);
        assert_eq!(state.advance(), None);

        let mut fresh = TimerState::new(10, 3600);
        assert_eq!(fresh.expire_if_due(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_ticks_then_expires_once() {
        let (_timer, mut rx) = TimerService::start(0, 3, Duration::from_secs(1));

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                TimerEvent::Tick { elapsed: 1 },
                TimerEvent::Tick { elapsed: 2 },
                TimerEvent::Expired { elapsed: 3 },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_before_first_period() {
        let (_timer, mut rx) = TimerService::start(100, 3600, Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rx.recv().await, Some(TimerEvent::Tick { elapsed: 101 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_ticks() {
        let (mut timer, mut rx) = TimerService::start(0, 3600, Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(2500)).await;
        timer.stop();
        timer.stop();
        assert!(!timer.is_running());

        let mut ticks = 0;
        while let Some(event) = rx.recv().await {
            assert!(matches!(event, TimerEvent::Tick { .. }));
            ticks += 1;
        }
        assert_eq!(ticks, 2);
    }
}
