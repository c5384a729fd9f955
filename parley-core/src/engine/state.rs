//! Turn state and generation bookkeeping shared by the reader path, the turn
//! tasks and the playback scheduler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ipc::{EventSink, ServerEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnState {
    Listening,
    Transcribing,
    Replying,
    Synthesizing,
    Interrupted,
}

impl TurnState {
    /// A turn task is working on this state.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            TurnState::Transcribing | TurnState::Replying | TurnState::Synthesizing
        )
    }
}

/// Monotonic generation counter plus a cancellation floor.
///
/// Generation 0 means "no turn yet". A generation is live while it is the
/// latest one issued and has not been cancelled.
#[derive(Debug, Default)]
pub struct GenerationClock {
    latest: AtomicU64,
    cancelled_through: AtomicU64,
}

impl GenerationClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next generation.
    pub fn advance(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    /// Cancel `generation` and everything older.
    pub fn cancel(&self, generation: u64) {
        self.cancelled_through.fetch_max(generation, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self, generation: u64) -> bool {
        generation <= self.cancelled_through.load(Ordering::SeqCst)
    }

    pub fn is_live(&self, generation: u64) -> bool {
        generation != 0 && generation == self.latest() && !self.is_cancelled(generation)
    }
}

#[derive(Debug)]
struct Current {
    state: TurnState,
    generation: u64,
}

/// The single `TurnState` of a session.
///
/// Every transition goes through one mutex and is checked against the
/// generation clock under that lock, so a superseded turn can never move the
/// state after a newer turn (or an interrupt) has claimed it.
#[derive(Debug)]
pub struct TurnTracker {
    clock: Arc<GenerationClock>,
    current: Mutex<Current>,
    events: EventSink,
}

impl TurnTracker {
    pub fn new(clock: Arc<GenerationClock>, events: EventSink) -> Self {
        Self {
            clock,
            current: Mutex::new(Current {
                state: TurnState::Listening,
                generation: 0,
            }),
            events,
        }
    }

    pub fn clock(&self) -> &Arc<GenerationClock> {
        &self.clock
    }

    pub fn state(&self) -> TurnState {
        self.current.lock().state
    }

    pub fn is_live(&self, generation: u64) -> bool {
        self.clock.is_live(generation)
    }

    /// Claim a new generation and enter `start`.
    pub fn begin(&self, start: TurnState) -> u64 {
        let mut cur = self.current.lock();
        let generation = self.clock.advance();
        self.set(&mut cur, generation, start);
        generation
    }

    /// Move `generation`'s turn to `to`. Returns `false` (and changes nothing)
    /// when the generation is no longer live.
    pub fn transition(&self, generation: u64, to: TurnState) -> bool {
        let mut cur = self.current.lock();
        if !self.clock.is_live(generation) {
            debug!(generation, ?to, "stale transition ignored");
            return false;
        }
        if cur.state != to {
            self.set(&mut cur, generation, to);
        }
        true
    }

    /// End `generation`'s turn: back to `Listening` if still live.
    pub fn finish(&self, generation: u64) -> bool {
        self.transition(generation, TurnState::Listening)
    }

    /// Cancel `generation` and park the session in `Interrupted`.
    pub fn interrupt(&self, generation: u64) {
        let mut cur = self.current.lock();
        self.clock.cancel(generation);
        self.set(&mut cur, generation, TurnState::Interrupted);
    }

    /// `Interrupted → Listening`. Returns whether the state changed.
    pub fn resume(&self) -> bool {
        let mut cur = self.current.lock();
        if cur.state != TurnState::Interrupted {
            return false;
        }
        let generation = cur.generation;
        self.set(&mut cur, generation, TurnState::Listening);
        true
    }

    fn set(&self, cur: &mut Current, generation: u64, state: TurnState) {
        cur.state = state;
        cur.generation = generation;
        self.events.emit(ServerEvent::TurnState { generation, state });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> (TurnTracker, tokio::sync::mpsc::UnboundedReceiver<ServerEvent>) {
        let (sink, rx) = EventSink::channel();
        (TurnTracker::new(Arc::new(GenerationClock::new()), sink), rx)
    }

    #[test]
    fn clock_liveness_follows_latest_and_cancel_floor() {
        let clock = GenerationClock::new();
        assert!(!clock.is_live(0));
        let g1 = clock.advance();
        assert!(clock.is_live(g1));
        let g2 = clock.advance();
        assert!(!clock.is_live(g1));
        assert!(clock.is_live(g2));
        clock.cancel(g2);
        assert!(clock.is_cancelled(g1));
        assert!(!clock.is_live(g2));
        let g3 = clock.advance();
        assert!(clock.is_live(g3));
    }

    #[test]
    fn stale_generation_cannot_transition() {
        let (t, _rx) = tracker();
        let g1 = t.begin(TurnState::Transcribing);
        let g2 = t.begin(TurnState::Transcribing);
        assert!(!t.finish(g1));
        assert_eq!(t.state(), TurnState::Transcribing);
        assert!(!t.transition(g1, TurnState::Replying));
        assert!(t.transition(g2, TurnState::Replying));
        assert!(t.finish(g2));
        assert_eq!(t.state(), TurnState::Listening);
    }

    #[test]
    fn interrupt_blocks_the_cancelled_turn_until_resume() {
        let (t, _rx) = tracker();
        let g = t.begin(TurnState::Replying);
        t.interrupt(g);
        assert_eq!(t.state(), TurnState::Interrupted);
        assert!(!t.transition(g, TurnState::Synthesizing));
        assert!(!t.finish(g));
        assert_eq!(t.state(), TurnState::Interrupted);
        assert!(t.resume());
        assert_eq!(t.state(), TurnState::Listening);
        assert!(!t.resume());
    }

    #[test]
    fn every_transition_is_announced() {
        let (t, mut rx) = tracker();
        let g = t.begin(TurnState::Transcribing);
        t.transition(g, TurnState::Replying);
        t.finish(g);
        let mut states = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let ServerEvent::TurnState { state, generation } = ev {
                assert_eq!(generation, g);
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![
                TurnState::Transcribing,
                TurnState::Replying,
                TurnState::Listening
            ]
        );
    }
}
