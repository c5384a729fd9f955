use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

/// Per-session counters, bumped from the reader path, the turn tasks and the
/// playback scheduler.
#[derive(Debug, Default)]
pub struct SessionDiagnostics {
    pub chunks_in: AtomicUsize,
    pub frames_classified: AtomicUsize,
    pub speech_frames: AtomicUsize,
    pub utterances_emitted: AtomicUsize,
    pub utterances_discarded: AtomicUsize,
    pub turns_started: AtomicUsize,
    pub turns_completed: AtomicUsize,
    pub turns_failed: AtomicUsize,
    pub barge_ins: AtomicUsize,
    pub playback_frames: AtomicUsize,
    pub playback_frames_dropped: AtomicUsize,
    pub malformed_messages: AtomicUsize,
}

impl SessionDiagnostics {
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicUsize, n: usize) {
        if n > 0 {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            chunks_in: self.chunks_in.load(Ordering::Relaxed),
            frames_classified: self.frames_classified.load(Ordering::Relaxed),
            speech_frames: self.speech_frames.load(Ordering::Relaxed),
            utterances_emitted: self.utterances_emitted.load(Ordering::Relaxed),
            utterances_discarded: self.utterances_discarded.load(Ordering::Relaxed),
            turns_started: self.turns_started.load(Ordering::Relaxed),
            turns_completed: self.turns_completed.load(Ordering::Relaxed),
            turns_failed: self.turns_failed.load(Ordering::Relaxed),
            barge_ins: self.barge_ins.load(Ordering::Relaxed),
            playback_frames: self.playback_frames.load(Ordering::Relaxed),
            playback_frames_dropped: self.playback_frames_dropped.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    /// Inbound audio chunks accepted.
    pub chunks_in: usize,
    pub frames_classified: usize,
    pub speech_frames: usize,
    pub utterances_emitted: usize,
    /// Utterances that produced no turn (empty transcript).
    pub utterances_discarded: usize,
    pub turns_started: usize,
    pub turns_completed: usize,
    pub turns_failed: usize,
    pub barge_ins: usize,
    /// Playback frames enqueued.
    pub playback_frames: usize,
    /// Playback frames purged by cancellation or rejected as stale.
    pub playback_frames_dropped: usize,
    pub malformed_messages: usize,
}
