//! Utterance endpointing: onset / offset hysteresis over classified frames.
//!
//! ## States
//!
//! ```text
//!            speech                 speech × N
//!   Idle ───────────► Armed ─────────────────────► Active ◄──┐
//!    ▲                  │ silence                   │ silence │ speech
//!    │                  ▼                           ▼         │
//!    ├──────────────── Idle                      Trailing ────┘
//!    │                                              │ silence × M
//!    └──────────────── emit Utterance ◄─────────────┘
//! ```
//!
//! Armed frames are buffered speculatively and flushed into the utterance on
//! confirmation, so the onset that triggered confirmation is never chopped.
//! Pre-onset noise (Armed → Idle) is dropped. Trailing silence is kept in
//! the utterance.

use tracing::{debug, trace};

use crate::{buffering::AudioFrame, vad::VadDecision};

/// Endpointer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Idle,
    /// Candidate speech seen, not yet confirmed.
    Armed,
    /// Confirmed utterance in progress.
    Active,
    /// Silence observed during an active utterance, counting toward the end.
    Trailing,
}

impl EndpointState {
    /// `true` while an utterance is confirmed (Active or Trailing).
    pub fn in_utterance(self) -> bool {
        matches!(self, EndpointState::Active | EndpointState::Trailing)
    }
}

/// Hysteresis thresholds, in frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointerConfig {
    /// Consecutive speech frames required for `Armed → Active`.
    pub onset_frames: u32,
    /// Consecutive non-speech frames required to close an utterance.
    pub offset_frames: u32,
    /// Force-emit an utterance once it reaches this many frames. `None` disables.
    pub max_utterance_frames: Option<u32>,
}

impl EndpointerConfig {
    /// Convert millisecond thresholds to frame counts (rounded up, at least 1).
    /// `max_utterance_ms == 0` disables the length cap.
    pub fn from_millis(frame_ms: u32, onset_ms: u32, offset_ms: u32, max_utterance_ms: u32) -> Self {
        Self {
            onset_frames: frames_for(onset_ms, frame_ms),
            offset_frames: frames_for(offset_ms, frame_ms),
            max_utterance_frames: (max_utterance_ms > 0)
                .then(|| frames_for(max_utterance_ms, frame_ms)),
        }
    }
}

impl Default for EndpointerConfig {
    /// 30 ms frames: 400 ms onset, 800 ms offset, 30 s cap.
    fn default() -> Self {
        Self::from_millis(30, 400, 800, 30_000)
    }
}

fn frames_for(ms: u32, frame_ms: u32) -> u32 {
    if frame_ms == 0 {
        return 1;
    }
    ms.div_ceil(frame_ms).max(1)
}

/// Why an utterance was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Offset threshold of trailing silence reached.
    Silence,
    /// Utterance hit `max_utterance_frames`.
    MaxLength,
    /// Client requested a flush.
    Flush,
}

/// A finished utterance handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    /// Concatenated PCM16 of every frame in the utterance.
    pub audio: Vec<u8>,
    pub frame_count: u32,
    pub sample_rate: u32,
    pub frame_ms: u32,
    pub reason: EndReason,
}

impl Utterance {
    pub fn duration_ms(&self) -> u64 {
        self.frame_count as u64 * self.frame_ms as u64
    }
}

/// Transitions reported by [`Endpointer::push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointEvent {
    /// `Idle → Armed`.
    Armed,
    /// `Armed → Idle`; the speculative onset was noise.
    Rejected,
    /// `Armed → Active`.
    Confirmed,
    /// An utterance was closed and handed over.
    Finalized(Utterance),
}

pub struct Endpointer {
    config: EndpointerConfig,
    state: EndpointState,
    /// Consecutive speech frames while Armed.
    speech_run: u32,
    /// Consecutive non-speech frames while Active / Trailing.
    silence_run: u32,
    /// Speculative onset audio (Armed only).
    pending: Vec<u8>,
    /// Confirmed utterance audio.
    utterance: Vec<u8>,
    utterance_frames: u32,
    sample_rate: u32,
    frame_ms: u32,
}

impl Endpointer {
    pub fn new(config: EndpointerConfig) -> Self {
        Self {
            config,
            state: EndpointState::Idle,
            speech_run: 0,
            silence_run: 0,
            pending: Vec::new(),
            utterance: Vec::new(),
            utterance_frames: 0,
            sample_rate: 0,
            frame_ms: 0,
        }
    }

    pub fn state(&self) -> EndpointState {
        self.state
    }

    pub fn config(&self) -> &EndpointerConfig {
        &self.config
    }

    /// Feed one classified frame and return the transitions it caused, in order.
    pub fn push(&mut self, frame: &AudioFrame, decision: VadDecision) -> Vec<EndpointEvent> {
        self.sample_rate = frame.sample_rate;
        self.frame_ms = frame.duration_ms;

        let mut events = Vec::new();
        match (self.state, decision) {
            (EndpointState::Idle, VadDecision::Speech) => {
                self.speech_run = 1;
                self.pending.clear();
                self.pending.extend_from_slice(&frame.data);
                self.state = EndpointState::Armed;
                events.push(EndpointEvent::Armed);
                self.confirm_if_ready(&mut events);
            }
            (EndpointState::Idle, VadDecision::Silence) => {}
            (EndpointState::Armed, VadDecision::Speech) => {
                self.speech_run += 1;
                self.pending.extend_from_slice(&frame.data);
                self.confirm_if_ready(&mut events);
            }
            (EndpointState::Armed, VadDecision::Silence) => {
                trace!(speech_run = self.speech_run, "onset rejected");
                self.speech_run = 0;
                self.pending.clear();
                self.state = EndpointState::Idle;
                events.push(EndpointEvent::Rejected);
            }
            (EndpointState::Active, VadDecision::Speech) => {
                self.silence_run = 0;
                self.append(frame);
            }
            (EndpointState::Active, VadDecision::Silence) => {
                self.append(frame);
                self.silence_run = 1;
                self.state = EndpointState::Trailing;
                self.finalize_if_quiet(&mut events);
            }
            (EndpointState::Trailing, VadDecision::Speech) => {
                self.silence_run = 0;
                self.append(frame);
                self.state = EndpointState::Active;
            }
            (EndpointState::Trailing, VadDecision::Silence) => {
                self.append(frame);
                self.silence_run += 1;
                self.finalize_if_quiet(&mut events);
            }
        }

        if self.state.in_utterance() {
            if let Some(max) = self.config.max_utterance_frames {
                if self.utterance_frames >= max {
                    debug!(frames = self.utterance_frames, "max utterance length reached");
                    let keep_active = self.state == EndpointState::Active;
                    if let Some(utt) = self.take_utterance(EndReason::MaxLength) {
                        events.push(EndpointEvent::Finalized(utt));
                    }
                    if keep_active {
                        // Speech is still going; keep capturing into a fresh buffer.
                        self.state = EndpointState::Active;
                    }
                }
            }
        }

        events
    }

    /// Close whatever is buffered right now (including unconfirmed onset audio)
    /// and return to Idle. `None` when nothing was buffered.
    pub fn flush(&mut self) -> Option<Utterance> {
        match self.state {
            EndpointState::Idle => None,
            EndpointState::Armed => {
                self.utterance = std::mem::take(&mut self.pending);
                self.utterance_frames = self.speech_run;
                self.take_utterance(EndReason::Flush)
            }
            EndpointState::Active | EndpointState::Trailing => {
                self.take_utterance(EndReason::Flush)
            }
        }
    }

    /// Drop all buffered audio and counters.
    pub fn reset(&mut self) {
        self.state = EndpointState::Idle;
        self.speech_run = 0;
        self.silence_run = 0;
        self.pending.clear();
        self.utterance.clear();
        self.utterance_frames = 0;
    }

    fn append(&mut self, frame: &AudioFrame) {
        self.utterance.extend_from_slice(&frame.data);
        self.utterance_frames += 1;
    }

    fn confirm_if_ready(&mut self, events: &mut Vec<EndpointEvent>) {
        if self.speech_run < self.config.onset_frames {
            return;
        }
        self.utterance = std::mem::take(&mut self.pending);
        self.utterance_frames = self.speech_run;
        self.speech_run = 0;
        self.silence_run = 0;
        self.state = EndpointState::Active;
        debug!(onset_frames = self.utterance_frames, "speech confirmed");
        events.push(EndpointEvent::Confirmed);
    }

    fn finalize_if_quiet(&mut self, events: &mut Vec<EndpointEvent>) {
        if self.silence_run < self.config.offset_frames {
            return;
        }
        if let Some(utt) = self.take_utterance(EndReason::Silence) {
            events.push(EndpointEvent::Finalized(utt));
        }
    }

    /// Hand the buffer over and reset to Idle. Zero-length buffers are discarded.
    fn take_utterance(&mut self, reason: EndReason) -> Option<Utterance> {
        let audio = std::mem::take(&mut self.utterance);
        let frame_count = self.utterance_frames;
        self.reset();

        if audio.is_empty() {
            debug!(?reason, "discarding empty utterance");
            return None;
        }
        debug!(
            ?reason,
            frames = frame_count,
            bytes = audio.len(),
            "utterance finalized"
        );
        Some(Utterance {
            audio,
            frame_count,
            sample_rate: self.sample_rate,
            frame_ms: self.frame_ms,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: VadDecision = VadDecision::Speech;
    const Q: VadDecision = VadDecision::Silence;

    fn cfg(onset: u32, offset: u32) -> EndpointerConfig {
        EndpointerConfig {
            onset_frames: onset,
            offset_frames: offset,
            max_utterance_frames: None,
        }
    }

    /// 4-byte frames whose content encodes their index, so ordering is checkable.
    fn frame(idx: u16) -> AudioFrame {
        let b = idx.to_le_bytes();
        AudioFrame {
            data: vec![b[0], b[1], b[0], b[1]],
            sample_rate: 1_000,
            duration_ms: 2,
        }
    }

    fn run(ep: &mut Endpointer, decisions: &[VadDecision]) -> Vec<Utterance> {
        let mut out = Vec::new();
        for (i, d) in decisions.iter().enumerate() {
            for ev in ep.push(&frame(i as u16), *d) {
                if let EndpointEvent::Finalized(u) = ev {
                    out.push(u);
                }
            }
        }
        out
    }

    /// Reference count: ≥N consecutive speech, then eventually ≥M consecutive silence.
    fn expected_emissions(decisions: &[VadDecision], n: u32, m: u32) -> usize {
        let mut count = 0;
        let mut i = 0;
        'outer: while i < decisions.len() {
            let mut run = 0;
            while i < decisions.len() {
                run = if decisions[i].is_speech() { run + 1 } else { 0 };
                i += 1;
                if run >= n {
                    break;
                }
            }
            if run < n {
                break;
            }
            let mut quiet = 0;
            while i < decisions.len() {
                quiet = if decisions[i].is_speech() { 0 } else { quiet + 1 };
                i += 1;
                if quiet >= m {
                    count += 1;
                    continue 'outer;
                }
            }
            break;
        }
        count
    }

    #[test]
    fn onset_audio_is_preserved() {
        // 5 speech frames with N=3 → all 5 in the utterance, not just 3..5.
        let mut ep = Endpointer::new(cfg(3, 2));
        let utts = run(&mut ep, &[S, S, S, S, S, Q, Q]);
        assert_eq!(utts.len(), 1);
        assert_eq!(utts[0].frame_count, 7);
        let first_idx = u16::from_le_bytes([utts[0].audio[0], utts[0].audio[1]]);
        assert_eq!(first_idx, 0);
        assert_eq!(utts[0].audio.len(), 7 * 4);
        assert_eq!(utts[0].reason, EndReason::Silence);
    }

    #[test]
    fn short_noise_burst_is_rejected() {
        let mut ep = Endpointer::new(cfg(3, 2));
        let mut events = Vec::new();
        for (i, d) in [S, S, Q].iter().enumerate() {
            events.extend(ep.push(&frame(i as u16), *d));
        }
        assert_eq!(events, vec![EndpointEvent::Armed, EndpointEvent::Rejected]);
        assert_eq!(ep.state(), EndpointState::Idle);
        assert!(run(&mut ep, &[Q, Q, Q, Q]).is_empty());
    }

    #[test]
    fn mid_sentence_pause_does_not_fragment() {
        let mut ep = Endpointer::new(cfg(2, 3));
        let utts = run(&mut ep, &[S, S, S, Q, Q, S, S, Q, Q, Q]);
        assert_eq!(utts.len(), 1);
        assert_eq!(utts[0].frame_count, 10);
    }

    #[test]
    fn transitions_follow_the_state_table() {
        let mut ep = Endpointer::new(cfg(2, 2));
        assert_eq!(ep.push(&frame(0), S), vec![EndpointEvent::Armed]);
        assert_eq!(ep.state(), EndpointState::Armed);
        assert_eq!(ep.push(&frame(1), S), vec![EndpointEvent::Confirmed]);
        assert_eq!(ep.state(), EndpointState::Active);
        assert!(ep.push(&frame(2), Q).is_empty());
        assert_eq!(ep.state(), EndpointState::Trailing);
        assert!(ep.push(&frame(3), S).is_empty());
        assert_eq!(ep.state(), EndpointState::Active);
        assert!(ep.push(&frame(4), Q).is_empty());
        let events = ep.push(&frame(5), Q);
        assert!(matches!(events.as_slice(), [EndpointEvent::Finalized(_)]));
        assert_eq!(ep.state(), EndpointState::Idle);
    }

    #[test]
    fn single_frame_onset_confirms_immediately() {
        let mut ep = Endpointer::new(cfg(1, 1));
        assert_eq!(
            ep.push(&frame(0), S),
            vec![EndpointEvent::Armed, EndpointEvent::Confirmed]
        );
        let events = ep.push(&frame(1), Q);
        assert!(matches!(events.as_slice(), [EndpointEvent::Finalized(u)] if u.frame_count == 2));
    }

    #[test]
    fn emission_count_matches_onset_offset_pairs() {
        // Deterministic pseudo-random decision streams (LCG), several seeds.
        for seed in 1u64..40 {
            let mut x = seed;
            let decisions: Vec<VadDecision> = (0..400)
                .map(|_| {
                    x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    // Bias toward runs: 60 % speech.
                    if (x >> 33) % 10 < 6 {
                        S
                    } else {
                        Q
                    }
                })
                .collect();
            for (n, m) in [(1, 1), (2, 3), (3, 2), (4, 4)] {
                let mut ep = Endpointer::new(cfg(n, m));
                let got = run(&mut ep, &decisions).len();
                assert_eq!(
                    got,
                    expected_emissions(&decisions, n, m),
                    "seed={seed} n={n} m={m}"
                );
            }
        }
    }

    #[test]
    fn identical_input_yields_identical_utterances() {
        let decisions = [Q, S, S, S, Q, S, S, Q, Q, Q, S, S, S, S, Q, Q, Q];
        let a = run(&mut Endpointer::new(cfg(3, 3)), &decisions);
        let b = run(&mut Endpointer::new(cfg(3, 3)), &decisions);
        assert_eq!(a.len(), 2);
        assert_eq!(a, b);
    }

    #[test]
    fn max_length_force_emits_and_keeps_capturing() {
        let mut ep = Endpointer::new(EndpointerConfig {
            onset_frames: 2,
            offset_frames: 2,
            max_utterance_frames: Some(4),
        });
        let utts = run(&mut ep, &[S, S, S, S, S, S, Q, Q]);
        assert_eq!(utts.len(), 2);
        assert_eq!(utts[0].reason, EndReason::MaxLength);
        assert_eq!(utts[0].frame_count, 4);
        assert_eq!(utts[1].reason, EndReason::Silence);
        assert_eq!(utts[1].frame_count, 4);
    }

    #[test]
    fn flush_returns_buffered_audio_including_unconfirmed_onset() {
        let mut ep = Endpointer::new(cfg(5, 5));
        run(&mut ep, &[S, S]);
        assert_eq!(ep.state(), EndpointState::Armed);
        let utt = ep.flush().expect("armed audio should flush");
        assert_eq!(utt.frame_count, 2);
        assert_eq!(utt.reason, EndReason::Flush);
        assert_eq!(ep.state(), EndpointState::Idle);
        assert!(ep.flush().is_none());
    }

    #[test]
    fn zero_length_frames_never_emit() {
        let mut ep = Endpointer::new(cfg(1, 1));
        let empty = AudioFrame {
            data: vec![],
            sample_rate: 16_000,
            duration_ms: 0,
        };
        let mut events = ep.push(&empty, S);
        events.extend(ep.push(&empty, Q));
        assert!(!events
            .iter()
            .any(|e| matches!(e, EndpointEvent::Finalized(_))));
        assert_eq!(ep.state(), EndpointState::Idle);
    }

    #[test]
    fn thresholds_convert_from_millis() {
        let c = EndpointerConfig::from_millis(30, 400, 800, 0);
        assert_eq!(c.onset_frames, 14);
        assert_eq!(c.offset_frames, 27);
        assert_eq!(c.max_utterance_frames, None);
        assert_eq!(EndpointerConfig::from_millis(20, 0, 10, 100).onset_frames, 1);
    }
}
