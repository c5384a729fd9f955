use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    endpoint::EndpointerConfig,
    engine::{OrchestratorConfig, ReplyMode, DEFAULT_DELIMITERS},
};

/// Which endpointer transition counts as the user talking over a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BargeInTrigger {
    /// `Idle → Armed`: first speech frame. Fastest, but noise bursts cut replies.
    OnCandidate,
    /// `Armed → Active`: onset confirmed.
    OnConfirmedSpeech,
    /// New speech never cancels playback.
    Disabled,
}

/// Configuration for one [`Session`](super::Session).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Rate of inbound client audio (Hz). Default: 48000.
    pub input_sample_rate: u32,
    /// Rate the classifier and transcriber see (Hz). Default: 16000.
    pub analysis_sample_rate: u32,
    /// Analysis frame duration. Default: 30 ms.
    pub frame_ms: u32,
    /// Energy classifier RMS threshold. Default: 0.01.
    pub vad_threshold: f32,
    /// Sustained speech before an utterance is confirmed. Default: 400 ms.
    pub onset_ms: u32,
    /// Sustained silence before an utterance is closed. Default: 800 ms.
    pub offset_ms: u32,
    /// Force-close long utterances; 0 disables. Default: 30000 ms.
    pub max_utterance_ms: u32,
    /// Default: [`BargeInTrigger::OnConfirmedSpeech`].
    pub barge_in: BargeInTrigger,
    /// Default: [`ReplyMode::Streamed`].
    pub reply_mode: ReplyMode,
    /// Rate of outbound playback frames (Hz). Default: 48000.
    pub output_sample_rate: u32,
    /// Playback frame duration. Default: 20 ms.
    pub playback_frame_ms: u32,
    /// Deliver playback in real time rather than as fast as possible. Default: true.
    pub pacing: bool,
    /// Frames sent ahead of real time at the start of each reply. Default: 5.
    pub pacing_lead_frames: u32,
    /// Per-call limit for transcription / reply / synthesis. Default: 15000 ms.
    pub collaborator_timeout_ms: u64,
    /// Voice used until the client selects one. Default: `"default"`.
    pub default_voice: String,
    pub sentence_delimiters: Vec<char>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 48_000,
            analysis_sample_rate: 16_000,
            frame_ms: 30,
            vad_threshold: 0.01,
            onset_ms: 400,
            offset_ms: 800,
            max_utterance_ms: 30_000,
            barge_in: BargeInTrigger::OnConfirmedSpeech,
            reply_mode: ReplyMode::Streamed,
            output_sample_rate: 48_000,
            playback_frame_ms: 20,
            pacing: true,
            pacing_lead_frames: 5,
            collaborator_timeout_ms: 15_000,
            default_voice: "default".into(),
            sentence_delimiters: DEFAULT_DELIMITERS.to_vec(),
        }
    }
}

impl SessionConfig {
    /// Hysteresis thresholds in frames of `frame_ms`.
    pub fn endpointer(&self) -> EndpointerConfig {
        EndpointerConfig::from_millis(
            self.frame_ms,
            self.onset_ms,
            self.offset_ms,
            self.max_utterance_ms,
        )
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            reply_mode: self.reply_mode,
            collaborator_timeout: Duration::from_millis(self.collaborator_timeout_ms),
            sentence_delimiters: self.sentence_delimiters.clone(),
        }
    }
}
