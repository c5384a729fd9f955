//! One turn: transcribe → reply → synthesize → playback.
//!
//! The session claims a generation with [`Orchestrator::begin`] on its reader
//! path and spawns [`Orchestrator::run`]; everything slow happens inside that
//! task. Each step re-checks the generation before acting on its result, so a
//! barge-in or a newer turn silently retires this one.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::segmenter::{SentenceSegmenter, DEFAULT_DELIMITERS};
use super::state::{TurnState, TurnTracker};
use crate::{
    endpoint::Utterance,
    error::{ParleyError, Result},
    ipc::{EventSink, ServerEvent},
    playback::{PlaybackScheduler, PlaybackWriter},
    services::Collaborators,
    session::SessionDiagnostics,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    /// Wait for the whole reply, synthesize it in one go.
    Full,
    /// Synthesize sentence by sentence while the reply streams in.
    Streamed,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub reply_mode: ReplyMode,
    /// Upper bound for each collaborator call (and each streamed item).
    pub collaborator_timeout: Duration,
    pub sentence_delimiters: Vec<char>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            reply_mode: ReplyMode::Streamed,
            collaborator_timeout: Duration::from_millis(15_000),
            sentence_delimiters: DEFAULT_DELIMITERS.to_vec(),
        }
    }
}

#[derive(Debug)]
pub enum TurnInput {
    Utterance(Utterance),
    /// Typed text; recognition is skipped.
    Text(String),
}

impl TurnInput {
    fn entry_state(&self) -> TurnState {
        match self {
            TurnInput::Utterance(_) => TurnState::Transcribing,
            TurnInput::Text(_) => TurnState::Replying,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    /// Nothing was recognized; no reply attempted.
    EmptyTranscript,
    /// The reply collaborator had nothing to say.
    EmptyReply,
    /// A newer generation or a cancel took over.
    Superseded,
    /// A collaborator failed; an error event was sent.
    Failed,
}

#[derive(Clone)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    collaborators: Collaborators,
    tracker: Arc<TurnTracker>,
    playback: Arc<PlaybackScheduler>,
    events: EventSink,
    diagnostics: Arc<SessionDiagnostics>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        collaborators: Collaborators,
        tracker: Arc<TurnTracker>,
        playback: Arc<PlaybackScheduler>,
        events: EventSink,
        diagnostics: Arc<SessionDiagnostics>,
    ) -> Self {
        Self {
            config,
            collaborators,
            tracker,
            playback,
            events,
            diagnostics,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Claim the next generation for `input` and enter its first state.
    pub fn begin(&self, input: &TurnInput) -> u64 {
        SessionDiagnostics::bump(&self.diagnostics.turns_started);
        self.tracker.begin(input.entry_state())
    }

    /// Drive the turn to completion. Never fails: collaborator errors become an
    /// `error` event and [`TurnOutcome::Failed`].
    pub async fn run(self, generation: u64, input: TurnInput, voice: String) -> TurnOutcome {
        let outcome = match self.drive(generation, input, &voice).await {
            Ok(outcome) => outcome,
            Err(err) => self.fail(generation, err),
        };
        match outcome {
            TurnOutcome::Completed => SessionDiagnostics::bump(&self.diagnostics.turns_completed),
            TurnOutcome::Failed => SessionDiagnostics::bump(&self.diagnostics.turns_failed),
            TurnOutcome::EmptyTranscript => {
                SessionDiagnostics::bump(&self.diagnostics.utterances_discarded)
            }
            TurnOutcome::Superseded => self.retire(generation),
            TurnOutcome::EmptyReply => {}
        }
        info!(generation, ?outcome, "turn finished");
        outcome
    }

    async fn drive(&self, generation: u64, input: TurnInput, voice: &str) -> Result<TurnOutcome> {
        let text = match input {
            TurnInput::Utterance(utterance) => {
                info!(
                    generation,
                    duration_ms = utterance.duration_ms(),
                    reason = ?utterance.reason,
                    "transcribing utterance"
                );
                self.bounded(
                    "transcribe",
                    self.collaborators
                        .transcriber
                        .transcribe(&utterance.audio, utterance.sample_rate),
                )
                .await?
            }
            TurnInput::Text(text) => text,
        };
        if !self.tracker.is_live(generation) {
            return Ok(TurnOutcome::Superseded);
        }

        let text = text.trim();
        if text.is_empty() {
            debug!(generation, "empty transcript; back to listening");
            self.tracker.finish(generation);
            return Ok(TurnOutcome::EmptyTranscript);
        }
        self.events.emit(ServerEvent::Transcript {
            generation,
            text: text.to_string(),
        });
        if !self.tracker.transition(generation, TurnState::Replying) {
            return Ok(TurnOutcome::Superseded);
        }

        match self.config.reply_mode {
            ReplyMode::Full => self.full_reply(generation, text, voice).await,
            ReplyMode::Streamed => self.streamed_reply(generation, text, voice).await,
        }
    }

    async fn full_reply(&self, generation: u64, text: &str, voice: &str) -> Result<TurnOutcome> {
        let reply = self
            .bounded("reply", self.collaborators.replier.generate_reply(text))
            .await?;
        if !self.tracker.is_live(generation) {
            return Ok(TurnOutcome::Superseded);
        }
        if reply.trim().is_empty() {
            self.tracker.finish(generation);
            return Ok(TurnOutcome::EmptyReply);
        }
        self.events.emit(ServerEvent::ReplyText {
            generation,
            text: reply.clone(),
        });
        if !self.tracker.transition(generation, TurnState::Synthesizing) {
            return Ok(TurnOutcome::Superseded);
        }

        let mut writer = self
            .playback
            .writer(generation, self.collaborators.synthesizer.sample_rate())?;
        if !self.synthesize_into(generation, &reply, voice, &mut writer).await? {
            return Ok(TurnOutcome::Superseded);
        }
        Ok(self.complete(generation, writer))
    }

    async fn streamed_reply(&self, generation: u64, text: &str, voice: &str) -> Result<TurnOutcome> {
        let mut deltas = self
            .bounded("reply", self.collaborators.replier.generate_reply_stream(text))
            .await?;
        let mut writer = self
            .playback
            .writer(generation, self.collaborators.synthesizer.sample_rate())?;
        let (segment_tx, mut segment_rx) = mpsc::unbounded_channel::<String>();

        // Reads deltas and hands off each finished sentence. Dropping
        // `segment_tx` at the end tells the synthesis side no more are coming.
        let reader = async move {
            let mut segmenter = SentenceSegmenter::new(&self.config.sentence_delimiters);
            let mut full = String::new();
            let mut submitted = 0usize;
            while self.tracker.is_live(generation) && !segment_tx.is_closed() {
                let next = self
                    .bounded("reply", async { deltas.next().await.transpose() })
                    .await?;
                let Some(delta) = next else { break };
                if delta.is_empty() {
                    continue;
                }
                self.events.emit(ServerEvent::ReplyTextDelta {
                    generation,
                    delta: delta.clone(),
                });
                full.push_str(&delta);
                for segment in segmenter.push(&delta) {
                    self.submit(generation, &segment_tx, segment, &mut submitted);
                }
            }
            if !self.tracker.is_live(generation) {
                return Ok(full);
            }
            if let Some(rest) = segmenter.finish() {
                self.submit(generation, &segment_tx, rest, &mut submitted);
            }
            if !full.trim().is_empty() {
                self.events.emit(ServerEvent::ReplyText {
                    generation,
                    text: full.clone(),
                });
            }
            Ok::<String, ParleyError>(full)
        };

        // Synthesizes segments strictly in submission order.
        let synthesis = async {
            while let Some(segment) = segment_rx.recv().await {
                if !self.synthesize_into(generation, &segment, voice, &mut writer).await? {
                    return Ok(false);
                }
            }
            Ok::<bool, ParleyError>(true)
        };

        let (full, synthesized) = tokio::try_join!(reader, synthesis)?;
        if !synthesized || !self.tracker.is_live(generation) {
            return Ok(TurnOutcome::Superseded);
        }
        if full.trim().is_empty() {
            self.tracker.finish(generation);
            return Ok(TurnOutcome::EmptyReply);
        }
        Ok(self.complete(generation, writer))
    }

    fn submit(
        &self,
        generation: u64,
        tx: &mpsc::UnboundedSender<String>,
        segment: String,
        submitted: &mut usize,
    ) {
        if *submitted == 0 && !self.tracker.transition(generation, TurnState::Synthesizing) {
            return;
        }
        *submitted += 1;
        debug!(generation, index = *submitted, chars = segment.chars().count(), "segment ready");
        if tx.send(segment).is_err() {
            debug!(generation, "synthesis side gone; segment dropped");
        }
    }

    /// Stream one text's audio into `writer`. `Ok(false)` when the generation
    /// stopped being live; checked around every awaited chunk.
    async fn synthesize_into(
        &self,
        generation: u64,
        text: &str,
        voice: &str,
        writer: &mut PlaybackWriter,
    ) -> Result<bool> {
        let mut chunks = self
            .bounded(
                "synthesize",
                self.collaborators.synthesizer.synthesize_stream(text, voice),
            )
            .await?;
        loop {
            if !self.tracker.is_live(generation) {
                return Ok(false);
            }
            let next = self
                .bounded("synthesize", async { chunks.next().await.transpose() })
                .await?;
            let Some(chunk) = next else {
                return Ok(true);
            };
            if !self.tracker.is_live(generation) || !writer.push(&chunk) {
                return Ok(false);
            }
        }
    }

    /// Hand the tail to playback, then return to `Listening`.
    fn complete(&self, generation: u64, writer: PlaybackWriter) -> TurnOutcome {
        if !self.tracker.is_live(generation) || !writer.finish() {
            return TurnOutcome::Superseded;
        }
        if self.tracker.finish(generation) {
            TurnOutcome::Completed
        } else {
            TurnOutcome::Superseded
        }
    }

    /// A newer turn took over without cancelling this one: drop whatever it
    /// still has queued and close it for the transport.
    fn retire(&self, generation: u64) {
        if self.tracker.clock().is_cancelled(generation) {
            return;
        }
        let dropped = self.playback.cancel(generation);
        debug!(generation, dropped, "superseded turn retired");
    }

    fn fail(&self, generation: u64, err: ParleyError) -> TurnOutcome {
        if !self.tracker.is_live(generation) {
            debug!(generation, error = %err, "stale turn failed; ignoring");
            return TurnOutcome::Superseded;
        }
        if err.is_collaborator_failure() {
            warn!(generation, kind = err.kind(), error = %err, "turn aborted");
        } else {
            error!(generation, kind = err.kind(), error = %err, "turn aborted on internal error");
        }
        self.tracker.finish(generation);
        self.playback.cancel(generation);
        self.events.emit(ServerEvent::error(&err, Some(generation)));
        TurnOutcome::Failed
    }

    async fn bounded<T, F>(&self, stage: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let limit = self.config.collaborator_timeout;
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(ParleyError::CollaboratorTimeout {
                stage,
                timeout_ms: limit.as_millis() as u64,
            }),
        }
    }
}
