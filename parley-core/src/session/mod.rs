//! `Session`: one connected client.
//!
//! ## Ownership
//!
//! ```text
//! Session (reader path, &mut self)
//!   ├─ FrameReframer ─► VoiceActivityClassifier ─► Endpointer
//!   ├─ Orchestrator ──► JoinSet<turn task>        (one task per turn)
//!   ├─ TurnTracker    (shared with turn tasks)
//!   └─ PlaybackScheduler (shared with turn tasks and the transport writer)
//! ```
//!
//! Audio and control messages arrive on the reader path and are handled
//! synchronously; nothing here awaits a collaborator. Turn tasks report back
//! through the event channel returned by [`Session::new`] and the playback
//! scheduler.
//!
//! ## Barge-in
//!
//! When the configured endpointer transition fires while a turn is busy or
//! playback is still queued, the latest generation is cancelled *before* the
//! frame that caused it is processed further. The new utterance then becomes
//! the next generation. Starting any turn applies the same cancel first, so a
//! turn that was never interrupted by speech onset (a max-length emit, a
//! `Disabled` trigger, a flush or a text query) cannot keep playing under the
//! new one.

mod config;
mod diagnostics;

pub use config::{BargeInTrigger, SessionConfig};
pub use diagnostics::{DiagnosticsSnapshot, SessionDiagnostics};

use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::{
    buffering::{AudioFrame, FrameReframer},
    endpoint::{EndpointEvent, EndpointState, Endpointer},
    engine::{GenerationClock, Orchestrator, TurnInput, TurnOutcome, TurnState, TurnTracker},
    error::{ParleyError, Result},
    ipc::{ClientMessage, EventSink, ServerEvent},
    playback::PlaybackScheduler,
    services::Collaborators,
    vad::{EnergyVad, VoiceActivityClassifier},
};

/// What the transport should do after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFlow {
    Continue,
    Close,
}

pub struct Session {
    id: u64,
    config: SessionConfig,
    reframer: FrameReframer,
    classifier: Arc<dyn VoiceActivityClassifier>,
    endpointer: Endpointer,
    orchestrator: Orchestrator,
    tracker: Arc<TurnTracker>,
    clock: Arc<GenerationClock>,
    playback: Arc<PlaybackScheduler>,
    events: EventSink,
    voice: String,
    turns: JoinSet<TurnOutcome>,
    diagnostics: Arc<SessionDiagnostics>,
    span: Span,
    closed: bool,
}

impl Session {
    /// Build a session and the receiver for its outbound events.
    ///
    /// # Errors
    /// `ParleyError::Resampler` if the inbound rate converter cannot be built.
    pub fn new(
        id: u64,
        config: SessionConfig,
        classifier: Arc<dyn VoiceActivityClassifier>,
        collaborators: Collaborators,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerEvent>)> {
        let span = info_span!("session", session_id = id);
        let reframer = FrameReframer::new(
            config.input_sample_rate,
            config.analysis_sample_rate,
            config.frame_ms,
        )?;
        let (events, rx) = EventSink::channel();
        let diagnostics = Arc::new(SessionDiagnostics::default());
        let clock = Arc::new(GenerationClock::new());
        let tracker = Arc::new(TurnTracker::new(Arc::clone(&clock), events.clone()));
        let playback = Arc::new(PlaybackScheduler::new(
            Arc::clone(&clock),
            config.output_sample_rate,
            config.playback_frame_ms,
            Arc::clone(&diagnostics),
        ));
        let orchestrator = Orchestrator::new(
            config.orchestrator(),
            collaborators,
            Arc::clone(&tracker),
            Arc::clone(&playback),
            events.clone(),
            Arc::clone(&diagnostics),
        );
        span.in_scope(|| {
            info!(
                input_rate = config.input_sample_rate,
                analysis_rate = config.analysis_sample_rate,
                output_rate = config.output_sample_rate,
                reply_mode = ?config.reply_mode,
                barge_in = ?config.barge_in,
                "session opened"
            )
        });

        let session = Self {
            id,
            endpointer: Endpointer::new(config.endpointer()),
            voice: config.default_voice.clone(),
            config,
            reframer,
            classifier,
            orchestrator,
            tracker,
            clock,
            playback,
            events,
            turns: JoinSet::new(),
            diagnostics,
            span,
            closed: false,
        };
        Ok((session, rx))
    }

    /// [`Session::new`] with an [`EnergyVad`] at the configured threshold.
    ///
    /// # Errors
    /// See [`Session::new`].
    pub fn with_energy_vad(
        id: u64,
        config: SessionConfig,
        collaborators: Collaborators,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerEvent>)> {
        let classifier = Arc::new(EnergyVad::new(config.vad_threshold));
        Self::new(id, config, classifier, collaborators)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn turn_state(&self) -> TurnState {
        self.tracker.state()
    }

    pub fn endpoint_state(&self) -> EndpointState {
        self.endpointer.state()
    }

    /// Latest generation issued (0 before the first turn).
    pub fn generation(&self) -> u64 {
        self.clock.latest()
    }

    /// Handle for the transport writer.
    pub fn playback(&self) -> Arc<PlaybackScheduler> {
        Arc::clone(&self.playback)
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Turn tasks still running.
    pub fn active_turns(&self) -> usize {
        self.turns.len()
    }

    /// Binary message: raw PCM16 at `input_sample_rate`.
    pub fn handle_audio(&mut self, pcm16: &[u8]) -> SessionFlow {
        let span = self.span.clone();
        let _enter = span.enter();
        if self.closed {
            return SessionFlow::Close;
        }
        self.reap();

        let frames = match self.reframer.push(pcm16) {
            Ok(frames) => frames,
            Err(err) => {
                self.reject(err);
                return SessionFlow::Continue;
            }
        };
        SessionDiagnostics::bump(&self.diagnostics.chunks_in);
        for frame in &frames {
            self.on_frame(frame);
        }
        SessionFlow::Continue
    }

    /// Text message: a JSON (or bare-word) control message.
    pub fn handle_control(&mut self, raw: &str) -> SessionFlow {
        match ClientMessage::parse(raw) {
            Ok(msg) => self.handle_message(msg),
            Err(err) => {
                let span = self.span.clone();
                let _enter = span.enter();
                self.reject(err);
                SessionFlow::Continue
            }
        }
    }

    pub fn handle_message(&mut self, msg: ClientMessage) -> SessionFlow {
        let span = self.span.clone();
        let _enter = span.enter();
        if self.closed {
            return SessionFlow::Close;
        }
        self.reap();
        debug!(?msg, "control message");

        match msg {
            ClientMessage::Flush => match self.endpointer.flush() {
                Some(utterance) => {
                    SessionDiagnostics::bump(&self.diagnostics.utterances_emitted);
                    self.start_turn(TurnInput::Utterance(utterance), "flush");
                }
                None => debug!("flush with nothing buffered"),
            },
            ClientMessage::Resume => {
                self.tracker.resume();
                self.endpointer.reset();
                self.reframer.reset();
            }
            ClientMessage::Interrupt => {
                if !self.barge_in("interrupt") {
                    debug!("interrupt with nothing to cancel");
                }
            }
            ClientMessage::SelectVoice { voice } => {
                let voice = voice.trim();
                if voice.is_empty() {
                    self.reject(ParleyError::MalformedControl("empty voice id".into()));
                } else {
                    info!(voice, "voice selected");
                    self.voice = voice.to_string();
                }
            }
            ClientMessage::TextQuery { text } => {
                if text.trim().is_empty() {
                    self.reject(ParleyError::MalformedControl("empty text query".into()));
                } else {
                    self.start_turn(TurnInput::Text(text), "textQuery");
                }
            }
            ClientMessage::Close => {
                info!("client requested close");
                return SessionFlow::Close;
            }
        }
        SessionFlow::Continue
    }

    /// Wait for every running turn task to finish.
    pub async fn drain_turns(&mut self) {
        while let Some(joined) = self.turns.join_next().await {
            self.log_join(joined);
        }
    }

    /// Tear down regardless of state: cancel the live generation, close the
    /// playback queue, abort turn tasks and drop buffered audio.
    pub async fn shutdown(mut self) -> DiagnosticsSnapshot {
        self.closed = true;
        let latest = self.clock.latest();
        if latest > 0 {
            self.clock.cancel(latest);
        }
        self.playback.close();
        self.turns.shutdown().await;
        self.endpointer.reset();
        self.reframer.reset();

        let snapshot = self.diagnostics.snapshot();
        info!(
            parent: &self.span,
            chunks_in = snapshot.chunks_in,
            speech_frames = snapshot.speech_frames,
            utterances = snapshot.utterances_emitted,
            turns_started = snapshot.turns_started,
            turns_completed = snapshot.turns_completed,
            turns_failed = snapshot.turns_failed,
            barge_ins = snapshot.barge_ins,
            playback_frames = snapshot.playback_frames,
            playback_frames_dropped = snapshot.playback_frames_dropped,
            malformed = snapshot.malformed_messages,
            "session closed"
        );
        snapshot
    }

    fn on_frame(&mut self, frame: &AudioFrame) {
        let decision = self.classifier.classify(frame);
        SessionDiagnostics::bump(&self.diagnostics.frames_classified);
        if decision.is_speech() {
            SessionDiagnostics::bump(&self.diagnostics.speech_frames);
        }

        for event in self.endpointer.push(frame, decision) {
            match event {
                EndpointEvent::Armed => {
                    if self.config.barge_in == BargeInTrigger::OnCandidate {
                        self.barge_in("speech candidate");
                    }
                }
                EndpointEvent::Confirmed => {
                    if self.config.barge_in == BargeInTrigger::OnConfirmedSpeech {
                        self.barge_in("speech confirmed");
                    }
                }
                EndpointEvent::Rejected => {}
                EndpointEvent::Finalized(utterance) => {
                    SessionDiagnostics::bump(&self.diagnostics.utterances_emitted);
                    info!(
                        duration_ms = utterance.duration_ms(),
                        reason = ?utterance.reason,
                        "utterance finalized"
                    );
                    self.start_turn(TurnInput::Utterance(utterance), "utterance");
                }
            }
        }
    }

    /// Cancel the latest generation if a turn is working on it or any reply
    /// audio is still queued. Returns whether anything was cancelled.
    fn barge_in(&mut self, cause: &'static str) -> bool {
        let generation = self.clock.latest();
        if generation == 0 || self.clock.is_cancelled(generation) {
            return false;
        }
        let busy = self.tracker.state().is_busy();
        let queued = self.playback.queued_frames();
        if !busy && queued == 0 {
            return false;
        }
        info!(generation, cause, busy, queued, "barge-in");
        self.playback.cancel(generation);
        self.tracker.interrupt(generation);
        SessionDiagnostics::bump(&self.diagnostics.barge_ins);
        true
    }

    /// Supersede whatever the previous turn is still doing, then claim the next
    /// generation and spawn its task.
    fn start_turn(&mut self, input: TurnInput, cause: &'static str) {
        self.barge_in(cause);
        let generation = self.orchestrator.begin(&input);
        let span = info_span!("turn", session_id = self.id, generation);
        let task = self
            .orchestrator
            .clone()
            .run(generation, input, self.voice.clone())
            .instrument(span);
        self.turns.spawn(task);
    }

    fn reject(&self, err: ParleyError) {
        if err.is_malformed_input() {
            SessionDiagnostics::bump(&self.diagnostics.malformed_messages);
            warn!(kind = err.kind(), error = %err, "message rejected");
        } else {
            error!(kind = err.kind(), error = %err, "message failed");
        }
        self.events.emit(ServerEvent::error(&err, None));
    }

    /// Collect finished turn tasks without waiting.
    fn reap(&mut self) {
        while let Some(joined) = self.turns.try_join_next() {
            self.log_join(joined);
        }
    }

    fn log_join(&self, joined: std::result::Result<TurnOutcome, tokio::task::JoinError>) {
        match joined {
            Ok(outcome) => debug!(?outcome, "turn task reaped"),
            Err(err) if err.is_cancelled() => debug!("turn task aborted"),
            Err(err) => error!(error = %err, "turn task panicked"),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let latest = self.clock.latest();
        if latest > 0 {
            self.clock.cancel(latest);
        }
        self.playback.close();
    }
}
