//! # parley-core
//!
//! Streaming voice turn engine: live microphone audio in, endpointed turns,
//! synthesized replies out, with barge-in.
//!
//! ## Architecture
//!
//! ```text
//! client PCM ─► FrameReframer ─► VoiceActivityClassifier ─► Endpointer
//!                                                              │ Utterance
//!                                                              ▼
//!                       Orchestrator task: Transcriber → ReplyGenerator → Synthesizer
//!                                                              │ PCM chunks
//!                                                              ▼
//!                               PlaybackScheduler ─► OutboundTracker ─► client
//! ```
//!
//! One [`Session`] per connection owns the reader path. Each turn runs as its
//! own task tagged with a generation; barge-in cancels a generation and its
//! queued audio without waiting for the task.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod playback;
pub mod services;
pub mod session;
pub mod vad;

// Convenience re-exports for downstream crates
pub use buffering::{AudioFrame, FrameReframer};
pub use endpoint::{EndpointEvent, EndpointState, Endpointer, EndpointerConfig, Utterance};
pub use engine::{GenerationClock, Orchestrator, ReplyMode, SentenceSegmenter, TurnState};
pub use error::{ParleyError, Result};
pub use ipc::{ClientMessage, ServerEvent};
pub use playback::{Outbound, OutboundTracker, Pacer, PlaybackItem, PlaybackScheduler};
pub use services::{Collaborators, ReplyGenerator, Synthesizer, Transcriber};
pub use session::{BargeInTrigger, DiagnosticsSnapshot, Session, SessionConfig, SessionFlow};
pub use vad::{EnergyVad, VadDecision, VoiceActivityClassifier};
