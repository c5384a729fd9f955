//! Turn engine: the per-session state machine that sequences replies.
//!
//! ## Lifecycle of one turn
//!
//! ```text
//! utterance / text query
//!     └─► Orchestrator::begin()      → new generation, Transcribing (or Replying)
//!         └─► Orchestrator::run()    → transcribe → reply → synthesize → playback
//!             └─► TurnTracker::finish() → Listening   (only if still live)
//! ```
//!
//! ## Generations
//!
//! Every turn gets a generation from the session's [`GenerationClock`]. The
//! clock is shared with the playback scheduler: cancelling a generation both
//! stops its turn task at the next check and purges its queued audio.

mod orchestrator;
mod segmenter;
mod state;

pub use orchestrator::{Orchestrator, OrchestratorConfig, ReplyMode, TurnInput, TurnOutcome};
pub use segmenter::{SentenceSegmenter, DEFAULT_DELIMITERS};
pub use state::{GenerationClock, TurnState, TurnTracker};
