//! Collaborator capabilities consumed by the turn engine.
//!
//! Each trait carries the one method the orchestrator needs (plus an optional
//! streaming form with a default built on the one-shot form). Implementations
//! are shared by every session, so they must be safe for concurrent calls.
//!
//! Concrete recognizers, language models and synthesizers live outside this
//! crate; [`stub`] provides deterministic stand-ins for tests, the replay tool
//! and the development server.

pub mod stub;

use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};

use crate::error::Result;

/// Lazy, single-pass sequence of reply text deltas.
pub type TextDeltaStream = BoxStream<'static, Result<String>>;

/// Lazy sequence of PCM16 chunks. Chunk boundaries carry no frame alignment.
pub type AudioChunkStream = BoxStream<'static, Result<Vec<u8>>>;

/// Speech recognition.
#[async_trait]
pub trait Transcriber: Send + Sync + 'static {
    /// Transcribe mono PCM16 at `sample_rate`.
    ///
    /// Returns empty text when nothing was recognized. Failures surface as
    /// `ParleyError::Transcription`; partial text is never returned silently.
    async fn transcribe(&self, pcm16: &[u8], sample_rate: u32) -> Result<String>;
}

/// Reply generation.
#[async_trait]
pub trait ReplyGenerator: Send + Sync + 'static {
    async fn generate_reply(&self, text: &str) -> Result<String>;

    /// Streamed form. Defaults to the full reply as a single delta.
    async fn generate_reply_stream(&self, text: &str) -> Result<TextDeltaStream> {
        let full = self.generate_reply(text).await?;
        Ok(futures::stream::once(async move { Ok(full) }).boxed())
    }
}

/// Speech synthesis.
#[async_trait]
pub trait Synthesizer: Send + Sync + 'static {
    /// Native PCM16 output rate (Hz).
    fn sample_rate(&self) -> u32;

    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>>;

    /// Streamed form. Defaults to the one-shot result as a single chunk.
    async fn synthesize_stream(&self, text: &str, voice: &str) -> Result<AudioChunkStream> {
        let audio = self.synthesize(text, voice).await?;
        Ok(futures::stream::once(async move { Ok(audio) }).boxed())
    }
}

/// Process-wide collaborator handles, cloned into every session.
#[derive(Clone)]
pub struct Collaborators {
    pub transcriber: Arc<dyn Transcriber>,
    pub replier: Arc<dyn ReplyGenerator>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl Collaborators {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        replier: Arc<dyn ReplyGenerator>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            transcriber,
            replier,
            synthesizer,
        }
    }

    /// Deterministic stand-ins: see [`stub`].
    pub fn stub() -> Self {
        Self::new(
            Arc::new(stub::StubTranscriber),
            Arc::new(stub::EchoReplyGenerator::default()),
            Arc::new(stub::ToneSynthesizer::default()),
        )
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
