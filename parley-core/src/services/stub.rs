//! Placeholder collaborators that produce deterministic output without any model.
//!
//! They let the full endpoint → transcribe → reply → synthesize → playback path
//! be exercised end-to-end (replay tool, development server, tests).

use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;

use super::{AudioChunkStream, ReplyGenerator, Synthesizer, TextDeltaStream, Transcriber};
use crate::{audio::f32_to_pcm16, error::Result};

/// Emits `"[stub: <N> samples @ <SR> Hz]"` for any utterance of at least 10 ms.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubTranscriber;

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, pcm16: &[u8], sample_rate: u32) -> Result<String> {
        let samples = pcm16.len() / 2;
        if (samples as u64) * 100 < sample_rate as u64 {
            return Ok(String::new());
        }
        debug!(samples, sample_rate, "StubTranscriber::transcribe");
        Ok(format!("[stub: {samples} samples @ {sample_rate} Hz]"))
    }
}

/// Replies with `"<prefix><text>."` and streams it one word at a time.
#[derive(Debug, Clone)]
pub struct EchoReplyGenerator {
    pub prefix: String,
}

impl Default for EchoReplyGenerator {
    fn default() -> Self {
        Self {
            prefix: "You said: ".into(),
        }
    }
}

#[async_trait]
impl ReplyGenerator for EchoReplyGenerator {
    async fn generate_reply(&self, text: &str) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("{}{}.", self.prefix, text))
    }

    async fn generate_reply_stream(&self, text: &str) -> Result<TextDeltaStream> {
        let full = self.generate_reply(text).await?;
        let mut deltas = Vec::new();
        for (i, word) in full.split(' ').enumerate() {
            deltas.push(Ok(if i == 0 {
                word.to_string()
            } else {
                format!(" {word}")
            }));
        }
        Ok(futures::stream::iter(deltas).boxed())
    }
}

/// Synthesizes a quiet 440 Hz tone whose length scales with the text.
#[derive(Debug, Clone)]
pub struct ToneSynthesizer {
    pub sample_rate: u32,
    pub ms_per_char: u32,
    /// Streamed chunk size in bytes. Not frame-aligned on purpose.
    pub chunk_bytes: usize,
}

impl Default for ToneSynthesizer {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            ms_per_char: 40,
            chunk_bytes: 4_098,
        }
    }
}

impl ToneSynthesizer {
    fn render(&self, text: &str) -> Vec<u8> {
        let chars = text.chars().filter(|c| !c.is_whitespace()).count() as u64;
        let samples = (chars * self.ms_per_char as u64 * self.sample_rate as u64 / 1000) as usize;
        let step = 2.0 * std::f32::consts::PI * 440.0 / self.sample_rate as f32;
        let tone: Vec<f32> = (0..samples).map(|i| 0.1 * (i as f32 * step).sin()).collect();
        f32_to_pcm16(&tone)
    }
}

#[async_trait]
impl Synthesizer for ToneSynthesizer {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        debug!(voice, chars = text.len(), "ToneSynthesizer::synthesize");
        Ok(self.render(text))
    }

    async fn synthesize_stream(&self, text: &str, voice: &str) -> Result<AudioChunkStream> {
        let audio = self.synthesize(text, voice).await?;
        let chunk = self.chunk_bytes.max(2);
        let chunks: Vec<Result<Vec<u8>>> = audio.chunks(chunk).map(|c| Ok(c.to_vec())).collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}
