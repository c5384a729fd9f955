use tracing::{debug, trace};

use crate::{
    audio::{frame_len_bytes, frame_len_samples, resample::RateConverter},
    buffering::AudioFrame,
    error::Result,
};

/// Re-chunks synthesizer output into fixed playback frames at the output rate.
///
/// Input chunks may split a sample; the odd byte is carried into the next
/// chunk. [`finish`](Self::finish) zero-pads the last partial frame to full
/// length instead of dropping it.
pub struct FramePacker {
    converter: RateConverter,
    output_rate: u32,
    frame_ms: u32,
    frame_bytes: usize,
    odd_byte: Option<u8>,
    pending: Vec<u8>,
}

impl FramePacker {
    /// # Errors
    /// `ParleyError::Resampler` if the rate converter cannot be built.
    pub fn new(source_rate: u32, output_rate: u32, frame_ms: u32) -> Result<Self> {
        let converter = RateConverter::new(
            source_rate,
            output_rate,
            frame_len_samples(source_rate, frame_ms).max(1),
        )?;
        let frame_bytes = frame_len_bytes(output_rate, frame_ms).max(2);
        if !converter.is_passthrough() {
            debug!(source_rate, output_rate, "synthesis audio will be resampled");
        }
        Ok(Self {
            converter,
            output_rate,
            frame_ms,
            frame_bytes,
            odd_byte: None,
            pending: Vec::with_capacity(frame_bytes * 2),
        })
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Bytes held below one frame at the output rate.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<AudioFrame> {
        let mut bytes = Vec::with_capacity(chunk.len() + 1);
        if let Some(b) = self.odd_byte.take() {
            bytes.push(b);
        }
        bytes.extend_from_slice(chunk);
        if bytes.len() % 2 == 1 {
            self.odd_byte = bytes.pop();
        }

        let converted = self.converter.convert(&bytes);
        self.pending.extend_from_slice(&converted);
        self.drain_full()
    }

    /// Flush the resampler and emit the zero-padded final frame.
    /// A dangling half sample is discarded.
    pub fn finish(&mut self) -> Vec<AudioFrame> {
        self.odd_byte = None;
        let tail = self.converter.flush();
        self.pending.extend_from_slice(&tail);
        let mut frames = self.drain_full();
        if !self.pending.is_empty() {
            let mut last = std::mem::take(&mut self.pending);
            let padding = self.frame_bytes - last.len();
            last.resize(self.frame_bytes, 0);
            trace!(padding, "zero-padded final playback frame");
            frames.push(AudioFrame::new(last, self.output_rate, self.frame_ms));
        }
        frames
    }

    fn drain_full(&mut self) -> Vec<AudioFrame> {
        let mut frames = Vec::with_capacity(self.pending.len() / self.frame_bytes);
        while self.pending.len() >= self.frame_bytes {
            let data: Vec<u8> = self.pending.drain(..self.frame_bytes).collect();
            frames.push(AudioFrame::new(data, self.output_rate, self.frame_ms));
        }
        frames
    }
}
