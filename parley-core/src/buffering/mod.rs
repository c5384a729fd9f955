//! Inbound reframing: arbitrary network chunks in, fixed analysis frames out.
//!
//! The reframer keeps a byte remainder shorter than one frame between calls and
//! never emits a short frame. Audio arriving at a different rate than the
//! classifier wants is resampled before slicing.

pub mod frame;

use tracing::{debug, trace, warn};

use crate::{
    audio::{frame_len_bytes, frame_len_samples, resample::RateConverter},
    error::{ParleyError, Result},
};

pub use frame::AudioFrame;

pub struct FrameReframer {
    converter: RateConverter,
    target_rate: u32,
    frame_ms: u32,
    frame_bytes: usize,
    /// Bytes at `target_rate` not yet forming a full frame.
    remainder: Vec<u8>,
}

impl FrameReframer {
    /// # Errors
    /// Returns `ParleyError::Resampler` if the rate converter cannot be built.
    pub fn new(source_rate: u32, target_rate: u32, frame_ms: u32) -> Result<Self> {
        let converter = RateConverter::new(
            source_rate,
            target_rate,
            frame_len_samples(source_rate, frame_ms).max(1),
        )?;
        let frame_bytes = frame_len_bytes(target_rate, frame_ms);
        debug!(
            source_rate,
            target_rate,
            frame_ms,
            passthrough = converter.is_passthrough(),
            "inbound reframer ready"
        );
        Ok(Self {
            converter,
            target_rate,
            frame_ms,
            frame_bytes,
            remainder: Vec::with_capacity(frame_bytes * 2),
        })
    }

    /// Append `bytes` and return every complete frame now available.
    ///
    /// # Errors
    /// `ParleyError::MalformedAudio` when `bytes` is not a whole number of
    /// 16-bit samples. The remainder is left untouched so the stream stays aligned.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<AudioFrame>> {
        if bytes.len() % 2 != 0 {
            warn!(len = bytes.len(), "rejecting odd-length audio chunk");
            return Err(ParleyError::MalformedAudio { len: bytes.len() });
        }

        let converted = self.converter.convert(bytes);
        self.remainder.extend_from_slice(&converted);

        let mut frames = Vec::with_capacity(self.remainder.len() / self.frame_bytes.max(1));
        if self.frame_bytes == 0 {
            return Ok(frames);
        }
        while self.remainder.len() >= self.frame_bytes {
            let data: Vec<u8> = self.remainder.drain(..self.frame_bytes).collect();
            frames.push(AudioFrame::new(data, self.target_rate, self.frame_ms));
        }

        trace!(
            in_bytes = bytes.len(),
            frames = frames.len(),
            pending = self.remainder.len(),
            "reframed inbound chunk"
        );
        Ok(frames)
    }

    /// Bytes buffered below one frame.
    pub fn pending_bytes(&self) -> usize {
        self.remainder.len()
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Drop buffered audio, including anything inside the resampler.
    pub fn reset(&mut self) {
        self.remainder.clear();
        self.converter.reset();
    }
}
