//! Fixed-duration PCM16 frame passed from the reframer to the classifier,
//! endpointer and playback queue.

use crate::audio::{frame_len_bytes, pcm16_rms};

/// A fixed-length span of mono little-endian PCM16 at a known sample rate.
///
/// `data.len() == sample_rate × duration_ms / 1000 × 2` for every frame the
/// reframer or packer produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub data: Vec<u8>,
    /// Sample rate in Hz (e.g. 16000, 24000, 48000).
    pub sample_rate: u32,
    pub duration_ms: u32,
}

impl AudioFrame {
    pub fn new(data: Vec<u8>, sample_rate: u32, duration_ms: u32) -> Self {
        debug_assert_eq!(data.len(), frame_len_bytes(sample_rate, duration_ms));
        Self {
            data,
            sample_rate,
            duration_ms,
        }
    }

    pub fn rms(&self) -> f32 {
        pcm16_rms(&self.data)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
