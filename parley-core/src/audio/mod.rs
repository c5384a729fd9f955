//! PCM16 helpers shared by the inbound reframer and the outbound packer.
//!
//! Everything on the wire is single-channel signed 16-bit little-endian PCM.
//! Analysis (VAD, resampling) happens on normalized `f32` in [-1.0, 1.0].

pub mod resample;

/// Bytes per PCM16 sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Byte length of one frame of `duration_ms` at `sample_rate`.
///
/// `sample_rate × duration_ms / 1000 × 2`.
pub fn frame_len_bytes(sample_rate: u32, duration_ms: u32) -> usize {
    frame_len_samples(sample_rate, duration_ms) * BYTES_PER_SAMPLE
}

/// Sample count of one frame of `duration_ms` at `sample_rate`.
pub fn frame_len_samples(sample_rate: u32, duration_ms: u32) -> usize {
    (sample_rate as usize * duration_ms as usize) / 1000
}

/// Decode little-endian PCM16 into normalized f32. A trailing odd byte is ignored;
/// callers validate length first.
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Encode normalized f32 samples as little-endian PCM16, clamping out-of-range values.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for sample in samples {
        let scaled = (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        out.extend_from_slice(&scaled.to_le_bytes());
    }
    out
}

/// Root-mean-square level of little-endian PCM16 bytes, normalized to [0.0, 1.0].
pub fn pcm16_rms(bytes: &[u8]) -> f32 {
    let count = bytes.len() / BYTES_PER_SAMPLE;
    if count == 0 {
        return 0.0;
    }
    let sum_sq: f32 = bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| {
            let s = i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0;
            s * s
        })
        .sum();
    (sum_sq / count as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_len_matches_rate_and_duration() {
        assert_eq!(frame_len_bytes(16_000, 30), 960);
        assert_eq!(frame_len_bytes(48_000, 20), 1_920);
        assert_eq!(frame_len_samples(24_000, 20), 480);
    }

    #[test]
    fn pcm_conversion_preserves_sign_and_scale() {
        let bytes = f32_to_pcm16(&[0.0, 0.5, -0.5, 2.0]);
        assert_eq!(bytes.len(), 8);
        let back = pcm16_to_f32(&bytes);
        assert_eq!(back[0], 0.0);
        assert!((back[1] - 0.5).abs() < 1e-3);
        assert!((back[2] + 0.5).abs() < 1e-3);
        // clamped to full scale
        assert!(back[3] > 0.99);
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(pcm16_rms(&[0u8; 64]), 0.0);
        assert_eq!(pcm16_rms(&[]), 0.0);
    }
}
