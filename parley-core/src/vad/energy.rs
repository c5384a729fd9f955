//! Energy-based VAD using an RMS threshold.
//!
//! ## Algorithm
//!
//! 1. Compute RMS of the incoming frame (normalized to [0.0, 1.0]).
//! 2. If RMS ≥ `threshold` → `Speech`, otherwise `Silence`.
//!
//! No hangover counter: nothing carries over between frames. Pause bridging
//! is the endpointer's offset counter.

use super::{VadDecision, VoiceActivityClassifier};
use crate::buffering::AudioFrame;

/// A simple energy-based voice activity classifier.
#[derive(Debug, Clone, Copy)]
pub struct EnergyVad {
    /// RMS amplitude threshold. Frames at or above this are considered speech.
    /// Typical range: 0.005–0.05 for a browser microphone.
    threshold: f32,
}

impl EnergyVad {
    /// Create a new `EnergyVad`. Default threshold: `0.01`.
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.max(0.0),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl VoiceActivityClassifier for EnergyVad {
    fn classify(&self, frame: &AudioFrame) -> VadDecision {
        if frame.is_empty() {
            return VadDecision::Silence;
        }
        if frame.rms() >= self.threshold {
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::f32_to_pcm16;
    use approx::assert_relative_eq;

    fn frame_of(amplitude: f32, samples: usize) -> AudioFrame {
        AudioFrame {
            data: f32_to_pcm16(&vec![amplitude; samples]),
            sample_rate: 16_000,
            duration_ms: (samples * 1000 / 16_000) as u32,
        }
    }

    #[test]
    fn silence_below_threshold() {
        let vad = EnergyVad::new(0.02);
        assert_eq!(vad.classify(&frame_of(0.0, 480)), VadDecision::Silence);
        assert_eq!(vad.classify(&frame_of(0.005, 480)), VadDecision::Silence);
    }

    #[test]
    fn speech_above_threshold() {
        let vad = EnergyVad::new(0.02);
        assert_eq!(vad.classify(&frame_of(0.5, 480)), VadDecision::Speech);
    }

    #[test]
    fn classification_is_stateless() {
        let vad = EnergyVad::new(0.02);
        assert!(vad.classify(&frame_of(0.5, 480)).is_speech());
        // No hangover: the very next quiet frame is silence.
        assert!(!vad.classify(&frame_of(0.0, 480)).is_speech());
        // Identical input, identical answer.
        let f = frame_of(0.03, 480);
        assert_eq!(vad.classify(&f), vad.classify(&f));
    }

    #[test]
    fn empty_frame_is_silence() {
        let vad = EnergyVad::default();
        let frame = AudioFrame {
            data: vec![],
            sample_rate: 16_000,
            duration_ms: 0,
        };
        assert_eq!(vad.classify(&frame), VadDecision::Silence);
    }

    #[test]
    fn rms_of_square_wave() {
        // A square wave at ±0.5 should have RMS = 0.5
        let samples: Vec<f32> = (0..256)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let frame = AudioFrame {
            data: f32_to_pcm16(&samples),
            sample_rate: 16_000,
            duration_ms: 16,
        };
        assert_relative_eq!(frame.rms(), 0.5, epsilon = 1e-3);
    }
}
