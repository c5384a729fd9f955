//! Voice activity classification.
//!
//! The `VoiceActivityClassifier` trait is the extensibility point: swap in
//! `EnergyVad` (default) or any wrapped third-party classifier without touching
//! the endpointer.
//!
//! Classifiers are stateless per frame. All temporal logic (onset / offset
//! hysteresis) lives in [`crate::endpoint::Endpointer`], which is what lets a
//! single classifier be shared by every session.

pub mod energy;

pub use energy::EnergyVad;

use crate::buffering::AudioFrame;

/// Whether a given audio frame contains speech or silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    /// The frame contains speech.
    Speech,
    /// The frame is silent or noise.
    Silence,
}

impl VadDecision {
    pub fn is_speech(self) -> bool {
        self == VadDecision::Speech
    }
}

/// Trait for all classifier implementations.
///
/// Must be deterministic for identical input and run in O(frame length).
pub trait VoiceActivityClassifier: Send + Sync + 'static {
    /// Classify one fixed-duration frame.
    ///
    /// The frame's `sample_rate` matches the rate the session analyses at.
    /// Resampling is the reframer's responsibility.
    fn classify(&self, frame: &AudioFrame) -> VadDecision;
}
