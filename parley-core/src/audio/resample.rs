//! PCM16 sample-rate conversion.
//!
//! Clients usually capture at 48 kHz while the classifier and recognizer run
//! at 16 kHz, and synthesizers often produce 24 kHz for a 48 kHz client. When
//! both rates match no rubato state is allocated and bytes pass through
//! borrowed.

use std::borrow::Cow;

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{debug, error};

use super::{f32_to_pcm16, pcm16_to_f32};
use crate::error::{ParleyError, Result};

enum Mode {
    Passthrough,
    Resample(Box<Stage>),
}

struct Stage {
    resampler: FastFixedIn<f32>,
    /// Input samples waiting for a full rubato block.
    backlog: Vec<f32>,
    block: usize,
    scratch: Vec<Vec<f32>>,
    ratio: f64,
}

/// Mono PCM16 rate converter with block buffering.
pub struct RateConverter {
    mode: Mode,
    source_rate: u32,
    target_rate: u32,
}

impl RateConverter {
    /// `block` is the number of input samples handed to rubato per call.
    ///
    /// # Errors
    /// `ParleyError::Resampler` if either rate is zero or rubato rejects the ratio.
    pub fn new(source_rate: u32, target_rate: u32, block: usize) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(ParleyError::Resampler(format!(
                "invalid rates {source_rate} -> {target_rate}"
            )));
        }
        if source_rate == target_rate {
            return Ok(Self {
                mode: Mode::Passthrough,
                source_rate,
                target_rate,
            });
        }

        let block = block.max(1);
        let ratio = f64::from(target_rate) / f64::from(source_rate);
        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, block, 1)
            .map_err(|e| {
                ParleyError::Resampler(format!("{source_rate} -> {target_rate}: {e}"))
            })?;
        let scratch = vec![vec![0f32; resampler.output_frames_max()]];
        debug!(source_rate, target_rate, block, "rate conversion enabled");

        Ok(Self {
            mode: Mode::Resample(Box::new(Stage {
                resampler,
                backlog: Vec::with_capacity(block * 2),
                block,
                scratch,
                ratio,
            })),
            source_rate,
            target_rate,
        })
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self.mode, Mode::Passthrough)
    }

    /// Convert a whole-sample PCM16 chunk. Output may be shorter than the
    /// input implies until a full block has accumulated.
    pub fn convert<'a>(&mut self, pcm16: &'a [u8]) -> Cow<'a, [u8]> {
        let Mode::Resample(stage) = &mut self.mode else {
            return Cow::Borrowed(pcm16);
        };
        let stage = &mut **stage;
        stage.backlog.extend(pcm16_to_f32(pcm16));

        let mut out = Vec::new();
        let mut offset = 0;
        while stage.backlog.len() - offset >= stage.block {
            let block = &stage.backlog[offset..offset + stage.block];
            match stage
                .resampler
                .process_into_buffer(&[block], &mut stage.scratch, None)
            {
                Ok((_, produced)) => out.extend_from_slice(&stage.scratch[0][..produced]),
                Err(e) => error!(
                    source_rate = self.source_rate,
                    target_rate = self.target_rate,
                    error = %e,
                    "dropping block that failed to resample"
                ),
            }
            offset += stage.block;
        }
        stage.backlog.drain(..offset);
        Cow::Owned(f32_to_pcm16(&out))
    }

    /// Convert whatever is left in the backlog. The output is trimmed to the
    /// length the backlog maps to, so rubato's zero padding does not leak out.
    pub fn flush(&mut self) -> Vec<u8> {
        let Mode::Resample(stage) = &mut self.mode else {
            return Vec::new();
        };
        let stage = &mut **stage;
        if stage.backlog.is_empty() {
            return Vec::new();
        }

        let expected = (stage.backlog.len() as f64 * stage.ratio).round() as usize;
        let partial: [&[f32]; 1] = [&stage.backlog];
        let tail = match stage
            .resampler
            .process_partial_into_buffer(Some(&partial[..]), &mut stage.scratch, None)
        {
            Ok((_, produced)) => f32_to_pcm16(&stage.scratch[0][..produced.min(expected)]),
            Err(e) => {
                error!(error = %e, "failed to flush resampler backlog");
                Vec::new()
            }
        };
        stage.backlog.clear();
        tail
    }

    /// Forget buffered input and filter state.
    pub fn reset(&mut self) {
        if let Mode::Resample(stage) = &mut self.mode {
            stage.backlog.clear();
            stage.resampler.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(samples: usize) -> Vec<u8> {
        let wave: Vec<f32> = (0..samples).map(|i| 0.3 * (i as f32 * 0.07).sin()).collect();
        f32_to_pcm16(&wave)
    }

    #[test]
    fn matching_rates_borrow_the_input() {
        let mut rc = RateConverter::new(16_000, 16_000, 320).unwrap();
        assert!(rc.is_passthrough());
        let pcm = tone(320);
        assert!(matches!(rc.convert(&pcm), Cow::Borrowed(b) if b == pcm.as_slice()));
        assert!(rc.flush().is_empty());
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(matches!(
            RateConverter::new(0, 16_000, 320),
            Err(ParleyError::Resampler(_))
        ));
    }

    #[test]
    fn downsampling_48k_to_16k_thirds_the_length() {
        // 30 ms at 48 kHz per block.
        let mut rc = RateConverter::new(48_000, 16_000, 1_440).unwrap();
        let out = rc.convert(&tone(1_440 * 10)).into_owned();
        let samples = out.len() / 2;
        assert!((4_700..=4_900).contains(&samples), "{samples} samples");
    }

    #[test]
    fn short_input_waits_for_a_full_block() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).unwrap();
        assert!(rc.convert(&tone(500)).is_empty());
        assert!(!rc.convert(&tone(500)).is_empty());
    }

    #[test]
    fn flush_emits_the_backlog_once() {
        let mut rc = RateConverter::new(24_000, 48_000, 480).unwrap();
        assert!(rc.convert(&tone(240)).is_empty());
        let tail = rc.flush();
        assert!(!tail.is_empty() && tail.len() <= 960, "tail {} bytes", tail.len());
        assert!(rc.flush().is_empty());
    }

    #[test]
    fn reset_discards_backlog() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).unwrap();
        rc.convert(&tone(500));
        rc.reset();
        assert!(rc.flush().is_empty());
    }
}
