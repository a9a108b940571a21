//! Payload extraction at a located block.

use std::sync::Arc;

use crate::analysis::{AnalysisSignal, FrameMeter};
use crate::audio::AudioBuffer;
use crate::codec;
use crate::config::{DecodeMode, WatermarkConfig};
use crate::error::{Error, Result};
use crate::key::WatermarkKey;
use crate::message::{MESSAGE_BITS, Message, verify_crc};
use crate::resample::{Resampler, SincResampler};
use crate::scheme::Scheme;
use crate::shortcode::{self, ShortCode};
use crate::sync::Candidate;

/// Everything recovered from one block.
#[derive(Debug, Clone)]
pub struct DecodeResult {
    pub candidate: Candidate,
    /// The 128 decoded message bits (a codeword in short mode).
    pub raw_bits: Vec<bool>,
    /// Agreement of each raw bit with the soft values, in `[-1, 1]`.
    pub bit_confidence: Vec<f32>,
    pub crc_ok: bool,
    /// Soft value per coded bit, positive toward 1.
    pub soft: Vec<f32>,
    /// The block's message: the raw bits, or the short payload in short mode.
    pub message: Message,
    /// Short mode only: whether the codeword was within correction range.
    pub short_corrected: Option<bool>,
}

impl DecodeResult {
    /// Decode summed soft values into a result for `candidate`.
    pub(crate) fn from_soft(
        candidate: Candidate,
        soft: Vec<f32>,
        short_code: Option<&dyn ShortCode>,
    ) -> Result<Self> {
        let decoded = codec::decode(&soft);
        let crc_ok = verify_crc(&decoded);
        let confidence = codec::bit_confidence(&decoded, &soft);
        let raw_bits: Vec<bool> = decoded.iter().copied().take(MESSAGE_BITS).collect();
        let bit_confidence: Vec<f32> = confidence.into_iter().take(MESSAGE_BITS).collect();
        let (message, short_corrected) = match short_code {
            Some(code) => {
                let (payload, corrected) = code.decode(&raw_bits)?;
                (Message::from_bits(payload), Some(corrected))
            }
            None => (Message::from_bits(raw_bits.clone()), None),
        };
        Ok(Self {
            candidate,
            raw_bits,
            bit_confidence,
            crc_ok,
            soft,
            message,
            short_corrected,
        })
    }
}

/// Reads the coded bits of a block at a [`Candidate`].
pub struct Decoder {
    scheme: Arc<Scheme>,
    short_code: Option<Arc<dyn ShortCode>>,
    resampler: Arc<dyn Resampler>,
}

impl Decoder {
    pub fn new(key: &WatermarkKey, config: &WatermarkConfig) -> Result<Self> {
        Self::from_scheme(Arc::new(Scheme::new(key, config)?))
    }

    pub(crate) fn from_scheme(scheme: Arc<Scheme>) -> Result<Self> {
        let short_code = shortcode::default_for(&scheme.config)?;
        Ok(Self {
            scheme,
            short_code,
            resampler: Arc::new(SincResampler),
        })
    }

    pub fn with_resampler(mut self, resampler: Arc<dyn Resampler>) -> Self {
        self.resampler = resampler;
        self
    }

    /// Replace the short-payload code. Its widths must match the config.
    pub fn with_short_code(mut self, code: Arc<dyn ShortCode>) -> Result<Self> {
        shortcode::check_fits(code.as_ref(), &self.scheme.config)?;
        self.short_code = Some(code);
        Ok(self)
    }

    pub fn short_code(&self) -> Option<&dyn ShortCode> {
        self.short_code.as_deref()
    }

    /// Decode the block at `candidate` from the input signal.
    ///
    /// The whole block must lie inside the signal; anything shorter is
    /// [`Error::InputTooShort`].
    pub fn decode(&self, signal: &AudioBuffer, candidate: &Candidate) -> Result<DecodeResult> {
        self.scheme.require_block(signal)?;
        let analysis = AnalysisSignal::prepare(
            signal,
            candidate.speed,
            &self.scheme.config,
            self.resampler.as_ref(),
        )?;
        let mut located = candidate.clone();
        located.analysis_offset = analysis.analysis_offset(candidate.offset);
        self.decode_analysis(&analysis, &located)
    }

    /// Decode from a signal already prepared at the candidate's speed.
    pub(crate) fn decode_analysis(
        &self,
        signal: &AnalysisSignal,
        candidate: &Candidate,
    ) -> Result<DecodeResult> {
        let needed = candidate.analysis_offset + self.scheme.codec.block_samples();
        if needed > signal.len() {
            return Err(Error::InputTooShort {
                needed,
                got: signal.len(),
            });
        }
        let mut soft = self.soft_values(signal, candidate.analysis_offset)?;
        if self.scheme.config.decode_mode == DecodeMode::Hard {
            harden(&mut soft);
        }
        DecodeResult::from_soft(candidate.clone(), soft, self.short_code())
    }

    /// Soft value of every coded bit of the block at analysis sample `start`.
    fn soft_values(&self, signal: &AnalysisSignal, start: usize) -> Result<Vec<f32>> {
        let codec = &self.scheme.codec;
        let mut meter = FrameMeter::new(codec.frame_size())?;
        let mut soft = vec![0.0f32; codec::CODED_BITS];
        for (bit, value) in soft.iter_mut().enumerate() {
            for repeat in 0..codec.frames_per_bit() {
                let pos = codec.data_position(bit, repeat);
                *value += meter.statistic(
                    signal,
                    codec.frame_start(start, 0, pos),
                    self.scheme.patterns.data(pos),
                )?;
            }
        }
        Ok(soft)
    }
}

/// Keep only the sign of each soft value. Zero stays zero.
fn harden(soft: &mut [f32]) {
    for s in soft.iter_mut() {
        if *s != 0.0 {
            *s = s.signum();
        }
    }
}
