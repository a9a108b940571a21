use std::sync::Arc;

use crate::audio::AudioBuffer;
use crate::codec;
use crate::config::WatermarkConfig;
use crate::error::{Error, Result};
use crate::fft::FftProcessor;
use crate::frame::FrameRole;
use crate::key::WatermarkKey;
use crate::message::{Message, append_crc};
use crate::parallel;
use crate::pattern::{FramePattern, padding_frame};
use crate::resample::{Resampler, SincResampler};
use crate::scheme::Scheme;
use crate::shortcode::{self, ShortCode};

/// What embedding had to do beyond writing the mark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbedSummary {
    /// Frames scaled down to stay inside the sample format.
    pub limited_frames: usize,
}

/// Writes a message into a signal.
///
/// Processes audio in non-overlapping rectangular frames at the mark rate.
/// Each frame is analyzed, its keyed up/down bins are scaled, and only the
/// resulting perturbation is transformed back and added, so the rest of the
/// spectrum passes through untouched.
pub struct Embedder {
    scheme: Arc<Scheme>,
    resampler: Arc<dyn Resampler>,
    short_code: Option<Arc<dyn ShortCode>>,
}

impl Embedder {
    pub fn new(key: &WatermarkKey, config: &WatermarkConfig) -> Result<Self> {
        let scheme = Scheme::new(key, config)?;
        let short_code = shortcode::default_for(config)?;
        Ok(Self {
            scheme: Arc::new(scheme),
            resampler: Arc::new(SincResampler),
            short_code,
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

    /// Return a watermarked copy of `signal` with the same length, channel
    /// count, rate and sample format.
    pub fn embed(&self, signal: &AudioBuffer, message: &Message) -> Result<AudioBuffer> {
        Ok(self.embed_with_summary(signal, message)?.0)
    }

    /// [`Embedder::embed`], also reporting what the limiter did.
    pub fn embed_with_summary(
        &self,
        signal: &AudioBuffer,
        message: &Message,
    ) -> Result<(AudioBuffer, EmbedSummary)> {
        let config = &self.scheme.config;
        if message.width() != config.message_bits() {
            return Err(Error::GeometryMismatch {
                expected: config.message_bits(),
                got: message.width(),
            });
        }
        self.scheme.require_block(signal)?;

        let coded = self.coded_bits(message)?;

        let delta = if signal.sample_rate == config.mark_sample_rate {
            self.delta(signal, &coded)?
        } else {
            let marked = self
                .resampler
                .resample_to_rate(signal, config.mark_sample_rate)?;
            let delta = self.delta(&marked, &coded)?;
            self.resampler.resample_to_rate(&delta, signal.sample_rate)?
        };

        let mut out = signal.clone();
        for (s, d) in out.samples.iter_mut().zip(&delta.samples) {
            *s += d;
        }
        let limited_frames = if config.limiter {
            limit(&mut out, config.frame_size)
        } else {
            0
        };
        Ok((out, EmbedSummary { limited_frames }))
    }

    /// Message, through the short code when enabled, plus CRC, convolutionally
    /// encoded.
    fn coded_bits(&self, message: &Message) -> Result<Vec<bool>> {
        let bits = match &self.short_code {
            Some(code) => code.encode(message.bits())?,
            None => message.bits().to_vec(),
        };
        Ok(codec::encode(&append_crc(&bits)))
    }

    /// The perturbation for a mark-rate signal, as a buffer of the same shape.
    fn delta(&self, signal: &AudioBuffer, coded: &[bool]) -> Result<AudioBuffer> {
        let planes = signal.to_planar();
        let deltas = parallel::try_map(&planes, |channel| self.channel_delta(channel, coded))?;
        Ok(AudioBuffer::from_planar(&deltas, signal.sample_rate, signal))
    }

    fn channel_delta(&self, channel: &[f32], coded: &[bool]) -> Result<Vec<f32>> {
        let scheme = &*self.scheme;
        let config = &scheme.config;
        let frame_size = config.frame_size;
        let num_bins = config.num_bins();
        let total_frames = channel.len() / frame_size;
        let block_frames = scheme.codec.block_frames();
        let pad = config.pad_frames.min(total_frames.saturating_sub(block_frames));

        let first_block = pad * frame_size;

        let mut fft = FftProcessor::new(frame_size)?;
        let mut delta = vec![0.0f32; channel.len()];
        for frame in 0..total_frames {
            let start = frame * frame_size;
            let padding;
            let (bit, pattern): (bool, &FramePattern) =
                match scheme.codec.locate_sample(first_block, start) {
                    None => {
                        padding = padding_frame(&scheme.random, config, frame);
                        (padding.0, &padding.1)
                    }
                    Some((_, pos)) => match scheme.codec.role(pos) {
                        FrameRole::Sync(j) => {
                            (scheme.patterns.sync_bits[j], &scheme.patterns.sync)
                        }
                        FrameRole::Data { bit, .. } => (coded[bit], scheme.patterns.data(pos)),
                    },
                };

            let gains = pattern.gains(bit, config.strength, num_bins);
            fft.analyze(&channel[start..start + frame_size])?;
            fft.synthesize(|k| gains[k], &mut delta[start..start + frame_size])?;
        }
        Ok(delta)
    }
}

/// Scale every frame whose peak exceeds the format's ceiling by one gain.
/// Returns the number of frames scaled.
///
/// A constant gain per frame leaves the log-ratio statistic unchanged.
fn limit(signal: &mut AudioBuffer, frame_size: usize) -> usize {
    let ceiling = signal.ceiling();
    let chunk = frame_size * signal.channels as usize;
    let mut limited = 0;
    for frame in signal.samples.chunks_mut(chunk) {
        let peak = frame.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        if peak > ceiling {
            let gain = ceiling / peak;
            for s in frame.iter_mut() {
                *s = (*s * gain).clamp(-ceiling, ceiling);
            }
            limited += 1;
        }
    }
    limited
}
