//! The signal as the detector sees it: resampled to the mark rate,
//! speed-corrected, split into channels.

use crate::audio::AudioBuffer;
use crate::config::WatermarkConfig;
use crate::error::Result;
use crate::fft::FftProcessor;
use crate::pattern::FramePattern;
use crate::resample::Resampler;

pub struct AnalysisSignal {
    channels: Vec<Vec<f32>>,
    /// Speed the input was corrected for.
    speed: f64,
    /// Input samples per analysis sample at unit speed.
    rate_ratio: f64,
}

impl AnalysisSignal {
    /// Resample `signal` to the mark rate and undo playback speed `speed`.
    pub fn prepare(
        signal: &AudioBuffer,
        speed: f64,
        config: &WatermarkConfig,
        resampler: &dyn Resampler,
    ) -> Result<Self> {
        let marked = resampler.resample_to_rate(signal, config.mark_sample_rate)?;
        let corrected = resampler.resample_by_ratio(&marked, 1.0 / speed, config.mark_sample_rate)?;
        Ok(Self {
            channels: corrected.to_planar(),
            speed,
            rate_ratio: signal.sample_rate as f64 / config.mark_sample_rate as f64,
        })
    }

    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Input sample offset (per channel) of analysis sample `position`.
    pub fn input_offset(&self, position: usize) -> usize {
        (position as f64 / self.speed * self.rate_ratio).round() as usize
    }

    /// Analysis sample of input offset `offset`; inverse of
    /// [`AnalysisSignal::input_offset`].
    pub fn analysis_offset(&self, offset: usize) -> usize {
        (offset as f64 / self.rate_ratio * self.speed).round() as usize
    }
}

/// Frame statistics over an [`AnalysisSignal`], reusing one FFT plan.
pub struct FrameMeter {
    fft: FftProcessor,
}

impl FrameMeter {
    pub fn new(frame_size: usize) -> Result<Self> {
        Ok(Self {
            fft: FftProcessor::new(frame_size)?,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.fft.frame_size()
    }

    /// Up/down statistic of the frame starting at `start`, summed over
    /// channels. Frames running past the end are zero-padded.
    pub fn statistic(
        &mut self,
        signal: &AnalysisSignal,
        start: usize,
        pattern: &FramePattern,
    ) -> Result<f32> {
        let frame_size = self.frame_size();
        let mut total = 0.0f32;
        for channel in &signal.channels {
            let begin = start.min(channel.len());
            let end = (start + frame_size).min(channel.len());
            total += pattern.statistic(self.fft.analyze(&channel[begin..end])?);
        }
        Ok(total)
    }

    /// Statistics of consecutive whole frames starting at `offset`.
    pub fn frame_run(
        &mut self,
        signal: &AnalysisSignal,
        offset: usize,
        pattern: &FramePattern,
    ) -> Result<Vec<f32>> {
        let frame_size = self.frame_size();
        let count = signal.len().saturating_sub(offset) / frame_size;
        (0..count)
            .map(|i| self.statistic(signal, offset + i * frame_size, pattern))
            .collect()
    }
}
