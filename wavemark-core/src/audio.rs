use crate::error::{Error, Result};

/// How samples were stored before they reached the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Int,
    Float,
}

/// An in-memory signal: interleaved `f32` samples in `[-1, 1]` plus the
/// format facts the engine must preserve.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub format: SampleFormat,
}

impl AudioBuffer {
    /// A 16-bit integer signal.
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Result<Self> {
        Self::with_format(samples, channels, sample_rate, 16, SampleFormat::Int)
    }

    pub fn with_format(
        samples: Vec<f32>,
        channels: u16,
        sample_rate: u32,
        bit_depth: u16,
        format: SampleFormat,
    ) -> Result<Self> {
        if channels == 0 {
            return Err(Error::InvalidAudio("zero channels".to_string()));
        }
        if sample_rate == 0 {
            return Err(Error::InvalidAudio("zero sample rate".to_string()));
        }
        if !samples.len().is_multiple_of(channels as usize) {
            return Err(Error::InvalidAudio(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }
        if !(2..=32).contains(&bit_depth) {
            return Err(Error::InvalidAudio(format!("unsupported bit depth {bit_depth}")));
        }
        Ok(Self {
            samples,
            channels,
            sample_rate,
            bit_depth,
            format,
        })
    }

    /// Build from one vector per channel, copying the format of `like`.
    /// Channels are truncated to the shortest.
    pub fn from_planar(planes: &[Vec<f32>], sample_rate: u32, like: &AudioBuffer) -> Self {
        let frames = planes.iter().map(Vec::len).min().unwrap_or(0);
        let mut samples = Vec::with_capacity(frames * planes.len());
        for i in 0..frames {
            samples.extend(planes.iter().map(|p| p[i]));
        }
        Self {
            samples,
            channels: planes.len() as u16,
            sample_rate,
            bit_depth: like.bit_depth,
            format: like.format,
        }
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Vec<f32> {
        self.samples
            .iter()
            .skip(index)
            .step_by(self.channels as usize)
            .copied()
            .collect()
    }

    pub fn to_planar(&self) -> Vec<Vec<f32>> {
        (0..self.channels as usize).map(|c| self.channel(c)).collect()
    }

    /// Mono mix (channel mean) with the same rate and format.
    pub fn downmix(&self) -> AudioBuffer {
        let scale = 1.0 / self.channels as f32;
        let samples = self
            .samples
            .chunks_exact(self.channels as usize)
            .map(|frame| frame.iter().sum::<f32>() * scale)
            .collect();
        AudioBuffer {
            samples,
            channels: 1,
            sample_rate: self.sample_rate,
            bit_depth: self.bit_depth,
            format: self.format,
        }
    }

    /// Largest magnitude the stored format can represent.
    pub fn ceiling(&self) -> f32 {
        match self.format {
            SampleFormat::Float => 1.0,
            SampleFormat::Int => {
                let full = (1u64 << (self.bit_depth - 1)) as f64;
                ((full - 1.0) / full) as f32
            }
        }
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ragged_samples() {
        assert!(AudioBuffer::new(vec![0.0; 5], 2, 44100).is_err());
        assert!(AudioBuffer::new(vec![0.0; 4], 0, 44100).is_err());
    }

    #[test]
    fn planar_round_trip() {
        let buf = AudioBuffer::new(vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0], 2, 44100).unwrap();
        assert_eq!(buf.frames(), 3);
        let planes = buf.to_planar();
        assert_eq!(planes[0], vec![1.0, 2.0, 3.0]);
        assert_eq!(planes[1], vec![-1.0, -2.0, -3.0]);
        assert_eq!(AudioBuffer::from_planar(&planes, 44100, &buf), buf);
    }

    #[test]
    fn downmix_averages() {
        let buf = AudioBuffer::new(vec![1.0, 0.0, 0.5, 0.5], 2, 48000).unwrap();
        let mono = buf.downmix();
        assert_eq!(mono.channels, 1);
        assert_eq!(mono.sample_rate, 48000);
        assert_eq!(mono.samples, vec![0.5, 0.5]);
    }

    #[test]
    fn ceiling_follows_format() {
        let int16 = AudioBuffer::new(vec![], 1, 44100).unwrap();
        assert!((int16.ceiling() - 32767.0 / 32768.0).abs() < 1e-9);
        let float = AudioBuffer::with_format(vec![], 1, 44100, 32, SampleFormat::Float).unwrap();
        assert_eq!(float.ceiling(), 1.0);
    }
}
