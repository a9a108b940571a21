//! Sample rate conversion and time stretching.
//!
//! Inverse-maps every output sample to a fractional input position and
//! interpolates with a Blackman-windowed sinc kernel. The kernel is
//! tabulated once per call and linearly interpolated between phases.

use std::f64::consts::PI;

use crate::audio::AudioBuffer;
use crate::error::{Error, Result};

/// Rate conversion contract used by the mark-rate path and the speed search.
///
/// Implementations must keep the channel count and leave the input intact;
/// trials call them concurrently.
pub trait Resampler: Send + Sync {
    /// Convert to `rate`, keeping duration.
    fn resample_to_rate(&self, signal: &AudioBuffer, rate: u32) -> Result<AudioBuffer>;

    /// Play `signal` `ratio` times faster: output sample `n` is input
    /// position `n * ratio`, and the result is labelled `base_rate`.
    fn resample_by_ratio(
        &self,
        signal: &AudioBuffer,
        ratio: f64,
        base_rate: u32,
    ) -> Result<AudioBuffer>;
}

/// Kernel half-width in input samples.
const HALF_WIDTH: usize = 16;
/// Table entries per input sample.
const PHASES: usize = 256;

#[derive(Debug, Clone, Copy, Default)]
pub struct SincResampler;

impl SincResampler {
    pub fn new() -> Self {
        Self
    }

    fn stretch(&self, signal: &AudioBuffer, step: f64, out_len: usize, rate: u32) -> AudioBuffer {
        // Anti-aliasing when compressing time
        let cutoff = (1.0 / step).min(1.0);
        let table = kernel_table(cutoff);
        let planes: Vec<Vec<f32>> = signal
            .to_planar()
            .iter()
            .map(|channel| stretch_channel(channel, step, out_len, &table))
            .collect();
        AudioBuffer::from_planar(&planes, rate, signal)
    }
}

impl Resampler for SincResampler {
    fn resample_to_rate(&self, signal: &AudioBuffer, rate: u32) -> Result<AudioBuffer> {
        if rate == 0 {
            return Err(Error::InvalidAudio("target rate must be positive".to_string()));
        }
        if rate == signal.sample_rate {
            return Ok(signal.clone());
        }
        let out_len = (signal.frames() as u64 * rate as u64 / signal.sample_rate as u64) as usize;
        let step = signal.sample_rate as f64 / rate as f64;
        Ok(self.stretch(signal, step, out_len, rate))
    }

    fn resample_by_ratio(
        &self,
        signal: &AudioBuffer,
        ratio: f64,
        base_rate: u32,
    ) -> Result<AudioBuffer> {
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(Error::InvalidAudio(format!("invalid stretch ratio {ratio}")));
        }
        if ratio == 1.0 {
            let mut out = signal.clone();
            out.sample_rate = base_rate;
            return Ok(out);
        }
        let out_len = (signal.frames() as f64 / ratio).floor() as usize;
        Ok(self.stretch(signal, ratio, out_len, base_rate))
    }
}

/// `cutoff * sinc(cutoff * u) * blackman(u / HALF_WIDTH)` for
/// `u = m / PHASES - HALF_WIDTH`, plus one trailing zero for interpolation.
fn kernel_table(cutoff: f64) -> Vec<f32> {
    let len = 2 * HALF_WIDTH * PHASES + 2;
    (0..len)
        .map(|m| {
            let u = m as f64 / PHASES as f64 - HALF_WIDTH as f64;
            let v = u / HALF_WIDTH as f64;
            if v.abs() >= 1.0 {
                return 0.0;
            }
            let x = cutoff * u;
            let sinc = if x.abs() < 1e-12 {
                1.0
            } else {
                (PI * x).sin() / (PI * x)
            };
            let window = 0.42 + 0.5 * (PI * v).cos() + 0.08 * (2.0 * PI * v).cos();
            (cutoff * sinc * window) as f32
        })
        .collect()
}

fn stretch_channel(input: &[f32], step: f64, out_len: usize, table: &[f32]) -> Vec<f32> {
    let taps = 2 * HALF_WIDTH;
    (0..out_len)
        .map(|n| {
            let pos = n as f64 * step;
            let base = pos.floor();
            let frac = pos - base;
            // Tap j reads input base + j + 1 - HALF_WIDTH at kernel offset
            // u = j + 1 - HALF_WIDTH - frac.
            let x0 = (1.0 - frac) * PHASES as f64;
            let m0 = x0.floor() as usize;
            let a = (x0 - m0 as f64) as f32;
            let first = base as i64 + 1 - HALF_WIDTH as i64;

            let mut acc = 0.0f32;
            for j in 0..taps {
                let i = first + j as i64;
                if i < 0 || i as usize >= input.len() {
                    continue;
                }
                let m = m0 + j * PHASES;
                let h = table[m] + a * (table[m + 1] - table[m]);
                acc += input[i as usize] * h;
            }
            acc
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, rate: u32, len: usize) -> AudioBuffer {
        let samples = (0..len)
            .map(|i| (2.0 * PI * freq * i as f64 / rate as f64).sin() as f32 * 0.5)
            .collect();
        AudioBuffer::new(samples, 1, rate).unwrap()
    }

    fn max_error_vs_sine(buf: &AudioBuffer, freq: f64, time_scale: f64, skip: usize) -> f32 {
        buf.samples
            .iter()
            .enumerate()
            .skip(skip)
            .take(buf.samples.len().saturating_sub(2 * skip))
            .map(|(i, &s)| {
                let t = i as f64 * time_scale / buf.sample_rate as f64;
                let expected = (2.0 * PI * freq * t).sin() as f32 * 0.5;
                (s - expected).abs()
            })
            .fold(0.0f32, f32::max)
    }

    #[test]
    fn rate_conversion_preserves_a_tone() {
        let input = sine(1000.0, 48000, 4800);
        let out = SincResampler.resample_to_rate(&input, 44100).unwrap();
        assert_eq!(out.sample_rate, 44100);
        assert_eq!(out.frames(), 4410);
        let err = max_error_vs_sine(&out, 1000.0, 1.0, 64);
        assert!(err < 5e-3, "max error {err}");
    }

    #[test]
    fn ratio_speeds_up() {
        let input = sine(500.0, 44100, 44100);
        let out = SincResampler.resample_by_ratio(&input, 1.01, 44100).unwrap();
        assert_eq!(out.frames(), (44100.0f64 / 1.01).floor() as usize);
        // Output sample n is input time n * 1.01
        let err = max_error_vs_sine(&out, 500.0, 1.01, 64);
        assert!(err < 5e-3, "max error {err}");
    }

    #[test]
    fn round_trip_ratio() {
        let input = sine(3000.0, 44100, 20000);
        let fast = SincResampler.resample_by_ratio(&input, 1.005, 44100).unwrap();
        let back = SincResampler.resample_by_ratio(&fast, 1.0 / 1.005, 44100).unwrap();
        let n = back.frames().min(input.frames());
        let err = (200..n - 200)
            .map(|i| (back.samples[i] - input.samples[i]).abs())
            .fold(0.0f32, f32::max);
        assert!(err < 1e-2, "max error {err}");
    }

    #[test]
    fn keeps_channels_and_identity() {
        let input = AudioBuffer::new(vec![0.1, 0.2, 0.3, 0.4], 2, 44100).unwrap();
        let same = SincResampler.resample_to_rate(&input, 44100).unwrap();
        assert_eq!(same, input);
        let out = SincResampler.resample_to_rate(&input, 22050).unwrap();
        assert_eq!(out.channels, 2);
        assert!(SincResampler.resample_by_ratio(&input, 0.0, 44100).is_err());
    }
}
