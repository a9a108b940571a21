use realfft::num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Pre-allocated FFT processor for a fixed frame size.
///
/// Frames are rectangular and non-overlapping, so the spectrum seen here is
/// exactly the one the embedder modified.
pub struct FftProcessor {
    frame_size: usize,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    time_buf: Vec<f32>,
    freq_buf: Vec<Complex32>,
    scratch_fwd: Vec<Complex32>,
    scratch_inv: Vec<Complex32>,
}

impl FftProcessor {
    /// Create a new FFT processor. Frame size must be a non-zero power of 2.
    pub fn new(frame_size: usize) -> Result<Self> {
        if !frame_size.is_power_of_two() {
            return Err(Error::Fft(format!(
                "frame size must be a power of 2, got {frame_size}"
            )));
        }
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(frame_size);
        let inverse = planner.plan_fft_inverse(frame_size);

        let freq_buf = forward.make_output_vec();
        let scratch_fwd = forward.make_scratch_vec();
        let scratch_inv = inverse.make_scratch_vec();

        Ok(Self {
            frame_size,
            forward,
            inverse,
            time_buf: vec![0.0; frame_size],
            freq_buf,
            scratch_fwd,
            scratch_inv,
        })
    }

    /// Number of complex frequency bins (frame_size/2 + 1).
    pub fn num_bins(&self) -> usize {
        self.frame_size / 2 + 1
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Transform one frame. `frame` is left untouched; shorter input is
    /// zero-padded.
    pub fn analyze(&mut self, frame: &[f32]) -> Result<&[Complex32]> {
        if frame.len() > self.frame_size {
            return Err(Error::Fft(format!(
                "expected at most {} samples, got {}",
                self.frame_size,
                frame.len()
            )));
        }
        self.time_buf[..frame.len()].copy_from_slice(frame);
        self.time_buf[frame.len()..].fill(0.0);
        self.forward
            .process_with_scratch(&mut self.time_buf, &mut self.freq_buf, &mut self.scratch_fwd)
            .map_err(|e| Error::Fft(e.to_string()))?;
        Ok(&self.freq_buf)
    }

    /// Scale the bins of the last analyzed frame by `gain(bin)` and write
    /// the time-domain result, at unit scale, to `out`.
    ///
    /// With gains that are zero except on the modulated bins, `out` receives
    /// just the perturbation to add to the frame.
    pub fn synthesize(&mut self, gain: impl Fn(usize) -> f32, out: &mut [f32]) -> Result<()> {
        if out.len() != self.frame_size {
            return Err(Error::Fft(format!(
                "expected {} samples, got {}",
                self.frame_size,
                out.len()
            )));
        }
        for (k, bin) in self.freq_buf.iter_mut().enumerate() {
            *bin *= gain(k);
        }
        // DC and Nyquist must be real for the inverse transform
        let last = self.freq_buf.len() - 1;
        self.freq_buf[0].im = 0.0;
        self.freq_buf[last].im = 0.0;
        self.inverse
            .process_with_scratch(&mut self.freq_buf, out, &mut self.scratch_inv)
            .map_err(|e| Error::Fft(e.to_string()))?;
        let scale = 1.0 / self.frame_size as f32;
        for s in out.iter_mut() {
            *s *= scale;
        }
        Ok(())
    }
}
