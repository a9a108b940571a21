//! Up/down band modulation of a single frame.
//!
//! A frame carries one bit `b` through two disjoint sets of FFT bins: the
//! "up" bins are scaled by `1 + s * strength` and the "down" bins by
//! `1 - s * strength`, where `s = +1` for `b = 1` and `-1` for `b = 0`. The
//! detector measures `sum_up ln|X| - sum_down ln|X|`; for any frame-constant
//! gain the log terms cancel, so the statistic shifts by a fixed amount per
//! bit regardless of loudness.

use realfft::num_complex::Complex32;

use crate::config::WatermarkConfig;
use crate::random::{KeyedRandom, Stream, StreamRng};

/// Magnitudes below this are clamped before taking the logarithm.
const MAGNITUDE_FLOOR: f32 = 1e-9;

/// Bins modulated in one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePattern {
    pub up: Vec<usize>,
    pub down: Vec<usize>,
}

impl FramePattern {
    /// Draw `bands_per_frame` up and as many down bins from
    /// `min_band..max_band` without repetition.
    pub fn draw(rng: &mut StreamRng, config: &WatermarkConfig) -> Self {
        let mut bins: Vec<usize> = (config.min_band..config.max_band).collect();
        rng.shuffle(&mut bins);
        let n = config.bands_per_frame;
        Self {
            up: bins[..n].to_vec(),
            down: bins[n..2 * n].to_vec(),
        }
    }

    /// Per-bin gain of the perturbation that writes `bit` into a frame.
    ///
    /// Multiplying the spectrum by `1.0 + gains[k]` modulates it; the gains
    /// alone, inverse transformed, give the additive delta.
    pub fn gains(&self, bit: bool, strength: f32, num_bins: usize) -> Vec<f32> {
        let sign = if bit { strength } else { -strength };
        let mut gains = vec![0.0f32; num_bins];
        for &k in &self.up {
            gains[k] = sign;
        }
        for &k in &self.down {
            gains[k] = -sign;
        }
        gains
    }

    /// Log-magnitude up/down statistic of one analyzed frame.
    ///
    /// Positive values suggest bit 1, negative bit 0.
    pub fn statistic(&self, bins: &[Complex32]) -> f32 {
        let floor = MAGNITUDE_FLOOR * MAGNITUDE_FLOOR;
        let log_mag = |k: usize| 0.5 * bins[k].norm_sqr().max(floor).ln();
        let up: f32 = self.up.iter().map(|&k| log_mag(k)).sum();
        let down: f32 = self.down.iter().map(|&k| log_mag(k)).sum();
        up - down
    }
}

/// All keyed patterns one block needs, drawn once per embed or detect call.
pub struct PatternBook {
    /// Bins of every sync frame.
    pub sync: FramePattern,
    /// Balanced sign sequence of the sync frames, in block order.
    pub sync_bits: Vec<bool>,
    /// Bins of each block position; sync positions hold unused entries.
    data: Vec<FramePattern>,
}

impl PatternBook {
    pub fn new(random: &KeyedRandom, config: &WatermarkConfig, block_frames: usize) -> Self {
        let sync = FramePattern::draw(&mut random.stream(Stream::SyncPattern, 0), config);
        let sync_bits = balanced_bits(&mut random.stream(Stream::SyncPattern, 1), config.sync_frames);
        let data = (0..block_frames)
            .map(|pos| FramePattern::draw(&mut random.stream(Stream::DataUpDown, pos as u64), config))
            .collect();
        Self {
            sync,
            sync_bits,
            data,
        }
    }

    /// Data pattern for a block position.
    pub fn data(&self, position: usize) -> &FramePattern {
        &self.data[position]
    }

    /// Sync signs as `+1.0` / `-1.0`.
    pub fn sync_signs(&self) -> Vec<f32> {
        self.sync_bits
            .iter()
            .map(|&b| if b { 1.0 } else { -1.0 })
            .collect()
    }
}

/// A padding frame's bit and bins, keyed by its global frame index.
pub fn padding_frame(random: &KeyedRandom, config: &WatermarkConfig, frame: usize) -> (bool, FramePattern) {
    let mut rng = random.stream(Stream::Padding, frame as u64);
    let bit = rng.bit();
    (bit, FramePattern::draw(&mut rng, config))
}

/// `n` signs with as many ones as zeros (one extra zero when `n` is odd),
/// in keyed order.
fn balanced_bits(rng: &mut StreamRng, n: usize) -> Vec<bool> {
    let mut bits: Vec<bool> = (0..n).map(|i| i < n / 2).collect();
    rng.shuffle(&mut bits);
    bits
}
