use crate::error::{Error, Result};

/// Sample rate at which frames are defined. Input at any other rate is
/// resampled to it for analysis.
pub const MARK_SAMPLE_RATE: u32 = 44100;

/// Configuration for watermark embedding and detection.
///
/// Built once per run and passed by reference; nothing in the engine
/// mutates it.
#[derive(Debug, Clone)]
pub struct WatermarkConfig {
    /// Relative magnitude change applied to selected bins. Higher = more
    /// robust but more audible. Default: 0.05.
    pub strength: f32,
    /// FFT frame size in samples at the mark rate. Must be a power of 2.
    pub frame_size: usize,
    /// Sync frames per block.
    pub sync_frames: usize,
    /// Data frames carrying each coded bit.
    pub frames_per_bit: usize,
    /// Frames of keyed filler placed before the first block.
    pub pad_frames: usize,
    /// Bins scaled up (and, separately, bins scaled down) per frame.
    pub bands_per_frame: usize,
    /// Lowest usable FFT bin.
    pub min_band: usize,
    /// One past the highest usable FFT bin.
    pub max_band: usize,
    /// Interleave data frames through the block with a keyed permutation.
    pub mix: bool,
    /// Scale frames down so the output never exceeds the sample ceiling.
    pub limiter: bool,
    /// Rate frames are defined at.
    pub mark_sample_rate: u32,
    /// Width of the short payload, or `None` for the full 128-bit message.
    pub short_payload_bits: Option<usize>,
    pub sync: SyncParams,
    pub speed: SpeedMode,
    pub tie_break: TieBreak,
    pub decode_mode: DecodeMode,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            strength: 0.05,
            frame_size: 512,
            sync_frames: 64,
            frames_per_bit: 2,
            pad_frames: 16,
            bands_per_frame: 100,
            min_band: 8,
            max_band: 224,
            mix: true,
            limiter: true,
            mark_sample_rate: MARK_SAMPLE_RATE,
            short_payload_bits: None,
            sync: SyncParams::default(),
            speed: SpeedMode::Off,
            tie_break: TieBreak::Evidence,
            decode_mode: DecodeMode::Soft,
        }
    }
}

impl WatermarkConfig {
    /// Number of complex frequency bins (frame_size / 2 + 1).
    pub fn num_bins(&self) -> usize {
        self.frame_size / 2 + 1
    }

    /// Width of the message carried by each block.
    pub fn message_bits(&self) -> usize {
        self.short_payload_bits
            .unwrap_or(crate::message::MESSAGE_BITS)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.strength) {
            return invalid(format!("strength must be in [0, 1), got {}", self.strength));
        }
        if !self.frame_size.is_power_of_two() || self.frame_size < 64 {
            return invalid(format!(
                "frame_size must be a power of 2 and at least 64, got {}",
                self.frame_size
            ));
        }
        if self.sync_frames < 2 {
            return invalid(format!("sync_frames must be at least 2, got {}", self.sync_frames));
        }
        if self.frames_per_bit == 0 {
            return invalid("frames_per_bit must be at least 1".to_string());
        }
        if self.min_band == 0 || self.max_band >= self.num_bins() - 1 {
            return invalid(format!(
                "band range [{}, {}) must lie strictly inside 0..{}",
                self.min_band,
                self.max_band,
                self.num_bins() - 1
            ));
        }
        if self.bands_per_frame == 0
            || self.min_band >= self.max_band
            || 2 * self.bands_per_frame > self.max_band - self.min_band
        {
            return invalid(format!(
                "{} up and {} down bands do not fit in [{}, {})",
                self.bands_per_frame, self.bands_per_frame, self.min_band, self.max_band
            ));
        }
        if self.mark_sample_rate == 0 {
            return invalid("mark_sample_rate must be positive".to_string());
        }
        if let Some(bits) = self.short_payload_bits {
            if !(4..=20).contains(&bits) || bits % 4 != 0 {
                return invalid(format!(
                    "short payload must be 4..=20 bits in steps of 4, got {bits}"
                ));
            }
        }
        self.sync.validate(self.frame_size)?;
        self.speed.validate()
    }
}

/// Sync search tuning.
#[derive(Debug, Clone)]
pub struct SyncParams {
    /// Minimum normalized correlation for a block start to become a candidate.
    pub threshold: f32,
    /// Coarse sample step between trial frame grids.
    pub search_step: usize,
    /// Step of the first refinement pass (the second pass is per sample).
    pub fine_step: usize,
    /// Scores closer than this are treated as equal when ranking.
    pub tie_epsilon: f32,
}

impl Default for SyncParams {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            search_step: 64,
            fine_step: 8,
            tie_epsilon: 1e-3,
        }
    }
}

impl SyncParams {
    fn validate(&self, frame_size: usize) -> Result<()> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return invalid(format!("sync threshold must be in (0, 1], got {}", self.threshold));
        }
        if self.search_step == 0 || self.search_step > frame_size {
            return invalid(format!(
                "search_step must be in 1..={frame_size}, got {}",
                self.search_step
            ));
        }
        if self.fine_step == 0 || self.fine_step > self.search_step {
            return invalid(format!(
                "fine_step must be in 1..={}, got {}",
                self.search_step, self.fine_step
            ));
        }
        if self.tie_epsilon < 0.0 {
            return invalid("tie_epsilon must not be negative".to_string());
        }
        Ok(())
    }
}

/// Speed hypotheses tried by the sync search.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeedMode {
    /// Assume unit speed.
    Off,
    /// Try exactly one speed.
    Forced(f64),
    /// Scan a grid of speeds and keep the best.
    Search(SpeedGrid),
}

impl SpeedMode {
    fn validate(&self) -> Result<()> {
        match self {
            SpeedMode::Off => Ok(()),
            SpeedMode::Forced(speed) => {
                if (0.5..=2.0).contains(speed) {
                    Ok(())
                } else {
                    invalid(format!("forced speed must be in [0.5, 2.0], got {speed}"))
                }
            }
            SpeedMode::Search(grid) => grid.validate(),
        }
    }
}

/// A linear grid of speed ratios around 1.0, scanned coarsely and then
/// refined around the best coarse hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedGrid {
    pub max_deviation: f64,
    pub coarse_step: f64,
    pub fine_step: f64,
    /// Frame grids per frame tried for each coarse speed.
    pub scan_offsets: usize,
}

impl SpeedGrid {
    pub fn normal() -> Self {
        Self {
            max_deviation: 0.03,
            coarse_step: 0.001,
            fine_step: 0.0001,
            scan_offsets: 4,
        }
    }

    /// Wider and finer than [`SpeedGrid::normal`]; several times slower.
    pub fn patient() -> Self {
        Self {
            max_deviation: 0.06,
            coarse_step: 0.0005,
            fine_step: 0.00005,
            scan_offsets: 8,
        }
    }

    /// Coarse trial speeds, 1.0 included exactly.
    pub fn coarse_speeds(&self) -> Vec<f64> {
        steps_around(1.0, self.max_deviation, self.coarse_step)
    }

    /// Fine trial speeds within one coarse step of `center`.
    pub fn fine_speeds(&self, center: f64) -> Vec<f64> {
        steps_around(center, self.coarse_step, self.fine_step)
    }

    fn validate(&self) -> Result<()> {
        if !(self.max_deviation > 0.0 && self.max_deviation < 0.5) {
            return invalid(format!(
                "max speed deviation must be in (0, 0.5), got {}",
                self.max_deviation
            ));
        }
        if !(self.coarse_step > 0.0 && self.fine_step > 0.0 && self.fine_step <= self.coarse_step)
        {
            return invalid(format!(
                "speed steps must satisfy 0 < fine ({}) <= coarse ({})",
                self.fine_step, self.coarse_step
            ));
        }
        if self.scan_offsets == 0 {
            return invalid("scan_offsets must be at least 1".to_string());
        }
        Ok(())
    }
}

fn steps_around(center: f64, span: f64, step: f64) -> Vec<f64> {
    let n = (span / step).round() as i64;
    (-n..=n).map(|i| center + i as f64 * step).collect()
}

/// How a bit position with equal vote counts is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    /// Sign of the summed per-bit confidence; zero if that is also tied.
    Evidence,
    Zero,
    One,
}

/// What the Viterbi decoder is fed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Frame statistics as they are.
    Soft,
    /// Only the sign of each statistic, as `+1.0` / `-1.0`.
    Hard,
}

fn invalid(msg: String) -> Result<()> {
    Err(Error::InvalidConfig(msg))
}
