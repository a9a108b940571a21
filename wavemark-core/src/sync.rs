use std::cmp::Ordering;
use std::sync::Arc;

use crate::analysis::{AnalysisSignal, FrameMeter};
use crate::audio::AudioBuffer;
use crate::config::{SpeedMode, WatermarkConfig};
use crate::error::Result;
use crate::key::WatermarkKey;
use crate::resample::{Resampler, SincResampler};
use crate::scheme::Scheme;
use crate::speed;

/// A located block hypothesis.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Block start in input samples per channel.
    pub offset: usize,
    /// Playback speed the block was found at (1.0 = undistorted).
    pub speed: f64,
    /// Normalized sync correlation in `[-1, 1]`.
    pub confidence: f32,
    /// Block start in the speed-corrected mark-rate signal.
    pub analysis_offset: usize,
}

impl Candidate {
    /// Ranking order: confidence (equal within `tie_epsilon`) descending,
    /// then speed closest to 1.0, then earliest offset.
    pub fn ranking(&self, other: &Candidate, tie_epsilon: f32) -> Ordering {
        rank(
            (self.confidence, self.speed, self.analysis_offset),
            (other.confidence, other.speed, other.analysis_offset),
            tie_epsilon,
        )
    }
}

/// Total order over `(score, speed, position)` triples shared by candidate
/// ranking and speed-trial selection.
pub(crate) fn rank(a: (f32, f64, usize), b: (f32, f64, usize), tie_epsilon: f32) -> Ordering {
    let bucket = |score: f32| -> i64 {
        if tie_epsilon > 0.0 {
            (score / tie_epsilon).round() as i64
        } else {
            0
        }
    };
    let by_score = if tie_epsilon > 0.0 {
        bucket(b.0).cmp(&bucket(a.0))
    } else {
        b.0.total_cmp(&a.0)
    };
    by_score
        .then_with(|| (a.1 - 1.0).abs().total_cmp(&(b.1 - 1.0).abs()))
        .then_with(|| a.2.cmp(&b.2))
}

/// Diagnostics from a search.
#[derive(Debug, Clone, Default)]
pub struct SearchDiagnostics {
    /// Best sync correlation seen anywhere, thresholded or not.
    pub best_sync_corr: f32,
    /// Frame grids scanned at the chosen speed.
    pub offsets_searched: u32,
    /// Block starts above threshold before suppression.
    pub sync_hits: u32,
    /// Hits dropped as duplicates of a stronger nearby hit.
    pub suppressed: u32,
    /// Speeds tried (0 without a speed search).
    pub speed_trials: u32,
    /// Speed the final search ran at.
    pub chosen_speed: f64,
}

/// Normalized, mean-removed correlation of per-frame statistics with the
/// ±1 sync signs. Returns a value in `[-1, 1]`; 0 for flat input.
pub fn correlate_sync(values: &[f32], signs: &[f32]) -> f32 {
    if values.len() != signs.len() || values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let mut dot = 0.0f32;
    let mut energy = 0.0f32;
    for (&x, &s) in values.iter().zip(signs) {
        let centered = x - mean;
        dot += s * centered;
        energy += centered * centered;
    }
    let norm = (n * energy).sqrt();
    if norm < 1e-12 {
        return 0.0;
    }
    (dot / norm).clamp(-1.0, 1.0)
}

/// Sync scoring over one [`AnalysisSignal`].
pub(crate) struct SyncScorer<'a> {
    scheme: &'a Scheme,
    signs: Vec<f32>,
    meter: FrameMeter,
}

impl<'a> SyncScorer<'a> {
    pub fn new(scheme: &'a Scheme) -> Result<Self> {
        Ok(Self {
            scheme,
            signs: scheme.patterns.sync_signs(),
            meter: FrameMeter::new(scheme.config.frame_size)?,
        })
    }

    /// Correlation of the block starting at analysis sample `pos`.
    pub fn score_at(&mut self, signal: &AnalysisSignal, pos: usize) -> Result<f32> {
        let codec = &self.scheme.codec;
        let values = codec
            .sync_positions()
            .iter()
            .map(|&p| {
                self.meter
                    .statistic(signal, codec.frame_start(pos, 0, p), &self.scheme.patterns.sync)
            })
            .collect::<Result<Vec<f32>>>()?;
        Ok(correlate_sync(&values, &self.signs))
    }

    /// Score every whole block start on the frame grid beginning at
    /// `offset`, as `(position, score)`.
    pub fn scan(&mut self, signal: &AnalysisSignal, offset: usize) -> Result<Vec<(usize, f32)>> {
        let codec = &self.scheme.codec;
        let stats = self
            .meter
            .frame_run(signal, offset, &self.scheme.patterns.sync)?;
        let block_frames = codec.block_frames();
        if stats.len() < block_frames {
            return Ok(Vec::new());
        }
        let mut values = vec![0.0f32; codec.sync_frames()];
        Ok((0..=stats.len() - block_frames)
            .map(|i| {
                for (v, &p) in values.iter_mut().zip(codec.sync_positions()) {
                    *v = stats[i + p];
                }
                (offset + i * codec.frame_size(), correlate_sync(&values, &self.signs))
            })
            .collect())
    }

    /// Best position within reach of `pos`: first at `fine_step`, then per
    /// sample.
    pub fn refine(&mut self, signal: &AnalysisSignal, pos: usize, score: f32) -> Result<(usize, f32)> {
        let params = &self.scheme.config.sync;
        let last = signal.len().saturating_sub(self.scheme.codec.block_samples());
        let mut best = (pos, score);
        for (step, span) in [(params.fine_step, params.search_step), (1, params.fine_step)] {
            let center = best.0;
            let lo = center.saturating_sub(span);
            let hi = (center + span).min(last);
            let mut p = lo + (center - lo) % step;
            while p <= hi {
                if p != center {
                    let s = self.score_at(signal, p)?;
                    if s > best.1 {
                        best = (p, s);
                    }
                }
                p += step;
            }
        }
        Ok(best)
    }
}

/// Locates sync patterns, optionally over a range of playback speeds.
pub struct SyncSearch {
    scheme: Arc<Scheme>,
    resampler: Arc<dyn Resampler>,
}

impl SyncSearch {
    pub fn new(key: &WatermarkKey, config: &WatermarkConfig) -> Result<Self> {
        Ok(Self::from_scheme(Arc::new(Scheme::new(key, config)?)))
    }

    pub(crate) fn from_scheme(scheme: Arc<Scheme>) -> Self {
        Self {
            scheme,
            resampler: Arc::new(SincResampler),
        }
    }

    pub fn with_resampler(mut self, resampler: Arc<dyn Resampler>) -> Self {
        self.resampler = resampler;
        self
    }

    /// All blocks above the sync threshold, best first.
    ///
    /// An empty list means no watermark was found; a signal shorter than
    /// one block is [`crate::Error::InputTooShort`].
    pub fn locate(&self, signal: &AudioBuffer) -> Result<Vec<Candidate>> {
        Ok(self.search(signal)?.0)
    }

    pub fn locate_with_diagnostics(
        &self,
        signal: &AudioBuffer,
    ) -> Result<(Vec<Candidate>, SearchDiagnostics)> {
        let (candidates, _, diag) = self.search(signal)?;
        Ok((candidates, diag))
    }

    /// Full search; also returns the analysis signal at the chosen speed so
    /// candidates can be decoded without resampling again.
    pub(crate) fn search(
        &self,
        signal: &AudioBuffer,
    ) -> Result<(Vec<Candidate>, AnalysisSignal, SearchDiagnostics)> {
        let config = &self.scheme.config;
        self.scheme.require_block(signal)?;

        let mut diag = SearchDiagnostics::default();
        let speed = match &config.speed {
            SpeedMode::Off => 1.0,
            SpeedMode::Forced(speed) => *speed,
            SpeedMode::Search(grid) => {
                let (speed, trials) =
                    speed::find_speed(&self.scheme, self.resampler.as_ref(), signal, grid)?;
                diag.speed_trials = trials;
                speed
            }
        };
        diag.chosen_speed = speed;

        let analysis = AnalysisSignal::prepare(signal, speed, config, self.resampler.as_ref())?;
        let candidates = self.search_offsets(&analysis, &mut diag)?;
        Ok((candidates, analysis, diag))
    }

    fn search_offsets(
        &self,
        signal: &AnalysisSignal,
        diag: &mut SearchDiagnostics,
    ) -> Result<Vec<Candidate>> {
        let config = &self.scheme.config;
        let params = &config.sync;
        let mut scorer = SyncScorer::new(&self.scheme)?;

        let mut hits = Vec::new();
        for offset in (0..config.frame_size).step_by(params.search_step) {
            diag.offsets_searched += 1;
            for (pos, score) in scorer.scan(signal, offset)? {
                diag.best_sync_corr = diag.best_sync_corr.max(score);
                if score >= params.threshold {
                    hits.push(self.candidate(signal, pos, score));
                }
            }
        }
        diag.sync_hits = hits.len() as u32;

        let coarse = self.suppress(hits, diag);
        let mut refined = Vec::with_capacity(coarse.len());
        for hit in coarse {
            let (pos, score) = scorer.refine(signal, hit.analysis_offset, hit.confidence)?;
            diag.best_sync_corr = diag.best_sync_corr.max(score);
            refined.push(self.candidate(signal, pos, score));
        }
        Ok(self.suppress(refined, diag))
    }

    fn candidate(&self, signal: &AnalysisSignal, pos: usize, score: f32) -> Candidate {
        Candidate {
            offset: signal.input_offset(pos),
            speed: signal.speed(),
            confidence: score,
            analysis_offset: pos,
        }
    }

    /// Sort best first and drop hits within half a block of a better one.
    fn suppress(&self, mut hits: Vec<Candidate>, diag: &mut SearchDiagnostics) -> Vec<Candidate> {
        let eps = self.scheme.config.sync.tie_epsilon;
        let radius = self.scheme.codec.block_samples() / 2;
        hits.sort_by(|a, b| a.ranking(b, eps));
        let mut kept: Vec<Candidate> = Vec::new();
        for hit in hits {
            if kept
                .iter()
                .any(|k| k.analysis_offset.abs_diff(hit.analysis_offset) < radius)
            {
                diag.suppressed += 1;
            } else {
                kept.push(hit);
            }
        }
        kept
    }
}
