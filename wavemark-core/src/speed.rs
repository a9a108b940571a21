//! Playback speed estimation.
//!
//! Each trial speed corrects a mono mark-rate copy of the input and scores
//! the best sync correlation over a few frame grids, without a threshold.
//! The coarse grid is scanned first, then a fine grid around the best coarse
//! speed. Trials are independent and run through [`crate::parallel`].

use crate::analysis::AnalysisSignal;
use crate::audio::AudioBuffer;
use crate::config::SpeedGrid;
use crate::error::Result;
use crate::parallel;
use crate::resample::Resampler;
use crate::scheme::Scheme;
use crate::sync::{SyncScorer, rank};

/// Outcome of scoring one speed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedTrial {
    pub speed: f64,
    pub score: f32,
}

/// Best speed for `signal` and the number of trials it took.
pub(crate) fn find_speed(
    scheme: &Scheme,
    resampler: &dyn Resampler,
    signal: &AudioBuffer,
    grid: &SpeedGrid,
) -> Result<(f64, u32)> {
    let mono = resampler.resample_to_rate(&signal.downmix(), scheme.config.mark_sample_rate)?;

    let coarse = run_trials(scheme, resampler, &mono, grid, &grid.coarse_speeds())?;
    let Some(best_coarse) = best_trial(&coarse, scheme.config.sync.tie_epsilon) else {
        return Ok((1.0, 0));
    };
    let fine = run_trials(scheme, resampler, &mono, grid, &grid.fine_speeds(best_coarse.speed))?;

    let trials = (coarse.len() + fine.len()) as u32;
    let all: Vec<SpeedTrial> = coarse.into_iter().chain(fine).collect();
    let speed = best_trial(&all, scheme.config.sync.tie_epsilon).map_or(1.0, |t| t.speed);
    Ok((speed, trials))
}

fn run_trials(
    scheme: &Scheme,
    resampler: &dyn Resampler,
    mono: &AudioBuffer,
    grid: &SpeedGrid,
    speeds: &[f64],
) -> Result<Vec<SpeedTrial>> {
    parallel::try_map(speeds, |&speed| {
        Ok(SpeedTrial {
            speed,
            score: score_speed(scheme, resampler, mono, grid.scan_offsets, speed)?,
        })
    })
}

/// Best sync correlation at `speed` over `scan_offsets` evenly spaced frame
/// grids.
fn score_speed(
    scheme: &Scheme,
    resampler: &dyn Resampler,
    mono: &AudioBuffer,
    scan_offsets: usize,
    speed: f64,
) -> Result<f32> {
    let analysis = AnalysisSignal::prepare(mono, speed, &scheme.config, resampler)?;
    let mut scorer = SyncScorer::new(scheme)?;
    let frame_size = scheme.config.frame_size;
    let grids = scan_offsets.min(frame_size);
    let mut best = f32::NEG_INFINITY;
    for g in 0..grids {
        for (_, score) in scorer.scan(&analysis, g * frame_size / grids)? {
            best = best.max(score);
        }
    }
    Ok(best)
}

fn best_trial(trials: &[SpeedTrial], tie_epsilon: f32) -> Option<SpeedTrial> {
    trials
        .iter()
        .copied()
        .min_by(|a, b| rank((a.score, a.speed, 0), (b.score, b.speed, 0), tie_epsilon))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_prefer_unit_speed() {
        let trials = [
            SpeedTrial {
                speed: 0.999,
                score: 0.7004,
            },
            SpeedTrial {
                speed: 1.0,
                score: 0.7,
            },
            SpeedTrial {
                speed: 1.001,
                score: 0.6,
            },
        ];
        assert_eq!(best_trial(&trials, 1e-3).unwrap().speed, 1.0);
        assert_eq!(best_trial(&trials, 0.0).unwrap().speed, 0.999);
        assert!(best_trial(&[], 1e-3).is_none());
    }

    #[test]
    fn clearly_better_speed_wins() {
        let trials = [
            SpeedTrial {
                speed: 1.0,
                score: 0.2,
            },
            SpeedTrial {
                speed: 1.004,
                score: 0.8,
            },
        ];
        assert_eq!(best_trial(&trials, 1e-3).unwrap().speed, 1.004);
    }
}
