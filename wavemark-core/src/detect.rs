use std::sync::Arc;

use crate::audio::AudioBuffer;
use crate::config::WatermarkConfig;
use crate::decode::{DecodeResult, Decoder};
use crate::error::Result;
use crate::key::WatermarkKey;
use crate::parallel;
use crate::report::DetectionReport;
use crate::resample::Resampler;
use crate::scheme::Scheme;
use crate::shortcode::ShortCode;
use crate::sync::SyncSearch;

/// Finds every block in a signal and combines them into one report.
///
/// Detection runs in three stages:
///
/// 1. **Speed**: unless the config fixes it, scan trial speeds on a mono
///    downmix and keep the best sync score.
/// 2. **Sync**: search block starts at the chosen speed, suppress
///    duplicates and refine each survivor to the sample.
/// 3. **Decode**: read every candidate's coded bits, then resolve the final
///    message from CRC-verified blocks, the soft-combined decode, or an
///    unverified vote, in that order.
pub struct Detector {
    search: SyncSearch,
    decoder: Decoder,
    config: WatermarkConfig,
}

impl Detector {
    pub fn new(key: &WatermarkKey, config: &WatermarkConfig) -> Result<Self> {
        let scheme = Arc::new(Scheme::new(key, config)?);
        Ok(Self {
            search: SyncSearch::from_scheme(Arc::clone(&scheme)),
            decoder: Decoder::from_scheme(scheme)?,
            config: config.clone(),
        })
    }

    pub fn with_resampler(self, resampler: Arc<dyn Resampler>) -> Self {
        Self {
            search: self.search.with_resampler(Arc::clone(&resampler)),
            decoder: self.decoder.with_resampler(resampler),
            config: self.config,
        }
    }

    pub fn with_short_code(mut self, code: Arc<dyn ShortCode>) -> Result<Self> {
        self.decoder = self.decoder.with_short_code(code)?;
        Ok(self)
    }

    /// Locate and decode all blocks.
    ///
    /// Not finding a watermark is not an error here: the report then has no
    /// message, and [`DetectionReport::outcome`] turns that into
    /// [`crate::Error::NoWatermarkFound`].
    pub fn detect(&self, signal: &AudioBuffer) -> Result<DetectionReport> {
        let (candidates, analysis, diagnostics) = self.search.search(signal)?;
        let results: Vec<DecodeResult> = parallel::try_map(&candidates, |candidate| {
            self.decoder.decode_analysis(&analysis, candidate)
        })?;
        DetectionReport::resolve(
            candidates,
            results,
            self.decoder.short_code(),
            self.config.tie_break,
            diagnostics,
        )
    }
}
