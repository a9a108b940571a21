use crate::audio::AudioBuffer;
use crate::config::WatermarkConfig;
use crate::error::{Error, Result};
use crate::frame::FrameCodec;
use crate::key::WatermarkKey;
use crate::pattern::PatternBook;
use crate::random::KeyedRandom;

/// Everything derived from (key, configuration) that embedder and detector
/// must agree on. Built once, read-only afterwards.
pub struct Scheme {
    pub config: WatermarkConfig,
    pub random: KeyedRandom,
    pub codec: FrameCodec,
    pub patterns: PatternBook,
}

impl Scheme {
    pub fn new(key: &WatermarkKey, config: &WatermarkConfig) -> Result<Self> {
        config.validate()?;
        let random = KeyedRandom::new(key);
        let codec = FrameCodec::new(config, &random);
        let patterns = PatternBook::new(&random, config, codec.block_frames());
        Ok(Self {
            config: config.clone(),
            random,
            codec,
            patterns,
        })
    }

    /// Refuse signals that hold less than one block at the mark rate.
    /// Lengths in the error are input samples per channel.
    pub fn require_block(&self, signal: &AudioBuffer) -> Result<()> {
        let mark_rate = self.config.mark_sample_rate as u64;
        let input_rate = signal.sample_rate as u64;
        let mark_len = signal.frames() as u64 * mark_rate / input_rate;
        if self.codec.require_block(mark_len as usize).is_err() {
            let block = self.codec.block_samples() as u64;
            return Err(Error::InputTooShort {
                needed: (block * input_rate).div_ceil(mark_rate) as usize,
                got: signal.frames(),
            });
        }
        Ok(())
    }
}
