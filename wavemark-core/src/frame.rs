//! Block geometry.
//!
//! A block is `sync_frames` sync frames plus `CODED_BITS * frames_per_bit`
//! data frames. Sync frame `j` sits at position `j * block_frames /
//! sync_frames`, spreading the sync evidence over the whole block so its
//! correlation falls off quickly under speed drift. Data slot
//! `bit * frames_per_bit + repeat` takes the remaining positions in order,
//! or in keyed order when mixing is enabled.

use crate::codec::CODED_BITS;
use crate::config::WatermarkConfig;
use crate::error::{Error, Result};
use crate::random::{KeyedRandom, Stream};

/// What a frame at a given block position carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRole {
    /// The `j`th sync frame.
    Sync(usize),
    /// One of the `frames_per_bit` copies of coded bit `bit`.
    Data { bit: usize, repeat: usize },
}

#[derive(Debug, Clone)]
pub struct FrameCodec {
    frame_size: usize,
    frames_per_bit: usize,
    sync_positions: Vec<usize>,
    /// Block position of each data slot.
    data_positions: Vec<usize>,
    roles: Vec<FrameRole>,
}

impl FrameCodec {
    pub fn new(config: &WatermarkConfig, random: &KeyedRandom) -> Self {
        let data_frames = CODED_BITS * config.frames_per_bit;
        let block_frames = config.sync_frames + data_frames;

        let sync_positions: Vec<usize> = (0..config.sync_frames)
            .map(|j| j * block_frames / config.sync_frames)
            .collect();

        let mut roles = vec![FrameRole::Sync(0); block_frames];
        for (j, &pos) in sync_positions.iter().enumerate() {
            roles[pos] = FrameRole::Sync(j);
        }
        let mut data_positions: Vec<usize> = (0..block_frames)
            .filter(|pos| sync_positions.binary_search(pos).is_err())
            .collect();
        if config.mix {
            random.stream(Stream::Mix, 0).shuffle(&mut data_positions);
        }
        for (slot, &pos) in data_positions.iter().enumerate() {
            roles[pos] = FrameRole::Data {
                bit: slot / config.frames_per_bit,
                repeat: slot % config.frames_per_bit,
            };
        }

        Self {
            frame_size: config.frame_size,
            frames_per_bit: config.frames_per_bit,
            sync_positions,
            data_positions,
            roles,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn frames_per_bit(&self) -> usize {
        self.frames_per_bit
    }

    pub fn block_frames(&self) -> usize {
        self.roles.len()
    }

    pub fn block_samples(&self) -> usize {
        self.block_frames() * self.frame_size
    }

    pub fn sync_frames(&self) -> usize {
        self.sync_positions.len()
    }

    pub fn sync_position(&self, j: usize) -> usize {
        self.sync_positions[j]
    }

    pub fn sync_positions(&self) -> &[usize] {
        &self.sync_positions
    }

    /// Block position of copy `repeat` of coded bit `bit`.
    pub fn data_position(&self, bit: usize, repeat: usize) -> usize {
        self.data_positions[bit * self.frames_per_bit + repeat]
    }

    pub fn role(&self, position: usize) -> FrameRole {
        self.roles[position]
    }

    /// First sample of frame `position` of block `block_index`, for blocks
    /// laid end to end from `block_start`.
    pub fn frame_start(&self, block_start: usize, block_index: usize, position: usize) -> usize {
        block_start + (block_index * self.block_frames() + position) * self.frame_size
    }

    /// Block index and position of the frame holding `sample`, or `None`
    /// before `block_start`.
    pub fn locate_sample(&self, block_start: usize, sample: usize) -> Option<(usize, usize)> {
        let frame = sample.checked_sub(block_start)? / self.frame_size;
        Some((frame / self.block_frames(), frame % self.block_frames()))
    }

    /// Refuse signals shorter than one block.
    pub fn require_block(&self, samples_per_channel: usize) -> Result<()> {
        if samples_per_channel < self.block_samples() {
            return Err(Error::InputTooShort {
                needed: self.block_samples(),
                got: samples_per_channel,
            });
        }
        Ok(())
    }
}
