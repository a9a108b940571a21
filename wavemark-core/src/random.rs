//! Keyed pseudo-random streams.
//!
//! Each [`Stream`] gets its own AES-128 sub-key, derived one-way from the
//! watermark key by encrypting a labelled block. A generator for
//! `(stream, index)` runs AES in counter mode under that sub-key with the
//! counter block `index || counter`, so the same inputs always give the same
//! sequence and no stream's output reveals another's.

use aes::Aes128;
use aes::cipher::{BlockEncrypt, KeyInit};

use crate::key::WatermarkKey;

/// Independent sub-sequences drawn from one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    /// Band selection and balanced sign sequence of the sync frames.
    SyncPattern,
    /// Band selection of data frames, indexed by block position.
    DataUpDown,
    /// Bits and bands of the filler frames before the first block.
    Padding,
    /// Permutation of data frames within a block.
    Mix,
}

impl Stream {
    const ALL: [Stream; 4] = [
        Stream::SyncPattern,
        Stream::DataUpDown,
        Stream::Padding,
        Stream::Mix,
    ];

    fn tag(self) -> u8 {
        match self {
            Stream::SyncPattern => 1,
            Stream::DataUpDown => 2,
            Stream::Padding => 3,
            Stream::Mix => 4,
        }
    }
}

/// Per-stream sub-keys derived from a [`WatermarkKey`].
#[derive(Clone)]
pub struct KeyedRandom {
    subkeys: [Aes128; 4],
}

impl KeyedRandom {
    pub fn new(key: &WatermarkKey) -> Self {
        let subkeys = Stream::ALL.map(|stream| {
            let mut label = *b"wavemark-stream\0";
            label[15] = stream.tag();
            Aes128::new(&aes::Block::from(key.encrypt(label)))
        });
        Self { subkeys }
    }

    /// Generator for `(stream, index)`, positioned at its first value.
    pub fn stream(&self, stream: Stream, index: u64) -> StreamRng {
        StreamRng {
            cipher: self.subkeys[stream.tag() as usize - 1].clone(),
            index,
            counter: 0,
            buf: [0; 2],
            pos: 2,
        }
    }
}

/// One deterministic sequence; advancing it is its only side effect.
pub struct StreamRng {
    cipher: Aes128,
    index: u64,
    counter: u64,
    buf: [u64; 2],
    pos: usize,
}

impl StreamRng {
    pub fn next_u64(&mut self) -> u64 {
        if self.pos == self.buf.len() {
            let mut input = [0u8; 16];
            input[..8].copy_from_slice(&self.index.to_le_bytes());
            input[8..].copy_from_slice(&self.counter.to_le_bytes());
            let mut block = aes::Block::from(input);
            self.cipher.encrypt_block(&mut block);
            let out = u128::from_le_bytes(block.into());
            self.buf = [out as u64, (out >> 64) as u64];
            self.counter += 1;
            self.pos = 0;
        }
        let value = self.buf[self.pos];
        self.pos += 1;
        value
    }

    /// Uniform value in `[0, 1)` with 53 bits of precision.
    pub fn uniform_double(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Unbiased integer in `0..n`. `n` must be non-zero.
    pub fn below(&mut self, n: u64) -> u64 {
        debug_assert!(n > 0);
        let zone = u64::MAX - u64::MAX % n;
        loop {
            let v = self.next_u64();
            if v < zone {
                return v % n;
            }
        }
    }

    pub fn bit(&mut self) -> bool {
        self.next_u64() & 1 == 1
    }

    /// Fisher-Yates shuffle; identical on every platform.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.below(i as u64 + 1) as usize;
            items.swap(i, j);
        }
    }
}
