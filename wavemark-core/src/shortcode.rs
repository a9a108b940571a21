//! Error correction for payloads narrower than the full message.
//!
//! Short mode maps a `k`-bit payload onto a 128-bit codeword that travels
//! through the block exactly like a full message.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::config::WatermarkConfig;
use crate::error::{Error, Result};
use crate::message::MESSAGE_BITS;

/// Encode/decode contract of a short-payload code.
pub trait ShortCode: Send + Sync {
    fn payload_bits(&self) -> usize;

    fn codeword_bits(&self) -> usize;

    fn encode(&self, payload: &[bool]) -> Result<Vec<bool>>;

    /// Returns the payload and whether the codeword was within correction
    /// range. `false` means the payload is only a best guess.
    fn decode(&self, codeword: &[bool]) -> Result<(Vec<bool>, bool)>;
}

/// A random `[128, k]` binary linear code with maximum-likelihood decoding.
///
/// The generator rows come from a ChaCha20 stream with a public seed, so
/// every build agrees on the code. `k` is small enough (at most 20) to
/// enumerate all codewords.
#[derive(Debug, Clone)]
pub struct RandomLinearCode {
    rows: Vec<u128>,
    min_distance: u32,
}

impl RandomLinearCode {
    pub const MAX_PAYLOAD_BITS: usize = 20;

    pub fn new(payload_bits: usize) -> Result<Self> {
        if payload_bits == 0 || payload_bits > Self::MAX_PAYLOAD_BITS {
            return Err(Error::InvalidConfig(format!(
                "short code supports 1..={} payload bits, got {payload_bits}",
                Self::MAX_PAYLOAD_BITS
            )));
        }
        let mut seed = *b"wavemark short code generator\0\0\0";
        seed[31] = payload_bits as u8;
        let mut rng = ChaCha20Rng::from_seed(seed);
        let rows: Vec<u128> = (0..payload_bits).map(|_| rng.r#gen::<u128>()).collect();

        let mut min_distance = u32::MAX;
        for_each_codeword(&rows, |m, cw| {
            if m != 0 {
                min_distance = min_distance.min(cw.count_ones());
            }
        });

        Ok(Self { rows, min_distance })
    }

    /// Smallest Hamming distance between two codewords.
    pub fn min_distance(&self) -> u32 {
        self.min_distance
    }

    /// Errors guaranteed to be corrected.
    pub fn correctable(&self) -> u32 {
        self.min_distance.saturating_sub(1) / 2
    }
}

impl ShortCode for RandomLinearCode {
    fn payload_bits(&self) -> usize {
        self.rows.len()
    }

    fn codeword_bits(&self) -> usize {
        MESSAGE_BITS
    }

    fn encode(&self, payload: &[bool]) -> Result<Vec<bool>> {
        if payload.len() != self.rows.len() {
            return Err(Error::GeometryMismatch {
                expected: self.rows.len(),
                got: payload.len(),
            });
        }
        let cw = payload
            .iter()
            .zip(&self.rows)
            .filter(|(bit, _)| **bit)
            .fold(0u128, |acc, (_, row)| acc ^ row);
        Ok(unpack(cw))
    }

    fn decode(&self, codeword: &[bool]) -> Result<(Vec<bool>, bool)> {
        if codeword.len() != MESSAGE_BITS {
            return Err(Error::GeometryMismatch {
                expected: MESSAGE_BITS,
                got: codeword.len(),
            });
        }
        let received = pack(codeword);
        let mut best = (u32::MAX, 0usize);
        for_each_codeword(&self.rows, |m, cw| {
            let distance = (cw ^ received).count_ones();
            if distance < best.0 {
                best = (distance, m);
            }
        });
        let (distance, m) = best;
        let payload = (0..self.rows.len()).map(|i| (m >> i) & 1 == 1).collect();
        Ok((payload, distance <= self.correctable()))
    }
}

/// The code short mode uses unless the caller installs another one.
pub(crate) fn default_for(config: &WatermarkConfig) -> Result<Option<Arc<dyn ShortCode>>> {
    config
        .short_payload_bits
        .map(|bits| Ok(Arc::new(RandomLinearCode::new(bits)?) as Arc<dyn ShortCode>))
        .transpose()
}

/// A short code must map the configured payload width onto a full message.
pub(crate) fn check_fits(code: &dyn ShortCode, config: &WatermarkConfig) -> Result<()> {
    if code.codeword_bits() != MESSAGE_BITS {
        return Err(Error::GeometryMismatch {
            expected: MESSAGE_BITS,
            got: code.codeword_bits(),
        });
    }
    if code.payload_bits() != config.message_bits() {
        return Err(Error::GeometryMismatch {
            expected: config.message_bits(),
            got: code.payload_bits(),
        });
    }
    Ok(())
}

/// Visit every (message, codeword) pair in Gray-code order, one row XOR per
/// step.
fn for_each_codeword(rows: &[u128], mut visit: impl FnMut(usize, u128)) {
    let mut m = 0usize;
    let mut cw = 0u128;
    visit(m, cw);
    for i in 1usize..(1 << rows.len()) {
        let flip = i.trailing_zeros() as usize;
        m ^= 1 << flip;
        cw ^= rows[flip];
        visit(m, cw);
    }
}

fn pack(bits: &[bool]) -> u128 {
    bits.iter()
        .enumerate()
        .fold(0u128, |acc, (i, &b)| acc | ((b as u128) << i))
}

fn unpack(word: u128) -> Vec<bool> {
    (0..MESSAGE_BITS).map(|i| (word >> i) & 1 == 1).collect()
}
