use std::fmt;

use crate::error::{Error, Result};

/// Full message width in bits.
pub const MESSAGE_BITS: usize = 128;
/// CRC-32 size in bits.
pub const CRC_BITS: usize = 32;
/// Bits fed to the convolutional code (message + CRC).
pub const DATA_BITS: usize = MESSAGE_BITS + CRC_BITS;

/// An immutable, fixed-width bit message (MSB first).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message {
    bits: Vec<bool>,
}

impl Message {
    pub fn from_bits(bits: Vec<bool>) -> Self {
        Self { bits }
    }

    /// Parse `width / 4` hex digits. `width` must be a multiple of 4.
    pub fn from_hex(hex: &str, width: usize) -> Result<Self> {
        let hex = hex.trim();
        if hex.len() * 4 != width {
            return Err(Error::GeometryMismatch {
                expected: width,
                got: hex.len() * 4,
            });
        }
        let mut bits = Vec::with_capacity(width);
        for c in hex.chars() {
            let nibble = c
                .to_digit(16)
                .ok_or_else(|| Error::InvalidMessage(format!("not a hex digit: {c:?}")))?;
            bits.extend((0..4).rev().map(|j| (nibble >> j) & 1 == 1));
        }
        Ok(Self { bits })
    }

    pub fn to_hex(&self) -> String {
        self.bits
            .chunks(4)
            .map(|nibble| {
                let v = nibble
                    .iter()
                    .enumerate()
                    .fold(0u32, |acc, (i, &b)| acc | ((b as u32) << (3 - i)));
                char::from_digit(v, 16).unwrap_or('0')
            })
            .collect()
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn width(&self) -> usize {
        self.bits.len()
    }

    /// Fraction of differing bits; widths must match.
    pub fn bit_error_rate(&self, other: &Message) -> Result<f64> {
        if self.width() != other.width() {
            return Err(Error::GeometryMismatch {
                expected: self.width(),
                got: other.width(),
            });
        }
        if self.bits.is_empty() {
            return Ok(0.0);
        }
        let errors = self
            .bits
            .iter()
            .zip(&other.bits)
            .filter(|(a, b)| a != b)
            .count();
        Ok(errors as f64 / self.width() as f64)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Append the CRC-32 of `bits` (packed MSB first).
pub fn append_crc(bits: &[bool]) -> Vec<bool> {
    let crc = crc32(&pack_bits(bits));
    let mut out = bits.to_vec();
    out.extend((0..CRC_BITS).rev().map(|j| (crc >> j) & 1 == 1));
    out
}

/// Split `bits` into payload and trailing CRC-32 and check them.
pub fn verify_crc(bits: &[bool]) -> bool {
    let Some(split) = bits.len().checked_sub(CRC_BITS) else {
        return false;
    };
    let (payload, tail) = bits.split_at(split);
    let got = tail.iter().fold(0u32, |acc, &b| (acc << 1) | b as u32);
    crc32(&pack_bits(payload)) == got
}

fn pack_bits(bits: &[bool]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &b)| acc | ((b as u8) << (7 - i)))
        })
        .collect()
}

/// CRC-32 (ISO 3309 / ITU-T V.42, same as used in PNG, gzip, etc.)
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn hex_parses_msb_first() {
        let msg = Message::from_hex("a5", 8).unwrap();
        assert_eq!(
            msg.bits(),
            &[true, false, true, false, false, true, false, true]
        );
        assert_eq!(msg.to_hex(), "a5");
        assert_eq!(Message::from_hex(HEX, 128).unwrap().to_hex(), HEX);
    }

    #[test]
    fn hex_width_must_match() {
        assert!(matches!(
            Message::from_hex("abc", 128),
            Err(Error::GeometryMismatch {
                expected: 128,
                got: 12
            })
        ));
        assert!(matches!(
            Message::from_hex("xz", 8),
            Err(Error::InvalidMessage(_))
        ));
    }

    #[test]
    fn crc_round_trip() {
        let msg = Message::from_hex(HEX, 128).unwrap();
        let framed = append_crc(msg.bits());
        assert_eq!(framed.len(), DATA_BITS);
        assert!(verify_crc(&framed));
    }

    #[test]
    fn crc_detects_error() {
        let msg = Message::from_hex("ffffffffffffffffffffffffffffffff", 128).unwrap();
        let mut framed = append_crc(msg.bits());
        framed[50] = !framed[50];
        assert!(!verify_crc(&framed));
        assert!(!verify_crc(&framed[..20]));
    }

    #[test]
    fn crc32_known_value() {
        // CRC-32 of "123456789" is 0xCBF43926
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn bit_error_rate() {
        let a = Message::from_hex("00", 8).unwrap();
        let b = Message::from_hex("03", 8).unwrap();
        assert_eq!(a.bit_error_rate(&b).unwrap(), 0.25);
        assert_eq!(a.bit_error_rate(&a).unwrap(), 0.0);
        assert!(a.bit_error_rate(&Message::from_hex("0000", 16).unwrap()).is_err());
    }
}
