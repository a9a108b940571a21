use aes::Aes128;
use aes::cipher::{BlockEncrypt, KeyInit};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{Error, Result};

const KEY_FILE_HEADER: &str = "# watermarking key for wavemark";

/// A 128-bit watermark key.
///
/// Wraps an AES-128 cipher. Every keyed pattern in the engine is derived
/// from it through [`crate::random::KeyedRandom`]; without the key those
/// patterns cannot be reconstructed.
#[derive(Clone)]
pub struct WatermarkKey {
    cipher: Aes128,
    raw: [u8; 16],
}

impl WatermarkKey {
    /// Create a new watermark key from a 16-byte slice.
    pub fn new(key_bytes: &[u8]) -> Result<Self> {
        let raw: [u8; 16] = key_bytes
            .try_into()
            .map_err(|_| Error::InvalidKeyLength(key_bytes.len()))?;
        Ok(Self::from_array(raw))
    }

    fn from_array(raw: [u8; 16]) -> Self {
        let cipher = Aes128::new(&aes::Block::from(raw));
        Self { cipher, raw }
    }

    /// Draw a fresh key from the operating system RNG.
    pub fn generate() -> Self {
        let mut raw = [0u8; 16];
        OsRng.fill_bytes(&mut raw);
        Self::from_array(raw)
    }

    /// Parse a key from 32 hex digits.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.trim();
        if hex.len() != 32 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::KeyFormat(format!(
                "expected 32 hex digits, got {:?}",
                hex
            )));
        }
        let mut raw = [0u8; 16];
        for (i, byte) in raw.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|e| Error::KeyFormat(e.to_string()))?;
        }
        Ok(Self::from_array(raw))
    }

    /// Create a key from a passphrase by hashing it with a simple mixing function.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut key = [0u8; 16];
        for (i, b) in passphrase.bytes().enumerate() {
            key[i % 16] ^= b;
            key[(i + 7) % 16] = key[(i + 7) % 16].wrapping_add(b.wrapping_mul(0x9E));
        }
        // Avalanche through AES so similar passphrases give unrelated keys
        let cipher = Aes128::new(&aes::Block::from(key));
        let mut block = aes::Block::from(key);
        cipher.encrypt_block(&mut block);
        Self::from_array(block.into())
    }

    /// Reproducible key for test runs, derived from a small integer seed.
    pub fn from_test_seed(seed: u64) -> Self {
        let label = Aes128::new(&aes::Block::from(*b"wavemark-testkey"));
        let mut block = [0u8; 16];
        block[..8].copy_from_slice(&seed.to_le_bytes());
        block[8..].copy_from_slice(b"testseed");
        let mut block = aes::Block::from(block);
        label.encrypt_block(&mut block);
        Self::from_array(block.into())
    }

    /// Parse the text of a key file.
    ///
    /// Blank lines and `#` comments are skipped; exactly one `key <hex>`
    /// line must remain.
    pub fn from_key_file(text: &str) -> Result<Self> {
        let mut found = None;
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut words = line.split_whitespace();
            match (words.next(), words.next(), words.next()) {
                (Some("key"), Some(hex), None) if found.is_none() => {
                    found = Some(Self::from_hex(hex)?);
                }
                _ => return Err(Error::KeyFormat(format!("unexpected line {line:?}"))),
            }
        }
        found.ok_or_else(|| Error::KeyFormat("no key line".to_string()))
    }

    /// Format the key in the layout [`WatermarkKey::from_key_file`] reads.
    pub fn to_key_file(&self) -> String {
        format!("{KEY_FILE_HEADER}\n\nkey {}\n", self.to_hex())
    }

    /// Resolve the key from the sources given on the command line.
    ///
    /// No source yields the built-in default key; more than one is a
    /// [`Error::KeyConflict`].
    pub fn from_sources(sources: &[KeySource]) -> Result<Self> {
        match sources {
            [] => Ok(Self::default()),
            [KeySource::KeyFile(text)] => Self::from_key_file(text),
            [KeySource::TestSeed(seed)] => Ok(Self::from_test_seed(*seed)),
            [KeySource::Passphrase(pass)] => Ok(Self::from_passphrase(pass)),
            _ => Err(Error::KeyConflict),
        }
    }

    /// Returns the raw 16-byte key.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.raw
    }

    pub fn to_hex(&self) -> String {
        self.raw.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Encrypt one block under the key.
    pub(crate) fn encrypt(&self, input: [u8; 16]) -> [u8; 16] {
        let mut block = aes::Block::from(input);
        self.cipher.encrypt_block(&mut block);
        block.into()
    }
}

impl Default for WatermarkKey {
    fn default() -> Self {
        Self::from_array([0u8; 16])
    }
}

impl PartialEq for WatermarkKey {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for WatermarkKey {}

impl std::fmt::Debug for WatermarkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkKey")
            .field("raw", &"[REDACTED]")
            .finish()
    }
}

/// Where a key comes from.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Contents of a key file.
    KeyFile(String),
    TestSeed(u64),
    Passphrase(String),
}
