use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("input too short: need at least {needed} samples per channel, got {got}")]
    InputTooShort { needed: usize, got: usize },

    #[error("geometry mismatch: expected {expected} bits, got {got}")]
    GeometryMismatch { expected: usize, got: usize },

    #[error("more than one key source specified")]
    KeyConflict,

    #[error("no watermark found")]
    NoWatermarkFound,

    #[error("short payload could not be corrected")]
    UncorrectableShortCode,

    #[error("invalid key length: expected 16 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("malformed key: {0}")]
    KeyFormat(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("invalid audio buffer: {0}")]
    InvalidAudio(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("FFT error: {0}")]
    Fft(String),
}

pub type Result<T> = std::result::Result<T, Error>;
