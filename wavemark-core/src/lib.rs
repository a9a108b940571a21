//! Keyed audio watermarking.
//!
//! A 128-bit message (or a short payload mapped onto one) is CRC-framed,
//! convolutionally encoded and written into non-overlapping FFT frames by
//! scaling keyed "up" and "down" bins. Blocks of sync and data frames repeat
//! through the signal; detection finds them at any offset and, optionally,
//! any small playback speed change, then votes across blocks.

pub mod analysis;
pub mod audio;
pub mod codec;
pub mod config;
pub mod decode;
pub mod detect;
pub mod embed;
pub mod error;
pub mod fft;
pub mod frame;
pub mod key;
pub mod message;
pub mod parallel;
pub mod pattern;
pub mod random;
pub mod report;
pub mod resample;
pub mod scheme;
pub mod shortcode;
pub mod speed;
pub mod sync;
pub mod tally;

// Re-export primary API types
pub use audio::{AudioBuffer, SampleFormat};
pub use config::{DecodeMode, SpeedGrid, SpeedMode, SyncParams, TieBreak, WatermarkConfig};
pub use decode::{DecodeResult, Decoder};
pub use detect::Detector;
pub use embed::{EmbedSummary, Embedder};
pub use error::{Error, Result};
pub use key::{KeySource, WatermarkKey};
pub use message::Message;
pub use report::{Comparison, DetectionReport, Resolution, ShortCodeStatus};
pub use resample::{Resampler, SincResampler};
pub use shortcode::{RandomLinearCode, ShortCode};
pub use sync::{Candidate, SearchDiagnostics, SyncSearch};

/// Watermark a signal.
///
/// This is the one-shot API; build an [`Embedder`] to reuse the keyed
/// patterns across calls or to plug in another resampler or short code.
pub fn embed(
    signal: &AudioBuffer,
    message: &Message,
    key: &WatermarkKey,
    config: &WatermarkConfig,
) -> Result<AudioBuffer> {
    Embedder::new(key, config)?.embed(signal, message)
}

/// Locate watermark blocks, best first.
pub fn locate(
    signal: &AudioBuffer,
    key: &WatermarkKey,
    config: &WatermarkConfig,
) -> Result<Vec<Candidate>> {
    SyncSearch::new(key, config)?.locate(signal)
}

/// Decode the block at one candidate.
pub fn decode(
    signal: &AudioBuffer,
    candidate: &Candidate,
    key: &WatermarkKey,
    config: &WatermarkConfig,
) -> Result<DecodeResult> {
    Decoder::new(key, config)?.decode(signal, candidate)
}

/// Locate, decode and combine every block in a signal.
pub fn detect(
    signal: &AudioBuffer,
    key: &WatermarkKey,
    config: &WatermarkConfig,
) -> Result<DetectionReport> {
    Detector::new(key, config)?.detect(signal)
}
