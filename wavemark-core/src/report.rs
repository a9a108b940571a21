//! Combining per-block results into a final answer.

use crate::config::TieBreak;
use crate::decode::DecodeResult;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::shortcode::ShortCode;
use crate::sync::{Candidate, SearchDiagnostics};
use crate::tally::Tally;

/// How the final message was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Majority over blocks whose CRC verified.
    Verified,
    /// Decode of all blocks' summed soft values, CRC verified.
    Combined,
    /// Majority over all blocks; no CRC confirmed the message.
    Unverified,
    /// Nothing was located.
    None,
}

/// Outcome of the short-payload decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortCodeStatus {
    NotUsed,
    Corrected,
    Uncorrectable,
}

#[derive(Debug, Clone)]
pub struct DetectionReport {
    pub candidates: Vec<Candidate>,
    /// One result per candidate, in candidate order.
    pub results: Vec<DecodeResult>,
    /// Decode of the summed soft values of all candidates.
    pub combined: Option<DecodeResult>,
    /// Final message, if any block was found and (in short mode) the
    /// codeword could be corrected.
    pub message: Option<Message>,
    pub resolution: Resolution,
    /// Per raw bit, how strongly the contributing blocks back the final bit.
    pub bit_confidence: Vec<f32>,
    /// Blocks whose own message equals the final message.
    pub match_count: usize,
    pub short_code: ShortCodeStatus,
    pub diagnostics: SearchDiagnostics,
}

impl DetectionReport {
    /// Resolve the final message from per-block results.
    pub(crate) fn resolve(
        candidates: Vec<Candidate>,
        results: Vec<DecodeResult>,
        short_code: Option<&dyn ShortCode>,
        tie_break: TieBreak,
        diagnostics: SearchDiagnostics,
    ) -> Result<Self> {
        let combined = combine(&results, short_code)?;

        let verified: Vec<&DecodeResult> = results.iter().filter(|r| r.crc_ok).collect();
        let (raw, bit_confidence, resolution) = if !verified.is_empty() {
            let (raw, confidence) = majority(&verified, tie_break);
            (Some(raw), confidence, Resolution::Verified)
        } else if let Some(c) = combined.as_ref().filter(|c| c.crc_ok) {
            (Some(c.raw_bits.clone()), c.bit_confidence.clone(), Resolution::Combined)
        } else if !results.is_empty() {
            let all: Vec<&DecodeResult> = results.iter().collect();
            let (raw, confidence) = majority(&all, tie_break);
            (Some(raw), confidence, Resolution::Unverified)
        } else {
            (None, Vec::new(), Resolution::None)
        };

        let (message, short_status) = match (raw, short_code) {
            (None, _) => (None, ShortCodeStatus::NotUsed),
            (Some(raw), None) => (Some(Message::from_bits(raw)), ShortCodeStatus::NotUsed),
            (Some(raw), Some(code)) => match code.decode(&raw)? {
                (payload, true) => (Some(Message::from_bits(payload)), ShortCodeStatus::Corrected),
                (_, false) => (None, ShortCodeStatus::Uncorrectable),
            },
        };

        let match_count = message
            .as_ref()
            .map_or(0, |m| results.iter().filter(|r| &r.message == m).count());

        Ok(Self {
            candidates,
            results,
            combined,
            message,
            resolution,
            bit_confidence,
            match_count,
            short_code: short_status,
            diagnostics,
        })
    }

    /// Whether a CRC confirmed the final message.
    pub fn verified(&self) -> bool {
        matches!(self.resolution, Resolution::Verified | Resolution::Combined)
    }

    /// The final message as a result, for callers that treat a miss as an
    /// error.
    pub fn outcome(&self) -> Result<&Message> {
        if self.short_code == ShortCodeStatus::Uncorrectable {
            return Err(Error::UncorrectableShortCode);
        }
        match &self.message {
            Some(message) if self.verified() => Ok(message),
            _ => Err(Error::NoWatermarkFound),
        }
    }

    /// Check the detection against a known message.
    ///
    /// Passes when the final message has no bit errors and, if
    /// `expected_matches` is given, exactly that many blocks match.
    pub fn compare(&self, expected: &Message, expected_matches: Option<usize>) -> Result<Comparison> {
        let ber = self
            .message
            .as_ref()
            .map(|m| m.bit_error_rate(expected))
            .transpose()?;
        let block_ber = self
            .results
            .iter()
            .map(|r| r.message.bit_error_rate(expected))
            .collect::<Result<Vec<f64>>>()?;
        let matches = block_ber.iter().filter(|&&b| b == 0.0).count();
        let passed = ber == Some(0.0) && expected_matches.is_none_or(|n| n == matches);
        Ok(Comparison {
            ber,
            block_ber,
            matches,
            expected_matches,
            passed,
        })
    }
}

/// Result of [`DetectionReport::compare`].
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Bit error rate of the final message; `None` when there is none.
    pub ber: Option<f64>,
    /// Bit error rate of each located block, in result order.
    pub block_ber: Vec<f64>,
    /// Blocks equal to the expected message.
    pub matches: usize,
    pub expected_matches: Option<usize>,
    pub passed: bool,
}

/// Tally `results`, weighting ties by their per-bit confidence.
fn majority(results: &[&DecodeResult], tie_break: TieBreak) -> (Vec<bool>, Vec<f32>) {
    let tally: Tally = results
        .iter()
        .map(|r| (r.raw_bits.as_slice(), r.bit_confidence.as_slice()))
        .collect();
    let bits = tally.resolve(tie_break);
    let confidence = tally
        .mean_evidence()
        .into_iter()
        .zip(&bits)
        .map(|(e, &b)| if b { e } else { -e })
        .collect();
    (bits, confidence)
}

/// Decode the element-wise sum of every block's soft values.
fn combine(results: &[DecodeResult], short_code: Option<&dyn ShortCode>) -> Result<Option<DecodeResult>> {
    let Some(best) = results.first() else {
        return Ok(None);
    };
    let mut soft = vec![0.0f32; best.soft.len()];
    for result in results {
        for (acc, s) in soft.iter_mut().zip(&result.soft) {
            *acc += s;
        }
    }
    DecodeResult::from_soft(best.candidate.clone(), soft, short_code).map(Some)
}
