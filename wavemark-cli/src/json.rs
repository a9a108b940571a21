use serde::Serialize;

use wavemark_core::{Comparison, DecodeResult, DetectionReport, Resolution, ShortCodeStatus};

#[derive(Serialize)]
pub struct JsonReport {
    pub matches: Vec<JsonMatch>,
    #[serde(rename = "final")]
    pub final_message: Option<String>,
    pub verified: bool,
    pub resolution: &'static str,
    pub match_count: usize,
    pub short_code: &'static str,
    pub speed: f64,
    pub best_sync: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<JsonComparison>,
}

#[derive(Serialize)]
pub struct JsonMatch {
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Block start in seconds.
    pub pos: f64,
    pub offset: usize,
    pub speed: f64,
    pub sync: f32,
    pub message: String,
    pub crc_ok: bool,
    pub quality: f32,
}

#[derive(Serialize)]
pub struct JsonComparison {
    pub ber: Option<f64>,
    pub block_ber: Vec<f64>,
    pub matches: usize,
    pub expected_matches: Option<usize>,
    pub passed: bool,
}

impl JsonReport {
    pub fn new(report: &DetectionReport, sample_rate: u32, comparison: Option<&Comparison>) -> Self {
        let mut matches: Vec<JsonMatch> = report
            .results
            .iter()
            .map(|r| JsonMatch::new("block", r, sample_rate))
            .collect();
        if let Some(combined) = &report.combined {
            matches.push(JsonMatch::new("all", combined, sample_rate));
        }

        Self {
            matches,
            final_message: report.message.as_ref().map(|m| m.to_hex()),
            verified: report.verified(),
            resolution: match report.resolution {
                Resolution::Verified => "verified",
                Resolution::Combined => "combined",
                Resolution::Unverified => "unverified",
                Resolution::None => "none",
            },
            match_count: report.match_count,
            short_code: match report.short_code {
                ShortCodeStatus::NotUsed => "none",
                ShortCodeStatus::Corrected => "corrected",
                ShortCodeStatus::Uncorrectable => "uncorrectable",
            },
            speed: report.diagnostics.chosen_speed,
            best_sync: report.diagnostics.best_sync_corr,
            comparison: comparison.map(|c| JsonComparison {
                ber: c.ber,
                block_ber: c.block_ber.clone(),
                matches: c.matches,
                expected_matches: c.expected_matches,
                passed: c.passed,
            }),
        }
    }
}

impl JsonMatch {
    fn new(kind: &'static str, result: &DecodeResult, sample_rate: u32) -> Self {
        let quality = if result.bit_confidence.is_empty() {
            0.0
        } else {
            result.bit_confidence.iter().sum::<f32>() / result.bit_confidence.len() as f32
        };
        Self {
            kind,
            pos: result.candidate.offset as f64 / sample_rate as f64,
            offset: result.candidate.offset,
            speed: result.candidate.speed,
            sync: result.candidate.confidence,
            message: result.message.to_hex(),
            crc_ok: result.crc_ok,
            quality,
        }
    }
}
