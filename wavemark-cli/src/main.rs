mod json;
mod wav;

use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};

use wavemark_core::{
    AudioBuffer, DecodeMode, DetectionReport, Detector, Embedder, KeySource, Message, Resampler,
    SincResampler, SpeedGrid, SpeedMode, WatermarkConfig, WatermarkKey,
};

#[derive(Parser)]
#[command(name = "wavemark", about = "Audio watermarking tool", version)]
struct Cli {
    #[command(flatten)]
    key: KeyArgs,

    /// Disable information messages
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Treat minor problems as errors
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct KeyArgs {
    /// Load the watermarking key from a key file
    #[arg(long, global = true, value_name = "FILE")]
    key: Option<PathBuf>,

    /// Use a deterministic test key
    #[arg(long, global = true, value_name = "SEED")]
    test_key: Option<u64>,

    /// Derive the key from a passphrase
    #[arg(long, global = true)]
    passphrase: Option<String>,
}

/// Layout options; detection must use the values embedding used.
#[derive(Args)]
struct LayoutArgs {
    /// Enable short payload mode with this many bits (4..=20, multiple of 4)
    #[arg(long, value_name = "BITS")]
    short: Option<usize>,

    /// Data frames per coded bit
    #[arg(long, default_value = "2")]
    frames_per_bit: usize,

    /// Keep data frames in order instead of mixing them through the block
    #[arg(long)]
    linear: bool,
}

#[derive(Args)]
struct DetectArgs {
    #[command(flatten)]
    layout: LayoutArgs,

    /// Detect and correct replay speed difference
    #[arg(long, conflicts_with_all = ["detect_speed_patient", "try_speed"])]
    detect_speed: bool,

    /// Slower, more accurate speed detection
    #[arg(long, conflicts_with = "try_speed")]
    detect_speed_patient: bool,

    /// Assume this replay speed
    #[arg(long, value_name = "SPEED")]
    try_speed: Option<f64>,

    /// Use hard decisions (bit signs only) when decoding
    #[arg(long)]
    hard: bool,

    /// Write JSON results into a file
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Create a watermarked WAV file with a message
    Add {
        input: PathBuf,
        output: PathBuf,
        /// Message as hex (32 digits, or BITS/4 with --short)
        message: String,

        /// Watermark strength, in thousandths
        #[arg(long, default_value = "50")]
        strength: f32,

        /// Do not scale down frames that would clip
        #[arg(long)]
        no_limiter: bool,

        /// Print the signal-to-watermark ratio of the result
        #[arg(long)]
        snr: bool,

        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// Retrieve the message
    Get {
        input: PathBuf,

        #[command(flatten)]
        detect: DetectArgs,
    },
    /// Compare the watermark message with an expected message
    Cmp {
        input: PathBuf,
        message: String,

        /// Fail unless exactly this many blocks match
        #[arg(long, value_name = "N")]
        expect_matches: Option<usize>,

        #[command(flatten)]
        detect: DetectArgs,
    },
    /// Generate a 128-bit watermarking key, to be used with --key
    GenKey { key_file: PathBuf },
    /// Write stereo 16-bit white noise
    TestGenNoise {
        output: PathBuf,
        seconds: f64,
        sample_rate: u32,
    },
    /// Play a file SPEED times faster, keeping its sample rate
    TestChangeSpeed {
        input: PathBuf,
        output: PathBuf,
        speed: f64,
    },
    /// Convert a file to another sample rate
    TestResample {
        input: PathBuf,
        output: PathBuf,
        sample_rate: u32,
    },
    /// Print the signal-to-watermark ratio in dB
    TestSnr { original: PathBuf, watermarked: PathBuf },
    /// Drop the first SAMPLES samples per channel
    CutStart {
        input: PathBuf,
        output: PathBuf,
        samples: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let quiet = cli.quiet;
    let notices = Notices {
        quiet,
        strict: cli.strict,
    };

    match cli.command {
        Command::Add {
            input,
            output,
            message,
            strength,
            no_limiter,
            snr,
            layout,
        } => {
            let key = load_key(&cli.key)?;
            let config = WatermarkConfig {
                strength: strength / 1000.0,
                limiter: !no_limiter,
                ..layout_config(&layout)
            };
            let message = Message::from_hex(&message, config.message_bits())?;
            let audio = wav::read(&input)?;
            if !quiet {
                eprintln!(
                    "Embedding into {} ({:.2}s, {} channels, {}Hz)...",
                    input.display(),
                    audio.duration_secs(),
                    audio.channels,
                    audio.sample_rate
                );
            }

            let (marked, summary) =
                Embedder::new(&key, &config)?.embed_with_summary(&audio, &message)?;
            if summary.limited_frames > 0 {
                notices.warn(&format!(
                    "limiter scaled down {} frames to avoid clipping",
                    summary.limited_frames
                ))?;
            }
            wav::write(&output, &marked)?;

            if !quiet {
                eprintln!("Watermarked audio written to {}", output.display());
                eprintln!("Message:  {message}");
                eprintln!("Strength: {strength}");
            }
            if snr {
                println!("SNR:      {:.6} dB", snr_db(&audio.samples, &marked.samples));
            }
        }
        Command::Get { input, detect } => {
            let key = load_key(&cli.key)?;
            let config = detect_config(&detect);
            let audio = wav::read(&input)?;
            let report = Detector::new(&key, &config)?.detect(&audio)?;

            print_report(&report, audio.sample_rate);
            if let Some(path) = &detect.json {
                write_json(path, &json::JsonReport::new(&report, audio.sample_rate, None))?;
            }
            check_verified(&report, &notices)?;
            if let Err(e) = report.outcome() {
                if !quiet {
                    eprintln!("{e}");
                }
                std::process::exit(1);
            }
        }
        Command::Cmp {
            input,
            message,
            expect_matches,
            detect,
        } => {
            let key = load_key(&cli.key)?;
            let config = detect_config(&detect);
            let expected = Message::from_hex(&message, config.message_bits())?;
            let audio = wav::read(&input)?;
            let report = Detector::new(&key, &config)?.detect(&audio)?;
            let cmp = report.compare(&expected, expect_matches)?;

            print_report(&report, audio.sample_rate);
            check_verified(&report, &notices)?;
            match cmp.ber {
                Some(ber) => println!("match_count {} {:.5}", cmp.matches, ber),
                None => println!("match_count 0 -"),
            }
            if let Some(path) = &detect.json {
                write_json(
                    path,
                    &json::JsonReport::new(&report, audio.sample_rate, Some(&cmp)),
                )?;
            }
            if !cmp.passed {
                if !quiet {
                    match (cmp.ber, expect_matches) {
                        (None, _) => eprintln!("No watermark detected."),
                        (Some(ber), _) if ber > 0.0 => {
                            eprintln!("Message mismatch: bit error rate {ber:.5}")
                        }
                        (_, Some(n)) => {
                            eprintln!("Expected {n} matching blocks, found {}", cmp.matches)
                        }
                        _ => {}
                    }
                }
                std::process::exit(1);
            }
        }
        Command::GenKey { key_file } => {
            let key = WatermarkKey::generate();
            std::fs::write(&key_file, key.to_key_file())?;
            if !quiet {
                eprintln!("Key written to {}", key_file.display());
            }
        }
        Command::TestGenNoise {
            output,
            seconds,
            sample_rate,
        } => {
            let mut rng = StdRng::seed_from_u64(0);
            let frames = (seconds * sample_rate as f64) as usize;
            let samples = (0..frames * 2)
                .map(|_| rng.gen_range(-1.0f32..1.0))
                .collect();
            wav::write(&output, &AudioBuffer::new(samples, 2, sample_rate)?)?;
        }
        Command::TestChangeSpeed {
            input,
            output,
            speed,
        } => {
            let audio = wav::read(&input)?;
            let changed = SincResampler.resample_by_ratio(&audio, speed, audio.sample_rate)?;
            wav::write(&output, &changed)?;
        }
        Command::TestResample {
            input,
            output,
            sample_rate,
        } => {
            let audio = wav::read(&input)?;
            wav::write(&output, &SincResampler.resample_to_rate(&audio, sample_rate)?)?;
        }
        Command::TestSnr {
            original,
            watermarked,
        } => {
            let orig = wav::read(&original)?;
            let marked = wav::read(&watermarked)?;
            if orig.channels != marked.channels {
                return Err("channel counts differ".into());
            }
            if orig.samples.len() != marked.samples.len() {
                notices.warn(&format!(
                    "size mismatch: {} vs {} frames",
                    orig.frames(),
                    marked.frames()
                ))?;
            }
            println!("{:.6}", snr_db(&orig.samples, &marked.samples));
        }
        Command::CutStart {
            input,
            output,
            samples,
        } => {
            let audio = wav::read(&input)?;
            let skip = (samples * audio.channels as usize).min(audio.samples.len());
            let cut = AudioBuffer {
                samples: audio.samples[skip..].to_vec(),
                ..audio
            };
            wav::write(&output, &cut)?;
        }
    }

    Ok(())
}

fn load_key(args: &KeyArgs) -> Result<WatermarkKey, Box<dyn std::error::Error>> {
    let mut sources = Vec::new();
    if let Some(path) = &args.key {
        sources.push(KeySource::KeyFile(std::fs::read_to_string(path)?));
    }
    if let Some(seed) = args.test_key {
        sources.push(KeySource::TestSeed(seed));
    }
    if let Some(pass) = &args.passphrase {
        sources.push(KeySource::Passphrase(pass.clone()));
    }
    Ok(WatermarkKey::from_sources(&sources)?)
}

fn layout_config(layout: &LayoutArgs) -> WatermarkConfig {
    WatermarkConfig {
        short_payload_bits: layout.short,
        frames_per_bit: layout.frames_per_bit,
        mix: !layout.linear,
        ..WatermarkConfig::default()
    }
}

fn detect_config(detect: &DetectArgs) -> WatermarkConfig {
    let speed = if detect.detect_speed {
        SpeedMode::Search(SpeedGrid::normal())
    } else if detect.detect_speed_patient {
        SpeedMode::Search(SpeedGrid::patient())
    } else if let Some(speed) = detect.try_speed {
        SpeedMode::Forced(speed)
    } else {
        SpeedMode::Off
    };
    WatermarkConfig {
        speed,
        decode_mode: if detect.hard {
            DecodeMode::Hard
        } else {
            DecodeMode::Soft
        },
        ..layout_config(&detect.layout)
    }
}

/// Routing for minor problems: printed as warnings, or fatal with `--strict`.
struct Notices {
    quiet: bool,
    strict: bool,
}

impl Notices {
    fn warn(&self, problem: &str) -> Result<(), Box<dyn std::error::Error>> {
        if self.strict {
            return Err(problem.into());
        }
        if !self.quiet {
            eprintln!("Warning: {problem}");
        }
        Ok(())
    }
}

/// A message that only survived without a CRC check is a minor problem.
fn check_verified(
    report: &DetectionReport,
    notices: &Notices,
) -> Result<(), Box<dyn std::error::Error>> {
    if report.message.is_some() && !report.verified() {
        notices.warn("message was recovered without a passing CRC")?;
    }
    Ok(())
}

/// Ratio of signal power to the power of the difference, in dB, over the
/// common prefix of both sample sequences.
fn snr_db(original: &[f32], marked: &[f32]) -> f64 {
    let (signal, delta) = original.iter().zip(marked).fold(
        (0.0f64, 0.0f64),
        |(signal, delta), (&o, &m)| {
            let d = (o - m) as f64;
            (signal + o as f64 * o as f64, delta + d * d)
        },
    );
    10.0 * (signal / delta).log10()
}

fn print_report(report: &DetectionReport, sample_rate: u32) {
    for result in &report.results {
        let secs = result.candidate.offset as f64 / sample_rate as f64;
        println!(
            "pattern {:2}:{:06.3} {} {:.3} {:.3} {}",
            (secs / 60.0) as u64,
            secs % 60.0,
            result.message,
            result.candidate.confidence,
            result.candidate.speed,
            if result.crc_ok { "CRC-OK" } else { "CRC-BAD" }
        );
    }
    if let Some(combined) = &report.combined {
        println!(
            "pattern   all {} {}",
            combined.message,
            if combined.crc_ok { "CRC-OK" } else { "CRC-BAD" }
        );
    }
    match &report.message {
        Some(message) => println!(
            "final {} {}",
            message,
            if report.verified() { "verified" } else { "unverified" }
        ),
        None => println!("final -"),
    }
}

fn write_json(path: &Path, report: &json::JsonReport) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(path, serde_json::to_string_pretty(report)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snr_of_known_difference() {
        let original = vec![1.0f32; 100];
        let marked: Vec<f32> = original.iter().map(|s| s + 0.1).collect();
        assert!((snr_db(&original, &marked) - 20.0).abs() < 1e-4);
        assert!(snr_db(&original, &original).is_infinite());
    }

    #[test]
    fn strict_turns_warnings_into_errors() {
        let lenient = Notices {
            quiet: true,
            strict: false,
        };
        assert!(lenient.warn("size mismatch").is_ok());

        let strict = Notices {
            quiet: true,
            strict: true,
        };
        let err = strict.warn("size mismatch").unwrap_err();
        assert_eq!(err.to_string(), "size mismatch");
    }

    #[test]
    fn hard_flag_selects_hard_decisions() {
        let cli =
            Cli::try_parse_from(["wavemark", "--strict", "get", "in.wav", "--hard"]).unwrap();
        assert!(cli.strict);
        match cli.command {
            Command::Get { detect, .. } => {
                assert_eq!(detect_config(&detect).decode_mode, DecodeMode::Hard);
            }
            _ => panic!("expected get"),
        }

        let cli =
            Cli::try_parse_from(["wavemark", "add", "a.wav", "b.wav", "00", "--snr"]).unwrap();
        assert!(matches!(cli.command, Command::Add { snr: true, .. }));
    }
}
