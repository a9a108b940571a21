use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use wavemark_core::{
    AudioBuffer, Candidate, DecodeMode, Detector, Embedder, Error, Message, ShortCodeStatus,
    WatermarkConfig, WatermarkKey,
};

/// Seeded white noise.
fn make_test_audio(seconds: f64, channels: u16, sample_rate: u32, seed: u64) -> AudioBuffer {
    let mut rng = StdRng::seed_from_u64(seed);
    let frames = (seconds * sample_rate as f64) as usize;
    let samples = (0..frames * channels as usize)
        .map(|_| rng.gen_range(-0.3f32..0.3))
        .collect();
    AudioBuffer::new(samples, channels, sample_rate).unwrap()
}

fn full_message() -> Message {
    Message::from_hex("0123456789abcdef0123456789abcdef", 128).unwrap()
}

fn test_key() -> WatermarkKey {
    WatermarkKey::from_test_seed(42)
}

#[test]
fn ten_seconds_stereo_round_trip() {
    let config = WatermarkConfig::default();
    let audio = make_test_audio(10.0, 2, 44100, 1);
    let marked = wavemark_core::embed(&audio, &full_message(), &test_key(), &config).unwrap();
    assert_eq!(marked.frames(), audio.frames());

    let report = wavemark_core::detect(&marked, &test_key(), &config).unwrap();
    assert_eq!(report.outcome().unwrap(), &full_message());
    assert!(report.verified());
    assert!(report.match_count >= 1);

    let cmp = report.compare(&full_message(), None).unwrap();
    assert_eq!(cmp.ber, Some(0.0));
    assert!(cmp.passed);
}

#[test]
fn repeated_blocks_all_match() {
    let config = WatermarkConfig::default();
    let audio = make_test_audio(20.0, 2, 44100, 2);
    let marked = wavemark_core::embed(&audio, &full_message(), &test_key(), &config).unwrap();

    let report = wavemark_core::detect(&marked, &test_key(), &config).unwrap();
    assert_eq!(report.message.as_ref(), Some(&full_message()));
    assert!(report.match_count >= 2, "matches: {}", report.match_count);
    for pair in report.candidates.windows(2) {
        assert!(pair[0].confidence + 1e-3 >= pair[1].confidence);
    }

    let cmp = report
        .compare(&full_message(), Some(report.match_count))
        .unwrap();
    assert!(cmp.passed);
    let too_many = report
        .compare(&full_message(), Some(report.match_count + 1))
        .unwrap();
    assert!(!too_many.passed);
}

#[test]
fn wrong_key_finds_nothing() {
    let config = WatermarkConfig::default();
    let audio = make_test_audio(10.0, 2, 44100, 3);
    let marked = wavemark_core::embed(&audio, &full_message(), &test_key(), &config).unwrap();

    let wrong = WatermarkKey::from_test_seed(43);
    let report = wavemark_core::detect(&marked, &wrong, &config).unwrap();
    assert!(matches!(report.outcome(), Err(Error::NoWatermarkFound)));

    // Reading the true block position with the wrong key yields coin flips
    let at_block = Candidate {
        offset: config.pad_frames * config.frame_size,
        speed: 1.0,
        confidence: 0.0,
        analysis_offset: 0,
    };
    let result = wavemark_core::decode(&marked, &at_block, &wrong, &config).unwrap();
    assert!(!result.crc_ok);
    let ber = result.message.bit_error_rate(&full_message()).unwrap();
    assert!((0.3..=0.7).contains(&ber), "ber {ber}");
}

#[test]
fn hard_decision_round_trip() {
    let config = WatermarkConfig {
        decode_mode: DecodeMode::Hard,
        ..WatermarkConfig::default()
    };
    let audio = make_test_audio(10.0, 2, 44100, 11);
    let marked = wavemark_core::embed(&audio, &full_message(), &test_key(), &config).unwrap();

    let report = wavemark_core::detect(&marked, &test_key(), &config).unwrap();
    assert_eq!(report.outcome().unwrap(), &full_message());
    assert!(report.results[0].soft.iter().all(|s| s.abs() == 1.0));
}

#[test]
fn unmarked_audio_finds_nothing() {
    let config = WatermarkConfig::default();
    let audio = make_test_audio(10.0, 1, 44100, 4);
    let report = wavemark_core::detect(&audio, &test_key(), &config).unwrap();
    assert!(!report.verified());
    assert!(report.outcome().is_err());
}

#[test]
fn offset_is_recovered() {
    let config = WatermarkConfig::default();
    let audio = make_test_audio(10.0, 1, 44100, 5);
    let marked = wavemark_core::embed(&audio, &full_message(), &test_key(), &config).unwrap();

    let lead = 12345;
    let mut samples = vec![0.0f32; lead];
    samples.extend_from_slice(&marked.samples);
    let shifted = AudioBuffer::new(samples, 1, 44100).unwrap();

    let candidates = wavemark_core::locate(&shifted, &test_key(), &config).unwrap();
    let expected = lead + config.pad_frames * config.frame_size;
    let best = candidates.first().expect("no candidate");
    assert!(
        best.offset.abs_diff(expected) <= 4,
        "offset {} expected {expected}",
        best.offset
    );

    let result = wavemark_core::decode(&shifted, best, &test_key(), &config).unwrap();
    assert!(result.crc_ok);
    assert_eq!(result.message, full_message());
}

#[test]
fn detection_is_deterministic() {
    let config = WatermarkConfig::default();
    let audio = make_test_audio(10.0, 2, 44100, 6);
    let marked = wavemark_core::embed(&audio, &full_message(), &test_key(), &config).unwrap();

    let detector = Detector::new(&test_key(), &config).unwrap();
    let a = detector.detect(&marked).unwrap();
    let b = detector.detect(&marked).unwrap();
    assert_eq!(a.candidates, b.candidates);
    assert_eq!(a.message, b.message);
    assert_eq!(a.bit_confidence, b.bit_confidence);
}

#[test]
fn short_input_is_rejected() {
    let config = WatermarkConfig::default();
    let audio = make_test_audio(5.0, 2, 44100, 7);
    assert!(matches!(
        wavemark_core::embed(&audio, &full_message(), &test_key(), &config),
        Err(Error::InputTooShort { .. })
    ));
    assert!(matches!(
        wavemark_core::detect(&audio, &test_key(), &config),
        Err(Error::InputTooShort { got: 220_500, .. })
    ));
}

#[test]
fn short_payload_round_trip() {
    let config = WatermarkConfig {
        short_payload_bits: Some(16),
        ..WatermarkConfig::default()
    };
    let payload = Message::from_hex("beef", 16).unwrap();
    let audio = make_test_audio(10.0, 2, 44100, 8);

    let embedder = Embedder::new(&test_key(), &config).unwrap();
    let marked = embedder.embed(&audio, &payload).unwrap();
    assert!(matches!(
        embedder.embed(&audio, &full_message()),
        Err(Error::GeometryMismatch {
            expected: 16,
            got: 128
        })
    ));

    let report = Detector::new(&test_key(), &config)
        .unwrap()
        .detect(&marked)
        .unwrap();
    assert_eq!(report.short_code, ShortCodeStatus::Corrected);
    assert_eq!(report.outcome().unwrap(), &payload);
    assert_eq!(report.message.as_ref().map(Message::width), Some(16));
}

#[test]
fn other_sample_rate_round_trip() {
    let config = WatermarkConfig::default();
    let audio = make_test_audio(10.0, 2, 48000, 9);
    let marked = wavemark_core::embed(&audio, &full_message(), &test_key(), &config).unwrap();
    assert_eq!(marked.sample_rate, 48000);
    assert_eq!(marked.frames(), audio.frames());

    let report = wavemark_core::detect(&marked, &test_key(), &config).unwrap();
    assert_eq!(report.outcome().unwrap(), &full_message());
    let best = &report.candidates[0];
    let expected = (config.pad_frames * config.frame_size) as f64 * 48000.0 / 44100.0;
    assert!((best.offset as f64 - expected).abs() <= 8.0, "offset {}", best.offset);
}

#[test]
fn limiter_keeps_loud_audio_in_range() {
    let config = WatermarkConfig::default();
    let mut rng = StdRng::seed_from_u64(10);
    let samples = (0..441_000)
        .map(|_| rng.gen_range(-0.999f32..0.999))
        .collect();
    let audio = AudioBuffer::new(samples, 1, 44100).unwrap();
    let marked = wavemark_core::embed(&audio, &full_message(), &test_key(), &config).unwrap();
    assert!(marked.peak() <= audio.ceiling());

    let report = wavemark_core::detect(&marked, &test_key(), &config).unwrap();
    assert_eq!(report.outcome().unwrap(), &full_message());
}
