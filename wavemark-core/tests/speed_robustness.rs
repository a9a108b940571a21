use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use wavemark_core::{
    AudioBuffer, Detector, Message, Resampler, SincResampler, SpeedGrid, SpeedMode,
    WatermarkConfig, WatermarkKey,
};

fn make_test_audio(seconds: f64, channels: u16, seed: u64) -> AudioBuffer {
    let mut rng = StdRng::seed_from_u64(seed);
    let frames = (seconds * 44100.0) as usize;
    let samples = (0..frames * channels as usize)
        .map(|_| rng.gen_range(-0.3f32..0.3))
        .collect();
    AudioBuffer::new(samples, channels, 44100).unwrap()
}

fn message() -> Message {
    Message::from_hex("00112233445566778899aabbccddeeff", 128).unwrap()
}

/// Marked audio played `speed` times too fast.
fn sped_up(speed: f64, seed: u64) -> AudioBuffer {
    let key = WatermarkKey::from_test_seed(7);
    let audio = make_test_audio(12.0, 2, seed);
    let marked = wavemark_core::embed(&audio, &message(), &key, &WatermarkConfig::default()).unwrap();
    SincResampler.resample_by_ratio(&marked, speed, 44100).unwrap()
}

/// A narrow grid keeps the scan short.
fn narrow_grid() -> SpeedGrid {
    SpeedGrid {
        max_deviation: 0.01,
        coarse_step: 0.001,
        fine_step: 0.0001,
        scan_offsets: 4,
    }
}

#[test]
fn speed_search_recovers_message() {
    let distorted = sped_up(1.006, 1);
    let config = WatermarkConfig {
        speed: SpeedMode::Search(narrow_grid()),
        ..WatermarkConfig::default()
    };
    let report = Detector::new(&WatermarkKey::from_test_seed(7), &config)
        .unwrap()
        .detect(&distorted)
        .unwrap();

    assert_eq!(report.outcome().unwrap(), &message());
    let speed = report.diagnostics.chosen_speed;
    assert!((speed - 1.006).abs() < 5e-4, "chosen speed {speed}");
    assert_eq!(report.diagnostics.speed_trials, 21 + 21);
    assert!(report.candidates.iter().all(|c| c.speed == speed));
}

#[test]
fn forced_speed_recovers_message() {
    let distorted = sped_up(0.995, 2);
    let config = WatermarkConfig {
        speed: SpeedMode::Forced(0.995),
        ..WatermarkConfig::default()
    };
    let report = wavemark_core::detect(&distorted, &WatermarkKey::from_test_seed(7), &config).unwrap();
    assert_eq!(report.outcome().unwrap(), &message());
    assert_eq!(report.diagnostics.speed_trials, 0);
    assert_eq!(report.diagnostics.chosen_speed, 0.995);
}

#[test]
fn without_speed_search_drift_defeats_detection() {
    let distorted = sped_up(1.006, 3);
    let report = wavemark_core::detect(
        &distorted,
        &WatermarkKey::from_test_seed(7),
        &WatermarkConfig::default(),
    )
    .unwrap();
    assert!(report.outcome().is_err());
}

#[test]
fn unit_speed_wins_on_undistorted_audio() {
    let distorted = sped_up(1.0, 4);
    let config = WatermarkConfig {
        speed: SpeedMode::Search(narrow_grid()),
        ..WatermarkConfig::default()
    };
    let report = wavemark_core::detect(&distorted, &WatermarkKey::from_test_seed(7), &config).unwrap();
    assert_eq!(report.outcome().unwrap(), &message());
    assert!((report.diagnostics.chosen_speed - 1.0).abs() < 3e-4);
}
