use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use wavemark_core::{AudioBuffer, Message, SampleFormat, WatermarkConfig, WatermarkKey};

fn make_test_audio(seconds: f64, channels: u16, sample_rate: u32) -> AudioBuffer {
    let mut rng = StdRng::seed_from_u64(99);
    let frames = (seconds * sample_rate as f64) as usize;
    let samples = (0..frames * channels as usize)
        .map(|_| rng.gen_range(-0.3f32..0.3))
        .collect();
    AudioBuffer::new(samples, channels, sample_rate).unwrap()
}

/// Write a buffer to a WAV file as 32-bit float.
fn write_wav_f32(path: &std::path::Path, audio: &AudioBuffer) {
    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("failed to create WAV writer");
    for &s in &audio.samples {
        writer.write_sample(s).expect("failed to write sample");
    }
    writer.finalize().expect("failed to finalize WAV");
}

/// Write a buffer to a WAV file as 16-bit integer.
fn write_wav_i16(path: &std::path::Path, audio: &AudioBuffer) {
    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("failed to create WAV writer");
    for &s in &audio.samples {
        let val = (s.clamp(-1.0, 1.0) * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
        writer.write_sample(val).expect("failed to write sample");
    }
    writer.finalize().expect("failed to finalize WAV");
}

/// Read a WAV file back into a buffer.
fn read_wav(path: &std::path::Path) -> AudioBuffer {
    let reader = hound::WavReader::open(path).expect("failed to open WAV");
    let spec = reader.spec();
    let (samples, format): (Vec<f32>, _) = match spec.sample_format {
        hound::SampleFormat::Float => (
            reader
                .into_samples::<f32>()
                .map(|s| s.expect("failed to read sample"))
                .collect(),
            SampleFormat::Float,
        ),
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            (
                reader
                    .into_samples::<i32>()
                    .map(|s| s.expect("failed to read sample") as f32 / max)
                    .collect(),
                SampleFormat::Int,
            )
        }
    };
    AudioBuffer::with_format(
        samples,
        spec.channels,
        spec.sample_rate,
        spec.bits_per_sample,
        format,
    )
    .expect("invalid WAV contents")
}

fn message() -> Message {
    Message::from_hex("cafebabe123456789abcdef011223344", 128).unwrap()
}

#[test]
fn wav_f32_embed_detect_round_trip() {
    let config = WatermarkConfig::default();
    let key = WatermarkKey::new(&[42u8; 16]).unwrap();
    let audio = make_test_audio(10.0, 2, 44100);
    let marked = wavemark_core::embed(&audio, &message(), &key, &config).unwrap();

    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let wav_path = dir.path().join("watermarked_f32.wav");
    write_wav_f32(&wav_path, &marked);
    let read_back = read_wav(&wav_path);
    assert_eq!(read_back.sample_rate, 44100);
    assert_eq!(read_back.samples, marked.samples);

    let report = wavemark_core::detect(&read_back, &key, &config).unwrap();
    assert_eq!(
        report.outcome().expect("no watermark after WAV f32 round-trip"),
        &message()
    );
}

#[test]
fn wav_i16_embed_detect_round_trip() {
    let config = WatermarkConfig::default();
    let key = WatermarkKey::from_passphrase("wav-i16");
    let audio = make_test_audio(10.0, 2, 44100);
    let marked = wavemark_core::embed(&audio, &message(), &key, &config).unwrap();

    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let wav_path = dir.path().join("watermarked_i16.wav");

    // Write as 16-bit: this quantizes the signal, testing robustness
    write_wav_i16(&wav_path, &marked);
    let read_back = read_wav(&wav_path);
    assert_eq!(read_back.format, SampleFormat::Int);
    assert_eq!(read_back.bit_depth, 16);

    let report = wavemark_core::detect(&read_back, &key, &config).unwrap();
    assert_eq!(
        report.outcome().expect("no watermark after WAV i16 round-trip"),
        &message()
    );
}

#[test]
fn wav_48000_sample_rate() {
    let config = WatermarkConfig::default();
    let key = WatermarkKey::from_test_seed(48000);
    let audio = make_test_audio(10.0, 1, 48000);
    let marked = wavemark_core::embed(&audio, &message(), &key, &config).unwrap();

    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let wav_path = dir.path().join("watermarked_48000.wav");
    write_wav_i16(&wav_path, &marked);
    let read_back = read_wav(&wav_path);
    assert_eq!(read_back.sample_rate, 48000);

    let report = wavemark_core::detect(&read_back, &key, &config).unwrap();
    assert_eq!(
        report.outcome().expect("no watermark at 48000 Hz"),
        &message()
    );
}
