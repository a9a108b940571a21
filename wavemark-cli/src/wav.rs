use std::error::Error;
use std::path::Path;

use wavemark_core::{AudioBuffer, SampleFormat};

/// Load a WAV file, remembering its sample format for [`write`].
pub fn read(path: &Path) -> Result<AudioBuffer, Box<dyn Error>> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let (samples, format) = match spec.sample_format {
        hound::SampleFormat::Float => (
            reader
                .into_samples::<f32>()
                .collect::<Result<Vec<f32>, _>>()?,
            SampleFormat::Float,
        ),
        hound::SampleFormat::Int => {
            let max = full_scale(spec.bits_per_sample);
            let samples = reader
                .into_samples::<i32>()
                .collect::<Result<Vec<i32>, _>>()?
                .into_iter()
                .map(|s| (s as f64 / max) as f32)
                .collect();
            (samples, SampleFormat::Int)
        }
    };

    Ok(AudioBuffer::with_format(
        samples,
        spec.channels,
        spec.sample_rate,
        spec.bits_per_sample,
        format,
    )?)
}

/// Write `audio` in its own sample format and bit depth.
pub fn write(path: &Path, audio: &AudioBuffer) -> Result<(), Box<dyn Error>> {
    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: match audio.format {
            SampleFormat::Float => 32,
            SampleFormat::Int => audio.bit_depth,
        },
        sample_format: match audio.format {
            SampleFormat::Float => hound::SampleFormat::Float,
            SampleFormat::Int => hound::SampleFormat::Int,
        },
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    match audio.format {
        SampleFormat::Float => {
            for &s in &audio.samples {
                writer.write_sample(s)?;
            }
        }
        SampleFormat::Int => {
            let max = full_scale(audio.bit_depth);
            for &s in &audio.samples {
                let v = (s as f64 * max).round().clamp(-max, max - 1.0);
                writer.write_sample(v as i32)?;
            }
        }
    }
    writer.finalize()?;
    Ok(())
}

fn full_scale(bits: u16) -> f64 {
    (1u64 << (bits - 1)) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_format_and_depth() {
        let dir = tempfile::tempdir().unwrap();
        for (bits, format) in [
            (16, SampleFormat::Int),
            (24, SampleFormat::Int),
            (32, SampleFormat::Float),
        ] {
            let audio = AudioBuffer::with_format(
                vec![0.0, 0.5, -0.5, 0.25, -1.0, 0.75],
                2,
                48000,
                bits,
                format,
            )
            .unwrap();
            let path = dir.path().join(format!("{bits}.wav"));
            write(&path, &audio).unwrap();
            let back = read(&path).unwrap();
            assert_eq!(back.format, format);
            assert_eq!(back.bit_depth, bits);
            assert_eq!(back.channels, 2);
            assert_eq!(back.sample_rate, 48000);
            assert_eq!(back.samples, audio.samples);
        }
    }
}
