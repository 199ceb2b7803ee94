use crate::{FeedbackError, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;
use tracing::{debug, info};

/// Write mono or interleaved samples (f32, range -1.0 to 1.0) as 16-bit PCM
pub fn write_wav<P: AsRef<Path>>(
    path: P,
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
) -> Result<()> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path.as_ref(), spec)
        .map_err(|e| FeedbackError::Io(format!("Failed to create WAV writer: {}", e)))?;

    for &sample in samples {
        let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(sample_i16)
            .map_err(|e| FeedbackError::Io(format!("Failed to write sample: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| FeedbackError::Io(format!("Failed to finalize WAV file: {}", e)))?;

    info!("Wrote {} samples to WAV file: {:?}", samples.len(), path.as_ref());
    Ok(())
}

/// Read a WAV file as `(samples, sample_rate, channels)`
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, u32, u16)> {
    let mut reader = WavReader::open(path.as_ref())
        .map_err(|e| FeedbackError::Io(format!("Failed to open WAV file: {}", e)))?;

    let spec = reader.spec();
    debug!(
        "Reading WAV file: {} Hz, {} channels, {} bits",
        spec.sample_rate, spec.channels, spec.bits_per_sample
    );

    let samples: Result<Vec<f32>> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, _) => reader
            .samples::<f32>()
            .map(|s| s.map_err(|e| FeedbackError::Io(format!("Failed to read sample: {}", e))))
            .collect(),
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| {
                s.map(|sample| sample as f32 / i16::MAX as f32)
                    .map_err(|e| FeedbackError::Io(format!("Failed to read sample: {}", e)))
            })
            .collect(),
        (SampleFormat::Int, bits) => {
            return Err(FeedbackError::CaptureEngineFailure(format!(
                "Unsupported bit depth: {}",
                bits
            )));
        }
    };

    Ok((samples?, spec.sample_rate, spec.channels))
}

/// Encoded length of a WAV file, read from its header
pub fn wav_duration_millis<P: AsRef<Path>>(path: P) -> Result<u64> {
    let reader = WavReader::open(path.as_ref())
        .map_err(|e| FeedbackError::Io(format!("Failed to open WAV file: {}", e)))?;
    let frames = reader.duration() as u64;
    let rate = reader.spec().sample_rate as u64;
    if rate == 0 {
        return Ok(0);
    }
    Ok(frames * 1000 / rate)
}
