//! Encoder/decoder collaborator backed by hound.
//!
//! The pipeline delegates the container format to this module: mono 16-bit
//! PCM WAV at the device's native rate. The decoder side yields per-sample
//! amplitude floats for waveform reduction.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::AudioError;

/// Encoding parameters for a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingParams {
    pub sample_rate: u32,
    pub channel_count: u16,
}

impl EncodingParams {
    pub fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channel_count: 1,
        }
    }
}

/// Writes PCM samples to `path` as a finalized WAV file.
///
/// # Errors
/// `EncodingFailure` if the writer cannot be created or finalized.
pub fn write_wav(path: &Path, samples: &[i16], params: EncodingParams) -> Result<(), AudioError> {
    let spec = WavSpec {
        channels: params.channel_count,
        sample_rate: params.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    tracing::debug!(
        "Encoded {} samples at {}Hz to {}",
        samples.len(),
        params.sample_rate,
        path.display()
    );
    Ok(())
}

/// Reads a finalized recording back as per-sample amplitudes in [0, 1].
///
/// # Errors
/// `RecordingNotFound` if the file is missing, `EncodingFailure` if it cannot
/// be decoded.
pub fn read_amplitudes(path: &Path) -> Result<Vec<f32>, AudioError> {
    if !path.exists() {
        return Err(AudioError::RecordingNotFound(path.to_path_buf()));
    }

    let mut reader = WavReader::open(path)?;
    let mut amplitudes = Vec::with_capacity(reader.len() as usize);

    for sample in reader.samples::<i16>() {
        let sample = sample?;
        amplitudes.push((sample as f32 / i16::MAX as f32).abs());
    }

    Ok(amplitudes)
}

/// Returns the duration of a finalized recording in seconds.
///
/// # Errors
/// `RecordingNotFound` if the file is missing, `EncodingFailure` if the
/// header cannot be read.
pub fn wav_duration_secs(path: &Path) -> Result<f32, AudioError> {
    if !path.exists() {
        return Err(AudioError::RecordingNotFound(path.to_path_buf()));
    }

    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    Ok(reader.duration() as f32 / spec.sample_rate as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_wav(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("vmemo_test_{}_{}.wav", std::process::id(), name))
    }

    #[test]
    fn test_write_then_read_amplitudes() {
        let path = temp_wav("roundtrip");
        let samples: Vec<i16> = vec![0, i16::MAX / 2, i16::MAX, i16::MIN / 2];
        write_wav(&path, &samples, EncodingParams::mono(22_050)).unwrap();

        let amplitudes = read_amplitudes(&path).unwrap();
        assert_eq!(amplitudes.len(), samples.len());
        // Decoder yields magnitudes: the negative sample comes back positive.
        assert!(amplitudes[3] > 0.0);
        assert!((amplitudes[2] - 1.0).abs() < 1e-4);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_duration_matches_sample_count() {
        let path = temp_wav("duration");
        let samples = vec![0i16; 22_050];
        write_wav(&path, &samples, EncodingParams::mono(22_050)).unwrap();

        let duration = wav_duration_secs(&path).unwrap();
        assert!((duration - 1.0).abs() < 1e-3);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let path = temp_wav("missing_never_created");
        match read_amplitudes(&path) {
            Err(AudioError::RecordingNotFound(p)) => assert_eq!(p, path),
            other => panic!("expected RecordingNotFound, got {other:?}"),
        }
    }
}
