//! Recording lifecycle: device capture, finalization and waveform derivation.
//!
//! Captures PCM from the system input device via cpal, downmixing to mono at
//! the device's native rate. Stopping a recording finalizes the WAV off the
//! interaction thread, re-reads the full file and reduces it to the display
//! waveform, delivering the result over the session event channel. The
//! re-derivation from the file (rather than the capped live series) yields a
//! waveform representative of the entire recording.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc::UnboundedSender;

#[cfg(target_os = "linux")]
use std::fs::OpenOptions;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

use super::encoder::{self, EncodingParams};
use super::level::LevelSampler;
use super::waveform::{self, LiveSeries};
use super::PipelineEvent;
use crate::config::AudioConfig;
use crate::error::AudioError;

/// Identity and parameters of a finished (or in-progress) recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    /// Encoded audio file location, unique per recording by timestamp.
    pub path: PathBuf,
    pub created_at: DateTime<Local>,
    pub params: EncodingParams,
}

impl Recording {
    /// Whether the encoded file still exists on disk.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Duration derived from the finalized file.
    pub fn duration_secs(&self) -> Result<f32, AudioError> {
        encoder::wav_duration_secs(&self.path)
    }
}

/// Owns the record lifecycle: input device, capture buffer, live series and
/// the level sampler. At most one current recording exists; starting a new
/// one replaces the previous identity without deleting its file (deletion is
/// explicit).
pub struct Recorder {
    config: AudioConfig,
    recordings_dir: PathBuf,
    /// Raw PCM capture shared with the audio callback (i16 mono).
    capture: Arc<Mutex<Vec<i16>>>,
    /// Live level series shared with the sampler task.
    live: Arc<Mutex<LiveSeries>>,
    /// Active input stream, kept alive while recording.
    stream: Option<cpal::Stream>,
    sampler: LevelSampler,
    /// Actual device sample rate, known after the stream is built.
    sample_rate: u32,
    recording: Option<Recording>,
    is_recording: bool,
    events: UnboundedSender<PipelineEvent>,
}

impl Recorder {
    pub fn new(
        config: AudioConfig,
        recordings_dir: PathBuf,
        events: UnboundedSender<PipelineEvent>,
    ) -> Self {
        let cap = config.live_series_cap;
        Self {
            sample_rate: config.sample_rate,
            config,
            recordings_dir,
            capture: Arc::new(Mutex::new(Vec::new())),
            live: Arc::new(Mutex::new(LiveSeries::new(cap))),
            stream: None,
            sampler: LevelSampler::new(),
            recording: None,
            is_recording: false,
            events,
        }
    }

    /// Acquires the input device and begins capturing a new recording.
    ///
    /// Clears the capture buffer and live series, assigns a fresh
    /// timestamp-named file path and starts the level sampler. The previous
    /// recording's file is left in place.
    ///
    /// # Errors
    /// `DeviceUnavailable` if the device cannot be acquired or the stream
    /// cannot be built.
    pub fn start_recording(&mut self, _generation: u64) -> Result<(), AudioError> {
        let device = suppress_alsa_warnings(|| {
            let host = cpal::default_host();
            if self.config.device == "default" {
                host.default_input_device()
                    .ok_or_else(|| anyhow!("No audio input device available"))
            } else {
                find_device(&host, &self.config.device)
            }
        })
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown device".to_string());
        tracing::info!("Recording device: {}", device_name);

        let device_config = device
            .default_input_config()
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
        let device_sample_rate = device_config.sample_rate().0;
        let num_channels = device_config.channels() as usize;

        if device_sample_rate != self.config.sample_rate {
            tracing::warn!(
                "Requested sample rate {}Hz but device uses {}Hz. Recording at device rate.",
                self.config.sample_rate,
                device_sample_rate
            );
        }
        self.sample_rate = device_sample_rate;

        self.capture.lock().unwrap().clear();
        self.live.lock().unwrap().clear();

        let capture = Arc::clone(&self.capture);
        let stream = device
            .build_input_stream(
                &device_config.into(),
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    downmix_into(data, &capture, num_channels);
                },
                |err| {
                    tracing::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
        stream
            .play()
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
        self.stream = Some(stream);

        if let Err(e) = std::fs::create_dir_all(&self.recordings_dir) {
            self.stream = None;
            return Err(AudioError::Io(e));
        }

        let created_at = Local::now();
        let path = self.recordings_dir.join(format!(
            "recording_{}.wav",
            created_at.format("%Y%m%d_%H%M%S%3f")
        ));
        self.recording = Some(Recording {
            path,
            created_at,
            params: EncodingParams::mono(device_sample_rate),
        });

        self.sampler.start(
            self.config.level_period_ms,
            Arc::clone(&self.capture),
            device_sample_rate,
            Arc::clone(&self.live),
        );
        self.is_recording = true;

        tracing::debug!(
            "Capture started: {}Hz, {} channels",
            device_sample_rate,
            num_channels
        );
        Ok(())
    }

    /// Stops capture and finalizes the recording off the interaction thread.
    ///
    /// Returns immediately; encoding, re-reading the finalized file and
    /// reducing it to the display waveform happen on a blocking worker which
    /// delivers `WaveformReady` (or `FinalizeFailed`) stamped with
    /// `generation` over the event channel.
    pub fn stop_recording(&mut self, generation: u64) {
        self.sampler.stop();
        self.stream = None;
        self.is_recording = false;

        let Some(recording) = self.recording.clone() else {
            tracing::warn!("stop_recording called with no active recording");
            return;
        };

        let samples = self.capture.lock().unwrap().clone();
        let duration_secs = samples.len() as f32 / self.sample_rate as f32;
        tracing::info!(
            "Recording stopped: {:.2}s ({} samples at {}Hz)",
            duration_secs,
            samples.len(),
            self.sample_rate
        );

        let display_bars = self.config.display_bars;
        let events = self.events.clone();

        tokio::task::spawn_blocking(move || {
            let result = finalize(&recording, &samples, display_bars);
            let event = match result {
                Ok((waveform, duration_secs)) => PipelineEvent::WaveformReady {
                    generation,
                    waveform,
                    duration_secs,
                },
                Err(e) => {
                    tracing::error!("Finalization failed: {}", e);
                    PipelineEvent::FinalizeFailed { generation }
                }
            };
            // Receiver gone means the session is shutting down.
            let _ = events.send(event);
        });
    }

    /// Deletes the current recording, stopping capture first if active.
    ///
    /// File removal is best-effort on a background worker; a missing file is
    /// not an error. Clears the live series and the recording identity.
    pub fn delete_recording(&mut self) {
        if self.is_recording {
            self.sampler.stop();
            self.stream = None;
            self.is_recording = false;
        }

        self.capture.lock().unwrap().clear();
        self.live.lock().unwrap().clear();

        if let Some(recording) = self.recording.take() {
            tokio::task::spawn_blocking(move || match std::fs::remove_file(&recording.path) {
                Ok(()) => tracing::debug!("Deleted recording {}", recording.path.display()),
                Err(e) => tracing::debug!(
                    "Could not delete {} (may not exist yet): {}",
                    recording.path.display(),
                    e
                ),
            });
        }
    }

    /// Returns the current recording identity, if any.
    pub fn recording(&self) -> Option<&Recording> {
        self.recording.as_ref()
    }

    /// Snapshot of the live level series for rendering.
    pub fn live_levels(&self) -> Vec<f32> {
        self.live.lock().unwrap().snapshot()
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }
}

/// Encodes the capture to the recording's file, then re-reads it and derives
/// the display waveform.
fn finalize(
    recording: &Recording,
    samples: &[i16],
    display_bars: usize,
) -> Result<(Vec<f32>, f32), AudioError> {
    if samples.is_empty() {
        return Err(AudioError::EncodingFailure(
            "no samples captured".to_string(),
        ));
    }

    encoder::write_wav(&recording.path, samples, recording.params)?;

    let amplitudes = encoder::read_amplitudes(&recording.path)?;
    let waveform = waveform::reduce(&amplitudes, display_bars);
    let duration_secs = encoder::wav_duration_secs(&recording.path)?;

    tracing::info!(
        "Finalized {}: {:.2}s, {} waveform bars",
        recording.path.display(),
        duration_secs,
        waveform.len()
    );
    Ok((waveform, duration_secs))
}

/// Folds an interleaved capture buffer into the shared mono sample vector by
/// averaging channels.
fn downmix_into(data: &[i16], capture: &Arc<Mutex<Vec<i16>>>, num_channels: usize) {
    let mut samples = capture.lock().unwrap();

    match num_channels {
        1 => samples.extend_from_slice(data),
        2 => {
            for chunk in data.chunks_exact(2) {
                let mono = ((chunk[0] as i32 + chunk[1] as i32) / 2) as i16;
                samples.push(mono);
            }
        }
        _ => {
            for chunk in data.chunks_exact(num_channels) {
                let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
                samples.push((sum / num_channels as i32) as i16);
            }
        }
    }
}

/// Finds an audio input device by numeric index or name.
fn find_device(host: &cpal::Host, device_spec: &str) -> Result<cpal::Device> {
    let devices: Vec<_> = host
        .input_devices()
        .map_err(|e| anyhow!("Failed to enumerate devices: {e}"))?
        .collect();

    if let Ok(index) = device_spec.parse::<usize>() {
        if index < devices.len() {
            return Ok(devices.into_iter().nth(index).unwrap());
        }
        return Err(anyhow!(
            "Device index {} is out of range (0-{})",
            index,
            devices.len().saturating_sub(1)
        ));
    }

    devices
        .into_iter()
        .find(|d| d.name().map(|n| n == device_spec).unwrap_or(false))
        .ok_or_else(|| {
            anyhow!(
                "Audio input device '{device_spec}' not found. Use 'vmemo list-devices' to see available devices."
            )
        })
}

/// Temporarily redirects stderr to /dev/null to suppress ALSA library
/// warnings on Linux while touching the audio host.
#[cfg(target_os = "linux")]
fn suppress_alsa_warnings<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let dev_null = OpenOptions::new()
        .write(true)
        .open("/dev/null")
        .map_err(|e| anyhow!("Failed to open /dev/null: {e}"))?;
    let dev_null_fd = dev_null.as_raw_fd();

    let old_stderr = unsafe { libc::dup(libc::STDERR_FILENO) };
    if old_stderr == -1 {
        return Err(anyhow!("Failed to duplicate stderr"));
    }

    if unsafe { libc::dup2(dev_null_fd, libc::STDERR_FILENO) } == -1 {
        unsafe { libc::close(old_stderr) };
        return Err(anyhow!("Failed to redirect stderr"));
    }

    let result = f();

    unsafe {
        libc::dup2(old_stderr, libc::STDERR_FILENO);
        libc::close(old_stderr);
    }

    result
}

/// On non-Linux platforms no stderr suppression is needed since ALSA doesn't exist.
#[cfg(not(target_os = "linux"))]
fn suppress_alsa_warnings<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo_averages_pairs() {
        let capture = Arc::new(Mutex::new(Vec::new()));
        downmix_into(&[100, 200, -50, 50], &capture, 2);
        assert_eq!(*capture.lock().unwrap(), vec![150, 0]);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let capture = Arc::new(Mutex::new(vec![1i16]));
        downmix_into(&[2, 3], &capture, 1);
        assert_eq!(*capture.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_finalize_rejects_empty_capture() {
        let recording = Recording {
            path: std::env::temp_dir().join("vmemo_test_finalize_empty.wav"),
            created_at: Local::now(),
            params: EncodingParams::mono(22_050),
        };
        match finalize(&recording, &[], 300) {
            Err(AudioError::EncodingFailure(_)) => {}
            other => panic!("expected EncodingFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_finalize_produces_bounded_waveform() {
        let path = std::env::temp_dir().join(format!(
            "vmemo_test_finalize_{}.wav",
            std::process::id()
        ));
        let recording = Recording {
            path: path.clone(),
            created_at: Local::now(),
            params: EncodingParams::mono(22_050),
        };
        let samples: Vec<i16> = (0..44_100).map(|i| ((i % 700) * 40) as i16).collect();

        let (waveform, duration) = finalize(&recording, &samples, 300).unwrap();
        assert_eq!(waveform.len(), 300);
        assert!((duration - 2.0).abs() < 1e-3);

        let _ = std::fs::remove_file(&path);
    }
}
