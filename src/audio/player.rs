//! Playback lifecycle: output device, progress tracking and completion.
//!
//! Loads a finalized recording into a rodio sink and advances a playback
//! cursor on a fixed tick. The session normally injects the cached display
//! waveform before playing; when playing standalone the player derives one
//! from the file itself. Natural end-of-audio is the only transition the
//! player initiates on its own, delivered over the event channel.

use std::fs::File;
use std::io::BufReader;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use super::encoder;
use super::recorder::Recording;
use super::waveform;
use super::PipelineEvent;
use crate::error::AudioError;

/// Position within a recording during playback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackCursor {
    pub elapsed_secs: f32,
    /// Normalized progress in [0, 1], monotone while running.
    pub progress: f32,
    pub state: CursorState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Stopped,
    Running,
    Paused,
}

impl PlaybackCursor {
    fn stopped() -> Self {
        Self {
            elapsed_secs: 0.0,
            progress: 0.0,
            state: CursorState::Stopped,
        }
    }
}

/// Owns the playback device, sink and progress tick.
pub struct Player {
    /// Output device handle, held only while loaded (exclusive-device policy).
    stream: Option<OutputStream>,
    sink: Option<Arc<Sink>>,
    cursor: Arc<Mutex<PlaybackCursor>>,
    waveform: Vec<f32>,
    tick: Option<JoinHandle<()>>,
    events: UnboundedSender<PipelineEvent>,
    tick_ms: u64,
    display_bars: usize,
    is_loading: bool,
}

impl Player {
    pub fn new(tick_ms: u64, display_bars: usize, events: UnboundedSender<PipelineEvent>) -> Self {
        Self {
            stream: None,
            sink: None,
            cursor: Arc::new(Mutex::new(PlaybackCursor::stopped())),
            waveform: Vec::new(),
            tick: None,
            events,
            tick_ms,
            display_bars,
            is_loading: false,
        }
    }

    /// Loads `recording` and begins playback from the start.
    ///
    /// Acquires the output device, decodes the file into a sink and starts
    /// the progress tick. `PlaybackFinished` stamped with `generation` is
    /// delivered exactly once when the audio runs out naturally.
    ///
    /// # Errors
    /// - `RecordingNotFound` if the file no longer exists; the player stays stopped
    /// - `DeviceUnavailable` if the output stream cannot be opened
    /// - `EncodingFailure` if the file cannot be decoded
    pub fn play(&mut self, recording: &Recording, generation: u64) -> Result<(), AudioError> {
        if !recording.exists() {
            return Err(AudioError::RecordingNotFound(recording.path.clone()));
        }

        self.halt();
        self.is_loading = true;

        let result = self.load_and_start(recording, generation);
        self.is_loading = false;

        if let Err(ref e) = result {
            tracing::warn!("Playback start failed: {}", e);
            self.stream = None;
        }
        result
    }

    fn load_and_start(&mut self, recording: &Recording, generation: u64) -> Result<(), AudioError> {
        let stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

        let duration_secs = encoder::wav_duration_secs(&recording.path)?;

        // Standalone fallback: the session injects the cached waveform before
        // playing, so deriving here only happens when used without a recorder.
        if self.waveform.is_empty() {
            tracing::debug!("No injected waveform, deriving from file");
            let amplitudes = encoder::read_amplitudes(&recording.path)?;
            self.waveform = waveform::reduce(&amplitudes, self.display_bars);
        }

        let file = File::open(&recording.path)?;
        let source = Decoder::new(BufReader::new(file))
            .map_err(|e| AudioError::EncodingFailure(e.to_string()))?;

        let sink = Arc::new(Sink::connect_new(stream.mixer()));
        sink.append(source);

        *self.cursor.lock().unwrap() = PlaybackCursor {
            elapsed_secs: 0.0,
            progress: 0.0,
            state: CursorState::Running,
        };

        self.tick = Some(spawn_progress_tick(
            Arc::clone(&sink),
            Arc::clone(&self.cursor),
            duration_secs,
            self.tick_ms,
            generation,
            self.events.clone(),
        ));

        self.stream = Some(stream);
        self.sink = Some(sink);
        tracing::info!(
            "Playback started: {} ({:.2}s)",
            recording.path.display(),
            duration_secs
        );
        Ok(())
    }

    /// Suspends or resumes output without resetting progress.
    pub fn toggle_playback(&mut self) {
        let Some(sink) = &self.sink else {
            return;
        };

        let mut cursor = self.cursor.lock().unwrap();
        match cursor.state {
            CursorState::Running => {
                sink.pause();
                cursor.state = CursorState::Paused;
                tracing::debug!("Playback paused at {:.2}s", cursor.elapsed_secs);
            }
            CursorState::Paused => {
                sink.play();
                cursor.state = CursorState::Running;
                tracing::debug!("Playback resumed at {:.2}s", cursor.elapsed_secs);
            }
            CursorState::Stopped => {}
        }
    }

    /// Halts output, cancels the tick and resets progress to zero.
    pub fn stop(&mut self) {
        self.halt();
        tracing::debug!("Playback stopped");
    }

    fn halt(&mut self) {
        if let Some(tick) = self.tick.take() {
            tick.abort();
        }
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.stream = None;
        *self.cursor.lock().unwrap() = PlaybackCursor::stopped();
    }

    /// Fast-path injection of a pre-derived display waveform.
    pub fn set_waveform(&mut self, series: Vec<f32>) {
        self.waveform = series;
    }

    pub fn clear_waveform(&mut self) {
        self.waveform.clear();
    }

    pub fn waveform(&self) -> &[f32] {
        &self.waveform
    }

    pub fn cursor(&self) -> PlaybackCursor {
        *self.cursor.lock().unwrap()
    }

    pub fn progress(&self) -> f32 {
        self.cursor.lock().unwrap().progress
    }

    pub fn is_playing(&self) -> bool {
        self.cursor.lock().unwrap().state == CursorState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.cursor.lock().unwrap().state == CursorState::Paused
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Advances the cursor every `tick_ms` while the sink is audible and reports
/// natural end-of-audio exactly once.
fn spawn_progress_tick(
    sink: Arc<Sink>,
    cursor: Arc<Mutex<PlaybackCursor>>,
    duration_secs: f32,
    tick_ms: u64,
    generation: u64,
    events: UnboundedSender<PipelineEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(tick_ms.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            if sink.empty() {
                *cursor.lock().unwrap() = PlaybackCursor::stopped();
                let _ = events.send(PipelineEvent::PlaybackFinished { generation });
                tracing::debug!("Playback finished naturally");
                break;
            }

            let mut cursor = cursor.lock().unwrap();
            if cursor.state != CursorState::Running {
                continue;
            }

            let elapsed = sink.get_pos().as_secs_f32();
            let progress = if duration_secs > 0.0 {
                (elapsed / duration_secs).clamp(0.0, 1.0)
            } else {
                1.0
            };
            cursor.elapsed_secs = elapsed.max(cursor.elapsed_secs);
            // Monotone while running; only stop/finish/replay reset it.
            cursor.progress = progress.max(cursor.progress);
        }
    })
}
