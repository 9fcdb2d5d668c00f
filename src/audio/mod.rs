//! Audio capture/playback pipeline for vmemo.
//!
//! Capture, encoding, level metering, waveform reduction and playback. The
//! session state machine drives these components and consumes the events they
//! deliver asynchronously.

pub mod encoder;
pub mod level;
pub mod player;
pub mod recorder;
pub mod waveform;

pub use level::LevelSampler;
pub use player::Player;
pub use recorder::{Recorder, Recording};

/// Asynchronous deliveries from background pipeline work back to the session.
///
/// Every variant carries the recording generation it was produced for; the
/// session discards deliveries whose generation no longer matches (staleness
/// guard).
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Finalization completed and the display waveform was derived from the
    /// full encoded file.
    WaveformReady {
        generation: u64,
        waveform: Vec<f32>,
        duration_secs: f32,
    },
    /// Finalization could not produce a usable file; the recording is absent.
    FinalizeFailed { generation: u64 },
    /// Playback reached the natural end of the audio.
    PlaybackFinished { generation: u64 },
}
