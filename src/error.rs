//! Error taxonomy for the audio pipeline.
//!
//! All failures here are recoverable within the owning component; commands
//! convert them to `anyhow::Error` at the boundary. None are fatal to the
//! process — the session falls back to the nearest safe state instead.

use std::path::PathBuf;
use thiserror::Error;

/// Failures the recording/playback pipeline can surface.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The input or output device could not be acquired (session conflict,
    /// permission denial, no device present).
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A playback or reduction target whose file no longer exists on disk.
    #[error("recording not found: {}", .0.display())]
    RecordingNotFound(PathBuf),

    /// Finalization could not produce a valid encoded file.
    #[error("audio encoding failed: {0}")]
    EncodingFailure(String),

    /// File I/O failure outside encoding (reads, metadata).
    #[error("file operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hound::Error> for AudioError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
                AudioError::Io(io)
            }
            other => AudioError::EncodingFailure(other.to_string()),
        }
    }
}
