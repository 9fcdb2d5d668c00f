//! vmemo: a terminal voice-memo recorder.
//!
//! The core is the audio capture/playback pipeline and its recording-control
//! state machine: live level sampling, waveform reduction, WAV finalization,
//! playback with progress tracking, and the press-driven session that keeps
//! all of it consistent. The CLI and TUI in `app`, `commands` and `ui` are
//! thin shells over that core.

pub mod app;
pub mod audio;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod ui;
