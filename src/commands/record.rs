//! Interactive recording/playback session.
//!
//! Wires the audio pipeline to the session state machine and drives it with
//! keyboard input: one primary control cycles record → stop → play → pause,
//! delete resets, submit prints the finished recording's path to stdout for
//! piping into other tools.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::audio::{Player, Recorder};
use crate::config::VmemoConfig;
use crate::session::RecordingSession;
use crate::ui::{SessionCommand, SessionTui};

/// Runs the interactive session until the user quits or submits.
///
/// On submit, the path of the finished recording is written to stdout.
///
/// # Errors
/// - If configuration cannot be loaded
/// - If the terminal UI cannot be initialized
pub async fn handle_record() -> Result<(), anyhow::Error> {
    tracing::info!("=== vmemo session started ===");

    let config = VmemoConfig::load().map_err(|e| {
        tracing::error!("Failed to load configuration: {e}");
        anyhow::anyhow!(
            "Configuration error: {e}\nPlease check your ~/.config/vmemo/vmemo.toml file."
        )
    })?;

    tracing::info!(
        "Configuration loaded: device={}, sample_rate={}Hz, display_bars={}, min_record_secs={}s",
        config.audio.device,
        config.audio.sample_rate,
        config.audio.display_bars,
        config.audio.min_record_secs
    );

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let recorder = Recorder::new(
        config.audio.clone(),
        config.storage.recordings_dir.clone(),
        events_tx.clone(),
    );
    let player = Player::new(
        config.audio.progress_tick_ms,
        config.audio.display_bars,
        events_tx,
    );
    let mut session =
        RecordingSession::new(recorder, player, events_rx, config.audio.min_record_secs);

    let mut tui = SessionTui::new().map_err(|e| anyhow::anyhow!("Failed to initialize UI: {e}"))?;

    let mut last_tick = Instant::now();
    let mut submitted: Option<std::path::PathBuf> = None;

    loop {
        let command = match tui.handle_input() {
            Ok(command) => command,
            Err(e) => {
                tracing::error!("Input handling error: {}", e);
                break;
            }
        };

        session.poll_events();

        if last_tick.elapsed() >= Duration::from_secs(1) {
            session.tick();
            last_tick = Instant::now();
        }

        match command {
            SessionCommand::Continue => {}
            SessionCommand::Press => session.press(),
            SessionCommand::Delete => session.delete(),
            SessionCommand::Submit => {
                if session.can_submit() {
                    submitted = session.recording_path();
                    break;
                }
                tracing::debug!("Submit ignored: no submittable recording");
            }
            SessionCommand::Quit => break,
        }

        let frame = session.snapshot();
        let can_submit = session.can_submit();
        if let Err(e) = tui.render(&frame, can_submit) {
            tracing::error!("Render failed: {}", e);
            break;
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    session.shutdown();
    tui.cleanup()
        .map_err(|e| anyhow::anyhow!("Cleanup failed: {e}"))?;

    if let Some(path) = submitted {
        println!("{}", path.display());
        tracing::info!("Recording submitted: {}", path.display());
    }

    tracing::info!("=== vmemo session exited ===");
    Ok(())
}
