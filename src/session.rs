//! Recording-control state machine.
//!
//! `RecordingSession` is the single source of truth for the user-visible
//! control state and the only component that commands recorder/player
//! transitions. The primary control ("press") dispatches purely on the
//! current state; asynchronous pipeline deliveries are applied through
//! `poll_events` with a generation-based staleness guard, so a delivery for a
//! recording that was replaced or deleted in the meantime is discarded.
//!
//! The session is generic over the recorder/player seams so the state machine
//! runs against the real audio pipeline in production and against fakes in
//! tests.

use tokio::sync::mpsc::UnboundedReceiver;

use crate::audio::recorder::Recording;
use crate::audio::{PipelineEvent, Player, Recorder};
use crate::error::AudioError;

/// The single enum governing which record/play actions are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Idle,
    Recording,
    Processing,
    ReadyToPlay,
    Playing,
    Paused,
}

/// Recording-side commands the session issues.
pub trait RecordControl {
    fn start_recording(&mut self, generation: u64) -> Result<(), AudioError>;
    fn stop_recording(&mut self, generation: u64);
    fn delete_recording(&mut self);
    fn recording(&self) -> Option<&Recording>;
    fn live_levels(&self) -> Vec<f32>;
}

/// Playback-side commands the session issues.
pub trait PlaybackControl {
    fn play(&mut self, recording: &Recording, generation: u64) -> Result<(), AudioError>;
    fn toggle_playback(&mut self);
    fn stop(&mut self);
    fn set_waveform(&mut self, series: Vec<f32>);
    fn clear_waveform(&mut self);
    fn waveform(&self) -> &[f32];
    fn progress(&self) -> f32;
}

impl RecordControl for Recorder {
    fn start_recording(&mut self, generation: u64) -> Result<(), AudioError> {
        Recorder::start_recording(self, generation)
    }
    fn stop_recording(&mut self, generation: u64) {
        Recorder::stop_recording(self, generation)
    }
    fn delete_recording(&mut self) {
        Recorder::delete_recording(self)
    }
    fn recording(&self) -> Option<&Recording> {
        Recorder::recording(self)
    }
    fn live_levels(&self) -> Vec<f32> {
        Recorder::live_levels(self)
    }
}

impl PlaybackControl for Player {
    fn play(&mut self, recording: &Recording, generation: u64) -> Result<(), AudioError> {
        Player::play(self, recording, generation)
    }
    fn toggle_playback(&mut self) {
        Player::toggle_playback(self)
    }
    fn stop(&mut self) {
        Player::stop(self)
    }
    fn set_waveform(&mut self, series: Vec<f32>) {
        Player::set_waveform(self, series)
    }
    fn clear_waveform(&mut self) {
        Player::clear_waveform(self)
    }
    fn waveform(&self) -> &[f32] {
        Player::waveform(self)
    }
    fn progress(&self) -> f32 {
        Player::progress(self)
    }
}

/// What the rendering consumer reads each refresh tick.
///
/// Built in one pass from session-owned state, so the fields are never
/// individually torn from the consumer's viewpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderFrame {
    pub levels: Vec<f32>,
    pub is_recording: bool,
    pub is_playing: bool,
    pub is_paused: bool,
    pub is_processing: bool,
    pub playback_progress: f32,
    pub elapsed_record_secs: u64,
    pub elapsed_playback_secs: u64,
}

/// The control state machine coordinating recorder and player.
pub struct RecordingSession<R, P> {
    recorder: R,
    player: P,
    events: UnboundedReceiver<PipelineEvent>,
    state: ControlState,
    /// Bumped on every new recording and every delete; deliveries stamped
    /// with an older generation are discarded.
    generation: u64,
    min_record_secs: u64,
    elapsed_record_secs: u64,
    elapsed_playback_secs: u64,
    /// Canonical display waveform of the current recording, once derived.
    display_waveform: Vec<f32>,
}

impl<R: RecordControl, P: PlaybackControl> RecordingSession<R, P> {
    pub fn new(
        recorder: R,
        player: P,
        events: UnboundedReceiver<PipelineEvent>,
        min_record_secs: u64,
    ) -> Self {
        Self {
            recorder,
            player,
            events,
            state: ControlState::Idle,
            generation: 0,
            min_record_secs,
            elapsed_record_secs: 0,
            elapsed_playback_secs: 0,
            display_waveform: Vec::new(),
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Handles the primary control press, dispatching on current state only.
    pub fn press(&mut self) {
        match self.state {
            ControlState::Idle => {
                self.generation += 1;
                match self.recorder.start_recording(self.generation) {
                    Ok(()) => {
                        self.elapsed_record_secs = 0;
                        self.elapsed_playback_secs = 0;
                        self.display_waveform.clear();
                        self.player.clear_waveform();
                        self.state = ControlState::Recording;
                    }
                    Err(e) => {
                        // No transition happens; the press is not reflected.
                        tracing::warn!("Could not start recording: {}", e);
                    }
                }
            }
            ControlState::Recording => {
                if self.elapsed_record_secs >= self.min_record_secs {
                    self.recorder.stop_recording(self.generation);
                    self.state = ControlState::Processing;
                } else {
                    tracing::debug!(
                        "Press ignored: {}s recorded, minimum is {}s",
                        self.elapsed_record_secs,
                        self.min_record_secs
                    );
                }
            }
            ControlState::Processing => {
                // Waveform derivation pending; the control is inert.
            }
            ControlState::ReadyToPlay => {
                let Some(recording) = self.recorder.recording().cloned() else {
                    tracing::warn!("ReadyToPlay with no recording, resetting");
                    self.state = ControlState::Idle;
                    return;
                };
                self.elapsed_playback_secs = 0;
                match self.player.play(&recording, self.generation) {
                    Ok(()) => self.state = ControlState::Playing,
                    Err(e) => {
                        tracing::warn!("Could not start playback: {}", e);
                    }
                }
            }
            ControlState::Playing => {
                self.player.toggle_playback();
                self.state = ControlState::Paused;
            }
            ControlState::Paused => {
                self.player.toggle_playback();
                self.state = ControlState::Playing;
            }
        }
    }

    /// Deletes the current recording from any state that has one.
    ///
    /// Stops the other device holder first: playback is halted before the
    /// recorder deletes, and an active recording is stopped inside
    /// `delete_recording`. Bumping the generation here discards any pending
    /// finalize delivery for the deleted recording.
    pub fn delete(&mut self) {
        if self.recorder.recording().is_none() {
            return;
        }

        self.player.stop();
        self.recorder.delete_recording();
        self.player.clear_waveform();
        self.display_waveform.clear();
        self.generation += 1;
        self.elapsed_record_secs = 0;
        self.elapsed_playback_secs = 0;
        self.state = ControlState::Idle;
        tracing::info!("Recording deleted, session idle");
    }

    /// Advances the 1-second elapsed-time counters.
    pub fn tick(&mut self) {
        match self.state {
            ControlState::Recording => self.elapsed_record_secs += 1,
            ControlState::Playing => {
                if self.elapsed_playback_secs < self.elapsed_record_secs {
                    self.elapsed_playback_secs += 1;
                }
            }
            _ => {}
        }
    }

    /// Applies pending pipeline deliveries; never blocks.
    pub fn poll_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::WaveformReady {
                generation,
                waveform,
                duration_secs,
            } => {
                if generation != self.generation || self.state != ControlState::Processing {
                    tracing::debug!(
                        "Discarding stale waveform delivery (generation {} vs {})",
                        generation,
                        self.generation
                    );
                    return;
                }
                tracing::debug!(
                    "Waveform ready: {} bars, {:.2}s",
                    waveform.len(),
                    duration_secs
                );
                self.display_waveform = waveform.clone();
                self.player.set_waveform(waveform);
                self.state = ControlState::ReadyToPlay;
            }
            PipelineEvent::FinalizeFailed { generation } => {
                if generation != self.generation || self.state != ControlState::Processing {
                    return;
                }
                // Accepted data loss: the recording is simply absent.
                tracing::warn!("Finalization failed, discarding recording");
                self.recorder.delete_recording();
                self.generation += 1;
                self.elapsed_record_secs = 0;
                self.state = ControlState::Idle;
            }
            PipelineEvent::PlaybackFinished { generation } => {
                // Paused is reachable here when a press lands between the
                // natural finish and the next poll; the sink is already
                // empty, so the finish still wins.
                let playing_or_paused = matches!(
                    self.state,
                    ControlState::Playing | ControlState::Paused
                );
                if generation != self.generation || !playing_or_paused {
                    return;
                }
                self.elapsed_playback_secs = 0;
                self.state = ControlState::ReadyToPlay;
            }
        }
    }

    /// Whether the current recording can be submitted: finished, at least the
    /// minimum length, and not currently recording or processing.
    pub fn can_submit(&self) -> bool {
        self.recorder.recording().is_some()
            && self.elapsed_record_secs >= self.min_record_secs
            && !matches!(
                self.state,
                ControlState::Recording | ControlState::Processing
            )
    }

    /// Whether a delete currently has anything to act on.
    pub fn has_recording(&self) -> bool {
        self.recorder.recording().is_some()
    }

    /// Path of the current recording's encoded file, if one exists.
    pub fn recording_path(&self) -> Option<std::path::PathBuf> {
        self.recorder.recording().map(|r| r.path.clone())
    }

    /// Releases both devices on the way out. An in-flight recording is
    /// stopped and finalized in the background; its file stays on disk.
    pub fn shutdown(&mut self) {
        self.player.stop();
        if self.state == ControlState::Recording {
            self.recorder.stop_recording(self.generation);
        }
        self.state = ControlState::Idle;
    }

    /// Builds the atomically-consistent frame the renderer reads.
    pub fn snapshot(&self) -> RenderFrame {
        let levels = match self.state {
            ControlState::Idle => Vec::new(),
            ControlState::Recording => self.recorder.live_levels(),
            ControlState::Processing => {
                if !self.display_waveform.is_empty() {
                    self.display_waveform.clone()
                } else {
                    self.recorder.live_levels()
                }
            }
            ControlState::ReadyToPlay | ControlState::Playing | ControlState::Paused => {
                if !self.display_waveform.is_empty() {
                    self.display_waveform.clone()
                } else {
                    self.player.waveform().to_vec()
                }
            }
        };

        RenderFrame {
            levels,
            is_recording: self.state == ControlState::Recording,
            is_playing: self.state == ControlState::Playing,
            is_paused: self.state == ControlState::Paused,
            is_processing: self.state == ControlState::Processing,
            playback_progress: self.player.progress(),
            elapsed_record_secs: self.elapsed_record_secs,
            elapsed_playback_secs: self.elapsed_playback_secs,
        }
    }
}

/// Formats elapsed seconds as `mm:ss`.
pub fn format_time(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::encoder::EncodingParams;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    fn test_recording() -> Recording {
        Recording {
            path: std::path::PathBuf::from("/tmp/vmemo_test_session.wav"),
            created_at: chrono::Local::now(),
            params: EncodingParams::mono(22_050),
        }
    }

    #[derive(Default)]
    struct FakeRecorderInner {
        live: Vec<f32>,
        fail_start: bool,
        stop_calls: Vec<u64>,
        delete_calls: usize,
    }

    /// Session-owned fake; `shared` lets the test inspect call history while
    /// `recording()` serves a borrow from the owned copy.
    struct FakeRecorder {
        shared: Arc<Mutex<FakeRecorderInner>>,
        recording: Option<Recording>,
    }

    impl FakeRecorder {
        fn new(shared: Arc<Mutex<FakeRecorderInner>>) -> Self {
            Self {
                shared,
                recording: None,
            }
        }
    }

    impl RecordControl for FakeRecorder {
        fn start_recording(&mut self, _generation: u64) -> Result<(), AudioError> {
            let mut inner = self.shared.lock().unwrap();
            if inner.fail_start {
                return Err(AudioError::DeviceUnavailable("no input".to_string()));
            }
            inner.live.clear();
            drop(inner);
            self.recording = Some(test_recording());
            Ok(())
        }
        fn stop_recording(&mut self, generation: u64) {
            self.shared.lock().unwrap().stop_calls.push(generation);
        }
        fn delete_recording(&mut self) {
            let mut inner = self.shared.lock().unwrap();
            inner.live.clear();
            inner.delete_calls += 1;
            drop(inner);
            self.recording = None;
        }
        fn recording(&self) -> Option<&Recording> {
            self.recording.as_ref()
        }
        fn live_levels(&self) -> Vec<f32> {
            self.shared.lock().unwrap().live.clone()
        }
    }

    #[derive(Default)]
    struct FakePlayerInner {
        waveform: Vec<f32>,
        progress: f32,
        playing: bool,
        paused: bool,
        fail_play: bool,
        stop_calls: usize,
    }

    #[derive(Clone, Default)]
    struct FakePlayer(Arc<Mutex<FakePlayerInner>>);

    impl PlaybackControl for FakePlayer {
        fn play(&mut self, recording: &Recording, _generation: u64) -> Result<(), AudioError> {
            let mut inner = self.0.lock().unwrap();
            if inner.fail_play {
                return Err(AudioError::RecordingNotFound(recording.path.clone()));
            }
            inner.playing = true;
            inner.paused = false;
            Ok(())
        }
        fn toggle_playback(&mut self) {
            let mut inner = self.0.lock().unwrap();
            if inner.playing {
                inner.playing = false;
                inner.paused = true;
            } else if inner.paused {
                inner.playing = true;
                inner.paused = false;
            }
        }
        fn stop(&mut self) {
            let mut inner = self.0.lock().unwrap();
            inner.playing = false;
            inner.paused = false;
            inner.progress = 0.0;
            inner.stop_calls += 1;
        }
        fn set_waveform(&mut self, series: Vec<f32>) {
            self.0.lock().unwrap().waveform = series;
        }
        fn clear_waveform(&mut self) {
            self.0.lock().unwrap().waveform.clear();
        }
        fn waveform(&self) -> &[f32] {
            // Snapshot path goes through the session's own copy in these
            // tests; an empty slice is fine here.
            &[]
        }
        fn progress(&self) -> f32 {
            self.0.lock().unwrap().progress
        }
    }

    struct Harness {
        session: RecordingSession<FakeRecorder, FakePlayer>,
        recorder: Arc<Mutex<FakeRecorderInner>>,
        player: FakePlayer,
        events_tx: mpsc::UnboundedSender<PipelineEvent>,
    }

    fn harness() -> Harness {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let recorder = Arc::new(Mutex::new(FakeRecorderInner::default()));
        let player = FakePlayer::default();
        let session = RecordingSession::new(
            FakeRecorder::new(Arc::clone(&recorder)),
            player.clone(),
            events_rx,
            15,
        );
        Harness {
            session,
            recorder,
            player,
            events_tx,
        }
    }

    fn record_until_processing(h: &mut Harness) -> u64 {
        h.session.press();
        assert_eq!(h.session.state(), ControlState::Recording);
        for _ in 0..15 {
            h.session.tick();
        }
        h.session.press();
        assert_eq!(h.session.state(), ControlState::Processing);
        *h.recorder.lock().unwrap().stop_calls.last().unwrap()
    }

    #[test]
    fn test_press_before_min_record_time_is_noop() {
        let mut h = harness();
        h.session.press();
        for _ in 0..10 {
            h.session.tick();
        }
        h.session.press();
        assert_eq!(h.session.state(), ControlState::Recording);
        assert!(h.recorder.lock().unwrap().stop_calls.is_empty());
    }

    #[test]
    fn test_full_press_walk_to_replay_ready() {
        let mut h = harness();
        let generation = record_until_processing(&mut h);

        h.events_tx
            .send(PipelineEvent::WaveformReady {
                generation,
                waveform: vec![0.5; 300],
                duration_secs: 15.0,
            })
            .unwrap();
        h.session.poll_events();
        assert_eq!(h.session.state(), ControlState::ReadyToPlay);
        assert_eq!(h.player.0.lock().unwrap().waveform.len(), 300);

        h.session.press();
        assert_eq!(h.session.state(), ControlState::Playing);

        h.events_tx
            .send(PipelineEvent::PlaybackFinished { generation })
            .unwrap();
        h.session.poll_events();
        assert_eq!(h.session.state(), ControlState::ReadyToPlay);
        assert_eq!(h.session.snapshot().elapsed_playback_secs, 0);
    }

    #[test]
    fn test_finish_delivered_while_paused_returns_to_ready() {
        // A press can land between the natural end of audio and the next
        // poll, leaving the session Paused with the finish still queued.
        let mut h = harness();
        let generation = record_until_processing(&mut h);
        h.events_tx
            .send(PipelineEvent::WaveformReady {
                generation,
                waveform: vec![0.5; 10],
                duration_secs: 15.0,
            })
            .unwrap();
        h.session.poll_events();

        h.session.press();
        h.session.tick();
        h.session.press();
        assert_eq!(h.session.state(), ControlState::Paused);

        h.events_tx
            .send(PipelineEvent::PlaybackFinished { generation })
            .unwrap();
        h.session.poll_events();
        assert_eq!(h.session.state(), ControlState::ReadyToPlay);
        assert_eq!(h.session.snapshot().elapsed_playback_secs, 0);
    }

    #[test]
    fn test_play_pause_resume() {
        let mut h = harness();
        let generation = record_until_processing(&mut h);
        h.events_tx
            .send(PipelineEvent::WaveformReady {
                generation,
                waveform: vec![0.5; 10],
                duration_secs: 15.0,
            })
            .unwrap();
        h.session.poll_events();

        h.session.press();
        assert_eq!(h.session.state(), ControlState::Playing);
        h.session.press();
        assert_eq!(h.session.state(), ControlState::Paused);
        assert!(h.player.0.lock().unwrap().paused);
        h.session.press();
        assert_eq!(h.session.state(), ControlState::Playing);
        assert!(h.player.0.lock().unwrap().playing);
    }

    #[test]
    fn test_delete_during_playing_goes_idle() {
        let mut h = harness();
        let generation = record_until_processing(&mut h);
        h.events_tx
            .send(PipelineEvent::WaveformReady {
                generation,
                waveform: vec![0.5; 10],
                duration_secs: 15.0,
            })
            .unwrap();
        h.session.poll_events();
        h.session.press();
        assert_eq!(h.session.state(), ControlState::Playing);

        h.session.delete();
        assert_eq!(h.session.state(), ControlState::Idle);
        assert!(!h.session.has_recording());
        assert!(!h.player.0.lock().unwrap().playing);
        assert!(h.player.0.lock().unwrap().stop_calls >= 1);
        assert_eq!(h.recorder.lock().unwrap().delete_calls, 1);
        assert!(!h.session.can_submit());
    }

    #[test]
    fn test_stale_waveform_delivery_is_discarded() {
        let mut h = harness();
        let stale_generation = record_until_processing(&mut h);

        // Delete while the finalize delivery is still pending, then start a
        // fresh recording.
        h.session.delete();
        h.session.press();
        assert_eq!(h.session.state(), ControlState::Recording);

        h.events_tx
            .send(PipelineEvent::WaveformReady {
                generation: stale_generation,
                waveform: vec![0.9; 300],
                duration_secs: 20.0,
            })
            .unwrap();
        h.session.poll_events();

        // The stale delivery must not surface: state unchanged, no waveform.
        assert_eq!(h.session.state(), ControlState::Recording);
        assert!(h.player.0.lock().unwrap().waveform.is_empty());
        assert!(h.session.snapshot().levels.is_empty());
    }

    #[test]
    fn test_start_failure_keeps_idle() {
        let mut h = harness();
        h.recorder.lock().unwrap().fail_start = true;
        h.session.press();
        assert_eq!(h.session.state(), ControlState::Idle);
    }

    #[test]
    fn test_play_failure_keeps_ready_to_play() {
        let mut h = harness();
        let generation = record_until_processing(&mut h);
        h.events_tx
            .send(PipelineEvent::WaveformReady {
                generation,
                waveform: vec![0.5; 10],
                duration_secs: 15.0,
            })
            .unwrap();
        h.session.poll_events();

        h.player.0.lock().unwrap().fail_play = true;
        h.session.press();
        assert_eq!(h.session.state(), ControlState::ReadyToPlay);
    }

    #[test]
    fn test_finalize_failure_falls_back_to_idle() {
        let mut h = harness();
        let generation = record_until_processing(&mut h);
        h.events_tx
            .send(PipelineEvent::FinalizeFailed { generation })
            .unwrap();
        h.session.poll_events();
        assert_eq!(h.session.state(), ControlState::Idle);
        assert!(!h.session.has_recording());
    }

    #[test]
    fn test_can_submit_gating() {
        let mut h = harness();
        assert!(!h.session.can_submit());

        let generation = record_until_processing(&mut h);
        // Processing: finished but not yet ready.
        assert!(!h.session.can_submit());

        h.events_tx
            .send(PipelineEvent::WaveformReady {
                generation,
                waveform: vec![0.5; 10],
                duration_secs: 15.0,
            })
            .unwrap();
        h.session.poll_events();
        assert!(h.session.can_submit());
    }

    #[test]
    fn test_snapshot_reflects_recording_state() {
        let mut h = harness();
        h.session.press();
        h.recorder.lock().unwrap().live = vec![0.1, 0.2, 0.3];

        let frame = h.session.snapshot();
        assert!(frame.is_recording);
        assert!(!frame.is_playing);
        assert!(!frame.is_paused);
        assert_eq!(frame.levels, vec![0.1, 0.2, 0.3]);
        assert_eq!(frame.playback_progress, 0.0);
    }

    #[test]
    fn test_playback_elapsed_capped_at_recorded_elapsed() {
        let mut h = harness();
        let generation = record_until_processing(&mut h);
        h.events_tx
            .send(PipelineEvent::WaveformReady {
                generation,
                waveform: vec![0.5; 10],
                duration_secs: 15.0,
            })
            .unwrap();
        h.session.poll_events();
        h.session.press();

        for _ in 0..40 {
            h.session.tick();
        }
        assert_eq!(h.session.snapshot().elapsed_playback_secs, 15);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(75), "01:15");
        assert_eq!(format_time(600), "10:00");
    }
}
