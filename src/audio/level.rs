//! Periodic input-level sampling during recording.
//!
//! Reads the tail of the shared capture buffer on a fixed period, converts it
//! to dBFS, normalizes into [0, 1] and appends to the live series. Emission is
//! best-effort, not hard-real-time; the task exits silently once the recorder
//! reports inactive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::waveform::LiveSeries;

/// Lower edge of the metering window in dBFS. Anything quieter reads as 0.0.
const MIN_DB: f32 = -60.0;
/// Upper edge of the metering window. Full scale reads as 1.0.
const MAX_DB: f32 = 0.0;
/// dBFS assigned to a digitally silent buffer.
const SILENCE_DB: f32 = -160.0;

/// Maps a decibel reading into the normalized [0, 1] display range.
///
/// Clamps to the [-60, 0] window first, so both silence and anything below
/// the window floor map to 0.0 and full scale maps to 1.0.
pub fn normalize_level(db: f32) -> f32 {
    let clamped = db.clamp(MIN_DB, MAX_DB);
    (clamped - MIN_DB) / (MAX_DB - MIN_DB)
}

/// Computes the RMS level of the most recent ~50 ms of capture in dBFS.
///
/// An empty or silent buffer reads as digital silence rather than -inf.
pub fn recent_dbfs(samples: &[i16], sample_rate: u32) -> f32 {
    if samples.is_empty() {
        return SILENCE_DB;
    }

    let window = ((sample_rate / 20) as usize).min(samples.len()).max(1);
    let recent = &samples[samples.len() - window..];

    let sum_of_squares: i64 = recent.iter().map(|&x| (x as i64).pow(2)).sum();
    let mean_square = sum_of_squares as f64 / recent.len() as f64;
    let rms = mean_square.sqrt() as f32;

    if rms > 0.0 {
        20.0 * (rms / i16::MAX as f32).log10()
    } else {
        SILENCE_DB
    }
}

/// Periodic level emitter feeding the live series.
///
/// Owned by the recorder; `start` spawns the sampling task and `stop` flips
/// the shared active flag, which the task observes on its next tick.
pub struct LevelSampler {
    active: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl LevelSampler {
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Begins emitting normalized levels at `period_ms` until stopped.
    ///
    /// Each emission appends to `live`; readings continue only while the
    /// active flag holds, so a recorder that stops mid-period simply ends the
    /// stream of emissions without an error.
    pub fn start(
        &mut self,
        period_ms: u64,
        capture: Arc<Mutex<Vec<i16>>>,
        sample_rate: u32,
        live: Arc<Mutex<LiveSeries>>,
    ) {
        self.stop();
        self.active.store(true, Ordering::Relaxed);

        let active = Arc::clone(&self.active);

        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(period_ms.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !active.load(Ordering::Relaxed) {
                    break;
                }

                let db = {
                    let samples = capture.lock().unwrap();
                    recent_dbfs(&samples, sample_rate)
                };
                live.lock().unwrap().push(normalize_level(db));
            }
            tracing::debug!("Level sampler stopped");
        }));
    }

    /// Signals the sampling task to end; safe to call when not running.
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::Relaxed);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for LevelSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_level_window_endpoints() {
        assert_eq!(normalize_level(-60.0), 0.0);
        assert_eq!(normalize_level(0.0), 1.0);
    }

    #[test]
    fn test_normalize_level_clamps_outside_window() {
        // Below the floor reads the same as the floor itself.
        assert_eq!(normalize_level(-120.0), normalize_level(-60.0));
        assert_eq!(normalize_level(12.0), 1.0);
    }

    #[test]
    fn test_normalize_level_midpoint() {
        assert!((normalize_level(-30.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_recent_dbfs_silence() {
        assert_eq!(recent_dbfs(&[], 44_100), SILENCE_DB);
        assert_eq!(recent_dbfs(&[0; 512], 44_100), SILENCE_DB);
    }

    #[test]
    fn test_recent_dbfs_full_scale() {
        // A full-scale square wave sits at 0 dBFS.
        let samples = vec![i16::MAX; 2_205];
        let db = recent_dbfs(&samples, 44_100);
        assert!(db.abs() < 0.01, "expected ~0 dBFS, got {db}");
    }
}
