//! Waveform reduction for playback display.
//!
//! Turns the raw amplitude samples of a finished recording into a fixed-length
//! sequence of bar heights. All functions here are pure: same input, same
//! output, no external state. Also owns the capped live series that the level
//! sampler appends to during recording.

use std::collections::VecDeque;

/// Minimum visible bar height before the power curve is applied.
const SILENCE_FLOOR: f32 = 0.05;
/// Sub-linear exponent keeping quiet passages visible.
const CURVE_EXPONENT: f32 = 0.6;
/// Peak/RMS blend weights for block summarization.
const PEAK_WEIGHT: f32 = 0.7;
const RMS_WEIGHT: f32 = 0.3;

/// Reduces raw amplitudes to at most `target_count` display values.
///
/// Pipeline: normalize to the loudest sample, apply the perceptual floor and
/// power curve, then block-downsample with a peak/RMS blend. Inputs shorter
/// than `target_count` are kept at full length (no upsampling).
pub fn reduce(samples: &[f32], target_count: usize) -> Vec<f32> {
    downsample(&rescale(&normalize(samples)), target_count)
}

/// Scales samples so the loudest becomes 1.0.
///
/// An empty input stays empty and an all-zero input passes through unchanged
/// so the division is always well-defined.
pub fn normalize(samples: &[f32]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let max_value = samples.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()));
    if max_value == 0.0 {
        return samples.to_vec();
    }

    samples.iter().map(|&x| x / max_value).collect()
}

/// Applies the perceptual rescale to every sample.
///
/// Near-silence is floored to a minimum visible height and the sub-linear
/// power curve lifts quiet passages; the result never exceeds 1.0.
pub fn rescale(samples: &[f32]) -> Vec<f32> {
    samples
        .iter()
        .map(|&x| x.max(SILENCE_FLOOR).powf(CURVE_EXPONENT).min(1.0))
        .collect()
}

/// Block-downsamples to `target_count` values.
///
/// Each output slot summarizes one contiguous block as a peak/RMS blend. The
/// trailing remainder beyond the last full block is dropped; inputs at or
/// below the target length are returned as-is.
pub fn downsample(samples: &[f32], target_count: usize) -> Vec<f32> {
    if target_count == 0 {
        return Vec::new();
    }
    if samples.len() <= target_count {
        return samples.to_vec();
    }

    let block_size = samples.len() / target_count;
    let mut reduced = Vec::with_capacity(target_count);

    for i in 0..target_count {
        let start = i * block_size;
        let end = (start + block_size).min(samples.len());
        let block = &samples[start..end];

        let peak = block.iter().fold(0.0f32, |acc, &x| acc.max(x));
        let rms = (block.iter().map(|&x| x * x).sum::<f32>() / block.len() as f32).sqrt();

        reduced.push(PEAK_WEIGHT * peak + RMS_WEIGHT * rms);
    }

    reduced
}

/// Append-only amplitude series with a FIFO length cap.
///
/// Grows while recording and evicts the oldest samples once the cap is
/// exceeded. This bounds memory for the real-time display only; the encoded
/// file keeps every sample.
#[derive(Debug)]
pub struct LiveSeries {
    samples: VecDeque<f32>,
    cap: usize,
}

impl LiveSeries {
    pub fn new(cap: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(cap.min(4096)),
            cap,
        }
    }

    /// Appends a level, evicting the oldest sample when over the cap.
    pub fn push(&mut self, level: f32) {
        self.samples.push_back(level);
        while self.samples.len() > self.cap {
            self.samples.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns a point-in-time copy for rendering.
    pub fn snapshot(&self) -> Vec<f32> {
        self.samples.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_empty_input() {
        assert!(reduce(&[], 300).is_empty());
    }

    #[test]
    fn test_reduce_all_zeros_avoids_division() {
        // maxValue guard triggers: zeros pass through normalize, then get
        // floored and curved like any other sample.
        let out = reduce(&[0.0; 10], 300);
        assert_eq!(out.len(), 10);
        let floored = SILENCE_FLOOR.powf(CURVE_EXPONENT);
        for v in out {
            assert!((v - floored).abs() < 1e-6);
        }
    }

    #[test]
    fn test_reduce_output_length() {
        let short: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        assert_eq!(reduce(&short, 300).len(), 100);

        let long: Vec<f32> = (0..10_000).map(|i| (i % 97) as f32 / 97.0).collect();
        assert_eq!(reduce(&long, 300).len(), 300);
    }

    #[test]
    fn test_rescale_floor_and_ceiling() {
        let out = rescale(&[0.0, 0.01, 0.5, 1.0, 2.0]);
        let floor = SILENCE_FLOOR.powf(CURVE_EXPONENT);
        for &v in &out {
            assert!(v >= floor - 1e-6);
            assert!(v <= 1.0);
        }
        // Exactly-1.0 input maps to exactly 1.0.
        assert!((out[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_reduce_values_within_display_range() {
        let samples: Vec<f32> = (0..5_000).map(|i| ((i * 31) % 100) as f32 / 100.0).collect();
        let floor = SILENCE_FLOOR.powf(CURVE_EXPONENT);
        for v in reduce(&samples, 300) {
            assert!(v >= floor - 1e-6, "value {v} below display floor");
            assert!(v <= 1.0 + 1e-6, "value {v} above ceiling");
        }
    }

    #[test]
    fn test_reduce_is_deterministic() {
        let samples: Vec<f32> = (0..4_321).map(|i| ((i * 7) % 53) as f32 / 53.0).collect();
        assert_eq!(reduce(&samples, 300), reduce(&samples, 300));
    }

    #[test]
    fn test_downsample_identity_at_full_length() {
        // With target == len, block size is 1 and peak == rms == sample, so
        // reduce collapses to normalize + rescale.
        let samples: Vec<f32> = vec![0.1, 0.4, 0.8, 0.2, 0.6];
        let expected = rescale(&normalize(&samples));
        assert_eq!(reduce(&samples, samples.len()), expected);
    }

    #[test]
    fn test_downsample_drops_trailing_remainder() {
        // 10 samples into 3 slots: block size 3, sample index 9 never read.
        let mut samples = vec![0.5f32; 9];
        samples.push(100.0);
        let out = downsample(&samples, 3);
        assert_eq!(out.len(), 3);
        for v in out {
            assert!((v - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_live_series_fifo_cap() {
        let mut series = LiveSeries::new(3);
        for i in 0..5 {
            series.push(i as f32);
        }
        assert_eq!(series.snapshot(), vec![2.0, 3.0, 4.0]);
        series.clear();
        assert!(series.is_empty());
    }
}
