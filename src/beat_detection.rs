use rustfft::{num_complex::Complex, FftPlanner};

const FRAME_SIZE: usize = 2048;
const HOP_SIZE: usize = 512;

/// Subdivision level of a beat-grid slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subdivision {
    Quarter,
    Eighth,
    Sixteenth,
}

/// One timing slot on the beat grid.
#[derive(Clone, Copy, Debug)]
pub struct GridSlot {
    /// Exact grid timestamp in seconds.
    pub time: f32,
    /// Slot time refined toward the nearest local onset peak, within half a
    /// subdivision. Equals `time` when no envelope is available.
    pub refined_time: f32,
    pub subdivision: Subdivision,
    /// Onset strength at this slot, normalized to 0..1.
    pub onset: f32,
}

/// Tempo-derived timing grid spanning the full track, sixteenth-note spaced.
#[derive(Clone, Debug)]
pub struct BeatGrid {
    pub bpm: f32,
    pub duration: f32,
    pub slots: Vec<GridSlot>,
}

impl BeatGrid {
    /// Detect tempo and onsets in a mono signal and lay the grid.
    pub fn from_waveform(samples: &[f32], sample_rate: u32) -> Self {
        let envelope = onset_envelope(samples, sample_rate);
        let smoothed = smooth_curve(&envelope, 3);
        let peak_indices = find_peaks(&smoothed, 0.3);

        let frame_dt = HOP_SIZE as f32 / sample_rate as f32;
        let peak_times: Vec<f32> = peak_indices.iter().map(|&i| i as f32 * frame_dt).collect();
        let bpm = estimate_bpm(&peak_times);

        let duration = samples.len() as f32 / sample_rate as f32;
        log::debug!(
            "beat grid: bpm={bpm:.1}, duration={duration:.1}s, {} onset peaks",
            peak_times.len()
        );

        let mut grid = Self::lay_grid(bpm, duration);
        grid.score_slots(&smoothed, frame_dt);
        grid
    }

    /// Grid for a known tempo with flat metric onset weighting. Used when the
    /// caller already trusts an external tempo and in tests.
    pub fn uniform(bpm: f32, duration: f32) -> Self {
        let mut grid = Self::lay_grid(bpm, duration);
        for slot in &mut grid.slots {
            slot.onset = match slot.subdivision {
                Subdivision::Quarter => 1.0,
                Subdivision::Eighth => 0.6,
                Subdivision::Sixteenth => 0.4,
            };
        }
        grid
    }

    fn lay_grid(bpm: f32, duration: f32) -> Self {
        let sixteenth = 60.0 / bpm / 4.0;
        let count = (duration / sixteenth).floor() as usize;
        let slots = (0..count)
            .map(|i| {
                let time = i as f32 * sixteenth;
                let subdivision = match i % 4 {
                    0 => Subdivision::Quarter,
                    2 => Subdivision::Eighth,
                    _ => Subdivision::Sixteenth,
                };
                GridSlot {
                    time,
                    refined_time: time,
                    subdivision,
                    onset: 0.0,
                }
            })
            .collect();

        BeatGrid {
            bpm,
            duration,
            slots,
        }
    }

    /// Score each slot with the envelope value nearest its time and refine
    /// its raw timestamp toward the local envelope maximum.
    fn score_slots(&mut self, envelope: &[f32], frame_dt: f32) {
        if envelope.is_empty() {
            return;
        }
        let max_val = envelope.iter().cloned().fold(f32::MIN, f32::max).max(1e-6);
        let half_window = (self.spacing() / 2.0 / frame_dt).round() as usize;

        for slot in &mut self.slots {
            let center = (slot.time / frame_dt).round() as usize;
            let center = center.min(envelope.len() - 1);
            slot.onset = envelope[center] / max_val;

            let lo = center.saturating_sub(half_window);
            let hi = (center + half_window + 1).min(envelope.len());
            let best = (lo..hi)
                .max_by(|&a, &b| {
                    envelope[a]
                        .partial_cmp(&envelope[b])
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(center);
            slot.refined_time = best as f32 * frame_dt;
        }

        // Refinement must never reorder slots
        let mut last = f32::MIN;
        for slot in &mut self.slots {
            if slot.refined_time <= last {
                slot.refined_time = slot.time;
            }
            last = slot.refined_time.max(slot.time);
        }
    }

    /// Sixteenth-note spacing in seconds.
    pub fn spacing(&self) -> f32 {
        60.0 / self.bpm / 4.0
    }

    /// Nearest exact grid timestamp for `time`.
    pub fn snap(&self, time: f32) -> f32 {
        let spacing = self.spacing();
        let idx = (time / spacing).round() as usize;
        let idx = idx.min(self.slots.len().saturating_sub(1));
        self.slots.get(idx).map(|s| s.time).unwrap_or(time)
    }
}

/// Spectral-flux onset envelope over Hann-windowed frames.
fn onset_envelope(samples: &[f32], _sample_rate: u32) -> Vec<f32> {
    if samples.len() < FRAME_SIZE {
        return Vec::new();
    }
    let num_frames = (samples.len() - FRAME_SIZE) / HOP_SIZE + 1;

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(FRAME_SIZE);

    let mut envelope = Vec::with_capacity(num_frames);
    let mut prev_mags = vec![0.0f32; FRAME_SIZE / 2];

    for i in 0..num_frames {
        let start = i * HOP_SIZE;
        let mut fft_input: Vec<Complex<f32>> = samples[start..start + FRAME_SIZE]
            .iter()
            .enumerate()
            .map(|(idx, &sample)| {
                let window = 0.5
                    * (1.0
                        - ((2.0 * std::f32::consts::PI * idx as f32)
                            / (FRAME_SIZE as f32 - 1.0))
                            .cos());
                Complex::new(sample * window, 0.0)
            })
            .collect();

        fft.process(&mut fft_input);

        // Half-wave rectified magnitude increase against the previous frame
        let mut flux = 0.0f32;
        for (bin, coeff) in fft_input.iter().take(FRAME_SIZE / 2).enumerate() {
            let mag = coeff.norm();
            let diff = mag - prev_mags[bin];
            if diff > 0.0 {
                flux += diff;
            }
            prev_mags[bin] = mag;
        }
        envelope.push(flux);
    }

    envelope
}

/// Smooth a curve with a centered moving average.
fn smooth_curve(data: &[f32], window_size: usize) -> Vec<f32> {
    if data.is_empty() {
        return Vec::new();
    }

    let half_window = window_size / 2;
    let mut smoothed = Vec::with_capacity(data.len());

    for i in 0..data.len() {
        let start = i.saturating_sub(half_window);
        let end = (i + half_window + 1).min(data.len());
        let avg = data[start..end].iter().sum::<f32>() / (end - start) as f32;
        smoothed.push(avg);
    }

    smoothed
}

/// Find local maxima above `threshold_ratio` of the curve's peak value.
fn find_peaks(data: &[f32], threshold_ratio: f32) -> Vec<usize> {
    if data.len() < 3 {
        return Vec::new();
    }

    let max_val = data.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let threshold = max_val * threshold_ratio;

    let mut peaks = Vec::new();
    for i in 1..data.len() - 1 {
        if data[i] > threshold && data[i] > data[i - 1] && data[i] > data[i + 1] {
            peaks.push(i);
        }
    }
    peaks
}

/// Estimate BPM from the median inter-peak interval, octave-folded into
/// the 90-180 band so half- and double-time pulses land on one grid.
fn estimate_bpm(peak_times: &[f32]) -> f32 {
    if peak_times.len() < 2 {
        return 120.0;
    }

    let mut intervals: Vec<f32> = peak_times
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&dt| dt > 0.05)
        .collect();
    if intervals.is_empty() {
        return 120.0;
    }

    intervals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = intervals[intervals.len() / 2];

    let mut bpm = 60.0 / median;
    while bpm < 90.0 {
        bpm *= 2.0;
    }
    while bpm >= 180.0 {
        bpm /= 2.0;
    }
    bpm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smooth_curve_preserves_length() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let smoothed = smooth_curve(&data, 3);
        assert_eq!(smoothed.len(), data.len());
    }

    #[test]
    fn test_find_peaks() {
        let data = vec![0.0, 1.0, 0.5, 2.0, 0.5, 1.5, 0.0];
        let peaks = find_peaks(&data, 0.3);
        assert!(peaks.contains(&1));
        assert!(peaks.contains(&3));
    }

    #[test]
    fn test_estimate_bpm_from_half_second_intervals() {
        let peaks = vec![0.0, 0.5, 1.0, 1.5, 2.0];
        let bpm = estimate_bpm(&peaks);
        assert!((bpm - 120.0).abs() < 1.0);
    }

    #[test]
    fn test_estimate_bpm_folds_slow_pulse_into_range() {
        // 2-second intervals (30 BPM) should fold up to 120
        let peaks = vec![0.0, 2.0, 4.0, 6.0];
        let bpm = estimate_bpm(&peaks);
        assert!((bpm - 120.0).abs() < 1.0);
    }

    #[test]
    fn test_estimate_bpm_folds_fast_pulse_into_range() {
        // 0.2-second intervals (300 BPM) should fold down to 150
        let peaks: Vec<f32> = (0..10).map(|i| i as f32 * 0.2).collect();
        let bpm = estimate_bpm(&peaks);
        assert!((bpm - 150.0).abs() < 1.0);
    }

    #[test]
    fn test_uniform_grid_spans_duration_strictly_increasing() {
        let grid = BeatGrid::uniform(120.0, 10.0);
        // 120 BPM sixteenths are 0.125s apart: 80 slots in 10s
        assert_eq!(grid.slots.len(), 80);
        for pair in grid.slots.windows(2) {
            assert!(pair[0].time < pair[1].time);
        }
        assert_eq!(grid.slots[0].subdivision, Subdivision::Quarter);
        assert_eq!(grid.slots[2].subdivision, Subdivision::Eighth);
        assert_eq!(grid.slots[3].subdivision, Subdivision::Sixteenth);
    }

    #[test]
    fn test_snap_rounds_to_nearest_slot() {
        let grid = BeatGrid::uniform(120.0, 10.0);
        assert!((grid.snap(0.07) - 0.125).abs() < 1e-6);
        assert!((grid.snap(0.05) - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_from_waveform_detects_click_track_tempo() {
        // 8 kHz click track at 120 BPM: a click every 0.5s for 20s
        let sample_rate = 8000u32;
        let mut samples = vec![0.0f32; sample_rate as usize * 20];
        let mut t = 0.0f32;
        while t < 20.0 {
            let start = (t * sample_rate as f32) as usize;
            for i in 0..200usize.min(samples.len() - start) {
                samples[start + i] = ((i as f32 * 0.9).sin()) * (1.0 - i as f32 / 200.0);
            }
            t += 0.5;
        }

        let grid = BeatGrid::from_waveform(&samples, sample_rate);
        assert!(
            (grid.bpm - 120.0).abs() < 6.0,
            "detected bpm {} too far from 120",
            grid.bpm
        );
        assert!((grid.duration - 20.0).abs() < 0.01);
        assert!(!grid.slots.is_empty());
    }
}
