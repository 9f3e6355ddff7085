//! Pure loudness and spectrum math.
//!
//! `rms`, `first_channel_rms` and `decibels` are allocation-free and safe to
//! call from the realtime tap. `magnitude_spectrum` allocates and is meant for
//! non-realtime callers.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Reference amplitude for dBFS: a full-scale sample is 1.0.
pub const FULL_SCALE_REFERENCE: f32 = 1.0;

/// Value logged in place of −∞ dB when a buffer is digital silence.
pub const SILENCE_FLOOR_DB: f64 = -160.0;

/// Root-mean-square over the first `length` samples.
///
/// Returns NaN when `length` (or the buffer) is empty; callers must guard.
pub fn rms(samples: &[f32], length: usize) -> f32 {
    let n = length.min(samples.len());
    if n == 0 {
        return f32::NAN;
    }
    let sum_sq: f64 = samples[..n].iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / n as f64).sqrt() as f32
}

/// RMS of the first channel of an interleaved buffer, without copying it out.
pub fn first_channel_rms(interleaved: &[f32], channels: u16) -> f32 {
    if channels <= 1 {
        return rms(interleaved, interleaved.len());
    }
    let stride = channels as usize;
    let frames = interleaved.len() / stride;
    if frames == 0 {
        return f32::NAN;
    }
    let sum_sq: f64 = interleaved
        .iter()
        .step_by(stride)
        .take(frames)
        .map(|&s| (s as f64) * (s as f64))
        .sum();
    (sum_sq / frames as f64).sqrt() as f32
}

/// `20 * log10(rms / reference)`. Negative infinity when `rms == 0`.
pub fn decibels(rms: f32, reference: f32) -> f32 {
    20.0 * (rms / reference).log10()
}

/// Map a decibel reading to the value written to a segment row.
///
/// −∞ (digital silence) becomes [`SILENCE_FLOOR_DB`]; NaN yields `None` so the
/// sample is skipped.
pub fn loggable_decibels(db: f32) -> Option<f64> {
    if db.is_nan() {
        None
    } else if db == f32::NEG_INFINITY {
        Some(SILENCE_FLOOR_DB)
    } else {
        Some(db as f64)
    }
}

/// Hann window of `size` points (periodic form, `0.5 * (1 - cos(2πi/size))`).
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos()))
        .collect()
}

/// Normalized single-sided magnitude spectrum of a Hann-windowed frame.
///
/// The transform size is the largest power of two not exceeding `frame_length`
/// (or the buffer length, whichever is smaller). Returns `size / 2` magnitudes
/// scaled by `2 / size`; an empty vector when fewer than two samples are usable.
/// Each call plans and drops its own FFT, so concurrent callers share nothing.
pub fn magnitude_spectrum(buffer: &[f32], frame_length: usize) -> Vec<f32> {
    let usable = frame_length.min(buffer.len());
    if usable < 2 {
        return Vec::new();
    }
    let size = prev_power_of_two(usable);

    let window = hann_window(size);
    let mut frame: Vec<Complex<f32>> = buffer[..size]
        .iter()
        .zip(window.iter())
        .map(|(&s, &w)| Complex::new(s * w, 0.0))
        .collect();

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(size);
    fft.process(&mut frame);

    let scale = 2.0 / size as f32;
    frame[..size / 2].iter().map(|c| c.norm() * scale).collect()
}

fn prev_power_of_two(n: usize) -> usize {
    debug_assert!(n > 0);
    1 << (usize::BITS - 1 - n.leading_zeros())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rms_of_silence_is_zero() {
        for len in [1, 7, 512, 8192] {
            let zeros = vec![0.0f32; len];
            assert_eq!(rms(&zeros, len), 0.0);
        }
    }

    #[test]
    fn rms_of_constant_is_its_magnitude() {
        let samples = vec![-0.5f32; 100];
        assert_relative_eq!(rms(&samples, 100), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn rms_uses_only_leading_samples() {
        let samples = [1.0f32, 1.0, 0.0, 0.0];
        assert_relative_eq!(rms(&samples, 2), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn rms_of_empty_is_nan() {
        assert!(rms(&[0.3, 0.4], 0).is_nan());
        assert!(rms(&[], 4).is_nan());
    }

    #[test]
    fn first_channel_ignores_other_channels() {
        // L = 0.5 constant, R = 1.0 constant
        let stereo = [0.5f32, 1.0, 0.5, 1.0, 0.5, 1.0];
        assert_relative_eq!(first_channel_rms(&stereo, 2), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn first_channel_mono_matches_rms() {
        let mono = [0.1f32, -0.2, 0.3, -0.4];
        assert_relative_eq!(first_channel_rms(&mono, 1), rms(&mono, 4), epsilon = 1e-7);
    }

    #[test]
    fn unit_rms_is_zero_db() {
        assert_eq!(decibels(1.0, 1.0), 0.0);
    }

    #[test]
    fn half_amplitude_is_about_minus_six_db() {
        assert_relative_eq!(decibels(0.5, FULL_SCALE_REFERENCE), -6.0206, epsilon = 1e-3);
    }

    #[test]
    fn decibels_is_monotonic() {
        let mut previous = f32::NEG_INFINITY;
        for i in 1..1000 {
            let db = decibels(i as f32 * 0.001, 1.0);
            assert!(db > previous);
            previous = db;
        }
    }

    #[test]
    fn silence_maps_to_floor() {
        assert_eq!(decibels(0.0, 1.0), f32::NEG_INFINITY);
        assert_eq!(loggable_decibels(decibels(0.0, 1.0)), Some(SILENCE_FLOOR_DB));
        assert_eq!(loggable_decibels(f32::NAN), None);
        assert_eq!(loggable_decibels(-20.0), Some(-20.0));
    }

    #[test]
    fn spectrum_length_is_half_of_power_of_two() {
        let buffer = vec![0.0f32; 1000];
        assert_eq!(magnitude_spectrum(&buffer, 1000).len(), 256);
        assert_eq!(magnitude_spectrum(&buffer, 1024).len(), 256);
        assert!(magnitude_spectrum(&buffer, 1).is_empty());
    }

    #[test]
    fn spectrum_peaks_at_tone_bin() {
        let size = 64;
        let bin = 8;
        let tone: Vec<f32> = (0..size)
            .map(|i| (2.0 * std::f32::consts::PI * bin as f32 * i as f32 / size as f32).sin())
            .collect();

        let spectrum = magnitude_spectrum(&tone, size);
        let (peak_index, peak) = spectrum
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |acc, (i, &m)| if m > acc.1 { (i, m) } else { acc });

        assert_eq!(peak_index, bin);
        // Hann coherent gain is 0.5 for a unit-amplitude tone.
        assert_relative_eq!(peak, 0.5, epsilon = 1e-3);
    }

    #[test]
    fn hann_window_endpoints() {
        let window = hann_window(8);
        assert_relative_eq!(window[0], 0.0, epsilon = 1e-7);
        assert_relative_eq!(window[4], 1.0, epsilon = 1e-6);
    }
}
