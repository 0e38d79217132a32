//! Small pure numeric filters the tracker composes out of, rather than
//! reaching for an external DSP crate: a generic FIR convolution, a
//! windowed-sinc bandpass design, filtfilt via two moving-average
//! passes, a median filter, and 3-point parabolic peak interpolation.
//!
//! Grounded on the plain `&[f64]` free-function style of
//! `jpc/src/coder.rs`; the algorithms themselves come from
//! `examples/original_source/src/unboxer/frametrackerutil.c`, which
//! inlines each of these at its call site rather than naming them.

use std::f64::consts::PI;

/// Direct-form FIR convolution, same length as `signal` (zero-padded
/// at the edges).
pub fn fir_filter(signal: &[f64], taps: &[f64]) -> Vec<f64> {
    let half = taps.len() / 2;
    let mut output = vec![0.0; signal.len()];
    for (i, slot) in output.iter_mut().enumerate() {
        let mut acc = 0.0;
        for (k, &tap) in taps.iter().enumerate() {
            let offset = i as i64 + k as i64 - half as i64;
            if offset >= 0 && (offset as usize) < signal.len() {
                acc += tap * signal[offset as usize];
            }
        }
        *slot = acc;
    }
    output
}

/// A symmetric Blackman window of `size` samples.
pub fn blackman_window(size: usize) -> Vec<f64> {
    if size <= 1 {
        return vec![1.0; size];
    }
    let n = (size - 1) as f64;
    (0..size)
        .map(|i| {
            let x = i as f64 / n;
            0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
        })
        .collect()
}

/// A windowed-sinc bandpass FIR of `length` taps (odd, centered),
/// passing frequencies (as a fraction of the sampling rate, `0..0.5`)
/// within `bandwidth` of `center_freq`.
pub fn bandpass_fir(length: usize, center_freq: f64, bandwidth: f64) -> Vec<f64> {
    let half = (length / 2) as i64;
    let window = blackman_window(length);
    let mut taps: Vec<f64> = (0..length)
        .map(|i| {
            let n = i as i64 - half;
            let lowpass = if n == 0 {
                2.0 * bandwidth
            } else {
                (2.0 * PI * bandwidth * n as f64).sin() / (PI * n as f64)
            };
            lowpass * (2.0 * PI * center_freq * n as f64).cos() * window[i]
        })
        .collect();
    let gain: f64 = taps.iter().map(|t| t.abs()).sum();
    if gain > 0.0 {
        for tap in taps.iter_mut() {
            *tap /= gain;
        }
    }
    taps
}

fn moving_average(signal: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 || signal.is_empty() {
        return signal.to_vec();
    }
    let half = window / 2;
    (0..signal.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(signal.len());
            let slice = &signal[lo..hi];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Two passes of a moving average of `window` samples (forward then
/// reverse then re-reversed), canceling the phase lag a single pass
/// introduces.
pub fn moving_average_filtfilt(signal: &[f64], window: usize) -> Vec<f64> {
    let forward = moving_average(signal, window);
    let mut reversed: Vec<f64> = forward.iter().rev().cloned().collect();
    reversed = moving_average(&reversed, window);
    reversed.reverse();
    reversed
}

/// A windowed median filter of `window` samples (must be odd to be
/// centered; even values are treated as `window - 1`).
pub fn median_filter(signal: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 || signal.is_empty() {
        return signal.to_vec();
    }
    let half = window / 2;
    (0..signal.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(signal.len());
            let mut slice: Vec<f64> = signal[lo..hi].to_vec();
            slice.sort_by(|a, b| a.partial_cmp(b).unwrap());
            slice[slice.len() / 2]
        })
        .collect()
}

/// Sub-sample offset (relative to index 0, the center sample) of the
/// maximum of a parabola fit through three equally spaced samples
/// `(y_minus1, y0, y_plus1)`. Returns `0.0` for a degenerate (flat or
/// inverted) fit.
pub fn parabolic_peak(y_minus1: f64, y0: f64, y_plus1: f64) -> f64 {
    let denom = y_minus1 - 2.0 * y0 + y_plus1;
    if denom.abs() < 1e-12 {
        0.0
    } else {
        0.5 * (y_minus1 - y_plus1) / denom
    }
}

/// Solves `y_k = a*cos(omega*x_k) + b*sin(omega*x_k) + c` for three
/// samples at `x in {-1, 0, 1}`, returning `(a, b, c)`; used to locate
/// a reference-bar peak's sub-sample phase from three neighboring
/// samples of a bandpass-filtered signal whose carrier angular
/// frequency is `omega` radians/sample.
pub fn three_sample_phase(y_minus1: f64, y0: f64, y_plus1: f64, omega: f64) -> (f64, f64, f64) {
    let cos1 = omega.cos();
    let sin1 = omega.sin();
    // y_minus1 = a*cos1 - b*sin1 + c
    // y0       = a            + c
    // y_plus1  = a*cos1 + b*sin1 + c
    let b = (y_plus1 - y_minus1) / (2.0 * sin1);
    let a = (y_plus1 + y_minus1 - 2.0 * y0) / (2.0 * (cos1 - 1.0));
    let c = y0 - a;
    (a, b, c)
}

/// The phase angle (radians) recovered from `three_sample_phase`'s
/// `(a, b)` coefficients, the sub-sample position of the peak.
pub fn phase_angle(a: f64, b: f64) -> f64 {
    b.atan2(a)
}

/// Converts a recovered phase (radians, from `phase_angle`) at carrier
/// angular frequency `omega` into a sub-sample offset from the center
/// sample.
pub fn phase_to_sample_offset(phase: f64, omega: f64) -> f64 {
    if omega.abs() < 1e-12 {
        0.0
    } else {
        -phase / omega
    }
}

/// Per-row argmax-then-refine location finder shared by both
/// reference-bar tracking (step 3) and columnwise border tracking
/// (step 4) — in the original they are the same function applied to
/// differently prepared input matrices. `data` is a row-major `height
/// x width` matrix of correlation/signal values; `reference` seeds the
/// chained per-row bias; `sampling_rate` sets both the phase-solve
/// carrier (`omega = PI / sampling_rate`) and the quadrant-correction
/// test.
///
/// Grounded on
/// `examples/original_source/src/unboxer/frametrackerutil.c`'s
/// `find_max_location_rate`: per-row argmax, 3-sample phase refine,
/// 127-tap/41-tap filtfilt residual for drop-out detection, linear
/// interpolation across drop-outs, and a final 101-sample median
/// filter.
pub fn find_max_location_rate(
    data: &[f64],
    width: usize,
    height: usize,
    reference: f64,
    sampling_rate: f64,
) -> Vec<f64> {
    if height == 0 || width == 0 {
        return Vec::new();
    }

    let mut location = vec![0.0; height];
    let mut carried_reference = reference;
    for k in 0..height {
        let row = &data[k * width..(k + 1) * width];
        let mut best_index = 0usize;
        let mut best_value = row[0];
        for (i, &v) in row.iter().enumerate() {
            if v > best_value {
                best_value = v;
                best_index = i;
            }
        }
        let _ = carried_reference; // original chains reference but argmax ignores it beyond seeding
        carried_reference = best_index as f64;
        location[k] = carried_reference;
    }

    let clamp_pos = |pos: f64| -> usize { pos.max(1.0).min((width as f64) - 2.0) as usize };

    let edge_vector: Vec<f64> = (0..height)
        .map(|k| {
            let pos = clamp_pos(location[k]);
            data[k * width + pos]
        })
        .collect();

    let smoothed = moving_average_filtfilt(&edge_vector, 127);
    let mut residual: Vec<f64> = edge_vector
        .iter()
        .zip(smoothed.iter())
        .map(|(e, s)| (e - s).powi(2))
        .collect();
    residual = moving_average_filtfilt(&residual, 41);

    let edge_average: f64 = edge_vector.iter().sum::<f64>() / height as f64;

    let omega = PI / sampling_rate;
    for k in 0..height {
        let pos = clamp_pos(location[k]);
        let y_minus1 = data[k * width + pos - 1];
        let y0 = data[k * width + pos];
        let y_plus1 = data[k * width + pos + 1];
        let (a, b, _c) = three_sample_phase(y_minus1, y0, y_plus1, omega);
        let epsilon = 1e-30;
        let a = if a.abs() < epsilon {
            epsilon.copysign(a)
        } else {
            a
        };
        let mut offset = (b / a).atan();
        if a * (offset * omega).cos() + b * (offset * omega).sin() < 0.0 {
            offset += sampling_rate;
        }
        location[k] += offset;
    }

    let threshold = edge_average * edge_average * 0.02;
    let mut drop_out = false;
    let mut drop_out_position = 0usize;
    for k in 0..height {
        if residual[k] > threshold {
            if !drop_out {
                drop_out_position = k;
                drop_out = true;
            }
            continue;
        }
        if drop_out {
            if drop_out_position > 0 && drop_out_position + 1 < k {
                let span = (k - (drop_out_position - 1)) as f64;
                let slope = (location[k] - location[drop_out_position - 1]) / span;
                for d in drop_out_position..k {
                    location[d] =
                        slope * ((d + 1 - drop_out_position) as f64) + location[drop_out_position - 1];
                }
            }
            drop_out = false;
        }
    }

    median_filter(&location, 101)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fir_filter_of_impulse_returns_the_taps() {
        let mut signal = vec![0.0; 7];
        signal[3] = 1.0;
        let taps = vec![1.0, 2.0, 3.0];
        let output = fir_filter(&signal, &taps);
        assert_eq!(&output[2..5], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn blackman_window_is_symmetric_and_zero_at_edges() {
        let window = blackman_window(9);
        assert!((window[0]).abs() < 1e-6);
        assert!((window[8]).abs() < 1e-6);
        for i in 0..window.len() {
            assert!((window[i] - window[window.len() - 1 - i]).abs() < 1e-9);
        }
    }

    #[test]
    fn moving_average_filtfilt_smooths_a_step() {
        let mut signal = vec![0.0; 20];
        for v in signal.iter_mut().skip(10) {
            *v = 1.0;
        }
        let smoothed = moving_average_filtfilt(&signal, 5);
        assert!(smoothed[5] < 0.01);
        assert!(smoothed[15] > 0.99 || smoothed[15] > smoothed[5]);
    }

    #[test]
    fn median_filter_removes_an_isolated_spike() {
        let mut signal = vec![0.0; 11];
        signal[5] = 100.0;
        let filtered = median_filter(&signal, 5);
        assert_eq!(filtered[5], 0.0);
    }

    #[test]
    fn parabolic_peak_of_symmetric_samples_is_zero() {
        assert_eq!(parabolic_peak(1.0, 2.0, 1.0), 0.0);
    }

    #[test]
    fn parabolic_peak_shifts_toward_the_larger_neighbour() {
        let offset = parabolic_peak(1.0, 2.0, 1.5);
        assert!(offset > 0.0);
    }

    #[test]
    fn phase_angle_recovers_a_known_cosine_phase() {
        let phase = 0.4_f64;
        let y = |x: f64| (x + phase).cos();
        let (a, b, c) = three_sample_phase(y(-1.0), y(0.0), y(1.0), 1.0);
        assert!(c.abs() < 1e-9);
        let recovered = phase_angle(a, b);
        assert!((recovered - (-phase)).abs() < 1e-6);
    }

    #[test]
    fn find_max_location_rate_tracks_a_stationary_peak_across_rows() {
        let width = 21;
        let height = 30;
        let peak_col = 10;
        let mut data = vec![0.0; width * height];
        for row in 0..height {
            for col in 0..width {
                let d = (col as f64 - peak_col as f64).abs();
                data[row * width + col] = (-d * d / 4.0).exp();
            }
        }
        let locations = find_max_location_rate(&data, width, height, peak_col as f64, 8.0);
        for &loc in &locations {
            assert!((loc - peak_col as f64).abs() < 1.0);
        }
    }
}
