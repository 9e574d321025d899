//! Butterworth bandpass design and zero-phase (forward-backward) application.
//!
//! The design goes analog prototype → bandpass transform → bilinear
//! transform in zero/pole/gain form, then pairs poles into second-order
//! sections. Narrow bands around 2 kHz put the poles very close to the unit
//! circle, where a single high-order polynomial loses precision.

use std::f64::consts::PI;

use num_complex::Complex64;

use crate::config::FilterConfig;
use crate::error::{Error, Result};

/// Imaginary parts below this are treated as real poles when pairing.
const REAL_POLE_TOLERANCE: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Second-order section
// ---------------------------------------------------------------------------

/// `H(z) = (b0 + b1 z⁻¹ + b2 z⁻²) / (1 + a1 z⁻¹ + a2 z⁻²)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    /// `a[0]` is always 1.
    pub a: [f64; 3],
}

impl Biquad {
    fn response(&self, z_inv: Complex64) -> Complex64 {
        let num = self.b[0] + z_inv * (self.b[1] + z_inv * self.b[2]);
        let den = self.a[0] + z_inv * (self.a[1] + z_inv * self.a[2]);
        num / den
    }

    fn dc_gain(&self) -> f64 {
        self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>()
    }

    /// Transposed direct form II state after a unit step has settled.
    fn step_state(&self) -> [f64; 2] {
        let gain = self.dc_gain();
        let z2 = self.b[2] - self.a[2] * gain;
        let z1 = self.b[1] - self.a[1] * gain + z2;
        [z1, z2]
    }
}

// ---------------------------------------------------------------------------
// BandpassFilter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct BandpassFilter {
    sections: Vec<Biquad>,
    low_hz: f64,
    high_hz: f64,
    sample_rate: f64,
}

impl BandpassFilter {
    /// Design a Butterworth bandpass `center ± half_bandwidth` of the given
    /// prototype order (the bandpass has twice as many poles).
    pub fn design(center_hz: f64, config: &FilterConfig, sample_rate: f64) -> Result<Self> {
        let low_hz = center_hz - config.half_bandwidth_hz;
        let high_hz = center_hz + config.half_bandwidth_hz;
        let nyquist_hz = sample_rate / 2.0;
        let fail = |reason: &str| Error::FilterDesign {
            low_hz,
            high_hz,
            nyquist_hz,
            reason: reason.to_string(),
        };

        if !(sample_rate > 0.0 && sample_rate.is_finite()) {
            return Err(fail("sample rate must be positive"));
        }
        if config.order == 0 {
            return Err(fail("order must be at least 1"));
        }
        if !(low_hz < high_hz) {
            return Err(fail("bandwidth must be positive"));
        }
        if !(low_hz > 0.0 && high_hz < nyquist_hz) {
            return Err(fail("cutoffs must lie strictly between 0 and Nyquist"));
        }

        let order = config.order;

        // Pre-warped analog band edges for a normalized sample rate of 2.
        let fs2 = 4.0;
        let warped_low = fs2 * (PI * (low_hz / nyquist_hz) / 2.0).tan();
        let warped_high = fs2 * (PI * (high_hz / nyquist_hz) / 2.0).tan();
        let bandwidth = warped_high - warped_low;
        let center_sq = warped_low * warped_high;

        // Analog Butterworth prototype poles on the left unit semicircle,
        // each mapped to a pair of bandpass poles.
        let mut analog_poles = Vec::with_capacity(2 * order);
        for k in 0..order {
            let m = 2.0 * k as f64 + 1.0 - order as f64;
            let prototype = -Complex64::from_polar(1.0, PI * m / (2.0 * order as f64));
            let shifted = prototype * (bandwidth / 2.0);
            let spread = (shifted * shifted - center_sq).sqrt();
            analog_poles.push(shifted + spread);
            analog_poles.push(shifted - spread);
        }

        // Bilinear transform: `order` zeros at the origin land on z = 1, the
        // surplus `order` zeros from infinity land on z = -1.
        let mut denominator = Complex64::new(1.0, 0.0);
        let digital_poles: Vec<Complex64> = analog_poles
            .iter()
            .map(|&p| {
                denominator *= fs2 - p;
                (fs2 + p) / (fs2 - p)
            })
            .collect();
        let gain = (bandwidth.powi(order as i32) * fs2.powi(order as i32) / denominator).re;

        let mut sections = Vec::with_capacity(order);
        let mut real_poles = Vec::new();
        for p in &digital_poles {
            if p.im > REAL_POLE_TOLERANCE {
                sections.push(Biquad {
                    b: [1.0, 0.0, -1.0],
                    a: [1.0, -2.0 * p.re, p.norm_sqr()],
                });
            } else if p.im.abs() <= REAL_POLE_TOLERANCE {
                real_poles.push(p.re);
            }
        }
        if real_poles.len() % 2 == 1 {
            return Err(fail("unpaired real pole"));
        }
        real_poles.sort_by(|a, b| a.total_cmp(b));
        for pair in real_poles.chunks_exact(2) {
            sections.push(Biquad {
                b: [1.0, 0.0, -1.0],
                a: [1.0, -(pair[0] + pair[1]), pair[0] * pair[1]],
            });
        }
        if sections.len() != order {
            return Err(fail("pole pairing produced the wrong number of sections"));
        }
        for coeff in sections[0].b.iter_mut() {
            *coeff *= gain;
        }

        log::debug!(
            "designed order-{order} Butterworth bandpass {low_hz:.2}–{high_hz:.2} Hz at {sample_rate} Hz"
        );

        Ok(Self {
            sections,
            low_hz,
            high_hz,
            sample_rate,
        })
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// Lower and upper −3 dB cutoffs in Hz.
    pub fn cutoffs(&self) -> (f64, f64) {
        (self.low_hz, self.high_hz)
    }

    /// Magnitude of the single-pass frequency response at `freq_hz`.
    pub fn gain_at(&self, freq_hz: f64) -> f64 {
        let z_inv = Complex64::from_polar(1.0, -2.0 * PI * freq_hz / self.sample_rate);
        self.sections
            .iter()
            .map(|s| s.response(z_inv))
            .fold(Complex64::new(1.0, 0.0), |acc, h| acc * h)
            .norm()
    }

    /// Number of samples reflected at each end by [`Self::filtfilt`].
    pub fn pad_len(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    /// Causal single pass from rest.
    pub fn filter(&self, input: &[f64]) -> Vec<f64> {
        let mut state = vec![[0.0; 2]; self.sections.len()];
        self.run(input, &mut state)
    }

    /// Zero-phase filtering: forward pass, then a pass over the reversed
    /// output. The input is extended by odd reflection at both ends and each
    /// pass starts from the settled step state scaled by its first sample.
    pub fn filtfilt(&self, input: &[f64]) -> Result<Vec<f64>> {
        let pad = self.pad_len();
        let n = input.len();
        if n <= pad {
            return Err(Error::SignalTooShort {
                required: pad,
                available: n,
            });
        }

        let first = input[0];
        let last = input[n - 1];
        let mut extended = Vec::with_capacity(n + 2 * pad);
        extended.extend((1..=pad).rev().map(|i| 2.0 * first - input[i]));
        extended.extend_from_slice(input);
        extended.extend((1..=pad).map(|i| 2.0 * last - input[n - 1 - i]));

        let steady = self.steady_state();

        let mut state = scaled(&steady, extended[0]);
        let mut output = self.run(&extended, &mut state);
        output.reverse();

        let mut state = scaled(&steady, output[0]);
        let mut output = self.run(&output, &mut state);
        output.reverse();

        Ok(output[pad..pad + n].to_vec())
    }

    /// Per-section step state, each scaled by the DC gain of the sections before it.
    fn steady_state(&self) -> Vec<[f64; 2]> {
        let mut scale = 1.0;
        self.sections
            .iter()
            .map(|s| {
                let [z1, z2] = s.step_state();
                let state = [scale * z1, scale * z2];
                scale *= s.dc_gain();
                state
            })
            .collect()
    }

    fn run(&self, input: &[f64], state: &mut [[f64; 2]]) -> Vec<f64> {
        input
            .iter()
            .map(|&x| {
                let mut v = x;
                for (s, z) in self.sections.iter().zip(state.iter_mut()) {
                    let y = s.b[0] * v + z[0];
                    z[0] = s.b[1] * v - s.a[1] * y + z[1];
                    z[1] = s.b[2] * v - s.a[2] * y;
                    v = y;
                }
                v
            })
            .collect()
    }
}

fn scaled(states: &[[f64; 2]], factor: f64) -> Vec<[f64; 2]> {
    states
        .iter()
        .map(|[z1, z2]| [z1 * factor, z2 * factor])
        .collect()
}

/// Design around `center_hz` and filter `signal` with zero phase.
pub fn bandpass_zero_phase(
    signal: &[f64],
    sample_rate: f64,
    center_hz: f64,
    config: &FilterConfig,
) -> Result<Vec<f64>> {
    BandpassFilter::design(center_hz, config, sample_rate)?.filtfilt(signal)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f64 = 5000.0;

    fn design_default(center: f64) -> Result<BandpassFilter> {
        BandpassFilter::design(center, &FilterConfig::default(), FS)
    }

    fn sine(freq: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 * (2.0 * PI * freq * i as f64 / FS).sin())
            .collect()
    }

    #[test]
    fn butterworth_response_shape() {
        let filter = design_default(2130.0).unwrap();
        assert_eq!(filter.sections().len(), 3);
        assert!((filter.gain_at(2130.0) - 1.0).abs() <= 1e-6);
        assert!((filter.gain_at(2125.0) - std::f64::consts::FRAC_1_SQRT_2).abs() <= 1e-6);
        assert!((filter.gain_at(2135.0) - std::f64::consts::FRAC_1_SQRT_2).abs() <= 1e-6);
        assert!(filter.gain_at(2080.0) < 0.01);
        assert!(filter.gain_at(2180.0) < 0.01);
    }

    #[test]
    fn sections_are_stable() {
        let filter = design_default(2130.0).unwrap();
        for s in filter.sections() {
            // both roots inside the unit circle
            assert!(s.a[2].abs() < 1.0);
            assert!(s.a[1].abs() < 1.0 + s.a[2]);
        }
    }

    /// Phase of the `freq` component over the settled middle of the record.
    fn phase_at(signal: &[f64], freq: f64) -> f64 {
        let (mut re, mut im) = (0.0_f64, 0.0_f64);
        for (i, v) in signal.iter().enumerate().take(7500).skip(2500) {
            let w = 2.0 * PI * freq * i as f64 / FS;
            re += v * w.cos();
            im += v * w.sin();
        }
        im.atan2(re)
    }

    #[test]
    fn zero_phase_keeps_center_tone_aligned() {
        let input = sine(2130.0, 10_000);
        let output = design_default(2130.0).unwrap().filtfilt(&input).unwrap();
        assert_eq!(output.len(), input.len());
        for i in 2500..7500 {
            assert!((output[i] - input[i]).abs() <= 0.5);
        }
        assert!((phase_at(&output, 2130.0) - phase_at(&input, 2130.0)).abs() <= 1e-4);
    }

    #[test]
    fn forward_backward_cancels_off_center_phase() {
        let input = sine(2133.0, 10_000);
        let filter = design_default(2130.0).unwrap();
        let causal = filter.filter(&input);
        let zero_phase = filter.filtfilt(&input).unwrap();

        let reference = phase_at(&input, 2133.0);
        assert!((phase_at(&causal, 2133.0) - reference).abs() > 1.0);
        assert!((phase_at(&zero_phase, 2133.0) - reference).abs() <= 1e-3);
    }

    #[test]
    fn rejects_out_of_band_tone() {
        let output = bandpass_zero_phase(&sine(1800.0, 10_000), FS, 2130.0, &FilterConfig::default())
            .unwrap();
        assert!(output[2500..7500].iter().all(|v| v.abs() < 0.1));
    }

    #[test]
    fn cutoffs_must_stay_inside_nyquist() {
        assert!(matches!(design_default(3.0), Err(Error::FilterDesign { .. })));
        assert!(matches!(design_default(2497.0), Err(Error::FilterDesign { .. })));
        assert!(matches!(design_default(2495.0), Err(Error::FilterDesign { .. })));
        assert!(design_default(2494.0).is_ok());
    }

    #[test]
    fn short_signal_is_rejected() {
        let filter = design_default(2130.0).unwrap();
        assert_eq!(filter.pad_len(), 21);
        assert!(matches!(
            filter.filtfilt(&[0.0; 21]),
            Err(Error::SignalTooShort { required: 21, available: 21 })
        ));
        assert!(filter.filtfilt(&[0.0; 22]).is_ok());
    }

    #[test]
    fn higher_order_design_pairs_all_poles() {
        let config = FilterConfig {
            half_bandwidth_hz: 400.0,
            order: 5,
        };
        let filter = BandpassFilter::design(1000.0, &config, FS).unwrap();
        assert_eq!(filter.sections().len(), 5);
        assert!((filter.gain_at(600.0) - std::f64::consts::FRAC_1_SQRT_2).abs() <= 1e-6);
    }
}
