use std::f64::consts::PI;

use chrono::{DateTime, Utc};

use super::model::{RawMeasurement, TimeAnchor, MAX_SAMPLE};
use crate::error::Result;

/// Mid-scale of the 12-bit ADC; the sensor signal swings around it.
pub const ADC_MID_SCALE: f64 = 2048.0;

// ---------------------------------------------------------------------------
// Deterministic PRNG
// ---------------------------------------------------------------------------

/// Minimal deterministic PRNG (xoshiro256**)
pub struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    pub fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
        mean + std_dev * z
    }
}

// ---------------------------------------------------------------------------
// Damped precession signal
// ---------------------------------------------------------------------------

/// Parameters of a synthetic capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrecessionSignal {
    pub frequency_hz: f64,
    pub t0: f64,
    pub amplitude: f64,
    pub x0: f64,
    pub y0: f64,
    /// Standard deviation of additive Gaussian noise, mV.
    pub noise: f64,
    pub sample_rate: f64,
    pub duration_secs: f64,
}

impl Default for PrecessionSignal {
    fn default() -> Self {
        Self {
            frequency_hz: 2130.0,
            t0: 2.0,
            amplitude: 400.0,
            x0: 0.0,
            y0: 0.0,
            noise: 2.0,
            sample_rate: 5000.0,
            duration_secs: 1.0,
        }
    }
}

impl PrecessionSignal {
    pub fn sample_count(&self) -> usize {
        (self.duration_secs * self.sample_rate).round() as usize
    }

    /// Noise-free model values in mV around zero.
    pub fn ideal(&self) -> Vec<f64> {
        (0..self.sample_count())
            .map(|i| {
                let t = i as f64 / self.sample_rate;
                self.y0
                    + self.amplitude
                        * (-t / self.t0).exp()
                        * (2.0 * PI * (t - self.x0) * self.frequency_hz).sin()
            })
            .collect()
    }

    /// ADC codes: model plus noise, shifted to mid-scale, rounded and clamped to 12 bits.
    pub fn adc_samples(&self, rng: &mut SimpleRng) -> Vec<u16> {
        self.ideal()
            .into_iter()
            .map(|v| {
                let code = (ADC_MID_SCALE + v + rng.gauss(0.0, self.noise)).round();
                code.clamp(0.0, MAX_SAMPLE as f64) as u16
            })
            .collect()
    }

    /// Fails only for a sample rate that is not positive and finite.
    pub fn measurement(&self, seed: u64, started_at: DateTime<Utc>) -> Result<RawMeasurement> {
        let mut rng = SimpleRng::new(seed);
        RawMeasurement::new(
            self.adc_samples(&mut rng),
            self.sample_rate,
            TimeAnchor::Start(started_at),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rng_is_deterministic_per_seed() {
        let mut a = SimpleRng::new(42);
        let mut b = SimpleRng::new(42);
        for _ in 0..16 {
            assert_eq!(a.next_f64(), b.next_f64());
        }
    }

    #[test]
    fn adc_samples_stay_in_12_bit_range() {
        let signal = PrecessionSignal {
            amplitude: 3000.0,
            ..Default::default()
        };
        let samples = signal.adc_samples(&mut SimpleRng::new(1));
        assert_eq!(samples.len(), 5000);
        assert!(samples.iter().all(|&s| s <= MAX_SAMPLE));
        assert!(samples.contains(&0) && samples.contains(&MAX_SAMPLE));
    }
}
