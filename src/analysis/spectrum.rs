use num_complex::Complex;
use rustfft::FftPlanner;
use serde::Serialize;

use crate::config::FrequencyBand;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// SpectrumResult
// ---------------------------------------------------------------------------

/// One-sided magnitude spectrum of a capture and its in-band peak.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectrumResult {
    /// Bin frequencies, ascending from 0 Hz in steps of `bin_width_hz`.
    pub frequencies: Vec<f64>,
    /// Unnormalized DFT magnitudes, same length as `frequencies`.
    pub magnitudes: Vec<f64>,
    pub bin_width_hz: f64,
    pub peak_frequency_hz: f64,
    pub peak_magnitude: f64,
}

impl SpectrumResult {
    /// `(frequency, magnitude)` pairs restricted to `band`, for zoomed plots.
    pub fn in_band<'a>(&'a self, band: &'a FrequencyBand) -> impl Iterator<Item = (f64, f64)> + 'a {
        self.frequencies
            .iter()
            .zip(&self.magnitudes)
            .filter(move |(f, _)| band.contains(**f))
            .map(|(&f, &m)| (f, m))
    }
}

// ---------------------------------------------------------------------------
// Spectral locator
// ---------------------------------------------------------------------------

/// Subtract the arithmetic mean (DC removal).
pub fn remove_mean(samples: &[f64]) -> Vec<f64> {
    if samples.is_empty() {
        return Vec::new();
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    samples.iter().map(|&x| x - mean).collect()
}

/// Compute the one-sided DFT of the mean-removed `signal` and pick the
/// strongest bin inside `band` (inclusive). Ties keep the lowest frequency.
pub fn locate_peak(signal: &[f64], sample_rate: f64, band: &FrequencyBand) -> Result<SpectrumResult> {
    locate_peak_centered(&remove_mean(signal), sample_rate, band)
}

/// [`locate_peak`] for a signal whose mean was already removed.
pub fn locate_peak_centered(
    signal: &[f64],
    sample_rate: f64,
    band: &FrequencyBand,
) -> Result<SpectrumResult> {
    let n = signal.len();
    if n < 2 {
        return Err(Error::SignalTooShort {
            required: 1,
            available: n,
        });
    }

    let mut buffer: Vec<Complex<f64>> = signal
        .iter()
        .map(|&x| Complex::new(x, 0.0))
        .collect();
    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(n).process(&mut buffer);

    let bins = n / 2 + 1;
    let bin_width_hz = sample_rate / n as f64;
    let frequencies: Vec<f64> = (0..bins).map(|k| k as f64 * bin_width_hz).collect();
    let magnitudes: Vec<f64> = buffer[..bins].iter().map(|c| c.norm()).collect();

    let mut peak: Option<(usize, f64)> = None;
    for (k, (&f, &m)) in frequencies.iter().zip(&magnitudes).enumerate() {
        if !band.contains(f) {
            continue;
        }
        if peak.map_or(true, |(_, best)| m > best) {
            peak = Some((k, m));
        }
    }

    let (k, peak_magnitude) = peak.ok_or(Error::EmptyBand {
        low_hz: band.low_hz,
        high_hz: band.high_hz,
        bin_width_hz,
    })?;
    let peak_frequency_hz = frequencies[k];
    log::debug!("spectral peak {peak_frequency_hz:.2} Hz, magnitude {peak_magnitude:.1}");

    Ok(SpectrumResult {
        frequencies,
        magnitudes,
        bin_width_hz,
        peak_frequency_hz,
        peak_magnitude,
    })
}
