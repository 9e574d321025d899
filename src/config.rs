use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Empirically tuned defaults
// ---------------------------------------------------------------------------

/// Nominal resonance search band of the sensor, in Hz.
pub const DEFAULT_SEARCH_BAND_HZ: (f64, f64) = (2125.0, 2135.0);
/// Bandpass half-width around the located peak, in Hz.
pub const DEFAULT_HALF_BANDWIDTH_HZ: f64 = 5.0;
pub const DEFAULT_FILTER_ORDER: usize = 3;
/// Fit window as percentages of the record: drop the leading transient and
/// the noise-dominated tail.
pub const DEFAULT_FIT_WINDOW_PCT: (f64, f64) = (4.0, 90.0);

pub const DEFAULT_INITIAL_X0: f64 = 0.0;
/// Typical decay time of the precession signal, in seconds.
pub const DEFAULT_INITIAL_T0: f64 = 2.0;
/// Typical signal amplitude, in mV.
pub const DEFAULT_INITIAL_AMPLITUDE: f64 = 400.0;
pub const DEFAULT_INITIAL_Y0: f64 = 0.0;

/// Model-evaluation budget of the solver, `200 * (parameters + 1)`.
pub const DEFAULT_MAX_EVALUATIONS: usize = 1200;
pub const DEFAULT_FTOL: f64 = 1.49012e-8;
pub const DEFAULT_XTOL: f64 = 1.49012e-8;

pub const DEFAULT_MAX_T0: f64 = 5.0;
pub const DEFAULT_MAX_T0_ERROR: f64 = 1.0;
pub const DEFAULT_MAX_X0_ERROR: f64 = 1.0;
pub const DEFAULT_MAX_F_ERROR: f64 = 1.0;

// ---------------------------------------------------------------------------
// Config sections
// ---------------------------------------------------------------------------

/// Inclusive frequency interval in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyBand {
    pub low_hz: f64,
    pub high_hz: f64,
}

impl FrequencyBand {
    pub fn new(low_hz: f64, high_hz: f64) -> Self {
        Self { low_hz, high_hz }
    }

    pub fn contains(&self, freq_hz: f64) -> bool {
        freq_hz >= self.low_hz && freq_hz <= self.high_hz
    }
}

impl Default for FrequencyBand {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_BAND_HZ.0, DEFAULT_SEARCH_BAND_HZ.1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub half_bandwidth_hz: f64,
    pub order: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            half_bandwidth_hz: DEFAULT_HALF_BANDWIDTH_HZ,
            order: DEFAULT_FILTER_ORDER,
        }
    }
}

/// Starting point of the solver. The frequency is not configurable: it always
/// comes from the spectral peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialGuess {
    pub x0: f64,
    pub t0: f64,
    pub amplitude: f64,
    pub y0: f64,
}

impl Default for InitialGuess {
    fn default() -> Self {
        Self {
            x0: DEFAULT_INITIAL_X0,
            t0: DEFAULT_INITIAL_T0,
            amplitude: DEFAULT_INITIAL_AMPLITUDE,
            y0: DEFAULT_INITIAL_Y0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// `(from, to)` in percent of the record length.
    pub window_pct: (f64, f64),
    pub initial: InitialGuess,
    pub max_evaluations: usize,
    /// Relative cost reduction below which the solver stops.
    pub ftol: f64,
    /// Relative parameter step below which the solver stops.
    pub xtol: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            window_pct: DEFAULT_FIT_WINDOW_PCT,
            initial: InitialGuess::default(),
            max_evaluations: DEFAULT_MAX_EVALUATIONS,
            ftol: DEFAULT_FTOL,
            xtol: DEFAULT_XTOL,
        }
    }
}

/// Acceptance limits of the quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Upper bound of `t0` in seconds; the lower bound is always exclusive zero.
    pub max_t0: f64,
    pub max_t0_error: f64,
    pub max_x0_error: f64,
    pub max_f_error: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_t0: DEFAULT_MAX_T0,
            max_t0_error: DEFAULT_MAX_T0_ERROR,
            max_x0_error: DEFAULT_MAX_X0_ERROR,
            max_f_error: DEFAULT_MAX_F_ERROR,
        }
    }
}

// ---------------------------------------------------------------------------
// AnalysisConfig
// ---------------------------------------------------------------------------

/// All numeric knobs of the pipeline. Missing keys in a JSON file keep their
/// defaults, so a file only needs to list overrides:
///
/// ```json
/// { "search_band": { "low_hz": 2100.0, "high_hz": 2160.0 },
///   "thresholds": { "max_t0": 4.0 } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub search_band: FrequencyBand,
    pub filter: FilterConfig,
    pub fit: FitConfig,
    pub thresholds: Thresholds,
}

impl AnalysisConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_json::from_str(text)
            .map_err(|e| Error::Config(format!("parsing JSON config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Reject configurations no measurement could succeed with.
    pub fn validate(&self) -> Result<()> {
        let band = &self.search_band;
        if !(band.low_hz >= 0.0 && band.low_hz <= band.high_hz) {
            return Err(Error::Config(format!(
                "search band [{}, {}] Hz must satisfy 0 <= low <= high",
                band.low_hz, band.high_hz
            )));
        }
        if !(self.filter.half_bandwidth_hz > 0.0) {
            return Err(Error::Config(format!(
                "filter half bandwidth must be positive, got {}",
                self.filter.half_bandwidth_hz
            )));
        }
        if self.filter.order == 0 {
            return Err(Error::Config("filter order must be at least 1".into()));
        }
        let (from, to) = self.fit.window_pct;
        if !(from >= 0.0 && from < to && to <= 100.0) {
            return Err(Error::Config(format!(
                "fit window {from}%..{to}% must satisfy 0 <= from < to <= 100"
            )));
        }
        if self.fit.max_evaluations == 0 {
            return Err(Error::Config("max_evaluations must be at least 1".into()));
        }
        if self.fit.initial.t0 == 0.0 {
            return Err(Error::Config("initial t0 must be non-zero".into()));
        }
        Ok(())
    }
}
