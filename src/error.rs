use thiserror::Error;

// ---------------------------------------------------------------------------
// Stage errors
// ---------------------------------------------------------------------------

/// Everything that can make a single capture unusable.
///
/// Quality-gate rejections are deliberately absent: a rejected fit is a normal
/// outcome carried by [`crate::analysis::ValidationOutcome`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed transport text or samples that do not fit in 12 bits.
    #[error("format error: {0}")]
    Format(String),

    #[error("no spectrum bin inside search band [{low_hz}, {high_hz}] Hz (bin width {bin_width_hz} Hz)")]
    EmptyBand {
        low_hz: f64,
        high_hz: f64,
        bin_width_hz: f64,
    },

    #[error("cannot design bandpass [{low_hz}, {high_hz}] Hz below Nyquist {nyquist_hz} Hz: {reason}")]
    FilterDesign {
        low_hz: f64,
        high_hz: f64,
        nyquist_hz: f64,
        reason: String,
    },

    #[error("signal has {available} samples, need more than {required}")]
    SignalTooShort { required: usize, available: usize },

    #[error("optimal parameters not found: {reason} after {evaluations} evaluations")]
    FitDiverged { evaluations: usize, reason: String },

    #[error("covariance of the parameters could not be estimated: {reason}")]
    CovarianceUndetermined { reason: String },

    #[error("overflow encountered in exp (argument {argument:e}, t0 = {t0})")]
    NumericOverflow { argument: f64, t0: f64 },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Failure with measurement context
// ---------------------------------------------------------------------------

/// A stage error tagged with the capture it happened on, so it can be logged
/// without re-running the pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{measurement} skipped, {error}")]
pub struct MeasurementFailure {
    /// Measurement id (`YYYYMMDD_HHMMSS_mmm` of the first sample, UTC).
    pub measurement: String,
    #[source]
    pub error: Error,
}
