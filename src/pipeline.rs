use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::field::{field_from_frequency, FieldEstimate};
use crate::analysis::filter::bandpass_zero_phase;
use crate::analysis::fit::{fit_damped_sine, FitResult};
use crate::analysis::gate::{self, ValidationOutcome};
use crate::analysis::spectrum::{locate_peak_centered, remove_mean, SpectrumResult};
use crate::config::AnalysisConfig;
use crate::data::model::RawMeasurement;
use crate::error::{Error, MeasurementFailure};

// ---------------------------------------------------------------------------
// AnalysisReport
// ---------------------------------------------------------------------------

/// Everything one pipeline run produced for a capture.
///
/// A rejected capture still yields a report; `field` is only present when the
/// quality gate accepted the fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub measurement: String,
    pub started_at: DateTime<Utc>,
    pub sample_rate: f64,
    pub sample_count: usize,
    pub spectrum: SpectrumResult,
    pub fit: FitResult,
    pub validation: ValidationOutcome,
    pub field: Option<FieldEstimate>,
}

impl AnalysisReport {
    pub fn is_accepted(&self) -> bool {
        self.validation.is_accepted()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Codec output to field estimate: spectrum, bandpass, fit, gate, field.
///
/// Holds nothing but its configuration, so one instance can serve any number
/// of threads.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: AnalysisConfig,
}

impl Pipeline {
    /// Fails with [`Error::Config`] when `config` does not validate.
    pub fn new(config: AnalysisConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run every stage on one capture. Stage errors abort the run and come
    /// back tagged with the measurement id.
    pub fn analyze(&self, measurement: &RawMeasurement) -> Result<AnalysisReport, MeasurementFailure> {
        let id = measurement.id();
        self.run(measurement, &id).map_err(|error| {
            let failure = MeasurementFailure {
                measurement: id,
                error,
            };
            log::warn!("{failure}");
            failure
        })
    }

    fn run(&self, measurement: &RawMeasurement, id: &str) -> Result<AnalysisReport, Error> {
        let sample_rate = measurement.sample_rate();
        log::debug!(
            "{id}: analyzing {} samples at {sample_rate} Hz",
            measurement.len()
        );

        let signal = remove_mean(&measurement.samples_f64());
        let spectrum = locate_peak_centered(&signal, sample_rate, &self.config.search_band)?;

        let filtered = bandpass_zero_phase(
            &signal,
            sample_rate,
            spectrum.peak_frequency_hz,
            &self.config.filter,
        )?;

        let fit = fit_damped_sine(
            filtered,
            sample_rate,
            spectrum.peak_frequency_hz,
            &self.config.fit,
        )?;

        let validation = gate::validate(&fit, &self.config.thresholds, id);
        let field = validation
            .is_accepted()
            .then(|| field_from_frequency(fit.parameters.f));
        if let Some(field) = &field {
            log::info!(
                "{id}: B = {:.2} nT (f = {:.4} Hz, t0 = {:.3} s)",
                field.nanotesla,
                fit.parameters.f,
                fit.parameters.t0
            );
        }

        Ok(AnalysisReport {
            measurement: id.to_owned(),
            started_at: measurement.started_at(),
            sample_rate,
            sample_count: measurement.len(),
            spectrum,
            fit,
            validation,
            field,
        })
    }
}
