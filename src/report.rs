//! Text serializations of an analysis for downstream processes.
//!
//! The status line is the contract with the process that launched
//! `ppm-analyze`: it reads one line from stdout and expects either
//! `OK\t<fields>` or `ERROR`.

use chrono::{DateTime, Utc};

use crate::error::MeasurementFailure;
use crate::pipeline::AnalysisReport;

pub const STATUS_OK: &str = "OK";
pub const STATUS_ERROR: &str = "ERROR";

const SUMMARY_COLUMNS: [&str; 12] = [
    "UTC",
    "B",
    "fit resonance frequency",
    "fft resonance frequency",
    "t0",
    "fft amplitude",
    "A",
    "xc error",
    "w error",
    "t0 error",
    "A error",
    "y0 error",
];

// ---------------------------------------------------------------------------
// Number formatting
// ---------------------------------------------------------------------------

/// Scientific notation with two decimals and an at least two-digit signed
/// exponent, e.g. `5.60E-08`, `1.23E+102`, `INF`, `NAN`.
pub fn scientific(value: f64) -> String {
    if value.is_nan() {
        return "NAN".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "INF" } else { "-INF" }.to_owned();
    }

    let formatted = format!("{value:.2E}");
    match formatted.split_once('E') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}E{sign}{:02}", exponent.abs())
        }
        None => formatted,
    }
}

/// Fixed two-decimal columns then scientific standard errors, shared by the
/// status line and the summary row.
fn result_fields(report: &AnalysisReport) -> Vec<String> {
    let fit = &report.fit;
    let field = report.field.map_or(f64::NAN, |f| f.nanotesla);
    let fixed = [
        field,
        fit.parameters.f,
        report.spectrum.peak_frequency_hz,
        fit.parameters.t0,
        report.spectrum.peak_magnitude,
        fit.parameters.amplitude,
    ];
    let errors = &fit.standard_errors;
    let scientific_fields = [errors.x0, errors.f, errors.t0, errors.amplitude, errors.y0];

    fixed
        .iter()
        .map(|v| format!("{v:.2}"))
        .chain(scientific_fields.iter().map(|&v| scientific(v)))
        .collect()
}

// ---------------------------------------------------------------------------
// Status line
// ---------------------------------------------------------------------------

/// `OK\tB\tf_fit\tf_fft\tt0\tfft_amplitude\t|A|\tσx0\tσf\tσt0\tσA\tσy0\tN` for
/// an accepted capture; `ERROR` for a rejected one or a stage failure.
pub fn status_line(outcome: &Result<AnalysisReport, MeasurementFailure>) -> String {
    match outcome {
        Ok(report) if report.is_accepted() => {
            let mut fields = vec![STATUS_OK.to_owned()];
            fields.extend(result_fields(report));
            fields.push(report.sample_count.to_string());
            fields.join("\t")
        }
        _ => STATUS_ERROR.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Daily summary table
// ---------------------------------------------------------------------------

/// Daily summary file name for a capture, `YYYYMMDD.txt` (UTC day).
pub fn summary_file_name(started_at: &DateTime<Utc>) -> String {
    format!("{}.txt", started_at.format("%Y%m%d"))
}

pub fn summary_header() -> String {
    SUMMARY_COLUMNS.join("\t")
}

/// One tab-separated row for an accepted report; `None` when rejected.
pub fn summary_row(report: &AnalysisReport) -> Option<String> {
    if !report.is_accepted() {
        return None;
    }
    let mut fields = vec![report.started_at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()];
    fields.extend(result_fields(report));
    Some(fields.join("\t"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scientific_pads_exponent_like_printf() {
        assert_eq!(scientific(5.6e-8), "5.60E-08");
        assert_eq!(scientific(2.5e-4), "2.50E-04");
        assert_eq!(scientific(0.0063), "6.30E-03");
        assert_eq!(scientific(0.0), "0.00E+00");
        assert_eq!(scientific(1.0), "1.00E+00");
        assert_eq!(scientific(12345.0), "1.23E+04");
        assert_eq!(scientific(-0.3), "-3.00E-01");
        assert_eq!(scientific(1.5e-300), "1.50E-300");
    }

    #[test]
    fn scientific_names_non_finite_values() {
        assert_eq!(scientific(f64::NAN), "NAN");
        assert_eq!(scientific(f64::INFINITY), "INF");
        assert_eq!(scientific(f64::NEG_INFINITY), "-INF");
    }

    #[test]
    fn header_lists_every_column() {
        let header = summary_header();
        assert!(header.starts_with("UTC\tB\tfit resonance frequency\t"));
        assert_eq!(header.split('\t').count(), 12);
    }

    #[test]
    fn summary_file_is_named_by_utc_day() {
        let t = crate::data::model::utc_from_unix_secs(1_505_056_346.646).unwrap();
        assert_eq!(summary_file_name(&t), "20170910.txt");
    }
}
