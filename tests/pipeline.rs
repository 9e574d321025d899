use chrono::{DateTime, Utc};

use ppm_analyzer::analysis::gate::RejectReason;
use ppm_analyzer::analysis::ValidationOutcome;
use ppm_analyzer::config::Thresholds;
use ppm_analyzer::data::model::utc_from_unix_secs;
use ppm_analyzer::data::synthetic::PrecessionSignal;
use ppm_analyzer::data::{codec, loader};
use ppm_analyzer::{report, AnalysisConfig, Error, Pipeline, TimeAnchor};

fn started() -> DateTime<Utc> {
    utc_from_unix_secs(1_505_056_346.646).unwrap()
}

fn temp_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("ppm-it-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn synthetic_capture_through_transport_is_accepted() {
    let sent = PrecessionSignal::default().measurement(42, started()).unwrap();
    let text = codec::encode(sent.samples()).unwrap();
    let decoded = codec::decode(&text, 5000.0, TimeAnchor::Start(started())).unwrap();
    assert_eq!(decoded, sent);

    let report = Pipeline::default().analyze(&decoded).unwrap();
    assert!(report.is_accepted(), "{:?}", report.validation);
    assert!((report.spectrum.peak_frequency_hz - 2130.0).abs() <= report.spectrum.bin_width_hz);
    assert!((report.fit.parameters.f - 2130.0).abs() <= 0.5);
    assert!((report.fit.parameters.t0 - 2.0).abs() <= 0.2);
    assert!((report.fit.parameters.amplitude - 400.0).abs() <= 40.0);
    assert!((report.field.unwrap().nanotesla - 23.496241 * report.fit.parameters.f).abs() <= 1e-9);
}

#[test]
fn stop_anchored_capture_keeps_fit_and_shifts_id() {
    let sent = PrecessionSignal::default().measurement(42, started()).unwrap();
    let text = codec::encode(sent.samples()).unwrap();
    let stop = started() + chrono::Duration::seconds(1);
    let decoded = codec::decode(&text, 5000.0, TimeAnchor::Stop(stop)).unwrap();

    let report = Pipeline::default().analyze(&decoded).unwrap();
    assert_eq!(report.measurement, "20170910_151226_646");
}

#[test]
fn status_line_matches_downstream_contract() {
    let measurement = PrecessionSignal::default().measurement(42, started()).unwrap();
    let outcome = Pipeline::default().analyze(&measurement);
    let line = report::status_line(&outcome);

    let fields: Vec<&str> = line.split('\t').collect();
    assert_eq!(fields.len(), 13, "{line}");
    assert_eq!(fields[0], "OK");
    for fixed in &fields[1..7] {
        let (_, decimals) = fixed.split_once('.').unwrap();
        assert_eq!(decimals.len(), 2, "{fixed}");
    }
    for sci in &fields[7..12] {
        let (mantissa, exponent) = sci.split_once('E').unwrap();
        assert_eq!(mantissa.split_once('.').unwrap().1.len(), 2, "{sci}");
        assert!(exponent.starts_with('+') || exponent.starts_with('-'), "{sci}");
        assert!(exponent.len() >= 3, "{sci}");
    }
    assert_eq!(fields[12], "5000");

    let b: f64 = fields[1].parse().unwrap();
    assert!((b - 23.496241 * 2130.0).abs() <= 15.0);
}

#[test]
fn rejected_capture_prints_error() {
    let config = AnalysisConfig {
        thresholds: Thresholds {
            max_t0: 1.0,
            ..Default::default()
        },
        ..Default::default()
    };
    let measurement = PrecessionSignal::default().measurement(42, started()).unwrap();
    let outcome = Pipeline::new(config).unwrap().analyze(&measurement);

    match &outcome {
        Ok(report) => {
            assert!(matches!(
                report.validation,
                ValidationOutcome::Rejected {
                    reason: RejectReason::T0OutOfRange,
                    ..
                }
            ));
            assert!(report::summary_row(report).is_none());
        }
        Err(failure) => panic!("unexpected failure: {failure}"),
    }
    assert_eq!(report::status_line(&outcome), "ERROR");
}

#[test]
fn stage_failure_prints_error() {
    // every bin of this band is within 5 Hz of Nyquist, so no bandpass fits
    let config = AnalysisConfig {
        search_band: ppm_analyzer::config::FrequencyBand::new(2495.0, 2500.0),
        ..Default::default()
    };
    let measurement = PrecessionSignal::default().measurement(42, started()).unwrap();
    let outcome = Pipeline::new(config).unwrap().analyze(&measurement);

    let failure = outcome.as_ref().unwrap_err();
    assert_eq!(failure.measurement, "20170910_151226_646");
    assert!(matches!(failure.error, Error::FilterDesign { .. }));
    assert_eq!(report::status_line(&outcome), "ERROR");
}

#[test]
fn time_table_round_trip_feeds_the_pipeline() {
    let dir = temp_dir("table");
    let measurement = PrecessionSignal::default().measurement(7, started()).unwrap();
    let path = dir.join(loader::time_table_file_name(&measurement));
    assert!(path.ends_with("20170910_151226_646_time.txt"));

    loader::write_time_table(&path, &measurement).unwrap();
    let loaded = loader::load_file(&path).unwrap();
    assert_eq!(loaded.samples(), measurement.samples());
    assert_eq!(loaded.id(), measurement.id());
    assert!((loaded.sample_rate() - 5000.0).abs() < 1e-6);

    let report = Pipeline::default().analyze(&loaded).unwrap();
    assert!(report.is_accepted());
    let row = report::summary_row(&report).unwrap();
    assert!(row.starts_with("2017-09-10 15:12:26.646\t"));
    assert_eq!(row.split('\t').count(), report::summary_header().split('\t').count());
}

#[test]
fn upload_record_file_is_decoded() {
    let dir = temp_dir("upload");
    let measurement = PrecessionSignal::default().measurement(9, started()).unwrap();
    let body = serde_json::json!({
        "sampleRate": 5000.0,
        "takenAt": 1_505_056_346.646,
        "base64samples": codec::encode(measurement.samples()).unwrap(),
    });
    let path = dir.join("upload.json");
    std::fs::write(&path, body.to_string()).unwrap();

    let loaded = loader::load_file(&path).unwrap();
    assert_eq!(loaded, measurement);
}

#[test]
fn corrupt_transport_is_a_format_error() {
    let err = codec::decode("AAAA\u{0}", 5000.0, TimeAnchor::Start(started())).unwrap_err();
    assert!(matches!(err, Error::Format(_)));
    // valid base64 for five bytes, which is not a whole number of blocks
    let err = codec::decode("AAAAAAA=", 5000.0, TimeAnchor::Start(started())).unwrap_err();
    assert!(matches!(err, Error::Format(_)));
}

#[test]
fn config_file_overrides_defaults() {
    let dir = temp_dir("config");
    let path = dir.join("analysis.json");
    std::fs::write(&path, r#"{ "filter": { "half_bandwidth_hz": 8.0 } }"#).unwrap();

    let config = AnalysisConfig::from_json_file(&path).unwrap();
    assert_eq!(config.filter.half_bandwidth_hz, 8.0);
    assert_eq!(config.filter.order, 3);

    let measurement = PrecessionSignal::default().measurement(5, started()).unwrap();
    let report = Pipeline::new(config).unwrap().analyze(&measurement).unwrap();
    assert!((report.fit.parameters.f - 2130.0).abs() <= 0.5);
}
