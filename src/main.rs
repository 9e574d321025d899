use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use ppm_analyzer::data::model::{measurement_id, utc_from_unix_secs};
use ppm_analyzer::data::{codec, loader};
use ppm_analyzer::{report, AnalysisConfig, MeasurementFailure, Pipeline, RawMeasurement, TimeAnchor};

/// Analyze one proton-precession capture.
///
/// Reads base64 transport text from stdin and prints `OK\t<fields>` or
/// `ERROR` on stdout. Diagnostics go to stderr (`RUST_LOG=debug` for more).
#[derive(Parser, Debug)]
#[command(name = "ppm-analyze", version, about)]
struct Args {
    /// Sample rate of the capture in Hz.
    #[arg(required_unless_present = "input")]
    sample_rate: Option<f64>,

    /// Unix time in seconds of the first sample.
    #[arg(required_unless_present = "input")]
    start_time: Option<f64>,

    /// The time argument marks the last sample instead of the first.
    #[arg(long)]
    stop: bool,

    /// Read a `_time.txt` table or JSON upload record instead of stdin.
    #[arg(long, short, conflicts_with_all = ["sample_rate", "start_time"])]
    input: Option<PathBuf>,

    /// JSON file overriding analysis defaults.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Print the full analysis report as JSON instead of the status line.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<ExitCode> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AnalysisConfig::from_json_file(path)?,
        None => AnalysisConfig::default(),
    };
    let pipeline = Pipeline::new(config)?;

    let measurement = match read_measurement(&args)? {
        Ok(measurement) => measurement,
        Err(failure) => {
            // undecodable payloads are a failed capture, not a failed run
            log::warn!("{failure}");
            println!("{}", report::STATUS_ERROR);
            return Ok(ExitCode::SUCCESS);
        }
    };

    let outcome = pipeline.analyze(&measurement);
    if args.json {
        match &outcome {
            Ok(report) => println!("{}", serde_json::to_string_pretty(report)?),
            Err(failure) => println!(
                "{}",
                serde_json::json!({ "measurement": failure.measurement, "error": failure.error.to_string() })
            ),
        }
    } else {
        println!("{}", report::status_line(&outcome));
    }
    Ok(ExitCode::SUCCESS)
}

/// Outer error: the run itself failed. Inner error: the payload did not decode.
fn read_measurement(args: &Args) -> Result<std::result::Result<RawMeasurement, MeasurementFailure>> {
    if let Some(path) = &args.input {
        let measurement =
            loader::load_file(path).with_context(|| format!("loading {}", path.display()))?;
        return Ok(Ok(measurement));
    }

    let (Some(sample_rate), Some(time)) = (args.sample_rate, args.start_time) else {
        anyhow::bail!("sample rate and start time are required without --input");
    };
    let instant = utc_from_unix_secs(time).with_context(|| format!("invalid time {time}"))?;
    let anchor = if args.stop {
        TimeAnchor::Stop(instant)
    } else {
        TimeAnchor::Start(instant)
    };

    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("reading base64 samples from stdin")?;

    Ok(codec::decode(&text, sample_rate, anchor).map_err(|error| MeasurementFailure {
        measurement: measurement_id(&instant),
        error,
    }))
}
