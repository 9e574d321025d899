//! Write a synthetic precession capture for demos and manual testing.
//!
//! Produces `<id>_time.txt` (tab separated time/ADC table) and `<id>.b64`
//! (transport text that can be piped into `ppm-analyze`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;

use ppm_analyzer::data::model::utc_from_unix_secs;
use ppm_analyzer::data::synthetic::PrecessionSignal;
use ppm_analyzer::data::{codec, loader};

#[derive(Parser, Debug)]
#[command(name = "generate_sample", version, about)]
struct Args {
    /// Output directory.
    #[arg(long, short, default_value = ".")]
    output: PathBuf,

    /// Precession frequency in Hz.
    #[arg(long, default_value_t = 2130.0)]
    frequency: f64,

    /// Decay time constant in seconds.
    #[arg(long, default_value_t = 2.0)]
    t0: f64,

    /// Amplitude in mV.
    #[arg(long, default_value_t = 400.0)]
    amplitude: f64,

    /// Gaussian noise standard deviation in mV.
    #[arg(long, default_value_t = 2.0)]
    noise: f64,

    #[arg(long, default_value_t = 5000.0)]
    sample_rate: f64,

    #[arg(long, default_value_t = 1.0)]
    duration: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Unix seconds of the first sample; defaults to now.
    #[arg(long)]
    start_time: Option<f64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let started_at = match args.start_time {
        Some(secs) => utc_from_unix_secs(secs).with_context(|| format!("invalid start time {secs}"))?,
        None => Utc::now(),
    };
    let signal = PrecessionSignal {
        frequency_hz: args.frequency,
        t0: args.t0,
        amplitude: args.amplitude,
        noise: args.noise,
        sample_rate: args.sample_rate,
        duration_secs: args.duration,
        ..Default::default()
    };
    let measurement = signal
        .measurement(args.seed, started_at)
        .context("building synthetic capture")?;

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;

    let table_path = args.output.join(loader::time_table_file_name(&measurement));
    loader::write_time_table(&table_path, &measurement)?;

    let b64_path = args.output.join(format!("{}.b64", measurement.id()));
    std::fs::write(&b64_path, codec::encode(measurement.samples())?)
        .with_context(|| format!("writing {}", b64_path.display()))?;

    println!(
        "Wrote {} samples at {} Hz to {} and {}",
        measurement.len(),
        measurement.sample_rate(),
        table_path.display(),
        b64_path.display()
    );
    println!(
        "analyze with: ppm-analyze {} {} < {}",
        measurement.sample_rate(),
        measurement.started_at().timestamp_millis() as f64 / 1000.0,
        b64_path.display()
    );
    Ok(())
}
