use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use super::codec;
use super::model::{utc_from_unix_secs, RawMeasurement, TimeAnchor, MAX_SAMPLE};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a captured measurement from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.txt` / `.tsv` – two tab-separated columns: time in seconds, ADC value
/// * `.json`         – upload record `{ "sampleRate", "takenAt", "base64samples" }`
pub fn load_file(path: &Path) -> Result<RawMeasurement> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "txt" | "tsv" => load_time_table(path),
        "json" => load_upload_record(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// Time table loader
// ---------------------------------------------------------------------------

/// Layout (no header), as written next to each capture:
///
/// ```text
/// 0.0     2048
/// 0.0002  2391
/// 0.0004  2517
/// ```
///
/// The sample rate is recovered from the first two time stamps. The start
/// time comes from a `YYYYMMDD_HHMMSS_mmm` file-name prefix, or the present
/// UTC time when the name carries none.
fn load_time_table(path: &Path) -> Result<RawMeasurement> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .context("opening sample table")?;

    let mut times = Vec::with_capacity(2);
    let mut samples = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("sample table row {row_no}"))?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        let time = record.get(0).unwrap_or("");
        let value = record.get(1).unwrap_or("");
        if times.len() < 2 {
            let t = time
                .parse::<f64>()
                .with_context(|| format!("Row {row_no}: time '{time}' is not a number"))?;
            times.push(t);
        }
        let sample = value
            .parse::<u16>()
            .with_context(|| format!("Row {row_no}: ADC value '{value}' is not an integer"))?;
        if sample > MAX_SAMPLE {
            bail!("Row {row_no}: ADC value {sample} does not fit in 12 bits");
        }
        samples.push(sample);
    }

    if times.len() < 2 {
        bail!("sample table needs at least two rows to derive the sample rate");
    }
    let step = times[1] - times[0];
    if !(step > 0.0) {
        bail!("time stamps must increase, got {} then {}", times[0], times[1]);
    }
    let sample_rate = 1.0 / step;

    let started_at = start_time_from_file_name(path).unwrap_or_else(|| {
        log::debug!("no timestamp in {}, using present time", path.display());
        Utc::now()
    });

    RawMeasurement::new(samples, sample_rate, TimeAnchor::Start(started_at))
        .context("building measurement from sample table")
}

/// Conventional file name of a capture's sample table.
pub fn time_table_file_name(measurement: &RawMeasurement) -> String {
    format!("{}_time.txt", measurement.id())
}

/// Write `i / sample_rate` and the ADC value per row, the layout
/// [`load_file`] reads back.
pub fn write_time_table(path: &Path, measurement: &RawMeasurement) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let rate = measurement.sample_rate();
    for (i, sample) in measurement.samples().iter().enumerate() {
        let time = i as f64 / rate;
        writer.write_record([time.to_string(), sample.to_string()])?;
    }
    writer.flush().context("flushing sample table")?;
    Ok(())
}

/// Parse a `20170910_151226_646` prefix (milliseconds) from the file name.
pub fn start_time_from_file_name(path: &Path) -> Option<DateTime<Utc>> {
    let name = path.file_name()?.to_str()?;
    let prefix = name.get(..19)?;
    let naive = NaiveDateTime::parse_from_str(prefix.get(..15)?, "%Y%m%d_%H%M%S").ok()?;
    if prefix.as_bytes()[15] != b'_' {
        return None;
    }
    let millis: i64 = prefix.get(16..)?.parse().ok()?;
    Some(naive.and_utc() + chrono::Duration::milliseconds(millis))
}

// ---------------------------------------------------------------------------
// Upload record loader
// ---------------------------------------------------------------------------

/// JSON body posted by field stations.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadRecord {
    #[serde(alias = "samplerate")]
    sample_rate: f64,
    /// Unix seconds of the first sample.
    taken_at: f64,
    #[serde(rename = "base64samples", alias = "base64Samples")]
    base64_samples: String,
}

fn load_upload_record(path: &Path) -> Result<RawMeasurement> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    parse_upload_record(&text)
}

/// Parse an upload record body and decode its samples.
pub fn parse_upload_record(text: &str) -> Result<RawMeasurement> {
    let record: UploadRecord = serde_json::from_str(text).context("parsing upload record")?;
    let started_at = utc_from_unix_secs(record.taken_at)
        .with_context(|| format!("takenAt {} is not a valid timestamp", record.taken_at))?;
    let measurement = codec::decode(
        &record.base64_samples,
        record.sample_rate,
        TimeAnchor::Start(started_at),
    )
    .context("decoding base64samples")?;
    Ok(measurement)
}
