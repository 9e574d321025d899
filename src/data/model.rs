use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// TimeAnchor – which end of the capture has a known timestamp
// ---------------------------------------------------------------------------

/// Devices that stream after sampling only know when the transfer started,
/// i.e. when sampling stopped; uploads carry the start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeAnchor {
    Start(DateTime<Utc>),
    Stop(DateTime<Utc>),
}

// ---------------------------------------------------------------------------
// RawMeasurement – one captured precession window
// ---------------------------------------------------------------------------

/// Largest value a 12-bit ADC sample can take.
pub const MAX_SAMPLE: u16 = 0x0FFF;

/// An immutable captured window of 12-bit voltage samples (mV).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawMeasurement {
    samples: Vec<u16>,
    sample_rate: f64,
    started_at: DateTime<Utc>,
}

impl RawMeasurement {
    /// Build a measurement, resolving a stop anchor to the first-sample time
    /// as `stop - len / sample_rate`.
    ///
    /// Fails with [`Error::Format`] for a sample rate that is not positive and
    /// finite, or a sample above [`MAX_SAMPLE`].
    pub fn new(samples: Vec<u16>, sample_rate: f64, anchor: TimeAnchor) -> Result<Self> {
        if !(sample_rate > 0.0 && sample_rate.is_finite()) {
            return Err(Error::Format(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        if let Some((i, &s)) = samples.iter().enumerate().find(|&(_, &s)| s > MAX_SAMPLE) {
            return Err(Error::Format(format!(
                "sample {i} = {s} does not fit in 12 bits"
            )));
        }

        let started_at = match anchor {
            TimeAnchor::Start(t) => t,
            TimeAnchor::Stop(t) => t - duration_of(samples.len(), sample_rate),
        };
        Ok(Self {
            samples,
            sample_rate,
            started_at,
        })
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    /// Samples per second.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// UTC instant of the first sample.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Record duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate
    }

    /// Identifier used in logs and file names: `YYYYMMDD_HHMMSS_mmm`.
    pub fn id(&self) -> String {
        measurement_id(&self.started_at)
    }

    /// Samples as `f64`, the working type of the analysis stages.
    pub fn samples_f64(&self) -> Vec<f64> {
        self.samples.iter().map(|&s| s as f64).collect()
    }
}

pub fn measurement_id(t: &DateTime<Utc>) -> String {
    t.format("%Y%m%d_%H%M%S_%3f").to_string()
}

/// Convert a unix timestamp in (fractional) seconds to UTC.
pub fn utc_from_unix_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    // microsecond resolution: f64 unix seconds carry no more than that
    let whole = secs.floor();
    let micros = ((secs - whole) * 1e6).round().min(999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, micros * 1000)
}

fn duration_of(samples: usize, sample_rate: f64) -> Duration {
    Duration::nanoseconds((samples as f64 / sample_rate * 1e9).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stop_anchor_shifts_start_back_by_duration() {
        let stop = Utc.with_ymd_and_hms(2017, 9, 10, 15, 12, 27).unwrap();
        let m = RawMeasurement::new(vec![0; 5000], 5000.0, TimeAnchor::Stop(stop)).unwrap();
        assert_eq!(m.started_at(), stop - Duration::seconds(1));
        assert_eq!(m.duration_secs(), 1.0);
    }

    #[test]
    fn constructor_rejects_unusable_rates() {
        let start = TimeAnchor::Start(Utc.with_ymd_and_hms(2017, 9, 10, 15, 12, 26).unwrap());
        for rate in [0.0, -5000.0, f64::NAN, f64::INFINITY] {
            let err = RawMeasurement::new(vec![2048; 10], rate, start).unwrap_err();
            assert!(matches!(err, Error::Format(_)), "{rate}");
        }
    }

    #[test]
    fn constructor_rejects_samples_above_12_bits() {
        let start = TimeAnchor::Start(Utc.with_ymd_and_hms(2017, 9, 10, 15, 12, 26).unwrap());
        assert!(RawMeasurement::new(vec![0, MAX_SAMPLE], 5000.0, start).is_ok());
        let err = RawMeasurement::new(vec![0, MAX_SAMPLE + 1], 5000.0, start).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn id_has_millisecond_precision() {
        let t = utc_from_unix_secs(1_505_056_346.646).unwrap();
        assert_eq!(measurement_id(&t), "20170910_151226_646");
    }

    #[test]
    fn non_finite_timestamp_is_rejected() {
        assert!(utc_from_unix_secs(f64::NAN).is_none());
    }
}
