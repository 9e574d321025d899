//! Proton-precession magnetometer signal analysis.
//!
//! A captured window of 12-bit samples goes through spectral peak search,
//! a zero-phase Butterworth bandpass, a damped-sine least-squares fit and a
//! quality gate; accepted fits are converted to a field strength in nT.

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod report;

pub use config::AnalysisConfig;
pub use data::model::{RawMeasurement, TimeAnchor};
pub use error::{Error, MeasurementFailure, Result};
pub use pipeline::{AnalysisReport, Pipeline};
