/// Analysis layer: one pure stage per module, composed by [`crate::pipeline`].
///
/// Architecture:
/// ```text
///   samples (mV)
///       │
///       ▼
///   ┌──────────┐  peak f   ┌──────────┐  filtered  ┌──────────┐
///   │ spectrum │──────────▶│  filter  │───────────▶│   fit    │
///   └──────────┘           └──────────┘            └──────────┘
///                                                       │ FitResult
///                                                       ▼
///                          ┌──────────┐  accepted  ┌──────────┐
///                          │  field   │◀───────────│   gate   │
///                          └──────────┘            └──────────┘
/// ```

pub mod field;
pub mod filter;
pub mod fit;
pub mod gate;
pub mod spectrum;

pub use field::{field_from_frequency, FieldEstimate, PROTON_CONVERSION_NT_PER_HZ};
pub use filter::{bandpass_zero_phase, BandpassFilter};
pub use fit::{fit_damped_sine, FitParameters, FitResult};
pub use gate::{validate, RejectReason, ValidationOutcome, Violation};
pub use spectrum::{locate_peak, SpectrumResult};
