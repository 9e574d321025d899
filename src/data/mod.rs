/// Data layer: captured measurements, transport codec, and demo loading.
///
/// Architecture:
/// ```text
///  base64 text          _time.txt / .json          synthetic
///       │                      │                        │
///       ▼                      ▼                        ▼
///   ┌────────┐           ┌──────────┐           ┌────────────┐
///   │ codec  │◀──────────│  loader  │           │ synthetic  │
///   └────────┘           └──────────┘           └────────────┘
///       │                      │                        │
///       ▼                      ▼                        ▼
///   ┌────────────────────────────────────────────────────────┐
///   │ RawMeasurement   12-bit samples, sample rate, start    │
///   └────────────────────────────────────────────────────────┘
/// ```

pub mod codec;
pub mod loader;
pub mod model;
pub mod synthetic;
