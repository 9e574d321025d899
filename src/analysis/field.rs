use serde::Serialize;

/// Field strength per Hz of precession frequency for this sensor, nT/Hz.
pub const PROTON_CONVERSION_NT_PER_HZ: f64 = 23.496241;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldEstimate {
    pub nanotesla: f64,
}

/// `B = k · f`. Only meaningful for an accepted fit frequency.
pub fn field_from_frequency(frequency_hz: f64) -> FieldEstimate {
    FieldEstimate {
        nanotesla: PROTON_CONVERSION_NT_PER_HZ * frequency_hz,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_nominal_resonance() {
        let b = field_from_frequency(2130.0);
        assert!((b.nanotesla - 50046.99333).abs() < 1e-6);
    }

    #[test]
    fn is_linear_in_frequency() {
        assert_eq!(field_from_frequency(0.0).nanotesla, 0.0);
        let doubled = field_from_frequency(4260.0).nanotesla;
        assert!((doubled - 2.0 * field_from_frequency(2130.0).nanotesla).abs() < 1e-9);
    }
}
