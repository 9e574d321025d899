use std::fmt;

use serde::Serialize;

use crate::analysis::fit::FitResult;
use crate::config::Thresholds;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Acceptance rules in the order they are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// `t0` outside `(0, max_t0]`.
    T0OutOfRange,
    T0Error,
    X0Error,
    FrequencyError,
}

impl RejectReason {
    /// Name of the offending quantity as it appears in log lines.
    pub fn quantity(&self) -> &'static str {
        match self {
            RejectReason::T0OutOfRange => "t0",
            RejectReason::T0Error => "t0_error",
            RejectReason::X0Error => "x0_error",
            RejectReason::FrequencyError => "f_error",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.quantity())
    }
}

/// One violated rule and the value that violated it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Violation {
    pub reason: RejectReason,
    pub value: f64,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.reason, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Accepted,
    /// `reason` and `value` describe the first failed rule; `violations`
    /// lists every failed rule, first one included.
    Rejected {
        reason: RejectReason,
        value: f64,
        violations: Vec<Violation>,
    },
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted)
    }
}

// ---------------------------------------------------------------------------
// Quality gate
// ---------------------------------------------------------------------------

/// Every rule `fit` violates, in evaluation order.
///
/// Comparisons are written so that NaN never passes.
pub fn violations(fit: &FitResult, thresholds: &Thresholds) -> Vec<Violation> {
    let t0 = fit.parameters.t0;
    let errors = &fit.standard_errors;
    let rules = [
        (RejectReason::T0OutOfRange, t0, t0 > 0.0 && t0 <= thresholds.max_t0),
        (RejectReason::T0Error, errors.t0, errors.t0 <= thresholds.max_t0_error),
        (RejectReason::X0Error, errors.x0, errors.x0 <= thresholds.max_x0_error),
        (RejectReason::FrequencyError, errors.f, errors.f <= thresholds.max_f_error),
    ];

    rules
        .into_iter()
        .filter(|(_, _, passed)| !passed)
        .map(|(reason, value, _)| Violation { reason, value })
        .collect()
}

/// Classify a fit. Each violated rule is logged against `measurement`.
pub fn validate(fit: &FitResult, thresholds: &Thresholds, measurement: &str) -> ValidationOutcome {
    let violations = violations(fit, thresholds);
    for violation in &violations {
        log::warn!("{measurement} skipped, {violation}");
    }

    match violations.first() {
        None => ValidationOutcome::Accepted,
        Some(&Violation { reason, value }) => ValidationOutcome::Rejected {
            reason,
            value,
            violations,
        },
    }
}
