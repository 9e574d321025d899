//! Damped-sinusoid fit by Levenberg–Marquardt least squares.
//!
//! Model: `y(t) = y0 + A · exp(-t/t0) · sin(2π (t - x0) f)` with `t` in
//! seconds from the first sample of the record.

use std::f64::consts::PI;
use std::ops::Range;

use nalgebra::{SymmetricEigen, Vector5};
use serde::Serialize;

use crate::config::FitConfig;
use crate::error::{Error, Result};

/// Number of model parameters.
pub const PARAMETER_COUNT: usize = 5;

/// Largest argument `exp` takes without overflowing an `f64`.
const MAX_EXP_ARGUMENT: f64 = 709.782712893384;

const INITIAL_DAMPING: f64 = 1.0;
const MIN_DAMPING: f64 = 1e-12;
/// Past this, no step however short lowers the cost: the solver sits on a
/// stationary point to machine precision.
const MAX_DAMPING: f64 = 1e16;
const DAMPING_STEP: f64 = 10.0;

// ---------------------------------------------------------------------------
// Parameter vector
// ---------------------------------------------------------------------------

/// The five model parameters. Also used for their standard errors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitParameters {
    /// Phase-shift time, s.
    pub x0: f64,
    /// Precession frequency, Hz.
    pub f: f64,
    /// Decay time constant, s.
    pub t0: f64,
    /// Amplitude, mV.
    pub amplitude: f64,
    /// Offset, mV.
    pub y0: f64,
}

impl FitParameters {
    fn to_vector(self) -> Vector5<f64> {
        Vector5::new(self.x0, self.f, self.t0, self.amplitude, self.y0)
    }

    fn from_vector(v: &Vector5<f64>) -> Self {
        Self {
            x0: v[0],
            f: v[1],
            t0: v[2],
            amplitude: v[3],
            y0: v[4],
        }
    }

    /// Model value at `t`; fails where `exp` or the model value overflows.
    pub fn evaluate(&self, t: f64) -> Result<f64> {
        let envelope = self.envelope(t)?;
        let value = self.y0 + envelope * (2.0 * PI * (t - self.x0) * self.f).sin();
        finite(value, -t / self.t0, self.t0)
    }

    /// `A · exp(-t/t0)`, which overflows before `exp` does for `|A| > 1`.
    pub fn envelope(&self, t: f64) -> Result<f64> {
        let argument = -t / self.t0;
        finite(
            self.amplitude * checked_exp(argument, self.t0)?,
            argument,
            self.t0,
        )
    }
}

fn checked_exp(argument: f64, t0: f64) -> Result<f64> {
    if argument.is_nan() || argument > MAX_EXP_ARGUMENT {
        return Err(Error::NumericOverflow { argument, t0 });
    }
    Ok(argument.exp())
}

/// `value` if finite, otherwise an overflow blamed on the `exp` argument
/// that produced it.
fn finite(value: f64, argument: f64, t0: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::NumericOverflow { argument, t0 })
    }
}

// ---------------------------------------------------------------------------
// FitResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    /// Best-fit parameters; `amplitude` is reported as its absolute value.
    pub parameters: FitParameters,
    /// One standard error per parameter (square roots of the covariance diagonal).
    pub standard_errors: FitParameters,
    /// The full filtered record the window was cut from.
    pub filtered: Vec<f64>,
    /// Sample indices of `filtered` used for fitting.
    pub window: Range<usize>,
    /// Model evaluations over the window spent by the solver.
    pub evaluations: usize,
    /// Sum of squared residuals at the optimum.
    pub residual_sum_of_squares: f64,
}

/// Sample range covering `from..to` percent of an `n`-sample record, with
/// both ends truncated toward zero.
pub fn window_range(n: usize, window_pct: (f64, f64)) -> Range<usize> {
    let index = |pct: f64| ((pct * n as f64 / 100.0) as usize).min(n);
    let start = index(window_pct.0);
    let end = index(window_pct.1);
    start..end.max(start)
}

// ---------------------------------------------------------------------------
// Least-squares problem over the window
// ---------------------------------------------------------------------------

struct WindowedSignal<'a> {
    values: &'a [f64],
    first_index: usize,
    sample_rate: f64,
}

/// Gauss-Newton quantities at one parameter point.
struct Linearization {
    jtj: nalgebra::Matrix5<f64>,
    jtr: Vector5<f64>,
    cost: f64,
}

impl WindowedSignal<'_> {
    fn times(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(i, &y)| ((self.first_index + i) as f64 / self.sample_rate, y))
    }

    fn cost(&self, p: &FitParameters) -> Result<f64> {
        let mut cost = 0.0;
        for (t, y) in self.times() {
            let r = y - p.evaluate(t)?;
            cost = finite(cost + r * r, -t / p.t0, p.t0)?;
        }
        Ok(cost)
    }

    /// Accumulate `JᵀJ`, `Jᵀr` and the cost without materializing `J`.
    fn linearize(&self, p: &FitParameters) -> Result<Linearization> {
        let mut jtj = nalgebra::Matrix5::zeros();
        let mut jtr = Vector5::zeros();
        let mut cost = 0.0;

        for (t, y) in self.times() {
            let argument = -t / p.t0;
            let decay = checked_exp(argument, p.t0)?;
            let phase = 2.0 * PI * (t - p.x0) * p.f;
            let (sin, cos) = phase.sin_cos();
            let swing = finite(p.amplitude * decay, argument, p.t0)?;

            let r = y - (p.y0 + swing * sin);
            let j = Vector5::new(
                -2.0 * PI * p.f * swing * cos,
                2.0 * PI * (t - p.x0) * swing * cos,
                swing * sin * t / (p.t0 * p.t0),
                decay * sin,
                1.0,
            );
            if !j.iter().all(|v| v.is_finite()) {
                return Err(Error::NumericOverflow { argument, t0: p.t0 });
            }

            jtj += j * j.transpose();
            jtr += j * r;
            cost = finite(cost + r * r, argument, p.t0)?;
        }
        if !(jtj.iter().all(|v| v.is_finite()) && jtr.iter().all(|v| v.is_finite())) {
            return Err(Error::NumericOverflow {
                argument: self.times().last().map_or(0.0, |(t, _)| -t / p.t0),
                t0: p.t0,
            });
        }

        Ok(Linearization { jtj, jtr, cost })
    }
}

// ---------------------------------------------------------------------------
// Fit engine
// ---------------------------------------------------------------------------

/// Fit the damped-sine model to `filtered` restricted to the configured window.
///
/// The start point is the configured initial guess with `f` replaced by the
/// spectral peak. Non-convergence and an undeterminable covariance are fatal
/// for the capture, as is a non-finite model value at any trial point.
///
/// Sample `i` sits at `t = i / sample_rate`. Results computed on a
/// `[0, duration]` linspace stretch time by `N / (N - 1)`, so their `f`
/// reads about 0.43 Hz lower at 2130 Hz and `N = 5000`.
pub fn fit_damped_sine(
    filtered: Vec<f64>,
    sample_rate: f64,
    peak_frequency_hz: f64,
    config: &FitConfig,
) -> Result<FitResult> {
    let window = window_range(filtered.len(), config.window_pct);
    if window.len() < PARAMETER_COUNT {
        return Err(Error::SignalTooShort {
            required: PARAMETER_COUNT - 1,
            available: window.len(),
        });
    }

    let problem = WindowedSignal {
        values: &filtered[window.clone()],
        first_index: window.start,
        sample_rate,
    };
    let initial = FitParameters {
        x0: config.initial.x0,
        f: peak_frequency_hz,
        t0: config.initial.t0,
        amplitude: config.initial.amplitude,
        y0: config.initial.y0,
    };

    let (best, linearization, evaluations) = levenberg_marquardt(&problem, initial, config)?;
    let standard_errors = standard_errors(&linearization, window.len())?;

    log::debug!(
        "fit converged after {evaluations} evaluations: f = {:.4} Hz, t0 = {:.4} s, A = {:.2}",
        best.f,
        best.t0,
        best.amplitude
    );

    let residual_sum_of_squares = linearization.cost;
    Ok(FitResult {
        parameters: FitParameters {
            amplitude: best.amplitude.abs(),
            ..best
        },
        standard_errors,
        filtered,
        window,
        evaluations,
        residual_sum_of_squares,
    })
}

/// Marquardt-damped Gauss-Newton iterations. Returns the optimum, the
/// linearization there, and the number of model evaluations.
fn levenberg_marquardt(
    problem: &WindowedSignal<'_>,
    initial: FitParameters,
    config: &FitConfig,
) -> Result<(FitParameters, Linearization, usize)> {
    let mut params = initial;
    let mut lin = problem.linearize(&params)?;
    let mut evaluations = 1;

    let mut damping = INITIAL_DAMPING;
    loop {
        if lin.cost == 0.0 {
            return Ok((params, lin, evaluations));
        }
        if evaluations >= config.max_evaluations {
            return Err(Error::FitDiverged {
                evaluations,
                reason: format!(
                    "number of calls to function has reached maxfev = {}",
                    config.max_evaluations
                ),
            });
        }

        let mut damped = lin.jtj;
        for i in 0..PARAMETER_COUNT {
            damped[(i, i)] += damping * lin.jtj[(i, i)].max(f64::MIN_POSITIVE);
        }
        let Some(cholesky) = damped.cholesky() else {
            damping *= DAMPING_STEP;
            if damping > MAX_DAMPING {
                return Err(Error::FitDiverged {
                    evaluations,
                    reason: "normal equations are not positive definite".into(),
                });
            }
            continue;
        };

        let step = cholesky.solve(&lin.jtr);
        let current = params.to_vector();
        let candidate = FitParameters::from_vector(&(current + step));
        let candidate_cost = problem.cost(&candidate)?;
        evaluations += 1;

        if candidate_cost < lin.cost {
            let previous_cost = lin.cost;
            params = candidate;
            lin = problem.linearize(&params)?;
            evaluations += 1;
            damping = (damping / DAMPING_STEP).max(MIN_DAMPING);

            let reduction = previous_cost - lin.cost;
            let step_small =
                step.norm() <= config.xtol * (params.to_vector().norm() + config.xtol);
            if reduction <= config.ftol * previous_cost || step_small {
                return Ok((params, lin, evaluations));
            }
        } else {
            damping *= DAMPING_STEP;
            if damping > MAX_DAMPING {
                log::debug!("no downhill step left after {evaluations} evaluations");
                return Ok((params, lin, evaluations));
            }
        }
    }
}

/// Standard errors from `s² (JᵀJ)⁻¹` with `s² = SSR / (m - n)`.
///
/// Singular values of `J` (square roots of the eigenvalues of `JᵀJ`) below
/// `ε · max(m, n) · s_max` make the covariance undeterminable.
fn standard_errors(lin: &Linearization, observations: usize) -> Result<FitParameters> {
    if observations <= PARAMETER_COUNT {
        return Err(Error::CovarianceUndetermined {
            reason: format!(
                "{observations} observations leave no degrees of freedom for {PARAMETER_COUNT} parameters"
            ),
        });
    }
    if !lin.jtj.iter().all(|v| v.is_finite()) {
        return Err(Error::CovarianceUndetermined {
            reason: "Jacobian is not finite".into(),
        });
    }

    let eigen = SymmetricEigen::new(lin.jtj);
    let singular: Vec<f64> = eigen.eigenvalues.iter().map(|&l| l.max(0.0).sqrt()).collect();
    let largest = singular.iter().copied().fold(0.0, f64::max);
    let threshold = f64::EPSILON * observations.max(PARAMETER_COUNT) as f64 * largest;
    if largest == 0.0 || singular.iter().any(|&s| s <= threshold) {
        return Err(Error::CovarianceUndetermined {
            reason: format!("Jacobian is rank deficient (singular values {singular:?})"),
        });
    }

    let residual_variance = lin.cost / (observations - PARAMETER_COUNT) as f64;
    let mut variances = Vector5::zeros();
    for (k, &lambda) in eigen.eigenvalues.iter().enumerate() {
        let column = eigen.eigenvectors.column(k);
        for i in 0..PARAMETER_COUNT {
            variances[i] += column[i] * column[i] / lambda;
        }
    }
    variances *= residual_variance;

    if variances.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(Error::CovarianceUndetermined {
            reason: format!("covariance diagonal is invalid: {:?}", variances.as_slice()),
        });
    }
    Ok(FitParameters::from_vector(&variances.map(f64::sqrt)))
}
