// src/prior.rs
//
// Calibration of the inverse-gamma prior on the sparing-factor variance
// from a cohort of previously treated patients.
//
// Each patient contributes one population variance. With the location
// fixed at 0, `v ~ InvGamma(alpha, beta)` is equivalent to
// `1/v ~ Gamma(shape = alpha, rate = beta)`, so the maximum-likelihood fit
// is the gamma shape/rate fit on the reciprocal variances:
//
//   ln(alpha) - digamma(alpha) = ln(mean(x)) - mean(ln x)
//   beta = alpha / mean(x)
//
// The shape equation is solved by Newton iteration from the usual
// closed-form starting point.

use serde::{Deserialize, Serialize};

use crate::config::PriorConfig;
use crate::error::{AdaptError, Result};
use crate::metrics::OnlineStats;

const NEWTON_MAX_ITERS: usize = 100;
const NEWTON_TOL: f64 = 1e-12;

/// Fitted inverse-gamma hyperparameters: shape `alpha`, scale `beta`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorHyperparams {
    pub alpha: f64,
    pub beta: f64,
}

impl From<PriorHyperparams> for PriorConfig {
    fn from(h: PriorHyperparams) -> Self {
        PriorConfig {
            alpha: h.alpha,
            beta: h.beta,
        }
    }
}

/// Fit the prior to `cohort`, one row of sparing factors per patient.
pub fn fit_prior(cohort: &[Vec<f64>]) -> Result<PriorHyperparams> {
    if cohort.is_empty() {
        return Err(AdaptError::input("cohort is empty"));
    }

    let mut variances = Vec::with_capacity(cohort.len());
    for (i, row) in cohort.iter().enumerate() {
        if row.len() < 2 {
            return Err(AdaptError::input(format!(
                "patient {i} has {} sparing factors; at least 2 are needed",
                row.len()
            )));
        }
        if row.iter().any(|x| !x.is_finite()) {
            return Err(AdaptError::input(format!(
                "patient {i} has a non-finite sparing factor"
            )));
        }
        let var = OnlineStats::from_slice(row).variance_population();
        if !(var > 0.0) {
            return Err(AdaptError::input(format!(
                "patient {i} has zero variance; the inverse-gamma fit needs spread"
            )));
        }
        variances.push(var);
    }

    fit_inverse_gamma(&variances)
}

/// Maximum-likelihood inverse-gamma fit (location 0) to positive samples.
pub fn fit_inverse_gamma(samples: &[f64]) -> Result<PriorHyperparams> {
    if samples.is_empty() {
        return Err(AdaptError::input("no samples to fit"));
    }

    let n = samples.len() as f64;
    let mut sum_x = 0.0;
    let mut sum_ln_x = 0.0;
    for &v in samples {
        if !(v > 0.0) || !v.is_finite() {
            return Err(AdaptError::input(format!("sample {v} is not positive")));
        }
        let x = 1.0 / v;
        sum_x += x;
        sum_ln_x += x.ln();
    }
    let mean_x = sum_x / n;
    let s = mean_x.ln() - sum_ln_x / n;

    // s = 0 exactly when every sample is identical: the likelihood grows
    // without bound in alpha.
    if !(s > 0.0) {
        return Err(AdaptError::Numeric(
            "all variances are identical; the shape has no finite maximum".into(),
        ));
    }

    let alpha = solve_shape(s)?;
    let beta = alpha / mean_x;
    tracing::debug!(alpha, beta, patients = samples.len(), "prior fitted");

    Ok(PriorHyperparams { alpha, beta })
}

/// Solve `ln(a) - digamma(a) = s` for `a > 0`.
fn solve_shape(s: f64) -> Result<f64> {
    let mut a = (3.0 - s + ((s - 3.0).powi(2) + 24.0 * s).sqrt()) / (12.0 * s);

    for _ in 0..NEWTON_MAX_ITERS {
        let f = a.ln() - digamma(a) - s;
        let df = 1.0 / a - trigamma(a);
        let mut next = a - f / df;
        // Keep the iterate positive.
        if !(next > 0.0) {
            next = a / 2.0;
        }
        if (next - a).abs() <= NEWTON_TOL * a {
            return Ok(next);
        }
        a = next;
    }

    if a.is_finite() && a > 0.0 {
        Ok(a)
    } else {
        Err(AdaptError::Numeric(format!(
            "shape iteration did not converge for s = {s}"
        )))
    }
}

// ----- special functions -----

/// Digamma for `x > 0`: shift above 12 by recurrence, then asymptotic series.
pub fn digamma(mut x: f64) -> f64 {
    let mut acc = 0.0;
    while x < 12.0 {
        acc -= 1.0 / x;
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    acc + x.ln()
        - 0.5 * inv
        - inv2
            * (1.0 / 12.0
                - inv2 * (1.0 / 120.0 - inv2 * (1.0 / 252.0 - inv2 * (1.0 / 240.0))))
}

/// Trigamma for `x > 0`.
pub fn trigamma(mut x: f64) -> f64 {
    let mut acc = 0.0;
    while x < 12.0 {
        acc += 1.0 / (x * x);
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    acc + inv
        + 0.5 * inv2
        + inv * inv2 * (1.0 / 6.0 - inv2 * (1.0 / 30.0 - inv2 * (1.0 / 42.0 - inv2 / 30.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

    #[test]
    fn digamma_reference_values() {
        assert!((digamma(1.0) + EULER_GAMMA).abs() < 1e-12);
        assert!((digamma(0.5) + EULER_GAMMA + 2.0 * 2f64.ln()).abs() < 1e-12);
        // digamma(x + 1) = digamma(x) + 1/x
        for &x in &[0.3, 2.5, 7.0, 40.0] {
            assert!((digamma(x + 1.0) - digamma(x) - 1.0 / x).abs() < 1e-12);
        }
    }

    #[test]
    fn trigamma_reference_values() {
        let pi2_6 = std::f64::consts::PI.powi(2) / 6.0;
        assert!((trigamma(1.0) - pi2_6).abs() < 1e-12);
        assert!((trigamma(0.5) - std::f64::consts::PI.powi(2) / 2.0).abs() < 1e-11);
    }

    #[test]
    fn fitted_shape_solves_score_equation() {
        let variances = [0.002, 0.004, 0.0035, 0.001, 0.006, 0.0025];
        let fit = fit_inverse_gamma(&variances).unwrap();

        let xs: Vec<f64> = variances.iter().map(|v| 1.0 / v).collect();
        let mean_x = xs.iter().sum::<f64>() / xs.len() as f64;
        let mean_ln = xs.iter().map(|x| x.ln()).sum::<f64>() / xs.len() as f64;
        let s = mean_x.ln() - mean_ln;

        assert!((fit.alpha.ln() - digamma(fit.alpha) - s).abs() < 1e-10);
        assert!((fit.beta - fit.alpha / mean_x).abs() < 1e-12 * fit.beta);
    }

    #[test]
    fn rejects_bad_cohorts() {
        assert!(fit_prior(&[]).unwrap_err().is_invalid_input());
        assert!(fit_prior(&[vec![1.0]]).unwrap_err().is_invalid_input());
        assert!(fit_prior(&[vec![0.9, 0.9, 0.9]]).unwrap_err().is_invalid_input());
        assert!(fit_prior(&[vec![0.9, f64::NAN]]).unwrap_err().is_invalid_input());
        // Same spread for every patient: no finite shape.
        let same = vec![vec![0.9, 1.1], vec![0.9, 1.1]];
        assert!(matches!(fit_prior(&same), Err(AdaptError::Numeric(_))));
    }
}
