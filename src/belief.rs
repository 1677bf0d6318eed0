// src/belief.rs
//
// Belief over the patient's sparing factor.
//
// Each session the belief is rebuilt from scratch:
//   1) mean = mean of all observed sparing factors (planning + sessions),
//   2) std  = MAP standard deviation under an inverse-gamma prior on the
//      variance, found by grid search over candidate variances,
//   3) a normal with that mean/std, truncated to [sf_low, sf_high], is
//      integrated over fixed-width bins; bins at or below the probability
//      threshold are dropped.
//
// The retained probabilities are NOT renormalised. The engine uses them as
// relative weights and its outputs depend on that.
//
// A FixedBelief in the config bypasses steps 1 and 2.

use crate::config::{Config, FixedBelief, GridConfig, PosteriorSearchConfig, PriorConfig};
use crate::error::{AdaptError, Result};
use crate::metrics::OnlineStats;

/// Mean and standard deviation of the (untruncated) sparing-factor normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeliefState {
    pub mean: f64,
    pub std: f64,
}

impl From<FixedBelief> for BeliefState {
    fn from(fixed: FixedBelief) -> Self {
        Self {
            mean: fixed.mean,
            std: fixed.std,
        }
    }
}

impl BeliefState {
    /// Belief for the current session: the configured override if present,
    /// otherwise the history mean and the MAP std under the prior.
    pub fn estimate(history: &[f64], cfg: &Config) -> Result<Self> {
        check_history(history)?;

        if let Some(fixed) = cfg.belief_override {
            return Ok(fixed.into());
        }

        let stats = OnlineStats::from_slice(history);
        let std = posterior_std(history, &cfg.prior, &cfg.posterior)?;
        Ok(Self {
            mean: stats.mean(),
            std,
        })
    }
}

/// Sparing factors must be observed, finite and positive.
pub fn check_history(history: &[f64]) -> Result<()> {
    if history.is_empty() {
        return Err(AdaptError::input("sparing-factor history is empty"));
    }
    if let Some((i, sf)) = history
        .iter()
        .enumerate()
        .find(|(_, sf)| !(sf.is_finite() && **sf > 0.0))
    {
        return Err(AdaptError::input(format!(
            "sparing factor #{i} must be finite and > 0, got {sf}"
        )));
    }
    Ok(())
}

/// Most likely standard deviation for `history` under an inverse-gamma
/// prior `(alpha, beta)` on the variance.
///
/// Maximises `v^(-alpha-1) * v^(-n/2) * exp(-beta/v) * exp(-n*s2/(2v))`
/// over `v = var_min + k*var_step < var_max`, with `s2` the population
/// variance of the history. The objective is evaluated as its logarithm,
/// which has the same argmax and does not underflow for small `v`.
pub fn posterior_std(
    history: &[f64],
    prior: &PriorConfig,
    search: &PosteriorSearchConfig,
) -> Result<f64> {
    check_history(history)?;

    let n = history.len() as f64;
    let s2 = OnlineStats::from_slice(history).variance_population();

    let shape = prior.alpha + 1.0 + n / 2.0;
    let scale = prior.beta + n * s2 / 2.0;

    let count = ((search.var_max - search.var_min) / search.var_step).ceil() as usize;
    let mut best_var = search.var_min;
    let mut best = f64::NEG_INFINITY;
    for k in 0..count {
        let v = search.var_min + k as f64 * search.var_step;
        let log_density = -shape * v.ln() - scale / v;
        if log_density > best {
            best = log_density;
            best_var = v;
        }
    }

    if !best.is_finite() {
        return Err(AdaptError::Numeric(format!(
            "posterior density is not finite on the variance grid (alpha={}, beta={})",
            prior.alpha, prior.beta
        )));
    }

    Ok(best_var.sqrt())
}

// ---------------------------------------------------------------------------
// Truncated normal
// ---------------------------------------------------------------------------

/// Complementary error function, Chebyshev fit with fractional error below
/// 1.2e-7 everywhere, so tail masses keep their relative precision.
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87
                                    + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let ans = t * poly.exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

/// Standard normal CDF.
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / std::f64::consts::SQRT_2)
}

/// Normal(mean, std) restricted to `[low, high]`.
#[derive(Debug, Clone, Copy)]
pub struct TruncatedNormal {
    mean: f64,
    std: f64,
    low: f64,
    high: f64,
    /// Untruncated mass on [low, high].
    norm: f64,
}

impl TruncatedNormal {
    pub fn new(mean: f64, std: f64, low: f64, high: f64) -> Result<Self> {
        if !(std.is_finite() && std > 0.0) || !mean.is_finite() {
            return Err(AdaptError::input(format!(
                "truncated normal needs finite mean and std > 0, got ({mean}, {std})"
            )));
        }
        if !(high > low) {
            return Err(AdaptError::input(format!(
                "truncated normal needs low < high, got [{low}, {high}]"
            )));
        }

        let mut tn = Self {
            mean,
            std,
            low,
            high,
            norm: 1.0,
        };
        let norm = tn.raw_mass(low, high);
        if !(norm > 0.0) {
            return Err(AdaptError::Numeric(format!(
                "normal({mean}, {std}) has no mass on [{low}, {high}]"
            )));
        }
        tn.norm = norm;
        Ok(tn)
    }

    /// Untruncated normal mass on [a, b]; works on the side of the mean
    /// where the CDF is small so upper-tail differences do not cancel.
    fn raw_mass(&self, a: f64, b: f64) -> f64 {
        let za = (a - self.mean) / self.std;
        let zb = (b - self.mean) / self.std;
        let m = if za > 0.0 {
            normal_cdf(-za) - normal_cdf(-zb)
        } else {
            normal_cdf(zb) - normal_cdf(za)
        };
        m.max(0.0)
    }

    /// Probability mass on [a, b].
    pub fn mass(&self, a: f64, b: f64) -> f64 {
        let a = a.max(self.low);
        let b = b.min(self.high);
        if b <= a {
            return 0.0;
        }
        self.raw_mass(a, b) / self.norm
    }

    pub fn cdf(&self, x: f64) -> f64 {
        if x <= self.low {
            0.0
        } else if x >= self.high {
            1.0
        } else {
            self.mass(self.low, x)
        }
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }
}

// ---------------------------------------------------------------------------
// Discrete distribution
// ---------------------------------------------------------------------------

/// Retained sparing-factor bins and their (unnormalised) probabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteDistribution {
    pub values: Vec<f64>,
    pub probs: Vec<f64>,
}

impl DiscreteDistribution {
    /// Integrate `tn` over bins of width `grid.sf_stepsize` centred at
    /// `sf_low + k * sf_stepsize`, `k = 1..=(sf_high - sf_low) / sf_stepsize`,
    /// keeping bins whose mass exceeds `grid.sf_prob_threshold`.
    pub fn from_truncated_normal(tn: &TruncatedNormal, grid: &GridConfig) -> Result<Self> {
        let step = grid.sf_stepsize;
        let half = step / 2.0;
        let bins = ((grid.sf_high - grid.sf_low) / step).round() as usize;

        let mut values = Vec::new();
        let mut probs = Vec::new();
        for k in 1..=bins {
            let centre = grid.sf_low + k as f64 * step;
            let p = tn.cdf(centre + half) - tn.cdf(centre - half);
            if p > grid.sf_prob_threshold {
                values.push(centre);
                probs.push(p);
            }
        }

        if values.is_empty() {
            return Err(AdaptError::input(format!(
                "no sparing-factor bin exceeds probability threshold {}",
                grid.sf_prob_threshold
            )));
        }

        Ok(Self { values, probs })
    }

    /// Belief for this session discretised on the configured grid.
    pub fn for_belief(belief: &BeliefState, grid: &GridConfig) -> Result<Self> {
        let tn = TruncatedNormal::new(belief.mean, belief.std, grid.sf_low, grid.sf_high)?;
        Self::from_truncated_normal(&tn, grid)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of retained probabilities; at most 1.
    pub fn total_mass(&self) -> f64 {
        self.probs.iter().sum()
    }

    /// Probability-weighted sum of `row` (one entry per retained bin).
    #[inline]
    pub fn expectation(&self, row: &[f64]) -> f64 {
        debug_assert_eq!(row.len(), self.probs.len());
        row.iter().zip(&self.probs).map(|(v, p)| v * p).sum()
    }
}
