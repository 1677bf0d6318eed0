// src/grid.rs
//
// State / action discretisation for one session solve.
//
// - StateGrid: accumulated-BED knots from the current value up to a bound,
//   closed by two sentinels: the bound itself and `bound + step`, the
//   overflow state that absorbs every projection past the bound.
// - ActionSpace: candidate physical doses `min, min+step, ..., max`, with
//   `max` clamped each session to the dose that exactly uses up the
//   remaining tumor BED at sparing factor 1.
// - interp1 / interp2: linear and bilinear interpolation on those knots.
//   Callers clamp projections to the overflow sentinel first; the
//   interpolators additionally clamp into the knot range so rounding can
//   never extrapolate.

use crate::bed::{dose_for_bed, tumor_bed};
use crate::config::Config;

/// Knots closer than this (relative to the step) to the bound are merged
/// into the bound sentinel.
const KNOT_EPS: f64 = 1e-6;

/// Ordered accumulated-BED states for one tissue.
#[derive(Debug, Clone, PartialEq)]
pub struct StateGrid {
    knots: Vec<f64>,
    bound: f64,
    step: f64,
}

impl StateGrid {
    /// `[start, start+step, ... < bound] ++ [bound, bound+step]`.
    ///
    /// A `start` at or past the bound leaves only the two sentinels.
    pub fn new(start: f64, bound: f64, step: f64) -> Self {
        let mut knots = Vec::new();
        if start < bound {
            let n = ((bound - start) / step).ceil() as usize;
            for k in 0..n {
                let x = start + k as f64 * step;
                if x < bound - KNOT_EPS * step {
                    knots.push(x);
                }
            }
        }
        knots.push(bound);
        knots.push(bound + step);

        Self { knots, bound, step }
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    pub fn len(&self) -> usize {
        self.knots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.knots.is_empty()
    }

    pub fn bound(&self) -> f64 {
        self.bound
    }

    /// The absorbing state just above the bound.
    pub fn overflow(&self) -> f64 {
        self.bound + self.step
    }

    /// Map a projected BED onto the grid's domain: anything past the bound
    /// becomes the overflow sentinel.
    #[inline]
    pub fn clamp_projection(&self, x: f64) -> f64 {
        if x > self.bound {
            self.overflow()
        } else {
            x
        }
    }
}

/// Candidate physical doses for the current session.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpace {
    doses: Vec<f64>,
    min_dose: f64,
    max_dose: f64,
}

impl ActionSpace {
    /// Build the action space for a session that starts at
    /// `accumulated_tumor_bed`.
    ///
    /// The maximum is the configured one (or, when unset, the remaining
    /// budget dose) but never above the dose that reaches the tumor goal at
    /// sparing factor 1. A minimum above that maximum is pulled down to one
    /// step below it (not below zero) so the range stays non-empty.
    pub fn for_session(cfg: &Config, accumulated_tumor_bed: f64) -> Self {
        let t = &cfg.treatment;
        let step = cfg.grid.dose_stepsize;

        let remaining = (t.tumor_goal - accumulated_tumor_bed).max(0.0);
        let budget_dose = dose_for_bed(remaining, t.tumor_alpha_beta, 1.0)
            .unwrap_or(0.0)
            .max(0.0);

        let max_dose = match cfg.dose.max_dose {
            Some(m) => m.min(budget_dose),
            None => budget_dose,
        };
        let mut min_dose = cfg.dose.min_dose;
        if min_dose > max_dose {
            min_dose = (max_dose - step).max(0.0);
        }

        Self::between(min_dose, max_dose, step)
    }

    /// `min, min+step, ...` strictly below `max`, then `max` itself.
    pub fn between(min_dose: f64, max_dose: f64, step: f64) -> Self {
        let n = ((max_dose - min_dose) / step - 1e-9).ceil().max(0.0) as usize;
        let mut doses: Vec<f64> = (0..n)
            .map(|k| min_dose + k as f64 * step)
            .filter(|&d| d < max_dose - 1e-9 * step)
            .collect();
        doses.push(max_dose);

        Self {
            doses,
            min_dose,
            max_dose,
        }
    }

    pub fn doses(&self) -> &[f64] {
        &self.doses
    }

    pub fn len(&self) -> usize {
        self.doses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doses.is_empty()
    }

    pub fn min_dose(&self) -> f64 {
        self.min_dose
    }

    pub fn max_dose(&self) -> f64 {
        self.max_dose
    }

    /// Clamp a closed-form dose into `[min_dose, max_dose]`.
    #[inline]
    pub fn clamp(&self, dose: f64) -> f64 {
        dose.max(self.min_dose).min(self.max_dose)
    }

    /// Tumor BED of every candidate dose.
    pub fn tumor_beds(&self, ab: f64) -> Vec<f64> {
        self.doses.iter().map(|&d| tumor_bed(d, ab)).collect()
    }
}

/// Position of a query point between two knots: `knots[i]` and
/// `knots[i+1]`, at fraction `w`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Loc {
    pub i: usize,
    pub w: f64,
}

/// Locate `x` in `knots`; out-of-range `x` is clamped to the end knots.
#[inline]
pub fn locate(knots: &[f64], x: f64) -> Loc {
    let n = knots.len();
    if n < 2 || x <= knots[0] {
        return Loc { i: 0, w: 0.0 };
    }
    if x >= knots[n - 1] {
        return Loc { i: n - 2, w: 1.0 };
    }
    let i = knots.partition_point(|&k| k <= x).saturating_sub(1).min(n - 2);
    let w = (x - knots[i]) / (knots[i + 1] - knots[i]);
    Loc { i, w }
}

/// Piecewise-linear interpolation of `values` over `knots`.
pub fn interp1(knots: &[f64], values: &[f64], x: f64) -> f64 {
    debug_assert_eq!(knots.len(), values.len());
    if values.len() == 1 {
        return values[0];
    }
    let Loc { i, w } = locate(knots, x);
    if w == 0.0 {
        return values[i];
    }
    if w == 1.0 {
        return values[i + 1];
    }
    (1.0 - w) * values[i] + w * values[i + 1]
}

/// Bilinear interpolation on the rectilinear grid `xs × ys`; `values` is
/// row-major with `ys.len()` columns.
pub fn interp2(xs: &[f64], ys: &[f64], values: &[f64], x: f64, y: f64) -> f64 {
    interp2_at(xs.len(), ys, values, locate(xs, x), y)
}

/// `interp2` with the row coordinate already located, for loops that reuse
/// one tumor projection across many OAR projections.
#[inline]
pub fn interp2_at(nx: usize, ys: &[f64], values: &[f64], lx: Loc, y: f64) -> f64 {
    debug_assert_eq!(values.len(), nx * ys.len());
    let ny = ys.len();
    let ly = locate(ys, y);
    let i1 = (lx.i + 1).min(nx - 1);
    let j1 = (ly.i + 1).min(ny - 1);

    // Zero-weight corners are skipped so exact knot hits stay exact even
    // next to a sentinel-penalised cell.
    let corners = [
        ((1.0 - lx.w) * (1.0 - ly.w), lx.i, ly.i),
        ((1.0 - lx.w) * ly.w, lx.i, j1),
        (lx.w * (1.0 - ly.w), i1, ly.i),
        (lx.w * ly.w, i1, j1),
    ];
    let mut acc = 0.0;
    for (w, a, b) in corners {
        if w != 0.0 {
            acc += w * values[a * ny + b];
        }
    }
    acc
}
