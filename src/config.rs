// src/config.rs
//
// Central configuration for the adaptfx engine.
// One explicit, typed record passed into every session / course call:
// treatment prescription, conjugate prior, optional fixed belief,
// dose bounds, discretisation granularity and penalty weights.
//
// Validation happens once, at entry, via Config::validate.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AdaptError, Result};

/// Which value-iteration variant solves each session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Track tumor and OAR BED; never exceed the OAR bound, penalise
    /// underdosing the tumor.
    #[default]
    OarBound,
    /// Track tumor BED only; hit the tumor goal while minimising the OAR BED
    /// delivered.
    MinOar,
}

/// Full engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub strategy: Strategy,
    /// Prescription and tissue parameters.
    pub treatment: TreatmentConfig,
    /// Inverse-gamma prior on the sparing-factor variance.
    pub prior: PriorConfig,
    /// When set, skip the history-based estimate and use this belief.
    #[serde(default)]
    pub belief_override: Option<FixedBelief>,
    #[serde(default)]
    pub dose: DoseConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub penalty: PenaltyConfig,
    #[serde(default)]
    pub posterior: PosteriorSearchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreatmentConfig {
    /// Number of sessions (fractions) in the course.
    pub sessions_total: usize,
    /// Alpha/beta ratio of the tumor (abt).
    pub tumor_alpha_beta: f64,
    /// Alpha/beta ratio of the organ at risk (abn).
    pub oar_alpha_beta: f64,
    /// Prescribed tumor BED.
    pub tumor_goal: f64,
    /// Maximum allowed OAR BED. Unused by `Strategy::MinOar`.
    pub oar_bound: f64,
}

/// Shape / scale of the inverse-gamma prior, usually produced by
/// `prior::fit_prior` on a historical cohort.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriorConfig {
    pub alpha: f64,
    pub beta: f64,
}

/// Caller-supplied sparing-factor distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixedBelief {
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DoseConfig {
    /// Smallest physical dose per session.
    pub min_dose: f64,
    /// Largest physical dose per session. `None` derives it each session
    /// from the remaining tumor BED budget. In JSON, `null` or any negative
    /// value (conventionally `-1`) means the same.
    #[serde(deserialize_with = "auto_max_dose")]
    pub max_dose: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GridConfig {
    /// Step between candidate physical doses (Gy).
    pub dose_stepsize: f64,
    /// Step between accumulated BED states.
    pub state_stepsize: f64,
    /// Lower truncation bound of the sparing-factor belief.
    pub sf_low: f64,
    /// Upper truncation bound of the sparing-factor belief.
    pub sf_high: f64,
    /// Width of one sparing-factor bin.
    pub sf_stepsize: f64,
    /// Bins with probability at or below this are dropped.
    pub sf_prob_threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PenaltyConfig {
    /// Weight on overshooting the tumor goal (min-OAR strategy).
    pub inf_penalty: f64,
    /// Weight on missing the tumor goal in the last session (OAR-bound
    /// strategy).
    pub underdose_penalty: f64,
    /// Finite stand-in for -inf on states already past a limit. Must stay
    /// finite: infinities turn into NaN once interpolated.
    pub overlimit_penalty: f64,
}

/// Candidate variances for the MAP standard-deviation search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PosteriorSearchConfig {
    pub var_min: f64,
    pub var_max: f64,
    pub var_step: f64,
}

impl Default for DoseConfig {
    fn default() -> Self {
        Self {
            min_dose: 0.0,
            max_dose: None,
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            dose_stepsize: 0.1,
            state_stepsize: 1.0,
            sf_low: 0.0,
            sf_high: 1.3,
            sf_stepsize: 0.01,
            sf_prob_threshold: 1e-5,
        }
    }
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            inf_penalty: 1e4,
            underdose_penalty: 10.0,
            overlimit_penalty: 1e11,
        }
    }
}

impl Default for PosteriorSearchConfig {
    fn default() -> Self {
        Self {
            var_min: 1e-5,
            var_max: 0.25,
            var_step: 1e-5,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        // ------------------------------------------------------------------
        // Five-session liver SBRT centre:
        //
        //   abt = 10, abn = 3
        //   tumor goal = 72 BED, OAR bound = 90 BED
        //
        // The prior is a placeholder with a variance mode of ~0.0038
        // (std ~0.06); real runs pass cohort-calibrated values.
        // ------------------------------------------------------------------
        Config {
            strategy: Strategy::OarBound,
            treatment: TreatmentConfig {
                sessions_total: 5,
                tumor_alpha_beta: 10.0,
                oar_alpha_beta: 3.0,
                tumor_goal: 72.0,
                oar_bound: 90.0,
            },
            prior: PriorConfig {
                alpha: 2.7,
                beta: 0.014,
            },
            belief_override: None,
            dose: DoseConfig::default(),
            grid: GridConfig::default(),
            penalty: PenaltyConfig::default(),
            posterior: PosteriorSearchConfig::default(),
        }
    }
}

// --- Runtime config loader: strategy + env overrides ------------------------

impl Config {
    pub fn for_strategy(strategy: Strategy) -> Self {
        Config {
            strategy,
            ..Config::default()
        }
    }

    /// Build a Config for `strategy`, then apply environment overrides:
    ///
    ///   - ADAPTFX_SESSIONS        (usize)
    ///   - ADAPTFX_TUMOR_GOAL      (f64, BED)
    ///   - ADAPTFX_OAR_BOUND       (f64, BED)
    ///   - ADAPTFX_MIN_DOSE        (f64, Gy)
    ///   - ADAPTFX_MAX_DOSE        (f64, Gy; -1 means derive per session)
    ///   - ADAPTFX_DOSE_STEPSIZE   (f64, Gy)
    ///   - ADAPTFX_STATE_STEPSIZE  (f64, BED)
    ///
    /// Any variable that fails to parse is ignored with a warning.
    pub fn from_env_or_strategy(strategy: Strategy) -> Self {
        let mut cfg = Config::for_strategy(strategy);

        if let Some(v) = env_parse::<usize>("ADAPTFX_SESSIONS", cfg.treatment.sessions_total) {
            cfg.treatment.sessions_total = v;
        }
        if let Some(v) = env_parse::<f64>("ADAPTFX_TUMOR_GOAL", cfg.treatment.tumor_goal) {
            cfg.treatment.tumor_goal = v;
        }
        if let Some(v) = env_parse::<f64>("ADAPTFX_OAR_BOUND", cfg.treatment.oar_bound) {
            cfg.treatment.oar_bound = v;
        }
        if let Some(v) = env_parse::<f64>("ADAPTFX_MIN_DOSE", cfg.dose.min_dose) {
            cfg.dose.min_dose = v.max(0.0);
        }
        if let Some(v) = env_parse::<f64>("ADAPTFX_MAX_DOSE", -1.0) {
            cfg.dose.max_dose = if v < 0.0 { None } else { Some(v) };
        }
        if let Some(v) = env_parse::<f64>("ADAPTFX_DOSE_STEPSIZE", cfg.grid.dose_stepsize) {
            cfg.grid.dose_stepsize = v;
        }
        if let Some(v) = env_parse::<f64>("ADAPTFX_STATE_STEPSIZE", cfg.grid.state_stepsize) {
            cfg.grid.state_stepsize = v;
        }

        cfg
    }

    /// Pick the strategy from ADAPTFX_STRATEGY (default OarBound), then
    /// apply all other env overrides.
    ///
    /// Allowed values (case-insensitive):
    ///   oar_bound | oar-bound | oar | frac | "" (empty)
    ///   min_oar   | min-oar   | min
    pub fn from_env_or_default() -> Self {
        let strategy = match std::env::var("ADAPTFX_STRATEGY") {
            Ok(s) => parse_strategy(&s).unwrap_or_else(|| {
                tracing::warn!(value = %s, "unknown ADAPTFX_STRATEGY; using oar_bound");
                Strategy::OarBound
            }),
            Err(_) => Strategy::OarBound,
        };

        Self::from_env_or_strategy(strategy)
    }

    /// Parse a JSON document and validate it.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let cfg: Config = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AdaptError::io(format!("reading {}", path.display()), e))?;
        Self::from_json_str(&raw)
    }

    /// Reject configurations that would otherwise surface as NaN deep inside
    /// a solve.
    pub fn validate(&self) -> Result<()> {
        let t = &self.treatment;
        if t.sessions_total == 0 {
            return Err(AdaptError::config("sessions_total must be at least 1"));
        }
        positive("tumor_alpha_beta", t.tumor_alpha_beta)?;
        positive("oar_alpha_beta", t.oar_alpha_beta)?;
        positive("tumor_goal", t.tumor_goal)?;
        positive("oar_bound", t.oar_bound)?;

        match self.belief_override {
            Some(fixed) => {
                finite("belief_override.mean", fixed.mean)?;
                positive("belief_override.std", fixed.std)?;
            }
            None => {
                positive("prior.alpha", self.prior.alpha)?;
                positive("prior.beta", self.prior.beta)?;
            }
        }

        let d = &self.dose;
        non_negative("min_dose", d.min_dose)?;
        // A min above max is shrunk per session by ActionSpace::for_session.
        if let Some(max_dose) = d.max_dose {
            non_negative("max_dose", max_dose)?;
        }

        let g = &self.grid;
        positive("dose_stepsize", g.dose_stepsize)?;
        positive("state_stepsize", g.state_stepsize)?;
        positive("sf_stepsize", g.sf_stepsize)?;
        non_negative("sf_low", g.sf_low)?;
        finite("sf_high", g.sf_high)?;
        if g.sf_high <= g.sf_low {
            return Err(AdaptError::config(format!(
                "sf_high ({}) must exceed sf_low ({})",
                g.sf_high, g.sf_low
            )));
        }
        if !(0.0..1.0).contains(&g.sf_prob_threshold) {
            return Err(AdaptError::config(format!(
                "sf_prob_threshold must lie in [0, 1), got {}",
                g.sf_prob_threshold
            )));
        }

        let p = &self.penalty;
        non_negative("inf_penalty", p.inf_penalty)?;
        non_negative("underdose_penalty", p.underdose_penalty)?;
        non_negative("overlimit_penalty", p.overlimit_penalty)?;

        let s = &self.posterior;
        positive("posterior.var_min", s.var_min)?;
        positive("posterior.var_step", s.var_step)?;
        if s.var_max <= s.var_min {
            return Err(AdaptError::config("posterior.var_max must exceed var_min"));
        }

        Ok(())
    }
}

pub fn parse_strategy(raw: &str) -> Option<Strategy> {
    match raw.trim().to_lowercase().as_str() {
        "oar_bound" | "oar-bound" | "oar" | "frac" | "" => Some(Strategy::OarBound),
        "min_oar" | "min-oar" | "min" => Some(Strategy::MinOar),
        _ => None,
    }
}

fn env_parse<T>(name: &str, current: T) -> Option<T>
where
    T: std::str::FromStr + std::fmt::Display,
{
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => {
            tracing::info!(var = name, value = %v, "config override");
            Some(v)
        }
        Err(_) => {
            tracing::warn!(
                var = name,
                raw = %raw,
                default = %current,
                "could not parse env override; using default"
            );
            None
        }
    }
}

/// Negative `max_dose` is the "derive per session" sentinel.
fn auto_max_dose<'de, D>(de: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v = Option::<f64>::deserialize(de)?;
    Ok(v.filter(|m| *m >= 0.0))
}

fn finite(name: &str, v: f64) -> Result<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(AdaptError::config(format!("{name} must be finite, got {v}")))
    }
}

fn positive(name: &str, v: f64) -> Result<()> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(AdaptError::config(format!("{name} must be > 0, got {v}")))
    }
}

fn non_negative(name: &str, v: f64) -> Result<()> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(AdaptError::config(format!("{name} must be >= 0, got {v}")))
    }
}
