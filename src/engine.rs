// src/engine.rs
//
// Per-session dose optimisation by backward induction.
//
// Engine::decide solves one session:
//   1) check the session index, accumulations and sparing-factor history,
//   2) rebuild the belief over the sparing factor and discretise it,
//   3) build the action space for the current accumulated tumor BED,
//   4) run the strategy's value iteration (oar_bound / min_oar) back from
//      the last session of the course to the current one,
//   5) report the chosen dose with the BED it delivers.
//
// Every grid and value table is owned by the call and dropped on return;
// nothing carries over between sessions except what the caller passes in.

mod min_oar;
mod oar_bound;
mod table;

pub use table::ValueTable;

use crate::bed::{bed, tumor_bed};
use crate::belief::{BeliefState, DiscreteDistribution};
use crate::config::{Config, Strategy};
use crate::error::{AdaptError, Result};
use crate::grid::ActionSpace;
use crate::types::Decision;

pub struct Engine {
    cfg: Config,
}

impl Engine {
    /// Validate `cfg` once and keep a copy for every subsequent solve.
    pub fn new(cfg: &Config) -> Result<Self> {
        cfg.validate()?;
        Ok(Self { cfg: cfg.clone() })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Dose for 1-based `session`, given the BED accumulated before it and
    /// the sparing factors observed so far (planning scan first, the
    /// current session's observation last, `session + 1` entries).
    pub fn decide(
        &self,
        session: usize,
        accumulated_tumor_bed: f64,
        accumulated_oar_bed: f64,
        history: &[f64],
    ) -> Result<Decision> {
        let problem = SessionProblem::new(
            &self.cfg,
            session,
            accumulated_tumor_bed,
            accumulated_oar_bed,
            history,
        )?;

        let choice = match self.cfg.strategy {
            Strategy::OarBound => oar_bound::solve(&problem),
            Strategy::MinOar => min_oar::solve(&problem),
        };

        problem.decision(choice)
    }
}

/// One-shot form of [`Engine::decide`].
pub fn decide_dose(
    session: usize,
    cfg: &Config,
    accumulated_tumor_bed: f64,
    accumulated_oar_bed: f64,
    history: &[f64],
) -> Result<Decision> {
    Engine::new(cfg)?.decide(session, accumulated_tumor_bed, accumulated_oar_bed, history)
}

/// Dose picked by a strategy solve.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Choice {
    dose: f64,
    over_limit: bool,
}

impl Choice {
    fn forced_zero() -> Self {
        Self {
            dose: 0.0,
            over_limit: true,
        }
    }
}

/// Everything a strategy needs to solve the current session.
struct SessionProblem<'a> {
    cfg: &'a Config,
    session: usize,
    acc_t: f64,
    acc_o: f64,
    /// Sparing factor observed for the current session.
    sf: f64,
    dist: DiscreteDistribution,
    actions: ActionSpace,
}

impl<'a> SessionProblem<'a> {
    fn new(
        cfg: &'a Config,
        session: usize,
        acc_t: f64,
        acc_o: f64,
        history: &[f64],
    ) -> Result<Self> {
        let total = cfg.treatment.sessions_total;
        if session == 0 || session > total {
            return Err(AdaptError::input(format!(
                "session index {session} outside 1..={total}"
            )));
        }
        if history.len() != session + 1 {
            return Err(AdaptError::HistoryLength {
                expected: session + 1,
                got: history.len(),
            });
        }
        for (name, v) in [("tumor", acc_t), ("oar", acc_o)] {
            if !v.is_finite() || v < 0.0 {
                return Err(AdaptError::input(format!(
                    "accumulated {name} BED must be finite and >= 0, got {v}"
                )));
            }
        }

        let belief = BeliefState::estimate(history, cfg)?;
        let dist = DiscreteDistribution::for_belief(&belief, &cfg.grid)?;
        let actions = ActionSpace::for_session(cfg, acc_t);
        let sf = history[session];

        tracing::debug!(
            session,
            sf,
            mean = belief.mean,
            std = belief.std,
            bins = dist.len(),
            actions = actions.len(),
            "session problem built"
        );

        Ok(Self {
            cfg,
            session,
            acc_t,
            acc_o,
            sf,
            dist,
            actions,
        })
    }

    fn is_final(&self) -> bool {
        self.session == self.cfg.treatment.sessions_total
    }

    /// Sessions after the current one; also the number of value layers.
    fn layers(&self) -> usize {
        self.cfg.treatment.sessions_total - self.session
    }

    fn decision(&self, choice: Choice) -> Result<Decision> {
        if !choice.dose.is_finite() {
            return Err(AdaptError::Numeric(format!(
                "session {} solve produced dose {}",
                self.session, choice.dose
            )));
        }

        let tr = &self.cfg.treatment;
        let tumor = tumor_bed(choice.dose, tr.tumor_alpha_beta);
        let oar = bed(choice.dose, tr.oar_alpha_beta, self.sf);

        tracing::debug!(
            session = self.session,
            dose = choice.dose,
            over_limit = choice.over_limit,
            "dose chosen"
        );

        Ok(Decision {
            session: self.session,
            dose: choice.dose,
            tumor_bed: tumor,
            oar_bed: oar,
            accumulated_tumor_bed: self.acc_t + tumor,
            accumulated_oar_bed: self.acc_o + oar,
            over_limit: choice.over_limit,
        })
    }
}

/// Index of the first maximum; NaN never wins. Empty input gives 0.
fn first_argmax(values: impl IntoIterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_v = f64::NEG_INFINITY;
    for (i, v) in values.into_iter().enumerate() {
        if v > best_v {
            best = i;
            best_v = v;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bed::dose_for_bed;
    use crate::config::FixedBelief;

    fn fixed_cfg(strategy: Strategy) -> Config {
        let mut cfg = Config::for_strategy(strategy);
        cfg.belief_override = Some(FixedBelief {
            mean: 1.0,
            std: 0.05,
        });
        cfg
    }

    fn history(session: usize, sf: f64) -> Vec<f64> {
        vec![sf; session + 1]
    }

    #[test]
    fn first_argmax_prefers_lowest_index_on_ties() {
        assert_eq!(first_argmax([1.0, 3.0, 3.0, 2.0]), 1);
        assert_eq!(first_argmax([f64::NAN, -1.0]), 1);
        assert_eq!(first_argmax([-5.0, -5.0]), 0);
    }

    #[test]
    fn rejects_bad_session_index_and_history() {
        let cfg = fixed_cfg(Strategy::OarBound);
        let err = decide_dose(0, &cfg, 0.0, 0.0, &[1.0]).unwrap_err();
        assert!(err.is_invalid_input());
        let err = decide_dose(6, &cfg, 0.0, 0.0, &history(6, 1.0)).unwrap_err();
        assert!(err.is_invalid_input());
        let err = decide_dose(2, &cfg, 0.0, 0.0, &[1.0, 1.0]).unwrap_err();
        assert!(matches!(
            err,
            AdaptError::HistoryLength {
                expected: 3,
                got: 2
            }
        ));
        let err = decide_dose(5, &cfg, -1.0, 0.0, &history(5, 1.0)).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn final_session_hits_tumor_goal_when_oar_is_loose() {
        let cfg = fixed_cfg(Strategy::OarBound);
        let d = decide_dose(5, &cfg, 60.0, 20.0, &history(5, 0.8)).unwrap();
        assert!(!d.over_limit);
        assert!((d.accumulated_tumor_bed - 72.0).abs() < 1e-9);
        assert!(d.accumulated_oar_bed < 90.0);
    }

    #[test]
    fn final_session_stops_at_oar_bound() {
        let cfg = fixed_cfg(Strategy::OarBound);
        let d = decide_dose(5, &cfg, 40.0, 80.0, &history(5, 1.0)).unwrap();
        let expected = dose_for_bed(10.0, 3.0, 1.0).unwrap();
        assert!((d.dose - expected).abs() < 1e-9);
        assert!((d.accumulated_oar_bed - 90.0).abs() < 1e-9);
        assert!(d.accumulated_tumor_bed < 72.0);
    }

    #[test]
    fn final_session_clamps_to_max_and_min() {
        let mut cfg = fixed_cfg(Strategy::OarBound);
        cfg.dose.max_dose = Some(3.0);
        let d = decide_dose(5, &cfg, 40.0, 20.0, &history(5, 1.0)).unwrap();
        assert_eq!(d.dose, 3.0);

        // OAR allows ~0.3 Gy but the minimum is 2 Gy.
        let mut cfg = fixed_cfg(Strategy::OarBound);
        cfg.dose.min_dose = 2.0;
        let d = decide_dose(5, &cfg, 40.0, 89.7, &history(5, 1.0)).unwrap();
        assert_eq!(d.dose, 2.0);
    }

    #[test]
    fn final_session_over_limit_delivers_nothing() {
        let cfg = fixed_cfg(Strategy::OarBound);
        let d = decide_dose(5, &cfg, 40.0, 95.0, &history(5, 1.0)).unwrap();
        assert_eq!(d.dose, 0.0);
        assert!(d.over_limit);
        assert_eq!(d.accumulated_oar_bed, 95.0);

        let cfg = fixed_cfg(Strategy::MinOar);
        let d = decide_dose(5, &cfg, 75.0, 0.0, &history(5, 1.0)).unwrap();
        assert_eq!(d.dose, 0.0);
        assert!(d.over_limit);
    }

    #[test]
    fn min_oar_final_session_reaches_goal_regardless_of_oar() {
        let cfg = fixed_cfg(Strategy::MinOar);
        let d = decide_dose(5, &cfg, 50.0, 200.0, &history(5, 1.2)).unwrap();
        assert!((d.accumulated_tumor_bed - 72.0).abs() < 1e-9);
        assert!(!d.over_limit);
    }

    #[test]
    fn earlier_session_dose_stays_inside_action_space() {
        for strategy in [Strategy::OarBound, Strategy::MinOar] {
            let mut cfg = fixed_cfg(strategy);
            cfg.treatment.sessions_total = 3;
            cfg.grid.dose_stepsize = 0.5;
            let d = decide_dose(2, &cfg, 30.0, 30.0, &[1.0, 0.95, 1.0]).unwrap();
            let actions = ActionSpace::for_session(&cfg, 30.0);
            assert!(d.dose >= actions.min_dose() && d.dose <= actions.max_dose());
            assert!(actions.doses().contains(&d.dose));
            assert!(d.accumulated_tumor_bed <= 72.0 + 1e-9);
        }
    }

    #[test]
    fn max_dose_zero_always_delivers_zero() {
        for strategy in [Strategy::OarBound, Strategy::MinOar] {
            let mut cfg = fixed_cfg(strategy);
            cfg.treatment.sessions_total = 2;
            cfg.dose.max_dose = Some(0.0);
            for session in 1..=2 {
                let d = decide_dose(session, &cfg, 0.0, 0.0, &history(session, 1.0)).unwrap();
                assert_eq!(d.dose, 0.0);
                assert_eq!(d.tumor_bed, 0.0);
            }
        }
    }
}
