// src/engine/min_oar.rs
//
// Single-state value iteration over accumulated tumor BED.
//
// The OAR has no bound here: the objective is to reach the tumor goal
// while spending as little OAR BED as possible. Missing the goal costs
// `inf_penalty` per unit of BED.
//
// - Terminal layer: the BED-space action `goal - state`, clipped to the
//   BED of the smallest and largest dose.
// - Interior layers: projections past the goal are moved to the overflow
//   state and additionally lose `inf_penalty`.

use crate::bed::{bed, bed_matrix, dose_for_bed, tumor_bed};
use crate::config::Config;
use crate::grid::{interp1, ActionSpace, StateGrid};

use super::{first_argmax, Choice, SessionProblem, ValueTable};

pub(super) fn solve(p: &SessionProblem<'_>) -> Choice {
    let tr = &p.cfg.treatment;
    if p.acc_t > tr.tumor_goal {
        return Choice::forced_zero();
    }
    if p.is_final() {
        let need = dose_for_bed(tr.tumor_goal - p.acc_t, tr.tumor_alpha_beta, 1.0)
            .unwrap_or(0.0)
            .max(0.0);
        return Choice {
            dose: p.actions.clamp(need),
            over_limit: false,
        };
    }

    let inf_penalty = p.cfg.penalty.inf_penalty;
    let grid = StateGrid::new(p.acc_t, tr.tumor_goal, p.cfg.grid.state_stepsize);
    let sfs = &p.dist.values;

    let doses = p.actions.doses();
    let bedt = p.actions.tumor_beds(tr.tumor_alpha_beta);
    let bedn = bed_matrix(doses, tr.oar_alpha_beta, sfs);

    let mut table = ValueTable::new(p.layers(), [grid.len(), 1, sfs.len()]);
    fill_terminal(p.cfg, &p.actions, &grid, sfs, table.layer_mut(0));
    for k in 1..table.layers() {
        let future = table.expected(k - 1, &p.dist);
        let layer = table.layer_mut(k);
        let mut cells = layer.chunks_exact_mut(sfs.len());
        for &t in grid.knots() {
            let Some(cell) = cells.next() else { break };
            cell.fill(f64::NEG_INFINITY);
            for (a, &bt) in bedt.iter().enumerate() {
                let fv = projected_value(&grid, &future, t + bt, inf_penalty);
                for (slot, row) in cell.iter_mut().zip(&bedn) {
                    let v = fv - row[a];
                    if v > *slot {
                        *slot = v;
                    }
                }
            }
        }
        tracing::debug!(
            session = tr.sessions_total - k,
            tumor_states = grid.len(),
            "min_oar layer solved"
        );
    }

    let future = table.expected(table.layers() - 1, &p.dist);
    let values = doses.iter().zip(&bedt).map(|(&d, &bt)| {
        projected_value(&grid, &future, p.acc_t + bt, inf_penalty)
            - bed(d, tr.oar_alpha_beta, p.sf)
    });

    Choice {
        dose: doses[first_argmax(values)],
        over_limit: false,
    }
}

/// Future value at projected tumor BED `x`; past the goal, the overflow
/// value minus `inf_penalty`.
fn projected_value(grid: &StateGrid, future: &[f64], x: f64, inf_penalty: f64) -> f64 {
    if x > grid.bound() {
        interp1(grid.knots(), future, grid.overflow()) - inf_penalty
    } else {
        interp1(grid.knots(), future, x)
    }
}

fn fill_terminal(
    cfg: &Config,
    actions: &ActionSpace,
    grid: &StateGrid,
    sfs: &[f64],
    layer: &mut [f64],
) {
    let tr = &cfg.treatment;
    let lo = tumor_bed(actions.min_dose(), tr.tumor_alpha_beta);
    let hi = tumor_bed(actions.max_dose(), tr.tumor_alpha_beta);

    let mut cells = layer.chunks_exact_mut(sfs.len());
    for &t in grid.knots() {
        let Some(cell) = cells.next() else { break };
        let need = (tr.tumor_goal - t).max(lo).min(hi);
        let dose = dose_for_bed(need, tr.tumor_alpha_beta, 1.0)
            .unwrap_or(0.0)
            .max(0.0);
        let miss = (t + need - tr.tumor_goal).abs() * cfg.penalty.inf_penalty;
        for (v, &sf) in cell.iter_mut().zip(sfs) {
            *v = -bed(dose, tr.oar_alpha_beta, sf) - miss;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Strategy;

    #[test]
    fn terminal_layer_hits_goal_exactly_inside_action_range() {
        let cfg = Config::for_strategy(Strategy::MinOar);
        let actions = ActionSpace::for_session(&cfg, 0.0);
        let grid = StateGrid::new(60.0, 72.0, 1.0);
        let sfs = [0.9, 1.0];
        let mut layer = vec![0.0; grid.len() * sfs.len()];
        fill_terminal(&cfg, &actions, &grid, &sfs, &mut layer);

        // t = 60 needs 12 BED: no miss, only the OAR cost.
        let d = dose_for_bed(12.0, 10.0, 1.0).unwrap();
        assert!((layer[0] + bed(d, 3.0, 0.9)).abs() < 1e-9);
        assert!((layer[1] + bed(d, 3.0, 1.0)).abs() < 1e-9);

        // The overflow state is one step past the goal and the smallest
        // action is 0 BED, so it misses by exactly one step.
        let last = &layer[layer.len() - 2..];
        assert!((last[0] + 1.0 * cfg.penalty.inf_penalty).abs() < 1e-6);
    }

    #[test]
    fn projections_past_goal_are_penalised() {
        let grid = StateGrid::new(0.0, 2.0, 1.0);
        let future = vec![-1.0, -2.0, -3.0, -4.0];
        assert_eq!(projected_value(&grid, &future, 1.5, 100.0), -2.5);
        assert_eq!(projected_value(&grid, &future, 2.0, 100.0), -3.0);
        assert_eq!(projected_value(&grid, &future, 2.2, 100.0), -104.0);
    }
}
