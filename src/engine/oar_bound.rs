// src/engine/oar_bound.rs
//
// Two-state value iteration over (accumulated tumor BED, accumulated OAR BED).
//
// - Terminal layer: per (tumor, oar, sf) cell the closed-form last-session
//   dose, valued as the (weighted) tumor shortfall minus the OAR BED it
//   delivers. Cells already past the goal or the bound get dose 0 and lose
//   `overlimit_penalty`.
// - Interior layers: per cell and sf bin, the best action's interpolated
//   expected future value minus the OAR BED delivered now.
// - Decision: the same backup at the single current state, with the exact
//   observed sparing factor.

use crate::bed::{bed, bed_matrix, dose_for_bed, tumor_bed};
use crate::config::Config;
use crate::grid::{interp2, interp2_at, locate, ActionSpace, Loc, StateGrid};

use super::{first_argmax, Choice, SessionProblem, ValueTable};

pub(super) fn solve(p: &SessionProblem<'_>) -> Choice {
    let tr = &p.cfg.treatment;
    if p.acc_t > tr.tumor_goal || p.acc_o > tr.oar_bound {
        return Choice::forced_zero();
    }
    if p.is_final() {
        return closed_form(p.cfg, &p.actions, p.acc_t, p.acc_o, p.sf);
    }

    let step = p.cfg.grid.state_stepsize;
    let t_grid = StateGrid::new(p.acc_t, tr.tumor_goal, step);
    let o_grid = StateGrid::new(p.acc_o, tr.oar_bound, step);
    let sfs = &p.dist.values;

    let doses = p.actions.doses();
    let bedt = p.actions.tumor_beds(tr.tumor_alpha_beta);
    let bedn = bed_matrix(doses, tr.oar_alpha_beta, sfs);

    let mut table = ValueTable::new(p.layers(), [t_grid.len(), o_grid.len(), sfs.len()]);
    fill_terminal(p.cfg, &p.actions, &t_grid, &o_grid, sfs, table.layer_mut(0));
    for k in 1..table.layers() {
        let future = table.expected(k - 1, &p.dist);
        fill_interior(&t_grid, &o_grid, &bedt, &bedn, &future, table.layer_mut(k));
        tracing::debug!(
            session = tr.sessions_total - k,
            tumor_states = t_grid.len(),
            oar_states = o_grid.len(),
            "oar_bound layer solved"
        );
    }

    let future = table.expected(table.layers() - 1, &p.dist);
    let values = doses.iter().zip(&bedt).map(|(&d, &bt)| {
        let oar_now = bed(d, tr.oar_alpha_beta, p.sf);
        let ft = t_grid.clamp_projection(p.acc_t + bt);
        let fo = o_grid.clamp_projection(p.acc_o + oar_now);
        interp2(t_grid.knots(), o_grid.knots(), &future, ft, fo) - oar_now
    });

    Choice {
        dose: doses[first_argmax(values)],
        over_limit: false,
    }
}

/// Last-session dose at state `(t, o)`: the smaller of the doses that reach
/// the tumor goal and the OAR bound, floored at 0, clamped into the action
/// range. Past either limit the dose is 0 and the state is flagged.
fn closed_form(cfg: &Config, actions: &ActionSpace, t: f64, o: f64, sf: f64) -> Choice {
    let tr = &cfg.treatment;
    if t > tr.tumor_goal || o > tr.oar_bound {
        return Choice::forced_zero();
    }

    let by_tumor = dose_for_bed(tr.tumor_goal - t, tr.tumor_alpha_beta, 1.0);
    let by_oar = dose_for_bed(tr.oar_bound - o, tr.oar_alpha_beta, sf);
    match (by_tumor, by_oar) {
        (Some(a), Some(b)) => Choice {
            dose: actions.clamp(a.min(b).max(0.0)),
            over_limit: false,
        },
        _ => Choice::forced_zero(),
    }
}

fn terminal_value(cfg: &Config, actions: &ActionSpace, t: f64, o: f64, sf: f64) -> f64 {
    let tr = &cfg.treatment;
    let pen = &cfg.penalty;

    let c = closed_form(cfg, actions, t, o, sf);
    let future_t = t + tumor_bed(c.dose, tr.tumor_alpha_beta);
    let shortfall = (future_t - tr.tumor_goal).min(0.0) * pen.underdose_penalty;
    let mut v = shortfall - bed(c.dose, tr.oar_alpha_beta, sf);
    if c.over_limit {
        v -= pen.overlimit_penalty;
    }
    v
}

fn fill_terminal(
    cfg: &Config,
    actions: &ActionSpace,
    t_grid: &StateGrid,
    o_grid: &StateGrid,
    sfs: &[f64],
    layer: &mut [f64],
) {
    let n_sf = sfs.len();
    let mut cells = layer.chunks_exact_mut(n_sf);
    for &t in t_grid.knots() {
        for &o in o_grid.knots() {
            if let Some(cell) = cells.next() {
                for (v, &sf) in cell.iter_mut().zip(sfs) {
                    *v = terminal_value(cfg, actions, t, o, sf);
                }
            }
        }
    }
}

/// One backup over every `(tumor, oar)` cell. `bedn[k][a]` is the OAR BED
/// of action `a` at sf bin `k`; `future` is the next layer marginalised
/// over sf.
fn fill_interior(
    t_grid: &StateGrid,
    o_grid: &StateGrid,
    bedt: &[f64],
    bedn: &[Vec<f64>],
    future: &[f64],
    layer: &mut [f64],
) {
    let tk = t_grid.knots();
    let ok = o_grid.knots();
    let n_t = tk.len();
    let n_sf = bedn.len();

    let mut best = vec![f64::NEG_INFINITY; n_sf];
    let mut cells = layer.chunks_exact_mut(n_sf);
    for &t in tk {
        // The tumor projection does not depend on sf or the OAR state.
        let locs: Vec<Loc> = bedt
            .iter()
            .map(|&b| locate(tk, t_grid.clamp_projection(t + b)))
            .collect();

        for &o in ok {
            best.fill(f64::NEG_INFINITY);
            for (a, &lx) in locs.iter().enumerate() {
                for (slot, row) in best.iter_mut().zip(bedn) {
                    let oar_now = row[a];
                    let fo = o_grid.clamp_projection(o + oar_now);
                    let v = interp2_at(n_t, ok, future, lx, fo) - oar_now;
                    if v > *slot {
                        *slot = v;
                    }
                }
            }
            if let Some(cell) = cells.next() {
                cell.copy_from_slice(&best);
            }
        }
    }
}
