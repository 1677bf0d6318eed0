// src/course.rs
//
// Whole-course driver.
//
// Given the planning observation and one observed sparing factor per
// session, the runner walks sessions 1..=N in order, feeding each solve the
// history prefix it would have seen in the clinic and the BED accumulated
// so far. Sessions are strictly sequential; each one's accumulations feed
// the next.

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{AdaptError, Result};
use crate::logging::{NoopSink, PlanSink};
use crate::types::{Decision, Plan, SessionRecord};

pub struct CourseRunner<S: PlanSink> {
    engine: Engine,
    sink: S,
}

impl CourseRunner<NoopSink> {
    pub fn new(cfg: &Config) -> Result<Self> {
        Self::with_sink(cfg, NoopSink)
    }
}

impl<S: PlanSink> CourseRunner<S> {
    /// Construct a runner that reports every delivered session to `sink`.
    pub fn with_sink(cfg: &Config, sink: S) -> Result<Self> {
        Ok(Self {
            engine: Engine::new(cfg)?,
            sink,
        })
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Simulate the full course. `history` holds the planning observation
    /// followed by one sparing factor per session (`sessions_total + 1`
    /// entries).
    pub fn run(&mut self, history: &[f64]) -> Result<Plan> {
        let cfg = self.engine.config();
        let total = cfg.treatment.sessions_total;
        if history.len() != total + 1 {
            return Err(AdaptError::HistoryLength {
                expected: total + 1,
                got: history.len(),
            });
        }

        let mut plan = Plan {
            sessions: Vec::with_capacity(total),
        };
        let mut acc_t = 0.0;
        let mut acc_o = 0.0;

        for session in 1..=total {
            let d = self
                .engine
                .decide(session, acc_t, acc_o, &history[..=session])?;
            let record = SessionRecord::from_decision(&d, history[session]);

            tracing::info!(
                session,
                sf = record.sparing_factor,
                dose = record.dose,
                acc_tumor = record.accumulated_tumor_bed,
                acc_oar = record.accumulated_oar_bed,
                "session delivered"
            );
            self.sink.log_session(self.engine.config(), &record);

            acc_t = d.accumulated_tumor_bed;
            acc_o = d.accumulated_oar_bed;
            plan.sessions.push(record);
        }

        Ok(plan)
    }
}

/// Simulate a course without telemetry.
pub fn run_course(cfg: &Config, history: &[f64]) -> Result<Plan> {
    CourseRunner::new(cfg)?.run(history)
}

/// Decide the current session from the history alone: a history of length
/// `k + 1` (planning plus `k` sessions) means session `k`.
pub fn single_session(
    cfg: &Config,
    history: &[f64],
    accumulated_tumor_bed: f64,
    accumulated_oar_bed: f64,
) -> Result<Decision> {
    if history.len() < 2 {
        return Err(AdaptError::input(
            "history needs the planning observation and at least one session",
        ));
    }
    let session = history.len() - 1;
    Engine::new(cfg)?.decide(session, accumulated_tumor_bed, accumulated_oar_bed, history)
}
