//! adaptfx core library.
//!
//! Adaptive fractionation: choose each radiotherapy session's dose by
//! backward induction over the sessions that remain, using a belief over
//! the patient's organ-at-risk sparing factor that is refreshed from every
//! new observation. The binary (`src/main.rs`) is a thin harness around
//! these components.

pub mod bed;
pub mod belief;
pub mod config;
pub mod course;
pub mod engine;
pub mod error;
pub mod grid;
pub mod logging;
pub mod metrics;
pub mod prior;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use bed::{bed, bed_matrix, dose_for_bed, tumor_bed};

pub use belief::{posterior_std, BeliefState, DiscreteDistribution, TruncatedNormal};

pub use config::{Config, FixedBelief, Strategy};

pub use course::{run_course, single_session, CourseRunner};

pub use engine::{decide_dose, Engine};

pub use error::{AdaptError, Result};

pub use grid::{ActionSpace, StateGrid};

pub use logging::{JsonlSink, MemorySink, NoopSink, PlanSink};

pub use prior::{fit_prior, PriorHyperparams};

pub use types::{Decision, Plan, SessionRecord};
