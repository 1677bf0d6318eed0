// src/types.rs
//
// Common shared types for adaptfx: per-session decisions and whole-course
// plans.

use serde::{Deserialize, Serialize};

/// Result of solving one session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// 1-based session index.
    pub session: usize,
    /// Physical dose to deliver (Gy).
    pub dose: f64,
    /// Tumor BED delivered by `dose`.
    pub tumor_bed: f64,
    /// OAR BED delivered by `dose` at the observed sparing factor.
    pub oar_bed: f64,
    /// Tumor BED after this session.
    pub accumulated_tumor_bed: f64,
    /// OAR BED after this session.
    pub accumulated_oar_bed: f64,
    /// The entering state was already past the tumor goal or the OAR bound
    /// (OarBound), or past the goal (MinOar); the dose is forced to 0.
    pub over_limit: bool,
}

/// One delivered session of a simulated course.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session: usize,
    pub sparing_factor: f64,
    pub dose: f64,
    pub tumor_bed: f64,
    pub oar_bed: f64,
    pub accumulated_tumor_bed: f64,
    pub accumulated_oar_bed: f64,
    pub over_limit: bool,
}

impl SessionRecord {
    pub fn from_decision(d: &Decision, sparing_factor: f64) -> Self {
        Self {
            session: d.session,
            sparing_factor,
            dose: d.dose,
            tumor_bed: d.tumor_bed,
            oar_bed: d.oar_bed,
            accumulated_tumor_bed: d.accumulated_tumor_bed,
            accumulated_oar_bed: d.accumulated_oar_bed,
            over_limit: d.over_limit,
        }
    }
}

/// Ordered session records of a full course.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub sessions: Vec<SessionRecord>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn doses(&self) -> Vec<f64> {
        self.sessions.iter().map(|r| r.dose).collect()
    }

    /// Accumulated tumor BED at the end of the course (0 when empty).
    pub fn total_tumor_bed(&self) -> f64 {
        self.sessions
            .last()
            .map(|r| r.accumulated_tumor_bed)
            .unwrap_or(0.0)
    }

    pub fn total_oar_bed(&self) -> f64 {
        self.sessions
            .last()
            .map(|r| r.accumulated_oar_bed)
            .unwrap_or(0.0)
    }

    pub fn total_dose(&self) -> f64 {
        self.sessions.iter().map(|r| r.dose).sum()
    }
}
