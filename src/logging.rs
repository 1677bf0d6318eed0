// src/logging.rs
//
// Telemetry sinks for adaptfx.
// - PlanSink:  trait used by the course runner, one call per session
// - NoopSink:  discards all records
// - JsonlSink: writes one JSON object per session for offline analysis
// - MemorySink: keeps records in memory (tests, harnesses)

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::config::{Config, Strategy};
use crate::types::SessionRecord;

/// Abstract sink for per-session telemetry.
pub trait PlanSink {
    fn log_session(&mut self, cfg: &Config, record: &SessionRecord);
}

impl<S: PlanSink + ?Sized> PlanSink for Box<S> {
    fn log_session(&mut self, cfg: &Config, record: &SessionRecord) {
        (**self).log_session(cfg, record);
    }
}

/// Sink that discards all records.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl PlanSink for NoopSink {
    fn log_session(&mut self, _cfg: &Config, _record: &SessionRecord) {}
}

/// Sink that keeps every record it sees.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub records: Vec<SessionRecord>,
}

impl PlanSink for MemorySink {
    fn log_session(&mut self, _cfg: &Config, record: &SessionRecord) {
        self.records.push(*record);
    }
}

#[derive(Serialize)]
struct SessionLine<'a> {
    strategy: Strategy,
    sessions_total: usize,
    #[serde(flatten)]
    record: &'a SessionRecord,
}

/// JSONL file sink: one object per session, flushed after every line.
pub struct JsonlSink {
    writer: BufWriter<File>,
}

impl JsonlSink {
    /// Create (truncate) `path`.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl PlanSink for JsonlSink {
    fn log_session(&mut self, cfg: &Config, record: &SessionRecord) {
        let line = SessionLine {
            strategy: cfg.strategy,
            sessions_total: cfg.treatment.sessions_total,
            record,
        };

        // Telemetry must never abort a course; write failures are dropped.
        if serde_json::to_writer(&mut self.writer, &line).is_ok() {
            let _ = self.writer.write_all(b"\n");
        }
        let _ = self.writer.flush();
    }
}
