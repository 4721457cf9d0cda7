//! One scheduled cycle: the flow job followed by every configured pick list.
//!
//! Jobs are independent. A job that fails is logged and reported, and the
//! remaining jobs still run.

use crate::catalog::MediaServer;
use crate::config::Config;
use crate::engine::{publish, FlowGenerator, Publication};
use crate::picks::run_pick_job;
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Flow,
    Picks,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobResult {
    Stored(Publication),
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub name: String,
    pub kind: JobKind,
    pub result: JobResult,
}

impl JobOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.result, JobResult::Failed { .. })
    }
}

/// Per-job results of a cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub jobs: Vec<JobOutcome>,
}

impl CycleReport {
    pub fn failures(&self) -> usize {
        self.jobs.iter().filter(|j| j.is_failure()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }
}

fn outcome(name: &str, kind: JobKind, result: anyhow::Result<Publication>) -> JobOutcome {
    let result = match result {
        Ok(publication) => JobResult::Stored(publication),
        Err(e) => {
            error!("Job '{name}' failed: {e:#}");
            JobResult::Failed { error: format!("{e:#}") }
        }
    };
    JobOutcome {
        name: name.to_string(),
        kind,
        result,
    }
}

/// Run every job once
pub fn run_cycle<M: MediaServer + ?Sized>(
    server: &M,
    config: &Config,
    generator: &mut FlowGenerator<'_>,
    now: DateTime<Utc>,
) -> CycleReport {
    let mut jobs = Vec::with_capacity(1 + config.pick_lists.len());

    let flow = generator.generate(server, now);
    let stored = publish(server, &flow.name, &flow.tracks, &flow.description());
    jobs.push(outcome(&flow.name, JobKind::Flow, stored));

    for job in &config.pick_lists {
        jobs.push(outcome(&job.name, JobKind::Picks, run_pick_job(server, job)));
    }

    let report = CycleReport { started_at: now, jobs };
    info!(
        "Cycle finished: {} jobs, {} failed",
        report.jobs.len(),
        report.failures()
    );
    report
}
