//! Job records and their state machine
//!
//! `queued -> running -> {done | failed}`. A running job that timed out may be
//! sent back to `queued` once for a retry; terminal states never change.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::forecast::{BacktestResult, ForecastMethod, ForecastOptions, ForecastResult};
use super::ids::{JobId, ModelId};
use super::projection::ProjectionResult;
use super::scenario::{Override, ScenarioRun};
use super::simulation::{MonteCarloConfig, ParameterDistributions, SimulationResult};
use crate::error::JobError;

/// Work a caller can submit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobRequest {
    Projection {
        model_id: ModelId,
        horizon: u32,
    },
    Scenario {
        model_id: ModelId,
        horizon: u32,
        #[serde(rename = "override", default)]
        patch: Override,
    },
    MonteCarlo {
        model_id: ModelId,
        horizon: u32,
        distributions: ParameterDistributions,
        #[serde(default)]
        config: MonteCarloConfig,
    },
    Forecast {
        model_id: ModelId,
        metric: String,
        steps: usize,
        #[serde(default)]
        method: ForecastMethod,
        #[serde(default)]
        options: ForecastOptions,
        /// Attach walk-forward accuracy for the chosen method
        #[serde(default)]
        backtest_window: Option<usize>,
    },
    Backtest {
        model_id: ModelId,
        metric: String,
        window: usize,
        #[serde(default)]
        options: ForecastOptions,
    },
}

impl JobRequest {
    #[must_use]
    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::Projection { .. } => JobKind::Projection,
            JobRequest::Scenario { .. } => JobKind::Scenario,
            JobRequest::MonteCarlo { .. } => JobKind::MonteCarlo,
            JobRequest::Forecast { .. } => JobKind::Forecast,
            JobRequest::Backtest { .. } => JobKind::Backtest,
        }
    }

    #[must_use]
    pub fn model_id(&self) -> &ModelId {
        match self {
            JobRequest::Projection { model_id, .. }
            | JobRequest::Scenario { model_id, .. }
            | JobRequest::MonteCarlo { model_id, .. }
            | JobRequest::Forecast { model_id, .. }
            | JobRequest::Backtest { model_id, .. } => model_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Projection,
    Scenario,
    MonteCarlo,
    Forecast,
    Backtest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

/// Output persisted for a finished job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobOutput {
    Projection(ProjectionResult),
    Scenario(ScenarioRun),
    Simulation(SimulationResult),
    Forecast(ForecastResult),
    Backtest(BacktestResult),
}

/// Reference to a job's persisted output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultRef(pub JobId);

/// A requested change of job state
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// queued -> running, starting a new attempt
    Start,
    /// running -> done
    Complete,
    /// queued | running -> failed
    Fail(JobError),
    /// running -> queued, keeping the error that caused the retry
    Requeue(JobError),
}

/// Durable status record of one unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub request: JobRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedupe_key: Option<String>,
    pub status: JobStatus,
    /// 0..=100; never decreases while running
    pub progress: u8,
    /// Number of times the job has been started
    pub attempt: u32,
    pub created_at: Timestamp,
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    #[serde(default)]
    pub finished_at: Option<Timestamp>,
    #[serde(default)]
    pub result: Option<ResultRef>,
    #[serde(default)]
    pub last_error: Option<JobError>,
}

impl Job {
    #[must_use]
    pub fn new(request: JobRequest, dedupe_key: Option<String>) -> Self {
        Self {
            id: JobId::new(),
            kind: request.kind(),
            request,
            dedupe_key,
            status: JobStatus::Queued,
            progress: 0,
            attempt: 0,
            created_at: Timestamp::now(),
            started_at: None,
            finished_at: None,
            result: None,
            last_error: None,
        }
    }

    /// Whether `transition` is legal from the current status
    #[must_use]
    pub fn can_apply(&self, transition: &Transition) -> bool {
        matches!(
            (self.status, transition),
            (JobStatus::Queued, Transition::Start)
                | (JobStatus::Queued, Transition::Fail(_))
                | (JobStatus::Running, Transition::Complete)
                | (JobStatus::Running, Transition::Fail(_))
                | (JobStatus::Running, Transition::Requeue(_))
        )
    }

    /// Apply a transition. Callers check [`Job::can_apply`] first.
    pub fn apply(&mut self, transition: &Transition, now: Timestamp) {
        match transition {
            Transition::Start => {
                self.status = JobStatus::Running;
                self.attempt += 1;
                self.progress = 0;
                self.started_at = Some(now);
            }
            Transition::Complete => {
                self.status = JobStatus::Done;
                self.progress = 100;
                self.finished_at = Some(now);
                self.result = Some(ResultRef(self.id));
            }
            Transition::Fail(error) => {
                self.status = JobStatus::Failed;
                self.finished_at = Some(now);
                self.last_error = Some(error.clone());
            }
            Transition::Requeue(error) => {
                self.status = JobStatus::Queued;
                self.progress = 0;
                self.last_error = Some(error.clone());
            }
        }
    }
}
