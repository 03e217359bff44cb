//! Job Orchestrator
//!
//! Runs projection, scenario, Monte Carlo and forecasting work asynchronously
//! on a fixed pool of worker threads. Durable job state lives in the injected
//! [`JobRepository`]; this instance only keeps the cancel flags and progress
//! counters of attempts it is executing right now.
//!
//! ```ignore
//! let orchestrator = Orchestrator::new(store, Arc::new(MemoryJobRepository::new()), config);
//! let id = orchestrator.submit(request, None)?;
//! loop {
//!     let job = orchestrator.poll(id)?;
//!     if job.status.is_terminal() { break; }
//!     std::thread::sleep(Duration::from_millis(50));
//! }
//! let output = orchestrator.result(id)?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::config::OrchestratorConfig;
use crate::error::{EngineError, ErrorKind, JobError, Result};
use crate::model::{Job, JobId, JobOutput, JobRequest, JobStatus, Transition};
use crate::repository::{Expected, JobRepository};
use crate::scenario::ScenarioEngine;
use crate::store::AssumptionStore;

mod control;
mod watchdog;
mod worker;

use control::ControlTable;

/// Message on the shared work queue
#[derive(Debug)]
enum WorkItem {
    Run(JobId),
    Shutdown,
}

/// State shared by the handle, the workers and the watchdog
struct Shared {
    repo: Arc<dyn JobRepository>,
    engine: ScenarioEngine,
    config: OrchestratorConfig,
    controls: ControlTable,
    queue: Sender<WorkItem>,
    stopping: AtomicBool,
}

impl Shared {
    fn enqueue(&self, id: JobId) {
        if self.queue.send(WorkItem::Run(id)).is_err() {
            tracing::error!(job_id = %id, "work queue closed; job stays queued");
        }
    }

    /// Whether `attempt` no longer owns its job in the repository: cancelled,
    /// timed out or finished by any orchestrator sharing it. A failed lookup
    /// counts as still owned; the final transition is a compare-and-set anyway.
    fn superseded(&self, id: JobId, attempt: u32) -> bool {
        match self.repo.get(id) {
            Ok(job) => job.status != JobStatus::Running || job.attempt != attempt,
            Err(e) => {
                tracing::debug!(job_id = %id, error = %e, "could not check job state");
                false
            }
        }
    }

    /// Fail the attempt described by `expected`, or requeue it when the error is
    /// retryable and retries remain. Returns the job's new state when this call
    /// won the transition.
    fn fail_or_retry(&self, job_id: JobId, expected: Expected, error: &EngineError) -> Option<Job> {
        let record = JobError::from(error);
        let retry = error.is_retryable() && expected.attempt <= self.config.max_retries;
        let transition = if retry {
            Transition::Requeue(record)
        } else {
            Transition::Fail(record)
        };
        match self.repo.transition(job_id, expected, &transition) {
            Ok(Some(job)) => {
                if retry {
                    tracing::warn!(job_id = %job_id, attempt = expected.attempt, error = %error, "job requeued for retry");
                    self.enqueue(job_id);
                } else {
                    tracing::info!(job_id = %job_id, kind = ?error.kind(), error = %error, "job failed");
                }
                Some(job)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "failed to record job failure");
                None
            }
        }
    }
}

#[cfg(test)]
impl Shared {
    /// Shared state without any threads, for driving workers and the watchdog by hand
    fn detached(repo: Arc<dyn JobRepository>) -> (Self, std::sync::mpsc::Receiver<WorkItem>) {
        let (queue, receiver) = channel();
        let shared = Self {
            repo,
            engine: ScenarioEngine::new(Arc::new(crate::store::MemoryAssumptionStore::new())),
            config: OrchestratorConfig::default(),
            controls: ControlTable::default(),
            queue,
            stopping: AtomicBool::new(false),
        };
        (shared, receiver)
    }
}

pub struct Orchestrator {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    watchdog: Option<JoinHandle<()>>,
}

impl Orchestrator {
    /// Start `config.workers` worker threads and the watchdog
    pub fn new(
        store: Arc<dyn AssumptionStore>,
        repo: Arc<dyn JobRepository>,
        config: OrchestratorConfig,
    ) -> Self {
        let (queue, receiver) = channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let worker_count = config.workers.max(1);

        let shared = Arc::new(Shared {
            repo,
            engine: ScenarioEngine::new(store),
            config,
            controls: ControlTable::default(),
            queue,
            stopping: AtomicBool::new(false),
        });

        let workers = (0..worker_count)
            .map(|n| {
                let shared = Arc::clone(&shared);
                let receiver = Arc::clone(&receiver);
                thread::Builder::new()
                    .name(format!("finmodel-worker-{n}"))
                    .spawn(move || worker::run(&shared, &receiver))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!(error = %e, "failed to spawn worker thread");
                    None
                }
            })
            .collect();

        let watchdog = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("finmodel-watchdog".into())
                .spawn(move || watchdog::run(&shared))
                .map_err(|e| tracing::error!(error = %e, "failed to spawn watchdog thread"))
                .ok()
        };

        tracing::info!(workers = worker_count, "orchestrator started");

        Self {
            shared,
            workers,
            watchdog,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.shared.config
    }

    /// Queue a job. With a `dedupe_key` already in use, the existing job's id is
    /// returned and nothing new is queued.
    pub fn submit(&self, request: JobRequest, dedupe_key: Option<String>) -> Result<JobId> {
        self.validate(&request)?;

        let job = Job::new(request, dedupe_key);
        let new_id = job.id;
        let stored = self.shared.repo.create(job)?;
        if stored.id != new_id {
            tracing::info!(job_id = %stored.id, "duplicate submission; returning existing job");
            return Ok(stored.id);
        }

        tracing::info!(job_id = %new_id, kind = ?stored.kind, "job submitted");
        self.shared.enqueue(new_id);
        Ok(new_id)
    }

    fn validate(&self, request: &JobRequest) -> Result<()> {
        let max_horizon = self.shared.config.max_horizon;
        let check_horizon = |horizon: u32| {
            if horizon == 0 || horizon > max_horizon {
                Err(EngineError::InvalidHorizon(horizon))
            } else {
                Ok(())
            }
        };
        match request {
            JobRequest::Projection { horizon, .. } | JobRequest::Scenario { horizon, .. } => {
                check_horizon(*horizon)
            }
            JobRequest::MonteCarlo {
                horizon, config, ..
            } => {
                check_horizon(*horizon)?;
                let max = self.shared.config.max_trials;
                if config.trials < 1 || config.trials > max {
                    return Err(EngineError::InvalidTrialCount {
                        requested: config.trials,
                        max: Some(max),
                    });
                }
                config.validate()
            }
            JobRequest::Forecast { steps, .. } => {
                if *steps == 0 {
                    return Err(EngineError::InvalidHorizon(0));
                }
                Ok(())
            }
            JobRequest::Backtest { .. } => Ok(()),
        }
    }

    /// Current state of a job, with live progress for attempts running here
    pub fn poll(&self, id: JobId) -> Result<Job> {
        let mut job = self.shared.repo.get(id)?;
        if job.status != JobStatus::Running {
            return Ok(job);
        }
        match self.shared.controls.get(id) {
            Some(control) if control.attempt == job.attempt => {
                job.progress = job.progress.max(control.percent());
            }
            // The attempt may have finished between the two reads; controls are
            // released only after the final transition, so a re-read sees it
            _ => job = self.shared.repo.get(id)?,
        }
        Ok(job)
    }

    /// Output of a finished job; `None` until the job is done
    pub fn result(&self, id: JobId) -> Result<Option<JobOutput>> {
        let job = self.shared.repo.get(id)?;
        if job.status != JobStatus::Done {
            return Ok(None);
        }
        Ok(self.shared.repo.get_result(id)?)
    }

    /// Cancel a queued or running job. Terminal jobs are returned unchanged.
    pub fn cancel(&self, id: JobId) -> Result<Job> {
        let error = JobError {
            kind: ErrorKind::Cancelled,
            message: EngineError::Cancelled.to_string(),
        };
        loop {
            let job = self.shared.repo.get(id)?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            if let Some(control) = self.shared.controls.get(id) {
                control.cancel();
            }
            let transition = Transition::Fail(error.clone());
            if let Some(job) = self
                .shared
                .repo
                .transition(id, Expected::of(&job), &transition)?
            {
                tracing::info!(job_id = %id, "job cancelled");
                return Ok(job);
            }
            // Lost a race with a worker; look again
        }
    }

    /// Stop the workers and the watchdog. Queued jobs stay queued in the repository.
    pub fn shutdown(&mut self) {
        if self.shared.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        for _ in 0..self.workers.len() {
            let _ = self.shared.queue.send(WorkItem::Shutdown);
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        if let Some(handle) = self.watchdog.take() {
            let _ = handle.join();
        }
        tracing::info!("orchestrator stopped");
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
