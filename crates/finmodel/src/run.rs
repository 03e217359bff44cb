//! Turn parsed arguments into a job, run it and collect the output

use std::thread;
use std::time::Duration;

use color_eyre::eyre::{Result, bail, eyre};
use finmodel_core::model::{
    JobId, JobOutput, JobRequest, JobStatus, ModelId, MonteCarloConfig, ParameterDistributions,
};
use finmodel_core::{AssumptionStore, Orchestrator};

use crate::cli::{Command, parse_distributions, parse_overrides};
use crate::data;

const FIRST_POLL: Duration = Duration::from_millis(20);
const MAX_POLL: Duration = Duration::from_millis(500);

/// Build the job request for `command` against `model_id`
pub fn build_request(command: &Command, model_id: &ModelId) -> Result<JobRequest> {
    let model_id = model_id.clone();
    let request = match command {
        Command::Project { horizon } => JobRequest::Projection {
            model_id,
            horizon: *horizon,
        },
        Command::Scenario { horizon, overrides } => JobRequest::Scenario {
            model_id,
            horizon: *horizon,
            patch: parse_overrides(overrides).map_err(|e| eyre!(e))?,
        },
        Command::Simulate {
            horizon,
            trials,
            seed,
            normal,
            uniform,
            triangular,
            distributions,
        } => {
            let base = match distributions {
                Some(path) => data::load_distributions(path)?,
                None => ParameterDistributions::new(),
            };
            let distributions =
                parse_distributions(base, normal, uniform, triangular).map_err(|e| eyre!(e))?;
            if distributions.is_empty() {
                bail!(
                    "simulate needs at least one of --normal, --uniform, --triangular or --distributions"
                );
            }
            JobRequest::MonteCarlo {
                model_id,
                horizon: *horizon,
                distributions,
                config: MonteCarloConfig {
                    trials: *trials,
                    seed: *seed,
                    ..MonteCarloConfig::default()
                },
            }
        }
        Command::Forecast {
            metric,
            steps,
            method,
            backtest_window,
            options,
        } => JobRequest::Forecast {
            model_id,
            metric: metric.clone(),
            steps: *steps,
            method: *method,
            options: options.options(),
            backtest_window: *backtest_window,
        },
        Command::Backtest {
            metric,
            window,
            options,
        } => JobRequest::Backtest {
            model_id,
            metric: metric.clone(),
            window: *window,
            options: options.options(),
        },
    };
    Ok(request)
}

/// Poll with a growing interval until the job is done or failed
pub fn wait_for_output(orchestrator: &Orchestrator, id: JobId) -> Result<JobOutput> {
    let mut interval = FIRST_POLL;
    let mut last_progress = 0;
    loop {
        let job = orchestrator.poll(id)?;
        if job.progress != last_progress {
            tracing::debug!(job_id = %id, progress = job.progress, "job progress");
            last_progress = job.progress;
        }
        match job.status {
            JobStatus::Done => {
                return orchestrator
                    .result(id)?
                    .ok_or_else(|| eyre!("job {id} is done but has no stored result"));
            }
            JobStatus::Failed => {
                let error = job.last_error.map_or_else(
                    || "unknown error".to_string(),
                    |e| format!("{:?}: {}", e.kind, e.message),
                );
                bail!("job {id} failed after {} attempt(s): {error}", job.attempt);
            }
            JobStatus::Queued | JobStatus::Running => {
                thread::sleep(interval);
                interval = (interval * 2).min(MAX_POLL);
            }
        }
    }
}

/// Submit `request` and block until its output is available
pub fn run_job(
    orchestrator: &Orchestrator,
    store: &dyn AssumptionStore,
    request: JobRequest,
    dedupe_key: Option<String>,
) -> Result<JobOutput> {
    // Fail fast on an unknown model before anything is queued
    store.assumption_set(request.model_id())?;

    let id = orchestrator.submit(request, dedupe_key)?;
    tracing::info!(job_id = %id, "job submitted");
    wait_for_output(orchestrator, id)
}
