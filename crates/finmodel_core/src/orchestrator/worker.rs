//! Worker threads: pull job ids off the queue and execute one attempt each

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::Receiver;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use super::control::JobControl;
use super::{Shared, WorkItem};
use crate::error::{EngineError, Result};
use crate::forecast::{backtest, forecast};
use crate::model::{Job, JobId, JobOutput, JobRequest, JobStatus, Transition};
use crate::monte_carlo::simulate_with_progress;
use crate::projection::project;
use crate::repository::Expected;

pub(super) fn run(shared: &Shared, receiver: &Mutex<Receiver<WorkItem>>) {
    loop {
        let item = {
            let rx = receiver.lock().unwrap_or_else(PoisonError::into_inner);
            rx.recv()
        };
        match item {
            Ok(WorkItem::Run(id)) => run_job(shared, id),
            Ok(WorkItem::Shutdown) | Err(_) => break,
        }
    }
}

fn run_job(shared: &Shared, id: JobId) {
    let job = match shared.repo.get(id) {
        Ok(job) => job,
        Err(e) => {
            tracing::error!(job_id = %id, error = %e, "failed to load queued job");
            return;
        }
    };
    // Cancelled or picked up elsewhere since it was queued
    if job.status != JobStatus::Queued {
        return;
    }

    let attempt = job.attempt + 1;
    let control = shared.controls.register(id, attempt);
    let running = match shared
        .repo
        .transition(id, Expected::of(&job), &Transition::Start)
    {
        Ok(Some(running)) => running,
        Ok(None) => {
            shared.controls.release(id, &control);
            return;
        }
        Err(e) => {
            tracing::error!(job_id = %id, error = %e, "failed to start job");
            shared.controls.release(id, &control);
            return;
        }
    };

    tracing::info!(job_id = %id, kind = ?running.kind, attempt, "job started");
    let started = Instant::now();

    let outcome = catch_unwind(AssertUnwindSafe(|| execute(shared, &running, &control)))
        .unwrap_or_else(|payload| Err(EngineError::InternalComputationError(panic_message(&*payload))));

    let expected = Expected::of(&running);
    match outcome {
        Ok(output) => finish(shared, id, expected, &output, started),
        Err(error) => {
            shared.fail_or_retry(id, expected, &error);
        }
    }
    shared.controls.release(id, &control);
}

fn finish(shared: &Shared, id: JobId, expected: Expected, output: &JobOutput, started: Instant) {
    // The result is written first so a job is never observed done without it
    match shared.repo.put_result(id, expected.attempt, output) {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(job_id = %id, attempt = expected.attempt, "attempt superseded; result discarded");
            return;
        }
        Err(e) => {
            let error = EngineError::from(e);
            shared.fail_or_retry(id, expected, &error);
            return;
        }
    }
    match shared.repo.transition(id, expected, &Transition::Complete) {
        Ok(Some(_)) => tracing::info!(
            job_id = %id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "job done"
        ),
        // Cancelled or timed out while computing; the late result is discarded
        Ok(None) => tracing::debug!(job_id = %id, "job moved on before completion"),
        Err(e) => tracing::error!(job_id = %id, error = %e, "failed to mark job done"),
    }
}

/// Stop point between phases. Besides a local cancel, the attempt stops once
/// the repository shows it has lost the job, so a cancel issued through
/// another orchestrator reaches it too.
fn checkpoint(shared: &Shared, id: JobId, control: &JobControl) -> Result<()> {
    if !control.is_cancelled() && shared.superseded(id, control.attempt) {
        control.cancel();
    }
    if control.is_cancelled() {
        Err(EngineError::Cancelled)
    } else {
        Ok(())
    }
}

fn execute(shared: &Shared, job: &Job, control: &JobControl) -> Result<JobOutput> {
    let store = shared.engine.store();
    checkpoint(shared, job.id, control)?;
    let output = match &job.request {
        JobRequest::Projection { model_id, horizon } => {
            let set = store.assumption_set(model_id)?;
            checkpoint(shared, job.id, control)?;
            JobOutput::Projection(project(&set, *horizon)?)
        }
        JobRequest::Scenario {
            model_id,
            horizon,
            patch,
        } => JobOutput::Scenario(shared.engine.run_scenario(model_id, patch, *horizon)?),
        JobRequest::MonteCarlo {
            model_id,
            horizon,
            distributions,
            config,
        } => {
            let set = store.assumption_set(model_id)?;
            control.set_total(config.trials);
            let progress = control.simulation_progress();
            JobOutput::Simulation(simulate_with_progress(
                &set,
                *horizon,
                distributions,
                config,
                &progress,
            )?)
        }
        JobRequest::Forecast {
            model_id,
            metric,
            steps,
            method,
            options,
            backtest_window,
        } => {
            let series = store.historical_series(model_id, metric)?;
            checkpoint(shared, job.id, control)?;
            let mut result = forecast(&series.values, *steps, *method, options)?;
            if let Some(window) = backtest_window {
                checkpoint(shared, job.id, control)?;
                let validation = backtest(&series.values, *window, options)?;
                result.metrics = validation
                    .method(result.method)
                    .and_then(|m| m.metrics);
            }
            JobOutput::Forecast(result)
        }
        JobRequest::Backtest {
            model_id,
            metric,
            window,
            options,
        } => {
            let series = store.historical_series(model_id, metric)?;
            checkpoint(shared, job.id, control)?;
            JobOutput::Backtest(backtest(&series.values, *window, options)?)
        }
    };
    checkpoint(shared, job.id, control)?;
    Ok(output)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic with non-string payload".to_string()
    }
}
