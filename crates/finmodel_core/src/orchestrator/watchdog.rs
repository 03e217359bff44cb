//! Watchdog thread: enforces the job time limit and flushes live progress.
//!
//! Timeouts are judged from the durable `started_at` of every running job, so
//! attempts abandoned by another orchestrator sharing the repository are
//! reclaimed too.

use std::sync::atomic::Ordering;
use std::thread;

use jiff::{SignedDuration, Timestamp};

use super::Shared;
use crate::error::EngineError;
use crate::repository::Expected;

pub(super) fn run(shared: &Shared) {
    let interval = shared.config.watchdog_interval();
    let timeout = shared.config.job_timeout();
    let limit = SignedDuration::try_from(timeout).unwrap_or(SignedDuration::MAX);

    while !shared.stopping.load(Ordering::SeqCst) {
        thread::sleep(interval);
        flush_progress(shared);
        expire(shared, limit, timeout);
    }
}

/// Publish live progress of local attempts, and stop those whose job was
/// cancelled or reclaimed elsewhere
fn flush_progress(shared: &Shared) {
    for (id, control) in shared.controls.snapshot() {
        if control.is_cancelled() {
            continue;
        }
        if shared.superseded(id, control.attempt) {
            tracing::debug!(job_id = %id, attempt = control.attempt, "attempt superseded; stopping");
            control.cancel();
            continue;
        }
        let percent = control.percent();
        if percent == 0 {
            continue;
        }
        if let Err(e) = shared.repo.record_progress(id, control.attempt, percent) {
            tracing::debug!(job_id = %id, error = %e, "progress flush failed");
        }
    }
}

fn expire(shared: &Shared, limit: SignedDuration, timeout: std::time::Duration) {
    let running = match shared.repo.list_running() {
        Ok(jobs) => jobs,
        Err(e) => {
            tracing::warn!(error = %e, "watchdog could not list running jobs");
            return;
        }
    };
    let now = Timestamp::now();
    for job in running {
        let Some(started) = job.started_at else {
            continue;
        };
        if now.duration_since(started) <= limit {
            continue;
        }
        tracing::warn!(job_id = %job.id, attempt = job.attempt, ?timeout, "job timed out");
        if let Some(control) = shared.controls.get(job.id)
            && control.attempt == job.attempt
        {
            control.cancel();
        }
        shared.fail_or_retry(job.id, Expected::of(&job), &EngineError::Timeout(timeout));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::{ErrorKind, JobError};
    use crate::model::{Job, Transition};
    use crate::repository::{JobRepository, MemoryJobRepository};

    #[test]
    fn test_flush_stops_attempts_cancelled_elsewhere() {
        let repo: Arc<dyn JobRepository> = Arc::new(MemoryJobRepository::new());
        let (shared, _rx) = Shared::detached(Arc::clone(&repo));

        let start = |job: Job| {
            repo.transition(job.id, Expected::of(&job), &Transition::Start)
                .unwrap()
                .unwrap()
        };
        let request = crate::repository::tests::request;
        let kept = start(repo.create(Job::new(request(), None)).unwrap());
        let dropped = start(repo.create(Job::new(request(), None)).unwrap());
        let kept_control = shared.controls.register(kept.id, kept.attempt);
        let dropped_control = shared.controls.register(dropped.id, dropped.attempt);
        kept_control.set_total(10);
        kept_control.simulation_progress().increment();

        let cancelled = Transition::Fail(JobError {
            kind: ErrorKind::Cancelled,
            message: "cancelled".into(),
        });
        repo.transition(dropped.id, Expected::of(&dropped), &cancelled)
            .unwrap()
            .unwrap();

        flush_progress(&shared);
        assert!(dropped_control.is_cancelled());
        assert!(!kept_control.is_cancelled());
        assert_eq!(repo.get(kept.id).unwrap().progress, 10);
    }
}
