//! Durable job status records
//!
//! The repository is the single source of truth for job state. Every status
//! change is a compare-and-set on `(status, attempt)`, so a late writer (a
//! worker finishing after a timeout, a watchdog racing a completion) can never
//! overwrite a newer state.

use jiff::Timestamp;

use crate::error::RepoError;
use crate::model::{Job, JobId, JobOutput, JobStatus, Transition};

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryJobRepository;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteJobRepository;

/// State a job must still be in for a transition to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expected {
    pub status: JobStatus,
    pub attempt: u32,
}

impl Expected {
    #[must_use]
    pub fn of(job: &Job) -> Self {
        Self {
            status: job.status,
            attempt: job.attempt,
        }
    }
}

pub trait JobRepository: Send + Sync {
    /// Store a new job. When the job carries a dedupe key already used by a
    /// stored job, nothing is written and the stored job is returned instead.
    fn create(&self, job: Job) -> Result<Job, RepoError>;

    fn get(&self, id: JobId) -> Result<Job, RepoError>;

    fn find_by_dedupe_key(&self, key: &str) -> Result<Option<Job>, RepoError>;

    /// Apply `transition` if the job is still in the `expected` state.
    ///
    /// Returns the updated job, or `None` when the job has moved on.
    fn transition(
        &self,
        id: JobId,
        expected: Expected,
        transition: &Transition,
    ) -> Result<Option<Job>, RepoError>;

    /// Raise the progress of a running attempt. Lower values are ignored.
    fn record_progress(&self, id: JobId, attempt: u32, progress: u8) -> Result<(), RepoError>;

    /// Store the output of `attempt`. Nothing is written unless the job is
    /// still running that attempt; returns whether the output was stored.
    fn put_result(&self, id: JobId, attempt: u32, output: &JobOutput) -> Result<bool, RepoError>;

    /// Output of a done job, as stored by the attempt that completed it
    fn get_result(&self, id: JobId) -> Result<Option<JobOutput>, RepoError>;

    fn list_running(&self) -> Result<Vec<Job>, RepoError>;
}

/// Shared CAS step: check `expected` and the state machine, then apply
fn apply_checked(job: &mut Job, expected: Expected, transition: &Transition) -> bool {
    if Expected::of(job) != expected || !job.can_apply(transition) {
        return false;
    }
    job.apply(transition, Timestamp::now());
    true
}
