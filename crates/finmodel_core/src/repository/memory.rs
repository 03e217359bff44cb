use std::sync::Mutex;

use rustc_hash::FxHashMap;

use super::{Expected, JobRepository, apply_checked};
use crate::error::RepoError;
use crate::model::{Job, JobId, JobOutput, JobStatus, Transition};

#[derive(Debug, Default)]
struct Inner {
    jobs: FxHashMap<JobId, Job>,
    dedupe: FxHashMap<String, JobId>,
    /// Output and the attempt that produced it
    results: FxHashMap<JobId, (u32, JobOutput)>,
}

/// Process-local repository
#[derive(Debug, Default)]
pub struct MemoryJobRepository {
    inner: Mutex<Inner>,
}

impl MemoryJobRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobRepository for MemoryJobRepository {
    fn create(&self, job: Job) -> Result<Job, RepoError> {
        let mut inner = self.inner.lock()?;
        if let Some(key) = &job.dedupe_key
            && let Some(existing) = inner.dedupe.get(key).and_then(|id| inner.jobs.get(id))
        {
            return Ok(existing.clone());
        }
        if inner.jobs.contains_key(&job.id) {
            return Err(RepoError::Duplicate(job.id.to_string()));
        }
        if let Some(key) = &job.dedupe_key {
            inner.dedupe.insert(key.clone(), job.id);
        }
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn get(&self, id: JobId) -> Result<Job, RepoError> {
        self.inner
            .lock()?
            .jobs
            .get(&id)
            .cloned()
            .ok_or_else(|| RepoError::JobNotFound(id.to_string()))
    }

    fn find_by_dedupe_key(&self, key: &str) -> Result<Option<Job>, RepoError> {
        let inner = self.inner.lock()?;
        Ok(inner
            .dedupe
            .get(key)
            .and_then(|id| inner.jobs.get(id))
            .cloned())
    }

    fn transition(
        &self,
        id: JobId,
        expected: Expected,
        transition: &Transition,
    ) -> Result<Option<Job>, RepoError> {
        let mut inner = self.inner.lock()?;
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| RepoError::JobNotFound(id.to_string()))?;
        Ok(apply_checked(job, expected, transition).then(|| job.clone()))
    }

    fn record_progress(&self, id: JobId, attempt: u32, progress: u8) -> Result<(), RepoError> {
        let mut inner = self.inner.lock()?;
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| RepoError::JobNotFound(id.to_string()))?;
        if job.status == JobStatus::Running && job.attempt == attempt {
            job.progress = job.progress.max(progress.min(100));
        }
        Ok(())
    }

    fn put_result(&self, id: JobId, attempt: u32, output: &JobOutput) -> Result<bool, RepoError> {
        let mut inner = self.inner.lock()?;
        let job = inner
            .jobs
            .get(&id)
            .ok_or_else(|| RepoError::JobNotFound(id.to_string()))?;
        if job.status != JobStatus::Running || job.attempt != attempt {
            return Ok(false);
        }
        inner.results.insert(id, (attempt, output.clone()));
        Ok(true)
    }

    fn get_result(&self, id: JobId) -> Result<Option<JobOutput>, RepoError> {
        let inner = self.inner.lock()?;
        let Some(job) = inner.jobs.get(&id) else {
            return Ok(None);
        };
        Ok(inner
            .results
            .get(&id)
            .filter(|(attempt, _)| job.status == JobStatus::Done && job.attempt == *attempt)
            .map(|(_, output)| output.clone()))
    }

    fn list_running(&self) -> Result<Vec<Job>, RepoError> {
        Ok(self
            .inner
            .lock()?
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Running)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_repository_contract() {
        super::super::tests::exercise(&MemoryJobRepository::new());
    }
}
