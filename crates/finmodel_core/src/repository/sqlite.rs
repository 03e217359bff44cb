use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};

use super::{Expected, JobRepository, apply_checked};
use crate::error::RepoError;
use crate::model::{Job, JobId, JobOutput, JobStatus, Transition};

/// SQLite-backed repository. Several orchestrators may share one database file.
///
/// Job records are stored as JSON next to the columns the CAS checks run on;
/// the `progress` column is authoritative for live progress.
pub struct SqliteJobRepository {
    conn: Mutex<Connection>,
}

fn init_db(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            dedupe_key TEXT UNIQUE,
            status TEXT NOT NULL,
            attempt INTEGER NOT NULL,
            progress INTEGER NOT NULL,
            record TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS job_results (
            job_id TEXT PRIMARY KEY,
            attempt INTEGER NOT NULL,
            output TEXT NOT NULL,
            FOREIGN KEY (job_id) REFERENCES jobs(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS jobs_status ON jobs(status)",
        [],
    )?;

    Ok(())
}

fn decode(record: &str, progress: i64) -> Result<Job, RepoError> {
    let mut job: Job = serde_json::from_str(record)?;
    job.progress = u8::try_from(progress.clamp(0, 100)).unwrap_or(100);
    Ok(job)
}

fn load(conn: &Connection, id: JobId) -> Result<Option<Job>, RepoError> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT record, progress FROM jobs WHERE id = ?1",
            [id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    row.map(|(record, progress)| decode(&record, progress))
        .transpose()
}

impl SqliteJobRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, RepoError> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl JobRepository for SqliteJobRepository {
    fn create(&self, job: Job) -> Result<Job, RepoError> {
        let conn = self.conn.lock()?;
        let record = serde_json::to_string(&job)?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO jobs (id, dedupe_key, status, attempt, progress, record, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                job.id.to_string(),
                job.dedupe_key,
                job.status.as_str(),
                job.attempt,
                job.progress,
                record,
                job.created_at.to_string(),
            ],
        )?;
        if inserted == 1 {
            return Ok(job);
        }
        // Ignored: either the dedupe key or the id is taken
        if let Some(key) = &job.dedupe_key
            && let Some(existing) = find_by_key(&conn, key)?
        {
            return Ok(existing);
        }
        Err(RepoError::Duplicate(job.id.to_string()))
    }

    fn get(&self, id: JobId) -> Result<Job, RepoError> {
        let conn = self.conn.lock()?;
        load(&conn, id)?.ok_or_else(|| RepoError::JobNotFound(id.to_string()))
    }

    fn find_by_dedupe_key(&self, key: &str) -> Result<Option<Job>, RepoError> {
        let conn = self.conn.lock()?;
        find_by_key(&conn, key)
    }

    fn transition(
        &self,
        id: JobId,
        expected: Expected,
        transition: &Transition,
    ) -> Result<Option<Job>, RepoError> {
        let conn = self.conn.lock()?;
        let mut job = load(&conn, id)?.ok_or_else(|| RepoError::JobNotFound(id.to_string()))?;
        if !apply_checked(&mut job, expected, transition) {
            return Ok(None);
        }
        let record = serde_json::to_string(&job)?;
        // The WHERE clause is the CAS: another process may have moved the job on
        let updated = conn.execute(
            "UPDATE jobs SET status = ?1, attempt = ?2, progress = ?3, record = ?4
             WHERE id = ?5 AND status = ?6 AND attempt = ?7",
            params![
                job.status.as_str(),
                job.attempt,
                job.progress,
                record,
                id.to_string(),
                expected.status.as_str(),
                expected.attempt,
            ],
        )?;
        Ok((updated == 1).then_some(job))
    }

    fn record_progress(&self, id: JobId, attempt: u32, progress: u8) -> Result<(), RepoError> {
        let conn = self.conn.lock()?;
        conn.execute(
            "UPDATE jobs SET progress = ?1
             WHERE id = ?2 AND status = ?3 AND attempt = ?4 AND progress < ?1",
            params![
                progress.min(100),
                id.to_string(),
                JobStatus::Running.as_str(),
                attempt
            ],
        )?;
        Ok(())
    }

    fn put_result(&self, id: JobId, attempt: u32, output: &JobOutput) -> Result<bool, RepoError> {
        let conn = self.conn.lock()?;
        let output = serde_json::to_string(output)?;
        // Guarded like a transition: only the attempt that is still running writes
        let written = conn.execute(
            "INSERT OR REPLACE INTO job_results (job_id, attempt, output)
             SELECT id, attempt, ?2 FROM jobs WHERE id = ?1 AND status = ?3 AND attempt = ?4",
            params![id.to_string(), output, JobStatus::Running.as_str(), attempt],
        )?;
        if written == 0 && load(&conn, id)?.is_none() {
            return Err(RepoError::JobNotFound(id.to_string()));
        }
        Ok(written == 1)
    }

    fn get_result(&self, id: JobId) -> Result<Option<JobOutput>, RepoError> {
        let conn = self.conn.lock()?;
        let output: Option<String> = conn
            .query_row(
                "SELECT r.output FROM job_results r JOIN jobs j ON j.id = r.job_id
                 WHERE r.job_id = ?1 AND j.status = ?2 AND j.attempt = r.attempt",
                params![id.to_string(), JobStatus::Done.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(output.map(|o| serde_json::from_str(&o)).transpose()?)
    }

    fn list_running(&self) -> Result<Vec<Job>, RepoError> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare("SELECT record, progress FROM jobs WHERE status = ?1")?;
        let rows = stmt.query_map([JobStatus::Running.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut jobs = Vec::new();
        for row in rows {
            let (record, progress) = row?;
            jobs.push(decode(&record, progress)?);
        }
        Ok(jobs)
    }
}

fn find_by_key(conn: &Connection, key: &str) -> Result<Option<Job>, RepoError> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT record, progress FROM jobs WHERE dedupe_key = ?1",
            [key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    row.map(|(record, progress)| decode(&record, progress))
        .transpose()
}
