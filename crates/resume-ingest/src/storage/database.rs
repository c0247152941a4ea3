//! SQLite job store
//!
//! Durable job lifecycle state, per-file results and the keys already
//! written to the result sink. Survives process restarts.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{JobRecord, JobStatus, ParsedResult};

/// Optimistic update attempts before giving up on a contended job row
const MAX_CONFLICT_RETRIES: usize = 5;

const JOB_COLUMNS: &str = "id, folder_reference, status, total_files, processed_files, \
    flushed_files, sink_reference, cancel_requested, created_at, updated_at, completed_at, \
    expires_at, error, sink_error, results_ttl_secs, version";

const RESULT_COLUMNS: &str = "source_file, file_id, name, email, phone, linkedin, github, \
    confidence, ocr_used, attempts, errors_json";

/// SQLite-backed job store
pub struct JobStore {
    conn: Arc<Mutex<Connection>>,
}

impl JobStore {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Internal(format!("Failed to open database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Internal(format!("Failed to open in-memory database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.migrate()?;
        Ok(store)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=5000;
            PRAGMA temp_store=MEMORY;
        "#).map_err(|e| Error::Internal(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                folder_reference TEXT NOT NULL,
                status TEXT NOT NULL,
                total_files INTEGER,
                processed_files INTEGER NOT NULL DEFAULT 0,
                flushed_files INTEGER NOT NULL DEFAULT 0,
                sink_reference TEXT,
                cancel_requested INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT,
                expires_at TEXT,
                error TEXT,
                sink_error TEXT,
                results_ttl_secs INTEGER NOT NULL,
                version INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);
            CREATE INDEX IF NOT EXISTS idx_jobs_expires_at ON jobs(expires_at);

            -- One row per file that reached a terminal attempt
            CREATE TABLE IF NOT EXISTS job_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT NOT NULL,
                result_key TEXT NOT NULL,
                source_file TEXT NOT NULL,
                file_id TEXT,
                name TEXT,
                email TEXT,
                phone TEXT,
                linkedin TEXT,
                github TEXT,
                confidence REAL NOT NULL,
                ocr_used INTEGER NOT NULL,
                attempts INTEGER NOT NULL,
                errors_json TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                UNIQUE(job_id, result_key)
            );

            CREATE INDEX IF NOT EXISTS idx_job_results_job_id ON job_results(job_id);

            -- Keys confirmed written to the sink
            CREATE TABLE IF NOT EXISTS flushed_results (
                job_id TEXT NOT NULL,
                result_key TEXT NOT NULL,
                flushed_at TEXT NOT NULL,
                PRIMARY KEY (job_id, result_key)
            );
        "#).map_err(|e| Error::Internal(format!("Failed to run migrations: {}", e)))?;

        Ok(())
    }

    // ==================== Job Operations ====================

    /// Persist a new job
    pub fn create_job(&self, job: &JobRecord) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            &format!(
                "INSERT INTO jobs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                JOB_COLUMNS
            ),
            params![
                job.id.to_string(),
                job.folder_reference,
                job.status.as_str(),
                job.total_files.map(|n| n as i64),
                job.processed_files as i64,
                job.flushed_files as i64,
                job.sink_reference,
                job.cancel_requested,
                timestamp(job.created_at),
                timestamp(job.updated_at),
                job.completed_at.map(timestamp),
                job.expires_at.map(timestamp),
                job.error,
                job.sink_error,
                i64::try_from(job.results_ttl_secs).unwrap_or(i64::MAX),
                job.version as i64,
            ],
        ).map_err(|e| Error::Internal(format!("Failed to create job: {}", e)))?;

        Ok(())
    }

    /// Get a live job; unknown and expired jobs are `JobNotFound`
    pub fn get_job(&self, job_id: Uuid) -> Result<JobRecord> {
        match self.find_job(job_id)? {
            Some(job) if !job.is_expired(Utc::now()) => Ok(job),
            _ => Err(Error::JobNotFound(job_id.to_string())),
        }
    }

    /// Raw lookup, expired jobs included
    pub fn find_job(&self, job_id: Uuid) -> Result<Option<JobRecord>> {
        let conn = self.conn.lock();
        select_job(&conn, job_id)
    }

    /// Read-modify-write guarded by the caller's view of `version`.
    ///
    /// Fails with `Conflict` if someone else updated the job first.
    pub fn compare_and_update<F>(
        &self,
        job_id: Uuid,
        expected_version: u64,
        mutate: F,
    ) -> Result<JobRecord>
    where
        F: FnOnce(&mut JobRecord) -> Result<()>,
    {
        let mut mutate = Some(mutate);
        self.apply_update(job_id, Some(expected_version), &mut |job| match mutate.take() {
            Some(f) => f(job),
            None => Err(Error::internal("update applied twice")),
        })
    }

    /// Atomic read-modify-write, retried on version conflicts
    pub fn update_job<F>(&self, job_id: Uuid, mut mutate: F) -> Result<JobRecord>
    where
        F: FnMut(&mut JobRecord) -> Result<()>,
    {
        let mut last_err = None;
        for attempt in 1..=MAX_CONFLICT_RETRIES {
            match self.apply_update(job_id, None, &mut mutate) {
                Err(Error::Conflict(msg)) => {
                    tracing::debug!(
                        "[Job {}] Update conflict (attempt {}): {}",
                        job_id,
                        attempt,
                        msg
                    );
                    last_err = Some(Error::Conflict(msg));
                }
                other => return other,
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Conflict(job_id.to_string())))
    }

    fn apply_update(
        &self,
        job_id: Uuid,
        expected_version: Option<u64>,
        mutate: &mut dyn FnMut(&mut JobRecord) -> Result<()>,
    ) -> Result<JobRecord> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::Internal(format!("Failed to begin transaction: {}", e)))?;

        let current = select_job(&tx, job_id)?
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;

        if let Some(expected) = expected_version {
            if current.version != expected {
                return Err(Error::Conflict(format!(
                    "job {} is at version {}, expected {}",
                    job_id, current.version, expected
                )));
            }
        }

        let mut updated = current.clone();
        mutate(&mut updated)?;
        check_invariants(&updated)?;
        updated.version = current.version + 1;
        updated.updated_at = Utc::now();

        let changed = tx.execute(
            r#"
            UPDATE jobs SET
                status = ?3,
                total_files = ?4,
                processed_files = ?5,
                flushed_files = ?6,
                sink_reference = ?7,
                cancel_requested = ?8,
                updated_at = ?9,
                completed_at = ?10,
                expires_at = ?11,
                error = ?12,
                sink_error = ?13,
                results_ttl_secs = ?14,
                version = ?15
            WHERE id = ?1 AND version = ?2
            "#,
            params![
                job_id.to_string(),
                current.version as i64,
                updated.status.as_str(),
                updated.total_files.map(|n| n as i64),
                updated.processed_files as i64,
                updated.flushed_files as i64,
                updated.sink_reference,
                updated.cancel_requested,
                timestamp(updated.updated_at),
                updated.completed_at.map(timestamp),
                updated.expires_at.map(timestamp),
                updated.error,
                updated.sink_error,
                i64::try_from(updated.results_ttl_secs).unwrap_or(i64::MAX),
                updated.version as i64,
            ],
        ).map_err(|e| Error::Internal(format!("Failed to update job: {}", e)))?;

        if changed == 0 {
            return Err(Error::Conflict(format!(
                "job {} changed during update",
                job_id
            )));
        }

        tx.commit()
            .map_err(|e| Error::Internal(format!("Failed to commit transaction: {}", e)))?;

        Ok(updated)
    }

    /// Move a job along its state machine, optionally recording an error
    pub fn transition(
        &self,
        job_id: Uuid,
        next: JobStatus,
        error: Option<String>,
    ) -> Result<JobRecord> {
        self.update_job(job_id, |job| {
            job.transition(next)?;
            if let Some(message) = &error {
                job.error = Some(message.clone());
            }
            Ok(())
        })
    }

    /// Flag a job for cancellation. Terminal jobs are left untouched.
    pub fn request_cancel(&self, job_id: Uuid) -> Result<JobRecord> {
        let job = self.get_job(job_id)?;
        if job.is_terminal() || job.cancel_requested {
            return Ok(job);
        }
        self.update_job(job_id, |job| {
            if !job.is_terminal() {
                job.cancel_requested = true;
            }
            Ok(())
        })
    }

    /// Jobs left pending or processing, oldest first
    pub fn incomplete_jobs(&self) -> Result<Vec<JobRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM jobs WHERE status IN ('pending', 'processing') ORDER BY created_at ASC",
            JOB_COLUMNS
        )).map_err(|e| Error::Internal(format!("Failed to prepare query: {}", e)))?;

        let records = stmt.query_map([], row_to_job_record)
            .map_err(|e| Error::Internal(format!("Failed to list incomplete jobs: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(records)
    }

    /// Most recent live jobs first
    pub fn list_recent(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM jobs WHERE expires_at IS NULL OR expires_at > ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            JOB_COLUMNS
        )).map_err(|e| Error::Internal(format!("Failed to prepare query: {}", e)))?;

        let records = stmt.query_map(params![timestamp(Utc::now()), limit as i64], row_to_job_record)
            .map_err(|e| Error::Internal(format!("Failed to list jobs: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(records)
    }

    /// Delete jobs past their TTL along with their results. Returns jobs removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Internal(format!("Failed to begin transaction: {}", e)))?;

        let cutoff = timestamp(now);
        tx.execute(
            "DELETE FROM job_results WHERE job_id IN (SELECT id FROM jobs WHERE expires_at IS NOT NULL AND expires_at <= ?1)",
            params![cutoff],
        ).map_err(|e| Error::Internal(format!("Failed to purge results: {}", e)))?;
        tx.execute(
            "DELETE FROM flushed_results WHERE job_id IN (SELECT id FROM jobs WHERE expires_at IS NOT NULL AND expires_at <= ?1)",
            params![cutoff],
        ).map_err(|e| Error::Internal(format!("Failed to purge flushed keys: {}", e)))?;
        let count = tx.execute(
            "DELETE FROM jobs WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![cutoff],
        ).map_err(|e| Error::Internal(format!("Failed to purge jobs: {}", e)))?;

        tx.commit()
            .map_err(|e| Error::Internal(format!("Failed to commit transaction: {}", e)))?;

        Ok(count)
    }

    // ==================== Result Operations ====================

    /// Record a terminal file result.
    ///
    /// Returns `false` if the job already holds a result for this key. Only a
    /// new key advances `processed_files`, and never past `total_files`.
    pub fn record_result(&self, job_id: Uuid, result: &ParsedResult) -> Result<bool> {
        let errors_json = serde_json::to_string(&result.errors)?;

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::Internal(format!("Failed to begin transaction: {}", e)))?;

        let exists: Option<i64> = tx
            .query_row("SELECT 1 FROM jobs WHERE id = ?1", params![job_id.to_string()], |row| row.get(0))
            .optional()
            .map_err(|e| Error::Internal(format!("Failed to get job: {}", e)))?;
        if exists.is_none() {
            return Err(Error::JobNotFound(job_id.to_string()));
        }

        let now = timestamp(Utc::now());
        let inserted = tx.execute(
            r#"
            INSERT OR IGNORE INTO job_results (
                job_id, result_key, source_file, file_id, name, email, phone, linkedin, github,
                confidence, ocr_used, attempts, errors_json, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                job_id.to_string(),
                result.result_key(),
                result.source_file,
                result.file_id,
                result.name,
                result.email,
                result.phone,
                result.linkedin,
                result.github,
                result.confidence,
                result.ocr_used,
                result.attempts as i64,
                errors_json,
                now,
            ],
        ).map_err(|e| Error::Internal(format!("Failed to record result: {}", e)))?;

        if inserted > 0 {
            tx.execute(
                r#"
                UPDATE jobs SET
                    processed_files = processed_files + 1,
                    version = version + 1,
                    updated_at = ?2
                WHERE id = ?1 AND total_files IS NOT NULL AND processed_files < total_files
                "#,
                params![job_id.to_string(), now],
            ).map_err(|e| Error::Internal(format!("Failed to update job progress: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| Error::Internal(format!("Failed to commit transaction: {}", e)))?;

        Ok(inserted > 0)
    }

    /// All results recorded for a job, in recording order
    pub fn list_results(&self, job_id: Uuid) -> Result<Vec<ParsedResult>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM job_results WHERE job_id = ?1 ORDER BY id ASC",
            RESULT_COLUMNS
        )).map_err(|e| Error::Internal(format!("Failed to prepare query: {}", e)))?;

        let results = stmt.query_map(params![job_id.to_string()], row_to_parsed_result)
            .map_err(|e| Error::Internal(format!("Failed to list results: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(results)
    }

    pub fn results_count(&self, job_id: Uuid) -> Result<usize> {
        let conn = self.conn.lock();

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM job_results WHERE job_id = ?1",
            params![job_id.to_string()],
            |row| row.get(0),
        ).map_err(|e| Error::Internal(format!("Failed to count results: {}", e)))?;

        Ok(count as usize)
    }

    /// Keys of files that already have a result
    pub fn recorded_keys(&self, job_id: Uuid) -> Result<HashSet<String>> {
        self.keys("SELECT result_key FROM job_results WHERE job_id = ?1", job_id)
    }

    /// Keys already written to the sink
    pub fn flushed_keys(&self, job_id: Uuid) -> Result<HashSet<String>> {
        self.keys("SELECT result_key FROM flushed_results WHERE job_id = ?1", job_id)
    }

    fn keys(&self, sql: &str, job_id: Uuid) -> Result<HashSet<String>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(sql)
            .map_err(|e| Error::Internal(format!("Failed to prepare query: {}", e)))?;

        let keys = stmt.query_map(params![job_id.to_string()], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Internal(format!("Failed to list keys: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(keys)
    }

    /// Mark keys as written to the sink. Returns how many were new.
    pub fn mark_flushed(&self, job_id: Uuid, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::Internal(format!("Failed to begin transaction: {}", e)))?;

        let now = timestamp(Utc::now());
        let mut added = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO flushed_results (job_id, result_key, flushed_at) VALUES (?1, ?2, ?3)"
            ).map_err(|e| Error::Internal(format!("Failed to prepare insert: {}", e)))?;

            for key in keys {
                added += stmt.execute(params![job_id.to_string(), key, now])
                    .map_err(|e| Error::Internal(format!("Failed to mark flushed: {}", e)))?;
            }
        }

        if added > 0 {
            tx.execute(
                "UPDATE jobs SET flushed_files = flushed_files + ?2, version = version + 1, updated_at = ?3 WHERE id = ?1",
                params![job_id.to_string(), added as i64, now],
            ).map_err(|e| Error::Internal(format!("Failed to update job progress: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| Error::Internal(format!("Failed to commit transaction: {}", e)))?;

        Ok(added)
    }
}

fn select_job(conn: &Connection, job_id: Uuid) -> Result<Option<JobRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS))
        .map_err(|e| Error::Internal(format!("Failed to prepare query: {}", e)))?;

    stmt.query_row(params![job_id.to_string()], row_to_job_record)
        .optional()
        .map_err(|e| Error::Internal(format!("Failed to get job: {}", e)))
}

fn check_invariants(job: &JobRecord) -> Result<()> {
    if let Some(total) = job.total_files {
        if job.processed_files > total {
            return Err(Error::InvalidTransition(format!(
                "job {} would have {} processed of {} files",
                job.id, job.processed_files, total
            )));
        }
    }
    if job.status == JobStatus::Completed && !job.all_processed() {
        return Err(Error::InvalidTransition(format!(
            "job {} completed with {}/{:?} files processed",
            job.id, job.processed_files, job.total_files
        )));
    }
    Ok(())
}

/// Fixed-width UTC timestamps so SQL string comparison orders them
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_job_record(row: &rusqlite::Row) -> rusqlite::Result<JobRecord> {
    let id_str: String = row.get(0)?;
    let status_str: String = row.get(2)?;
    let total_files: Option<i64> = row.get(3)?;
    let processed_files: i64 = row.get(4)?;
    let flushed_files: i64 = row.get(5)?;
    let created_at_str: String = row.get(8)?;
    let updated_at_str: String = row.get(9)?;
    let completed_at_str: Option<String> = row.get(10)?;
    let expires_at_str: Option<String> = row.get(11)?;
    let results_ttl_secs: i64 = row.get(14)?;
    let version: i64 = row.get(15)?;

    Ok(JobRecord {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        folder_reference: row.get(1)?,
        status: JobStatus::parse(&status_str).unwrap_or(JobStatus::Failed),
        total_files: total_files.map(|n| n as usize),
        processed_files: processed_files as usize,
        flushed_files: flushed_files as usize,
        sink_reference: row.get(6)?,
        cancel_requested: row.get(7)?,
        created_at: parse_timestamp(&created_at_str),
        updated_at: parse_timestamp(&updated_at_str),
        completed_at: completed_at_str.as_deref().map(parse_timestamp),
        expires_at: expires_at_str.as_deref().map(parse_timestamp),
        error: row.get(12)?,
        sink_error: row.get(13)?,
        results_ttl_secs: u64::try_from(results_ttl_secs).unwrap_or(0),
        version: version.max(0) as u64,
    })
}

fn row_to_parsed_result(row: &rusqlite::Row) -> rusqlite::Result<ParsedResult> {
    let attempts: i64 = row.get(9)?;
    let errors_json: String = row.get(10)?;

    Ok(ParsedResult {
        source_file: row.get(0)?,
        file_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        linkedin: row.get(5)?,
        github: row.get(6)?,
        confidence: row.get(7)?,
        ocr_used: row.get(8)?,
        attempts: attempts.max(0) as u32,
        errors: serde_json::from_str(&errors_json).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandidateFields, FileRef};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn job(ttl_secs: u64) -> JobRecord {
        JobRecord::new("folder-1", None, Duration::from_secs(ttl_secs))
    }

    fn result(name: &str) -> ParsedResult {
        let fields = CandidateFields {
            email: Some(format!("{}@example.com", name)),
            ..Default::default()
        };
        ParsedResult::from_fields(
            format!("{}.pdf", name),
            Some(format!("id-{}", name)),
            fields,
            0.45,
            false,
        )
    }

    fn processing(store: &JobStore, total: usize) -> JobRecord {
        let job = job(3600);
        store.create_job(&job).unwrap();
        store
            .update_job(job.id, |j| {
                j.total_files = Some(total);
                j.transition(JobStatus::Processing)
            })
            .unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let store = JobStore::in_memory().unwrap();
        let job = job(3600);
        store.create_job(&job).unwrap();

        let loaded = store.get_job(job.id).unwrap();
        assert_eq!(loaded.folder_reference, "folder-1");
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.total_files, None);
        assert_eq!(loaded.version, 0);
    }

    #[test]
    fn test_unknown_job() {
        let store = JobStore::in_memory().unwrap();
        assert!(matches!(store.get_job(Uuid::new_v4()), Err(Error::JobNotFound(_))));
        assert!(matches!(
            store.update_job(Uuid::new_v4(), |_| Ok(())),
            Err(Error::JobNotFound(_))
        ));
    }

    #[test]
    fn test_compare_and_update_conflict() {
        let store = JobStore::in_memory().unwrap();
        let job = job(3600);
        store.create_job(&job).unwrap();

        let updated = store
            .compare_and_update(job.id, 0, |j| {
                j.sink_reference = Some("sheet-1".into());
                Ok(())
            })
            .unwrap();
        assert_eq!(updated.version, 1);

        let stale = store.compare_and_update(job.id, 0, |j| {
            j.sink_reference = Some("sheet-2".into());
            Ok(())
        });
        assert!(matches!(stale, Err(Error::Conflict(_))));
        assert_eq!(store.get_job(job.id).unwrap().sink_reference.as_deref(), Some("sheet-1"));
    }

    #[test]
    fn test_invariants_enforced() {
        let store = JobStore::in_memory().unwrap();
        let job = processing(&store, 1);

        let over = store.update_job(job.id, |j| {
            j.processed_files = 2;
            Ok(())
        });
        assert!(matches!(over, Err(Error::InvalidTransition(_))));

        let early = store.transition(job.id, JobStatus::Completed, None);
        assert!(matches!(early, Err(Error::InvalidTransition(_))));
        assert_eq!(store.get_job(job.id).unwrap().status, JobStatus::Processing);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let store = JobStore::in_memory().unwrap();
        let job = job(3600);
        store.create_job(&job).unwrap();
        store.transition(job.id, JobStatus::Failed, Some("listing failed".into())).unwrap();

        assert!(store.transition(job.id, JobStatus::Processing, None).is_err());
        let loaded = store.get_job(job.id).unwrap();
        assert_eq!(loaded.error.as_deref(), Some("listing failed"));
        assert!(loaded.completed_at.is_some());
    }

    #[test]
    fn test_record_result_is_idempotent() {
        let store = JobStore::in_memory().unwrap();
        let job = processing(&store, 2);

        assert!(store.record_result(job.id, &result("a")).unwrap());
        assert!(!store.record_result(job.id, &result("a")).unwrap());
        assert!(store.record_result(job.id, &result("b")).unwrap());

        let loaded = store.get_job(job.id).unwrap();
        assert_eq!(loaded.processed_files, 2);
        assert_eq!(store.results_count(job.id).unwrap(), 2);

        // Never past total
        assert!(store.record_result(job.id, &result("c")).unwrap());
        assert_eq!(store.get_job(job.id).unwrap().processed_files, 2);
    }

    #[test]
    fn test_results_round_trip() {
        let store = JobStore::in_memory().unwrap();
        let job = processing(&store, 2);
        let failed = ParsedResult::failed(
            &FileRef::new("id-x", "x.pdf"),
            4,
            vec!["Timed out: x.pdf".to_string(); 4],
        );

        store.record_result(job.id, &result("a")).unwrap();
        store.record_result(job.id, &failed).unwrap();

        let results = store.list_results(job.id).unwrap();
        assert_eq!(results, vec![result("a"), failed]);
        assert_eq!(
            store.recorded_keys(job.id).unwrap(),
            HashSet::from(["id-a".to_string(), "id-x".to_string()])
        );
    }

    #[test]
    fn test_mark_flushed_counts_new_keys() {
        let store = JobStore::in_memory().unwrap();
        let job = processing(&store, 3);

        let keys = vec!["id-a".to_string(), "id-b".to_string()];
        assert_eq!(store.mark_flushed(job.id, &keys).unwrap(), 2);
        assert_eq!(store.mark_flushed(job.id, &keys).unwrap(), 0);

        assert_eq!(store.get_job(job.id).unwrap().flushed_files, 2);
        assert_eq!(store.flushed_keys(job.id).unwrap().len(), 2);
    }

    #[test]
    fn test_cancel_request() {
        let store = JobStore::in_memory().unwrap();
        let job = processing(&store, 1);
        assert!(store.request_cancel(job.id).unwrap().cancel_requested);

        let done = self::job(3600);
        store.create_job(&done).unwrap();
        store.transition(done.id, JobStatus::Cancelled, None).unwrap();
        let unchanged = store.request_cancel(done.id).unwrap();
        assert!(!unchanged.cancel_requested);
    }

    #[test]
    fn test_expired_jobs_hidden_and_purged() {
        let store = JobStore::in_memory().unwrap();
        let job = processing(&store, 1);
        store.record_result(job.id, &result("a")).unwrap();
        store.mark_flushed(job.id, &["id-a".to_string()]).unwrap();
        store
            .update_job(job.id, |j| {
                j.results_ttl_secs = 0;
                j.transition(JobStatus::Completed)
            })
            .unwrap();

        assert!(matches!(store.get_job(job.id), Err(Error::JobNotFound(_))));
        assert!(store.list_recent(10).unwrap().is_empty());

        let purged = store.purge_expired(Utc::now() + chrono::Duration::seconds(1)).unwrap();
        assert_eq!(purged, 1);
        assert!(store.find_job(job.id).unwrap().is_none());
        assert_eq!(store.results_count(job.id).unwrap(), 0);
        assert!(store.flushed_keys(job.id).unwrap().is_empty());
    }

    #[test]
    fn test_live_jobs_survive_purge() {
        let store = JobStore::in_memory().unwrap();
        let job = processing(&store, 0);
        store.transition(job.id, JobStatus::Completed, None).unwrap();

        assert_eq!(store.purge_expired(Utc::now()).unwrap(), 0);
        assert!(store.get_job(job.id).is_ok());
    }

    #[test]
    fn test_oversized_ttl_is_not_read_back_as_expired() {
        let store = JobStore::in_memory().unwrap();
        let job = job(u64::MAX);
        store.create_job(&job).unwrap();
        assert_eq!(store.get_job(job.id).unwrap().results_ttl_secs, i64::MAX as u64);

        store.transition(job.id, JobStatus::Failed, Some("boom".into())).unwrap();
        assert_eq!(store.purge_expired(Utc::now()).unwrap(), 0);
        let loaded = store.get_job(job.id).unwrap();
        assert_eq!(loaded.status, JobStatus::Failed);
        assert_eq!(loaded.expires_at, None);
    }

    #[test]
    fn test_recent_and_incomplete() {
        let store = JobStore::in_memory().unwrap();
        let first = job(3600);
        let second = job(3600);
        store.create_job(&first).unwrap();
        store.create_job(&second).unwrap();
        store.transition(first.id, JobStatus::Failed, Some("boom".into())).unwrap();

        let recent: Vec<Uuid> = store.list_recent(10).unwrap().iter().map(|j| j.id).collect();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0], second.id);

        let incomplete: Vec<Uuid> = store.incomplete_jobs().unwrap().iter().map(|j| j.id).collect();
        assert_eq!(incomplete, vec![second.id]);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("jobs.db");
        let job = job(3600);

        {
            let store = JobStore::new(&path).unwrap();
            store.create_job(&job).unwrap();
            store.update_job(job.id, |j| {
                j.total_files = Some(1);
                j.transition(JobStatus::Processing)
            }).unwrap();
            store.record_result(job.id, &result("a")).unwrap();
        }

        let reopened = JobStore::new(&path).unwrap();
        let loaded = reopened.get_job(job.id).unwrap();
        assert_eq!(loaded.status, JobStatus::Processing);
        assert_eq!(loaded.processed_files, 1);
        assert_eq!(reopened.list_results(job.id).unwrap(), vec![result("a")]);
    }
}
