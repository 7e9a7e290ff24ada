use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{JobMessage, JobProgress, JobStatus, TranslationJob, TranslationTask};
use crate::queue::{Queue, WORK_QUEUE};

/// Jobs returned per history request; also the hard cap on the limit param.
const HISTORY_LIMIT: u32 = 10;

/// Dry-run result: the tasks a bulk job would create, filtered to records
/// still missing the target value.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPreview {
    pub tasks: Vec<TranslationTask>,
    pub total: usize,
}

fn validate_language_pair(db: &Database, source: &str, target: &str) -> Result<()> {
    if source == target {
        return Err(Error::InvalidLanguage(
            "source and target languages must be different".to_string(),
        ));
    }

    let pair = db.active_language_pair(source, target)?;
    if pair.len() != 2 {
        return Err(Error::InvalidLanguage(
            "one or both languages do not exist or are not active".to_string(),
        ));
    }

    Ok(())
}

/// Preview a bulk run without creating anything. Unlike submission, this
/// skips records that already carry a target value.
pub fn prepare_bulk_job(db: &Database, source: &str, target: &str) -> Result<JobPreview> {
    validate_language_pair(db, source, target)?;

    let tasks = db.translations_missing_target(source, target)?;
    let total = tasks.len();

    Ok(JobPreview { tasks, total })
}

/// Create a bulk translation job: persist a pending record, then publish the
/// full task list as one work-queue message.
///
/// The record write and the publish are two separate operations. A crash
/// between them leaves a pending job no worker will ever pick up; the expiry
/// sweep exists to fail those (`expire_stale_jobs`).
pub fn submit_bulk_job(
    db: &Database,
    queue: &Queue,
    source: &str,
    target: &str,
) -> Result<TranslationJob> {
    validate_language_pair(db, source, target)?;

    let tasks = db.translations_with_source_value(source)?;
    if tasks.is_empty() {
        return Err(Error::NoWorkAvailable);
    }

    let now = Utc::now();
    let job = TranslationJob {
        job_id: Uuid::new_v4().to_string(),
        source_language: source.to_string(),
        target_language: target.to_string(),
        status: JobStatus::Pending,
        progress: JobProgress {
            total: tasks.len() as u32,
            completed: 0,
            failed: 0,
        },
        error: None,
        created_at: now,
        updated_at: now,
    };
    db.insert_job(&job)?;

    let message = JobMessage {
        job_id: job.job_id.clone(),
        source_language: source.to_string(),
        target_language: target.to_string(),
        translations: tasks,
    };
    queue.publish(WORK_QUEUE, &message, 0)?;

    info!(
        "Submitted translation job {} ({} -> {}, {} tasks)",
        job.job_id, source, target, job.progress.total
    );

    Ok(job)
}

pub fn get_job(db: &Database, job_id: &str) -> Result<TranslationJob> {
    db.get_job(job_id)?.ok_or(Error::NotFound("translation job"))
}

/// Cancel a pending or processing job. The worker notices the status flip at
/// its next task boundary; a provider call already in flight still finishes.
pub fn cancel_job(db: &Database, job_id: &str) -> Result<TranslationJob> {
    let job = get_job(db, job_id)?;

    if !db.cancel_job(job_id)? {
        return Err(Error::InvalidState(format!(
            "job is already {} and cannot be cancelled",
            job.status.as_str()
        )));
    }

    info!("Cancelled translation job {}", job_id);
    get_job(db, job_id)
}

/// Most recent jobs, newest first.
pub fn recent_jobs(db: &Database, limit: Option<u32>) -> Result<Vec<TranslationJob>> {
    let limit = limit.unwrap_or(HISTORY_LIMIT).min(HISTORY_LIMIT);
    db.list_recent_jobs(limit)
}

/// Fail pending jobs that have sat untouched longer than the expiry window.
/// Run periodically; a zero window means the sweep is disabled.
pub fn expire_stale_jobs(db: &Database, older_than_minutes: u64) -> Result<usize> {
    if older_than_minutes == 0 {
        return Ok(0);
    }

    let expired = db.expire_stale_pending(older_than_minutes)?;
    if expired > 0 {
        warn!("Expired {} stale pending translation jobs", expired);
    }

    Ok(expired)
}
