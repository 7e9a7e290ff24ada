use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{JobMessage, JobProgress, JobStatus, StatusUpdate};
use crate::provider;
use crate::queue::{Queue, STATUS_QUEUE, WORK_QUEUE};

/// Consume the work queue forever, one message at a time. A second message
/// is never started before the first is acknowledged.
pub async fn run(config: Config, db: Database, queue: Queue, client: reqwest::Client) {
    info!("Worker consuming queue '{}'", WORK_QUEUE);

    loop {
        match run_once(&config, &db, &queue, &client).await {
            Ok(true) => {}
            Ok(false) => {
                tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
            }
            Err(e) => {
                error!("Failed to process job message: {}", e);
                tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
            }
        }
    }
}

/// Take and process at most one message. Returns whether one was available.
///
/// The message is acknowledged only after the handler returns cleanly; any
/// handler error requeues it, so the whole batch runs again on redelivery.
pub async fn run_once(
    config: &Config,
    db: &Database,
    queue: &Queue,
    client: &reqwest::Client,
) -> Result<bool> {
    let Some(delivery) = queue.receive(WORK_QUEUE)? else {
        return Ok(false);
    };

    let handled: Result<()> = async {
        let message: JobMessage = serde_json::from_str(&delivery.body)?;
        process_job(config, db, queue, client, &message).await
    }
    .await;

    match handled {
        Ok(()) => {
            queue.ack(&delivery)?;
            Ok(true)
        }
        Err(e) => {
            queue.nack(&delivery)?;
            Err(e)
        }
    }
}

async fn process_job(
    config: &Config,
    db: &Database,
    queue: &Queue,
    client: &reqwest::Client,
    message: &JobMessage,
) -> Result<()> {
    let job_id = &message.job_id;

    // A message naming a job we have no record of requeues like any
    // other handler error; only a terminal status is a clean drop
    let job = db
        .get_job(job_id)?
        .ok_or(Error::NotFound("translation job"))?;
    if job.status.is_terminal() {
        info!(
            "Job {} is already {}, dropping message",
            job_id,
            job.status.as_str()
        );
        return Ok(());
    }

    info!(
        "Processing job {} ({} -> {}, {} tasks)",
        job_id,
        message.source_language,
        message.target_language,
        message.translations.len()
    );

    // Display names feed the prompt; resolved once per job, not per task.
    // A missing name fails each task individually rather than the message.
    let names = db.language_names(&message.source_language, &message.target_language)?;
    let source_name = names.get(&message.source_language).cloned();
    let target_name = names.get(&message.target_language).cloned();

    // Restart semantics: completed resets, failed carries over
    db.mark_job_processing(job_id)?;
    publish_status(db, queue, job_id);

    for task in &message.translations {
        // Cancellation is observed here, at task boundaries only
        let current = db.get_job(job_id)?.ok_or(Error::NotFound("translation job"))?;
        if current.status == JobStatus::Failed {
            info!("Job {} was cancelled, abandoning remaining tasks", job_id);
            break;
        }

        let outcome = match (&source_name, &target_name) {
            (Some(source), Some(target)) => {
                provider::translate_text(client, config, &task.source_text, source, target).await
            }
            _ => Err(Error::Provider(
                "source or target language has no display name".to_string(),
            )),
        };

        // Persisting the value is part of the task: a write failure counts
        // against this task, not the whole message
        let outcome = outcome.and_then(|translated| {
            let updated =
                db.set_translation_value(task.id, &message.target_language, &translated)?;
            if !updated {
                warn!(
                    "Translation record {} is gone, counting task '{}' as done anyway",
                    task.id, task.key
                );
            }
            Ok(())
        });

        match outcome {
            Ok(()) => {
                db.increment_completed(job_id)?;
                publish_status(db, queue, job_id);

                if config.task_delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(config.task_delay_ms)).await;
                }
            }
            Err(e) => {
                warn!("Task '{}' in job {} failed: {}", task.key, job_id, e);
                db.increment_failed(job_id)?;
                publish_status(db, queue, job_id);
            }
        }
    }

    finalize_job(db, queue, job_id)
}

/// Settle the job record after the task loop. A cancellation that happened
/// while we worked wins over anything the loop counted.
fn finalize_job(db: &Database, queue: &Queue, job_id: &str) -> Result<()> {
    let job = db
        .get_job(job_id)?
        .ok_or(Error::NotFound("translation job"))?;

    if job.status == JobStatus::Failed {
        info!("Job {} finished as cancelled", job_id);
        return Ok(());
    }

    let JobProgress {
        total,
        completed,
        failed,
    } = job.progress;

    if completed + failed >= total {
        let error = if failed > 0 {
            Some(format!("{} translations failed", failed))
        } else {
            None
        };
        db.finish_job(job_id, JobStatus::Completed, error.as_deref())?;
        publish_status(db, queue, job_id);
        info!(
            "Job {} completed: {} translated, {} failed",
            job_id, completed, failed
        );
    } else {
        warn!(
            "Job {} stopped early ({}/{} tasks accounted for), leaving it processing",
            job_id,
            completed + failed,
            total
        );
    }

    Ok(())
}

/// Best-effort broadcast of the job's current state. A status message is a
/// courtesy for watchers; losing one must never fail the job.
fn publish_status(db: &Database, queue: &Queue, job_id: &str) {
    let update = match db.get_job(job_id) {
        Ok(Some(job)) => StatusUpdate {
            job_id: job.job_id,
            status: job.status,
            progress: job.progress,
        },
        Ok(None) => return,
        Err(e) => {
            warn!("Skipping status broadcast for job {}: {}", job_id, e);
            return;
        }
    };

    if let Err(e) = queue.publish(STATUS_QUEUE, &update, 0) {
        warn!("Failed to broadcast status for job {}: {}", job_id, e);
    }
}
