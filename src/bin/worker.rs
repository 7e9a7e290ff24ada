//! Translation worker binary - consumes the work queue and runs bulk jobs
//!
//! Usage:
//!   cargo run --bin worker
//!
//! Required environment variables:
//! - GROQ_API_KEY
//!
//! Optional:
//! - DATABASE_PATH (defaults to translation_hub.db)
//! - QUEUE_PATH (defaults to translation_queue.db)
//! - TASK_DELAY_MS (defaults to 500)
//! - POLL_INTERVAL_MS (defaults to 1000)
//! - JOB_EXPIRY_MINUTES (defaults to 30, 0 disables the expiry sweep)

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use translation_hub::config::Config;
use translation_hub::db::Database;
use translation_hub::jobs;
use translation_hub::queue::{Queue, WORK_QUEUE};
use translation_hub::worker;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("translation_hub=info".parse()?),
        )
        .init();

    info!("Starting translation worker");

    let config = Config::from_env()?;
    let db = Database::new(&config.database_path)?;
    let queue = Queue::open(&config.queue_path)?;

    // Messages claimed by a previous run that died become ready again
    let recovered = queue.recover_unacked(WORK_QUEUE)?;
    if recovered > 0 {
        info!("Recovered {} unacknowledged work messages", recovered);
    }

    // The handle keeps the sweep alive for the lifetime of the worker
    let _scheduler = if config.job_expiry_minutes > 0 {
        Some(start_expiry_sweep(&db, config.job_expiry_minutes).await?)
    } else {
        None
    };

    let client = reqwest::Client::new();
    worker::run(config, db, queue, client).await;

    Ok(())
}

/// Every five minutes, fail pending jobs that outlived the expiry window.
/// Catches jobs whose work message was lost after submission.
async fn start_expiry_sweep(db: &Database, expiry_minutes: u64) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let db = db.clone();
    let job = Job::new_async("0 */5 * * * *", move |_uuid, _l| {
        let db = db.clone();

        Box::pin(async move {
            if let Err(e) = jobs::expire_stale_jobs(&db, expiry_minutes) {
                error!("Expiry sweep failed: {}", e);
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    info!("✓ Expiry sweep scheduled (window: {} minutes)", expiry_minutes);

    Ok(scheduler)
}
