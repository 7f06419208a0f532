use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use rappelbot::config::{Config, TIMEZONE};
use rappelbot::db::Pool;
use rappelbot::jobs::{
    JOB_PROCESSING_CADENCE_IN_SECS, JOB_SCHEDULING_CADENCE_IN_SECS, REMINDER_TICK_CADENCE_IN_SECS,
};
use rappelbot::notify::{Notifier, SmtpNotifier};
use rappelbot::reminders::ReminderEngine;
use rappelbot::{jobs, logger, Context};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let config = Config::from_env()?;
    let pool = Pool::open(&config.database_url);
    let notifier: Arc<dyn Notifier> = Arc::new(SmtpNotifier::new(&config.smtp)?);
    let ctx = Arc::new(Context {
        db: pool,
        notifier,
        config,
    });

    info!("rappelbot starting");
    let scheduler = tokio::spawn(run_job_scheduler(ctx.clone()));
    let runner = tokio::spawn(run_job_runner(ctx.clone()));
    let reminders = tokio::spawn(run_reminder_loop(ctx));
    let _ = tokio::try_join!(scheduler, runner, reminders)?;
    Ok(())
}

/// Periodically queues the next occurrence of every cron-defined job.
/// Inserting is idempotent (upsert on name + scheduled_at), so running the
/// pass more often than jobs fire is harmless.
async fn run_job_scheduler(ctx: Arc<Context>) {
    let mut interval =
        tokio::time::interval(Duration::from_secs(JOB_SCHEDULING_CADENCE_IN_SECS));
    loop {
        interval.tick().await;
        if let Err(e) = schedule_jobs(&ctx).await {
            error!("job scheduling pass failed: {:?}", e);
        }
    }
}

async fn schedule_jobs(ctx: &Context) -> Result<()> {
    let mut conn = ctx.db.connection().await;
    for job in jobs::jobs() {
        if let Some(next) = job.schedule.upcoming(TIMEZONE).next() {
            conn.insert_job(job.name, &next.with_timezone(&Utc), &job.metadata)
                .await?;
        }
    }
    Ok(())
}

/// Periodically executes whatever queued jobs are due.
async fn run_job_runner(ctx: Arc<Context>) {
    let mut interval =
        tokio::time::interval(Duration::from_secs(JOB_PROCESSING_CADENCE_IN_SECS));
    loop {
        interval.tick().await;
        if let Err(e) = process_due_jobs(&ctx).await {
            error!("job processing pass failed: {:?}", e);
        }
    }
}

async fn process_due_jobs(ctx: &Context) -> Result<()> {
    let mut conn = ctx.db.connection().await;
    for job in conn.get_jobs_to_execute().await? {
        info!("running job {} scheduled at {}", job.name, job.scheduled_at);
        conn.update_job_executed_at(&job.id).await?;
        match jobs::handle_job(ctx, &job.name, &job.metadata).await {
            Ok(()) => {
                conn.delete_job(&job.id).await?;
            }
            Err(e) => {
                error!("job {} failed: {:?}", job.name, e);
                conn.update_job_error_message(&job.id, &format!("{:?}", e))
                    .await?;
            }
        }
    }
    Ok(())
}

/// The 5-minute reminder tick. A tick never overlaps the previous one:
/// the loop awaits each pass, and a delayed pass just pushes the next
/// tick back.
async fn run_reminder_loop(ctx: Arc<Context>) {
    let mut engine = ReminderEngine::new(
        ctx.notifier.clone(),
        chrono::Duration::seconds(REMINDER_TICK_CADENCE_IN_SECS as i64),
    );
    let mut interval = tokio::time::interval(Duration::from_secs(REMINDER_TICK_CADENCE_IN_SECS));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let mut conn = ctx.db.connection().await;
        let now = Utc::now().with_timezone(&TIMEZONE);
        engine.run_tick(&mut *conn, now).await;
    }
}
