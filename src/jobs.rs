//! SCHEDULED JOBS
//!
//! The fixed-time daily jobs are defined here as cron schedules, evaluated
//! in Europe/Paris. A scheduler pass queues the next occurrence of each one
//! in the `jobs` table; the runner pass executes whatever is due and
//! dispatches on the job name through [`handle_job`].
//!
//! The 5-minute reminder tick is NOT one of these jobs: it owns mutable
//! dedup state and must never overlap itself, so it runs on its own
//! interval loop in `main`.

use std::str::FromStr;

use chrono::Utc;
use cron::Schedule;
use tracing::trace;

use crate::config::TIMEZONE;
use crate::db::jobs::JobSchedule;
use crate::{digests, Context};

// How often new cron-based jobs will be placed in the queue.
// This is the minimum period *between* a single cron task's executions.
pub const JOB_SCHEDULING_CADENCE_IN_SECS: u64 = 1800;

// How often the database is inspected for jobs which need to execute.
// This is the granularity at which events will occur.
pub const JOB_PROCESSING_CADENCE_IN_SECS: u64 = 60;

// How often the reminder engine re-scans today's tasks. Also the length of
// the due window, so each reminder instant lands in exactly one tick.
pub const REMINDER_TICK_CADENCE_IN_SECS: u64 = 300;

pub const MORNING_NUDGE_JOB: &str = "morning_nudge";
pub const EVENING_SUMMARY_JOB: &str = "evening_summary";

pub fn jobs() -> Vec<JobSchedule> {
    vec![
        JobSchedule {
            name: MORNING_NUDGE_JOB,
            // 09:00 Europe/Paris, every day
            schedule: Schedule::from_str("0 0 9 * * * *").unwrap(),
            metadata: serde_json::json!({}),
        },
        JobSchedule {
            name: EVENING_SUMMARY_JOB,
            // 18:00 Europe/Paris, every day
            schedule: Schedule::from_str("0 0 18 * * * *").unwrap(),
            metadata: serde_json::json!({}),
        },
    ]
}

pub async fn handle_job(
    ctx: &Context,
    name: &str,
    metadata: &serde_json::Value,
) -> anyhow::Result<()> {
    let today = Utc::now().with_timezone(&TIMEZONE).date_naive();
    match name {
        MORNING_NUDGE_JOB => {
            let mut conn = ctx.db.connection().await;
            digests::morning_nudge(&mut *conn, &*ctx.notifier, today).await
        }
        EVENING_SUMMARY_JOB => {
            let mut conn = ctx.db.connection().await;
            digests::evening_summary(&mut *conn, &*ctx.notifier, &ctx.config.boss_email, today)
                .await
        }
        _ => default(name, metadata),
    }
}

fn default(name: &str, metadata: &serde_json::Value) -> anyhow::Result<()> {
    trace!(
        "handle_job fell into default case: (name={:?}, metadata={:?})",
        name,
        metadata
    );

    Ok(())
}
