//! The `jobs` table provides a queue for the scheduled daily jobs.
//!
//! A scheduler pass inserts the next occurrence of every cron-defined job
//! (see `crate::jobs::jobs()`); a runner pass picks up the ones whose
//! `scheduled_at` has passed and executes them.

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A cron-defined recurring job, as declared in code.
pub struct JobSchedule {
    pub name: &'static str,
    pub schedule: Schedule,
    pub metadata: serde_json::Value,
}

/// A single queued occurrence of a job, as stored in the database.
#[derive(Serialize, Deserialize, Debug)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub scheduled_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
    pub executed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}
