//! The reminder engine.
//!
//! Every tick (5 minutes) the engine re-reads today's tasks and decides, per
//! task and per recipient, whether a reminder email is due right now. A task
//! is due when the current tick is the one containing its reminder instant
//! (`start_time - reminder_minutes`), i.e. when
//! `0 <= now - reminder_instant < tick_period`. The window is half-open and
//! exactly one tick long, so each task is due in exactly one tick under
//! regular timer operation.
//!
//! Each (task, lead, recipient) triple is notified at most once per process
//! lifetime: a key is recorded the moment a dispatch is attempted, whether or
//! not delivery succeeds. The set is in-memory only; a restart re-arms
//! reminders whose window has not yet passed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone};
use chrono_tz::Tz;
use tracing::{debug, error, info, warn};

use crate::config::TIMEZONE;
use crate::db::tasks::Task;
use crate::db::Connection;
use crate::notify::Notifier;

/// Bound on every task-store and notifier call, so a hung collaborator
/// cannot stall the tick loop.
pub const COLLABORATOR_CALL_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// Identity of a dispatched reminder. `collaborator` is `None` for the
/// task's assignee.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SentKey {
    task_id: i64,
    lead_minutes: i32,
    collaborator: Option<String>,
}

pub struct ReminderEngine {
    notifier: Arc<dyn Notifier>,
    tick_period: Duration,
    sent: HashSet<SentKey>,
}

impl ReminderEngine {
    pub fn new(notifier: Arc<dyn Notifier>, tick_period: Duration) -> Self {
        ReminderEngine {
            notifier,
            tick_period,
            sent: HashSet::new(),
        }
    }

    /// Runs one evaluation pass over all of today's tasks. Returns the
    /// number of dispatch attempts made.
    ///
    /// Failures are contained: a store failure ends the tick early, and a
    /// failed lookup or delivery is isolated to its own recipient.
    pub async fn run_tick(&mut self, conn: &mut dyn Connection, now: DateTime<Tz>) -> usize {
        let today = now.date_naive();
        let tasks = match tokio::time::timeout(
            COLLABORATOR_CALL_TIMEOUT,
            conn.get_tasks_for_date(today),
        )
        .await
        {
            Err(_) => {
                error!("task store query timed out, skipping tick");
                return 0;
            }
            Ok(Err(e)) => {
                error!("failed to fetch tasks for {}: {:?}", today, e);
                return 0;
            }
            Ok(Ok(tasks)) => tasks,
        };

        let mut attempted = 0;
        for task in &tasks {
            attempted += self.process_task(conn, task, now).await;
        }
        if attempted > 0 {
            info!("reminder tick dispatched {} notification(s)", attempted);
        }
        attempted
    }

    async fn process_task(
        &mut self,
        conn: &mut dyn Connection,
        task: &Task,
        now: DateTime<Tz>,
    ) -> usize {
        let Some(instant) = reminder_instant(task) else {
            return 0;
        };
        if !is_due(instant, now, self.tick_period) {
            return 0;
        }

        // Lead was validated by reminder_instant().
        let lead_minutes = task.reminder_minutes.unwrap_or(0);

        let mut recipients = vec![(task.employee_name.as_str(), None)];
        for name in task.collaborator_names() {
            recipients.push((name, Some(name.to_string())));
        }

        let mut attempted = 0;
        for (name, collaborator) in recipients {
            let key = SentKey {
                task_id: task.id,
                lead_minutes,
                collaborator,
            };
            if self.sent.contains(&key) {
                continue;
            }

            // A broken directory call only loses this recipient; the key is
            // not recorded since nothing was attempted.
            let employee = match tokio::time::timeout(
                COLLABORATOR_CALL_TIMEOUT,
                conn.get_employee_by_name(name),
            )
            .await
            {
                Err(_) => {
                    warn!("task {}: lookup of \"{}\" timed out", task.id, name);
                    continue;
                }
                Ok(Err(e)) => {
                    warn!("task {}: lookup of \"{}\" failed: {:?}", task.id, name, e);
                    continue;
                }
                Ok(Ok(employee)) => employee,
            };

            let Some(address) = employee
                .as_ref()
                .and_then(|employee| employee.notification_address())
            else {
                debug!(
                    "task {}: no reachable address for \"{}\", skipping",
                    task.id, name
                );
                continue;
            };

            let (subject, body) = reminder_mail(task, name);
            match tokio::time::timeout(
                COLLABORATOR_CALL_TIMEOUT,
                self.notifier.send(address, &subject, &body),
            )
            .await
            {
                Err(_) => warn!("task {}: reminder to {} timed out", task.id, address),
                Ok(Err(e)) => warn!("task {}: reminder to {} failed: {:?}", task.id, address, e),
                Ok(Ok(())) => debug!("task {}: reminder sent to {}", task.id, address),
            }
            // The attempt counts, delivered or not: no retry on a later
            // tick for this key.
            self.sent.insert(key);
            attempted += 1;
        }
        attempted
    }
}

/// The wall-clock point the reminder should fire at, or `None` when the
/// task is not reminder-eligible (no start time, no usable lead, done, or
/// a local time that does not exist in Europe/Paris).
fn reminder_instant(task: &Task) -> Option<DateTime<Tz>> {
    let start_time = task.start_time?;
    let lead = task.reminder_minutes?;
    if lead < 0 || task.is_done() {
        return None;
    }
    let start = TIMEZONE
        .from_local_datetime(&task.date.and_time(start_time))
        .single()?;
    Some(start - Duration::minutes(i64::from(lead)))
}

/// Half-open window: due on the single tick where
/// `0 <= now - instant < tick_period`.
fn is_due(instant: DateTime<Tz>, now: DateTime<Tz>, tick_period: Duration) -> bool {
    let elapsed = now.signed_duration_since(instant);
    elapsed >= Duration::zero() && elapsed < tick_period
}

fn reminder_mail(task: &Task, recipient_name: &str) -> (String, String) {
    // start_time is present for every due task.
    let start = task
        .start_time
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default();
    let subject = format!("Rappel : {} à {}", task.task_name, start);
    let mut body = format!(
        "Bonjour {},\n\nRappel : la tâche \"{}\" commence à {}",
        recipient_name, task.task_name, start
    );
    if let Some(location) = task.location.as_deref().filter(|l| !l.is_empty()) {
        body.push_str(&format!(" ({})", location));
    }
    body.push_str(".\n\nMyTâches");
    (subject, body)
}
