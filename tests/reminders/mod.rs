//! End-to-end tests for the reminder engine: real SQLite store, fake
//! notifier, hand-picked clock values.

use super::db::run_test;
use crate::{sample_employee, sample_task, FailingNotifier, RecordingNotifier};
use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use rappelbot::config::TIMEZONE;
use rappelbot::db::employees::{Employee, NewEmployee};
use rappelbot::db::jobs::Job;
use rappelbot::db::tasks::{NewTask, Task, STATUS_DONE};
use rappelbot::db::Connection;
use rappelbot::reminders::ReminderEngine;
use std::sync::Arc;
use uuid::Uuid;

fn paris(date: &str, time: &str) -> DateTime<Tz> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
    let time = NaiveTime::parse_from_str(time, "%H:%M:%S").unwrap();
    TIMEZONE.from_local_datetime(&date.and_time(time)).unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn tick() -> Duration {
    Duration::minutes(5)
}

#[test]
fn fan_out_and_dedup() {
    run_test(|mut connection| async move {
        connection
            .insert_employee(&sample_employee("Alice", Some("alice@exemple.com"), true))
            .await
            .unwrap();
        connection
            .insert_employee(&sample_employee("Bob", Some("bob@exemple.com"), true))
            .await
            .unwrap();
        // Starts 14:00, lead 30 => due in the tick starting 13:30.
        connection
            .insert_task(&sample_task(
                "Alice",
                date("2024-06-03"),
                Some("14:00"),
                Some(30),
                Some("Bob"),
            ))
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut engine = ReminderEngine::new(notifier.clone(), tick());

        // Before the window: nothing.
        let attempted = engine
            .run_tick(&mut *connection, paris("2024-06-03", "13:25:00"))
            .await;
        assert_eq!(attempted, 0);

        // In the window: assignee plus collaborator.
        let attempted = engine
            .run_tick(&mut *connection, paris("2024-06-03", "13:30:00"))
            .await;
        assert_eq!(attempted, 2);
        {
            let mails = notifier.mails.lock().unwrap();
            let mut to: Vec<_> = mails.iter().map(|m| m.to.as_str()).collect();
            to.sort();
            assert_eq!(to, vec!["alice@exemple.com", "bob@exemple.com"]);
            for mail in mails.iter() {
                assert_eq!(mail.subject, "Rappel : Inventaire à 14:00");
                assert!(mail.body.contains("commence à 14:00"));
                assert!(!mail.html);
            }
            assert!(mails
                .iter()
                .find(|m| m.to == "bob@exemple.com")
                .unwrap()
                .body
                .starts_with("Bonjour Bob,"));
        }

        // Another tick inside the same window: already recorded, no resend.
        let attempted = engine
            .run_tick(&mut *connection, paris("2024-06-03", "13:34:00"))
            .await;
        assert_eq!(attempted, 0);
        assert_eq!(notifier.mails.lock().unwrap().len(), 2);
    });
}

#[test]
fn assignee_and_same_named_collaborator_both_notified() {
    run_test(|mut connection| async move {
        connection
            .insert_employee(&sample_employee("Alice", Some("alice@exemple.com"), true))
            .await
            .unwrap();
        connection
            .insert_task(&sample_task(
                "Alice",
                date("2024-06-03"),
                Some("14:00"),
                Some(30),
                Some("Alice"),
            ))
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut engine = ReminderEngine::new(notifier.clone(), tick());
        let attempted = engine
            .run_tick(&mut *connection, paris("2024-06-03", "13:30:00"))
            .await;
        // The assignee slot and the collaborator slot are distinct.
        assert_eq!(attempted, 2);
        let mails = notifier.mails.lock().unwrap();
        assert!(mails.iter().all(|m| m.to == "alice@exemple.com"));
        assert_eq!(mails.len(), 2);
    });
}

#[test]
fn ineligible_tasks_never_fire() {
    run_test(|mut connection| async move {
        connection
            .insert_employee(&sample_employee("Alice", Some("alice@exemple.com"), true))
            .await
            .unwrap();
        let today = date("2024-06-03");
        // No start time, no lead, negative lead.
        connection
            .insert_task(&sample_task("Alice", today, None, Some(30), None))
            .await
            .unwrap();
        connection
            .insert_task(&sample_task("Alice", today, Some("14:00"), None, None))
            .await
            .unwrap();
        connection
            .insert_task(&sample_task("Alice", today, Some("14:00"), Some(-5), None))
            .await
            .unwrap();
        // Done before the reminder instant.
        let done = connection
            .insert_task(&sample_task("Alice", today, Some("14:00"), Some(30), None))
            .await
            .unwrap();
        connection
            .update_task_status(done.id, STATUS_DONE)
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut engine = ReminderEngine::new(notifier.clone(), tick());
        let attempted = engine
            .run_tick(&mut *connection, paris("2024-06-03", "13:30:00"))
            .await;
        assert_eq!(attempted, 0);
        assert!(notifier.mails.lock().unwrap().is_empty());
    });
}

#[test]
fn task_completed_between_ticks_is_dropped() {
    run_test(|mut connection| async move {
        connection
            .insert_employee(&sample_employee("Alice", Some("alice@exemple.com"), true))
            .await
            .unwrap();
        let task = connection
            .insert_task(&sample_task(
                "Alice",
                date("2024-06-03"),
                Some("14:00"),
                Some(30),
                None,
            ))
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut engine = ReminderEngine::new(notifier.clone(), tick());
        let attempted = engine
            .run_tick(&mut *connection, paris("2024-06-03", "13:25:00"))
            .await;
        assert_eq!(attempted, 0);

        // Marked done before its window opens: the re-read sees the new
        // status and never notifies.
        connection
            .update_task_status(task.id, STATUS_DONE)
            .await
            .unwrap();
        let attempted = engine
            .run_tick(&mut *connection, paris("2024-06-03", "13:30:00"))
            .await;
        assert_eq!(attempted, 0);
        assert!(notifier.mails.lock().unwrap().is_empty());
    });
}

#[test]
fn unreachable_recipients_are_skipped_silently() {
    run_test(|mut connection| async move {
        // "Ghost" has no employee record, "NoMail" has no address.
        connection
            .insert_employee(&sample_employee("NoMail", None, true))
            .await
            .unwrap();
        connection
            .insert_task(&sample_task(
                "Ghost",
                date("2024-06-03"),
                Some("14:00"),
                Some(30),
                Some("NoMail"),
            ))
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut engine = ReminderEngine::new(notifier.clone(), tick());
        let attempted = engine
            .run_tick(&mut *connection, paris("2024-06-03", "13:30:00"))
            .await;
        assert_eq!(attempted, 0);
        assert!(notifier.mails.lock().unwrap().is_empty());
    });
}

#[test]
fn broken_sibling_does_not_block_valid_task() {
    run_test(|mut connection| async move {
        connection
            .insert_employee(&sample_employee("Alice", Some("alice@exemple.com"), true))
            .await
            .unwrap();
        // 2024-03-31 02:30 does not exist in Europe/Paris; this task can
        // never resolve to a reminder instant.
        connection
            .insert_task(&sample_task(
                "Alice",
                date("2024-03-31"),
                Some("02:30"),
                Some(10),
                None,
            ))
            .await
            .unwrap();
        connection
            .insert_task(&sample_task(
                "Alice",
                date("2024-03-31"),
                Some("10:00"),
                Some(30),
                None,
            ))
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut engine = ReminderEngine::new(notifier.clone(), tick());
        let attempted = engine
            .run_tick(&mut *connection, paris("2024-03-31", "09:30:00"))
            .await;
        assert_eq!(attempted, 1);
        assert_eq!(
            notifier.mails.lock().unwrap()[0].to,
            "alice@exemple.com"
        );
    });
}

#[test]
fn failed_delivery_is_not_retried() {
    run_test(|mut connection| async move {
        connection
            .insert_employee(&sample_employee("Alice", Some("alice@exemple.com"), true))
            .await
            .unwrap();
        connection
            .insert_task(&sample_task(
                "Alice",
                date("2024-06-03"),
                Some("14:00"),
                Some(30),
                None,
            ))
            .await
            .unwrap();

        let notifier = Arc::new(FailingNotifier::default());
        let mut engine = ReminderEngine::new(notifier.clone(), tick());
        let attempted = engine
            .run_tick(&mut *connection, paris("2024-06-03", "13:30:00"))
            .await;
        // The attempt is counted and recorded even though delivery failed.
        assert_eq!(attempted, 1);

        let attempted = engine
            .run_tick(&mut *connection, paris("2024-06-03", "13:34:00"))
            .await;
        assert_eq!(attempted, 0);
        assert_eq!(*notifier.attempts.lock().unwrap(), 1);
    });
}

/// Delegates to a real store, except that looking up one employee name
/// always fails.
struct BrokenDirectory {
    inner: Box<dyn Connection>,
    broken_name: &'static str,
}

#[async_trait::async_trait]
impl Connection for BrokenDirectory {
    async fn insert_task(&mut self, task: &NewTask) -> Result<Task> {
        self.inner.insert_task(task).await
    }

    async fn get_tasks_for_date(&mut self, date: NaiveDate) -> Result<Vec<Task>> {
        self.inner.get_tasks_for_date(date).await
    }

    async fn update_task_status(&mut self, id: i64, status: &str) -> Result<()> {
        self.inner.update_task_status(id, status).await
    }

    async fn insert_employee(&mut self, employee: &NewEmployee) -> Result<Employee> {
        self.inner.insert_employee(employee).await
    }

    async fn get_employee_by_name(&mut self, name: &str) -> Result<Option<Employee>> {
        if name == self.broken_name {
            anyhow::bail!("directory unavailable");
        }
        self.inner.get_employee_by_name(name).await
    }

    async fn get_active_employees(&mut self) -> Result<Vec<Employee>> {
        self.inner.get_active_employees().await
    }

    async fn insert_job(
        &mut self,
        name: &str,
        scheduled_at: &DateTime<Utc>,
        metadata: &serde_json::Value,
    ) -> Result<()> {
        self.inner.insert_job(name, scheduled_at, metadata).await
    }

    async fn delete_job(&mut self, id: &Uuid) -> Result<()> {
        self.inner.delete_job(id).await
    }

    async fn update_job_error_message(&mut self, id: &Uuid, message: &str) -> Result<()> {
        self.inner.update_job_error_message(id, message).await
    }

    async fn update_job_executed_at(&mut self, id: &Uuid) -> Result<()> {
        self.inner.update_job_executed_at(id).await
    }

    async fn get_job_by_name_and_scheduled_at(
        &mut self,
        name: &str,
        scheduled_at: &DateTime<Utc>,
    ) -> Result<Job> {
        self.inner
            .get_job_by_name_and_scheduled_at(name, scheduled_at)
            .await
    }

    async fn get_jobs_to_execute(&mut self) -> Result<Vec<Job>> {
        self.inner.get_jobs_to_execute().await
    }
}

#[test]
fn failed_lookup_loses_only_that_recipient() {
    run_test(|connection| async move {
        let mut store = BrokenDirectory {
            inner: connection,
            broken_name: "Alice",
        };
        store
            .insert_employee(&sample_employee("Bob", Some("bob@exemple.com"), true))
            .await
            .unwrap();
        store
            .insert_task(&sample_task(
                "Alice",
                date("2024-06-03"),
                Some("14:00"),
                Some(30),
                Some("Bob"),
            ))
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut engine = ReminderEngine::new(notifier.clone(), tick());
        let attempted = engine
            .run_tick(&mut store, paris("2024-06-03", "13:30:00"))
            .await;
        // The assignee lookup fails; the collaborator is still served.
        assert_eq!(attempted, 1);
        let mails = notifier.mails.lock().unwrap();
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].to, "bob@exemple.com");
    });
}
