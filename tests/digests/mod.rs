//! Tests for the two daily digest jobs.

use super::db::run_test;
use crate::{sample_employee, sample_task, RecordingNotifier};
use chrono::NaiveDate;
use rappelbot::digests::{evening_summary, morning_nudge};

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[test]
fn morning_nudge_targets_taskless_employees() {
    run_test(|mut connection| async move {
        let today = date("2024-06-03");
        // Alice already recorded a task; Bob did not; Carol has no address;
        // Dave is inactive.
        connection
            .insert_employee(&sample_employee("Alice", Some("alice@exemple.com"), true))
            .await
            .unwrap();
        connection
            .insert_employee(&sample_employee("Bob", Some("bob@exemple.com"), true))
            .await
            .unwrap();
        connection
            .insert_employee(&sample_employee("Carol", None, true))
            .await
            .unwrap();
        connection
            .insert_employee(&sample_employee("Dave", Some("dave@exemple.com"), false))
            .await
            .unwrap();
        connection
            .insert_task(&sample_task("Alice", today, Some("14:00"), None, None))
            .await
            .unwrap();
        // A task on another day does not count for today.
        connection
            .insert_task(&sample_task("Bob", date("2024-06-02"), None, None, None))
            .await
            .unwrap();

        let notifier = RecordingNotifier::default();
        morning_nudge(&mut *connection, &notifier, today)
            .await
            .unwrap();

        let mails = notifier.mails.lock().unwrap();
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].to, "bob@exemple.com");
        assert_eq!(mails[0].subject, "Rappel : Merci de saisir vos tâches du jour");
        assert!(mails[0].body.starts_with("Bonjour Bob,"));
        assert!(!mails[0].html);
    });
}

#[test]
fn evening_summary_lists_the_day() {
    run_test(|mut connection| async move {
        let today = date("2024-06-03");
        connection
            .insert_task(&sample_task("Alice", today, Some("14:00"), None, None))
            .await
            .unwrap();
        connection
            .insert_task(&sample_task("Bob", today, None, None, None))
            .await
            .unwrap();
        // Tomorrow's task stays out of today's table.
        connection
            .insert_task(&sample_task("Carol", date("2024-06-04"), None, None, None))
            .await
            .unwrap();

        let notifier = RecordingNotifier::default();
        evening_summary(&mut *connection, &notifier, "chef@exemple.com", today)
            .await
            .unwrap();

        let mails = notifier.mails.lock().unwrap();
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].to, "chef@exemple.com");
        assert_eq!(mails[0].subject, "Récapitulatif des tâches du 03/06/2024");
        assert!(mails[0].html);
        assert!(mails[0].body.contains("<td>Alice</td>"));
        assert!(mails[0].body.contains("<td>Bob</td>"));
        assert!(!mails[0].body.contains("<td>Carol</td>"));
    });
}

#[test]
fn evening_summary_on_an_empty_day() {
    run_test(|mut connection| async move {
        let notifier = RecordingNotifier::default();
        evening_summary(
            &mut *connection,
            &notifier,
            "chef@exemple.com",
            date("2024-06-03"),
        )
        .await
        .unwrap();

        let mails = notifier.mails.lock().unwrap();
        assert_eq!(mails.len(), 1);
        assert!(mails[0].body.contains("Aucune tâche saisie aujourd'hui."));
    });
}
