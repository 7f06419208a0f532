//! The two fixed-time daily jobs: the 09:00 "please enter your tasks" nudge
//! and the 18:00 summary of the day sent to the boss.
//!
//! Both are plain read-format-send passes with no windowing or dedup; the
//! job queue (`jobs` table) guarantees each runs once per day.

use anyhow::{Context as _, Result};
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::db::tasks::Task;
use crate::db::Connection;
use crate::notify::Notifier;

/// Nudges every active employee who has not recorded any task for `today`.
pub async fn morning_nudge(
    conn: &mut dyn Connection,
    notifier: &dyn Notifier,
    today: NaiveDate,
) -> Result<()> {
    let tasks = conn
        .get_tasks_for_date(today)
        .await
        .context("fetching today's tasks")?;
    let employees = conn
        .get_active_employees()
        .await
        .context("fetching active employees")?;

    let mut nudged = 0;
    for employee in &employees {
        let Some(address) = employee.notification_address() else {
            debug!("no address for {}, skipping nudge", employee.name);
            continue;
        };
        if tasks.iter().any(|task| task.employee_name == employee.name) {
            continue;
        }
        notifier
            .send(
                address,
                "Rappel : Merci de saisir vos tâches du jour",
                &format!(
                    "Bonjour {},\n\nMerci de saisir vos tâches du jour sur MyTâches.",
                    employee.name
                ),
            )
            .await
            .with_context(|| format!("nudging {}", employee.name))?;
        nudged += 1;
    }
    info!("morning nudge sent to {} employee(s)", nudged);
    Ok(())
}

/// Sends the day's task table to the boss.
pub async fn evening_summary(
    conn: &mut dyn Connection,
    notifier: &dyn Notifier,
    boss_email: &str,
    today: NaiveDate,
) -> Result<()> {
    let tasks = conn
        .get_tasks_for_date(today)
        .await
        .context("fetching today's tasks")?;

    let subject = format!("Récapitulatif des tâches du {}", today.format("%d/%m/%Y"));
    notifier
        .send_html(boss_email, &subject, &summary_html(today, &tasks))
        .await
        .context("sending evening summary")?;
    info!("evening summary sent ({} task(s))", tasks.len());
    Ok(())
}

pub fn summary_html(date: NaiveDate, tasks: &[Task]) -> String {
    let mut html = format!(
        "<h2>Récapitulatif des tâches du {}</h2>",
        date.format("%d/%m/%Y")
    );
    if tasks.is_empty() {
        html.push_str("<p>Aucune tâche saisie aujourd'hui.</p>");
        return html;
    }
    html.push_str(
        "<table border=\"1\" cellpadding=\"4\" cellspacing=\"0\">\
            <tr><th>Employé</th><th>Catégorie</th><th>Tâche</th>\
            <th>Statut</th><th>Heure</th></tr>",
    );
    for task in tasks {
        let start = task
            .start_time
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_default();
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            task.employee_name,
            task.category.as_deref().unwrap_or(""),
            task.task_name,
            task.status,
            start,
        ));
    }
    html.push_str("</table>");
    html
}
