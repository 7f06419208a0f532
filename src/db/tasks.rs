//! The `tasks` table, shared with the CRUD layer of MyTâches.
//!
//! Only a handful of fields matter to the reminder engine (`date`,
//! `start_time`, `reminder_minutes`, `status`, `employee_name`,
//! `collaborators`); the rest ride along as mail payload.

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

pub const STATUS_TODO: &str = "À faire";
pub const STATUS_IN_PROGRESS: &str = "En cours";
pub const STATUS_DONE: &str = "Terminé";

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: i64,
    pub employee_name: String,
    pub category: Option<String>,
    pub task_name: String,
    pub status: String,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    /// Minutes before `start_time` at which a reminder should fire.
    /// `None` (or a negative value) disables reminders for the task.
    pub reminder_minutes: Option<i32>,
    pub location: Option<String>,
    pub estimated_duration: Option<String>,
    pub priority: Option<String>,
    pub comment: Option<String>,
    /// Comma-separated names of additional recipients.
    pub collaborators: Option<String>,
}

impl Task {
    pub fn is_done(&self) -> bool {
        self.status == STATUS_DONE
    }

    /// Collaborator names, trimmed, with empty entries discarded.
    pub fn collaborator_names(&self) -> Vec<&str> {
        self.collaborators
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub employee_name: String,
    pub category: Option<String>,
    pub task_name: String,
    pub status: String,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub reminder_minutes: Option<i32>,
    pub location: Option<String>,
    pub estimated_duration: Option<String>,
    pub priority: Option<String>,
    pub comment: Option<String>,
    pub collaborators: Option<String>,
}
