//! The `employees` table. The reminder engine only reads it to resolve a
//! task's assignee or collaborator name to a mail address.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Employee {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub active: bool,
}

impl Employee {
    /// The address reminders should go to, if the employee is reachable.
    pub fn notification_address(&self) -> Option<&str> {
        if !self.active {
            return None;
        }
        self.email.as_deref().filter(|email| !email.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct NewEmployee {
    pub name: String,
    pub email: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub active: bool,
}
