#![allow(clippy::new_without_default)]

use std::sync::Arc;

pub mod config;
pub mod db;
pub mod digests;
pub mod jobs;
pub mod logger;
pub mod notify;
pub mod reminders;

/// Shared state handed to the job runner and the reminder loop.
pub struct Context {
    pub db: db::Pool,
    pub notifier: Arc<dyn notify::Notifier>,
    pub config: config::Config,
}
