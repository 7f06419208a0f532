use crate::db::employees::{Employee, NewEmployee};
use crate::db::jobs::Job;
use crate::db::tasks::{NewTask, Task};
use crate::db::{Connection, ConnectionManager, ManagedConnection};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::params;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::Once;
use tracing::trace;
use uuid::Uuid;

pub struct Sqlite(PathBuf, Once);

impl Sqlite {
    pub fn new(path: PathBuf) -> Self {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).unwrap();
            }
        }
        Sqlite(path, Once::new())
    }
}

static MIGRATIONS: &[&str] = &[
    "",
    r#"
CREATE TABLE tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    employee_name TEXT NOT NULL,
    category TEXT,
    task_name TEXT NOT NULL,
    status TEXT NOT NULL,
    date TEXT NOT NULL,
    start_time TEXT,
    reminder_minutes INTEGER,
    location TEXT,
    estimated_duration TEXT,
    priority TEXT,
    comment TEXT,
    collaborators TEXT
);
    "#,
    "CREATE INDEX tasks_date_index ON tasks (date);",
    r#"
CREATE TABLE employees (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    name TEXT NOT NULL UNIQUE,
    email TEXT,
    department TEXT,
    position TEXT,
    active BOOLEAN NOT NULL DEFAULT TRUE
);
    "#,
    r#"
CREATE TABLE jobs (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    scheduled_at TIMESTAMP WITH TIME ZONE NOT NULL,
    metadata JSONB,
    executed_at TIMESTAMP WITH TIME ZONE,
    error_message TEXT
);
    "#,
    r#"
CREATE UNIQUE INDEX jobs_name_scheduled_at_unique_index
    ON jobs (
        name, scheduled_at
    );
    "#,
];

#[async_trait::async_trait]
impl ConnectionManager for Sqlite {
    type Connection = Mutex<rusqlite::Connection>;
    async fn open(&self) -> Self::Connection {
        let mut conn = rusqlite::Connection::open(&self.0).unwrap();
        conn.pragma_update(None, "cache_size", -128000).unwrap();
        conn.pragma_update(None, "journal_mode", "WAL").unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();

        self.1.call_once(|| {
            let version: i32 = conn
                .query_row(
                    "select user_version from pragma_user_version;",
                    params![],
                    |row| row.get(0),
                )
                .unwrap();
            for mid in (version as usize + 1)..MIGRATIONS.len() {
                let tx = conn.transaction().unwrap();
                tx.execute_batch(MIGRATIONS[mid]).unwrap();
                tx.pragma_update(None, "user_version", mid as i32).unwrap();
                tx.commit().unwrap();
            }
        });

        Mutex::new(conn)
    }
    async fn is_valid(&self, conn: &mut Self::Connection) -> bool {
        conn.get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .execute_batch("")
            .is_ok()
    }
}

pub struct SqliteConnection {
    conn: ManagedConnection<Mutex<rusqlite::Connection>>,
}

fn assert_sync<T: Sync>() {}

impl SqliteConnection {
    pub fn new(conn: ManagedConnection<Mutex<rusqlite::Connection>>) -> Self {
        assert_sync::<Self>();
        Self { conn }
    }

    pub fn raw(&mut self) -> &mut rusqlite::Connection {
        self.conn.get_mut().unwrap_or_else(|e| e.into_inner())
    }
}

const TASK_COLUMNS: &str = "id, employee_name, category, task_name, status, date, start_time, \
     reminder_minutes, location, estimated_duration, priority, comment, collaborators";

fn task_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<Task, rusqlite::Error> {
    Ok(Task {
        id: row.get(0)?,
        employee_name: row.get(1)?,
        category: row.get(2)?,
        task_name: row.get(3)?,
        status: row.get(4)?,
        date: row.get(5)?,
        start_time: row.get(6)?,
        reminder_minutes: row.get(7)?,
        location: row.get(8)?,
        estimated_duration: row.get(9)?,
        priority: row.get(10)?,
        comment: row.get(11)?,
        collaborators: row.get(12)?,
    })
}

fn employee_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<Employee, rusqlite::Error> {
    Ok(Employee {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        department: row.get(3)?,
        position: row.get(4)?,
        active: row.get(5)?,
    })
}

fn job_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<Job, rusqlite::Error> {
    Ok(Job {
        id: row.get(0)?,
        name: row.get(1)?,
        scheduled_at: row.get(2)?,
        metadata: row.get(3)?,
        executed_at: row.get(4)?,
        error_message: row.get(5)?,
    })
}

#[async_trait::async_trait]
impl Connection for SqliteConnection {
    async fn insert_task(&mut self, task: &NewTask) -> Result<Task> {
        let sql = format!(
            "INSERT INTO tasks (employee_name, category, task_name, status, date, \
                start_time, reminder_minutes, location, estimated_duration, priority, \
                comment, collaborators)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {TASK_COLUMNS}"
        );
        let inserted = self
            .raw()
            .query_row(
                &sql,
                params![
                    task.employee_name,
                    task.category,
                    task.task_name,
                    task.status,
                    task.date,
                    task.start_time,
                    task.reminder_minutes,
                    task.location,
                    task.estimated_duration,
                    task.priority,
                    task.comment,
                    task.collaborators,
                ],
                |row| task_from_row(row),
            )
            .context("inserting task")?;
        Ok(inserted)
    }

    async fn get_tasks_for_date(&mut self, date: NaiveDate) -> Result<Vec<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE date = ? ORDER BY id");
        let tasks = self
            .raw()
            .prepare(&sql)?
            .query_map(params![date], |row| task_from_row(row))?
            .collect::<std::result::Result<_, rusqlite::Error>>()?;
        Ok(tasks)
    }

    async fn update_task_status(&mut self, id: i64, status: &str) -> Result<()> {
        self.raw()
            .execute(
                "UPDATE tasks SET status = ? WHERE id = ?",
                params![status, id],
            )
            .context("updating task status")?;
        Ok(())
    }

    async fn insert_employee(&mut self, employee: &NewEmployee) -> Result<Employee> {
        let inserted = self
            .raw()
            .query_row(
                "INSERT INTO employees (name, email, department, position, active)
                    VALUES (?, ?, ?, ?, ?)
                    RETURNING id, name, email, department, position, active",
                params![
                    employee.name,
                    employee.email,
                    employee.department,
                    employee.position,
                    employee.active,
                ],
                |row| employee_from_row(row),
            )
            .context("inserting employee")?;
        Ok(inserted)
    }

    async fn get_employee_by_name(&mut self, name: &str) -> Result<Option<Employee>> {
        match self.raw().query_row(
            "SELECT id, name, email, department, position, active
                FROM employees WHERE name = ?",
            params![name],
            |row| employee_from_row(row),
        ) {
            Ok(employee) => Ok(Some(employee)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e).context("fetching employee by name"),
        }
    }

    async fn get_active_employees(&mut self) -> Result<Vec<Employee>> {
        let employees = self
            .raw()
            .prepare(
                "SELECT id, name, email, department, position, active
                    FROM employees WHERE active ORDER BY name",
            )?
            .query_map([], |row| employee_from_row(row))?
            .collect::<std::result::Result<_, rusqlite::Error>>()?;
        Ok(employees)
    }

    async fn insert_job(
        &mut self,
        name: &str,
        scheduled_at: &DateTime<Utc>,
        metadata: &serde_json::Value,
    ) -> Result<()> {
        trace!("insert_job(name={})", name);

        let id = Uuid::new_v4();
        self.raw()
            .execute(
                "INSERT INTO jobs (id, name, scheduled_at, metadata) VALUES (?, ?, ?, ?)
                ON CONFLICT (name, scheduled_at) DO UPDATE SET metadata = EXCLUDED.metadata",
                params![id, name, scheduled_at, metadata],
            )
            .context("inserting job")?;

        Ok(())
    }

    async fn delete_job(&mut self, id: &Uuid) -> Result<()> {
        trace!("delete_job(id={})", id);

        self.raw()
            .execute("DELETE FROM jobs WHERE id = ?", [id])
            .context("deleting job")?;

        Ok(())
    }

    async fn update_job_error_message(&mut self, id: &Uuid, message: &str) -> Result<()> {
        trace!("update_job_error_message(id={})", id);

        self.raw()
            .execute(
                "UPDATE jobs SET error_message = ? WHERE id = ?",
                params![message, id],
            )
            .context("updating job error message")?;

        Ok(())
    }

    async fn update_job_executed_at(&mut self, id: &Uuid) -> Result<()> {
        trace!("update_job_executed_at(id={})", id);

        self.raw()
            .execute(
                "UPDATE jobs SET executed_at = datetime('now') WHERE id = ?",
                [id],
            )
            .context("updating job executed at")?;

        Ok(())
    }

    async fn get_job_by_name_and_scheduled_at(
        &mut self,
        name: &str,
        scheduled_at: &DateTime<Utc>,
    ) -> Result<Job> {
        let job = self
            .raw()
            .query_row(
                "SELECT id, name, scheduled_at, metadata, executed_at, error_message
                    FROM jobs WHERE name = ? AND scheduled_at = ?",
                params![name, scheduled_at],
                |row| job_from_row(row),
            )
            .context("fetching job by name and scheduled at")?;
        Ok(job)
    }

    async fn get_jobs_to_execute(&mut self) -> Result<Vec<Job>> {
        let jobs = self
            .raw()
            .prepare(
                "SELECT id, name, scheduled_at, metadata, executed_at, error_message
                    FROM jobs WHERE scheduled_at <= datetime('now')
                    AND (error_message IS NULL OR executed_at <= datetime('now', '-60 minutes'))
                    ORDER BY scheduled_at",
            )?
            .query_map([], |row| job_from_row(row))?
            .collect::<std::result::Result<_, rusqlite::Error>>()?;
        Ok(jobs)
    }
}
