use crate::db::employees::{Employee, NewEmployee};
use crate::db::jobs::Job;
use crate::db::tasks::{NewTask, Task};
use crate::db::{Connection, ConnectionManager, ManagedConnection};
use anyhow::Context as _;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::trace;
use uuid::Uuid;

pub struct Postgres(String, std::sync::Once);

impl Postgres {
    pub fn new(url: String) -> Self {
        Postgres(url, std::sync::Once::new())
    }
}

pub async fn make_client(db_url: &str) -> Result<tokio_postgres::Client> {
    let (db_client, connection) = tokio_postgres::connect(db_url, tokio_postgres::NoTls)
        .await
        .context("failed to connect to DB")?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("database connection error: {}", e);
        }
    });

    Ok(db_client)
}

static MIGRATIONS: &[&str] = &[
    "
CREATE TABLE tasks (
    id BIGSERIAL PRIMARY KEY,
    employee_name TEXT NOT NULL,
    category TEXT,
    task_name TEXT NOT NULL,
    status TEXT NOT NULL,
    date DATE NOT NULL,
    start_time TIME,
    reminder_minutes INTEGER,
    location TEXT,
    estimated_duration TEXT,
    priority TEXT,
    comment TEXT,
    collaborators TEXT
);
",
    "CREATE INDEX tasks_date_index ON tasks (date);",
    "
CREATE TABLE employees (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    email TEXT,
    department TEXT,
    position TEXT,
    active BOOLEAN NOT NULL DEFAULT TRUE
);
",
    "
CREATE TABLE jobs (
    id UUID DEFAULT gen_random_uuid() PRIMARY KEY,
    name TEXT NOT NULL,
    scheduled_at TIMESTAMP WITH TIME ZONE NOT NULL,
    metadata JSONB,
    executed_at TIMESTAMP WITH TIME ZONE,
    error_message TEXT
);
",
    "
CREATE UNIQUE INDEX jobs_name_scheduled_at_unique_index
    ON jobs (
        name, scheduled_at
    );
",
];

pub async fn run_migrations(client: &tokio_postgres::Client) -> Result<()> {
    client
        .execute(
            "CREATE TABLE IF NOT EXISTS database_versions (
                zero INTEGER PRIMARY KEY,
                migration_counter INTEGER
            );",
            &[],
        )
        .await
        .context("creating database versioning table")?;

    client
        .execute(
            "INSERT INTO database_versions (zero, migration_counter)
                VALUES (0, 0)
                ON CONFLICT DO NOTHING",
            &[],
        )
        .await
        .context("inserting initial database_versions")?;

    let migration_idx: i32 = client
        .query_one("SELECT migration_counter FROM database_versions", &[])
        .await
        .context("getting migration counter")?
        .get(0);
    let migration_idx = migration_idx as usize;

    for (idx, migration) in MIGRATIONS.iter().enumerate() {
        if idx >= migration_idx {
            client
                .execute(*migration, &[])
                .await
                .with_context(|| format!("executing {}th migration", idx))?;
            client
                .execute(
                    "UPDATE database_versions SET migration_counter = $1",
                    &[&(idx as i32 + 1)],
                )
                .await
                .with_context(|| format!("updating migration counter to {}", idx))?;
        }
    }

    Ok(())
}

#[async_trait::async_trait]
impl ConnectionManager for Postgres {
    type Connection = tokio_postgres::Client;
    async fn open(&self) -> Self::Connection {
        let client = make_client(&self.0).await.unwrap();
        let mut should_init = false;
        self.1.call_once(|| {
            should_init = true;
        });
        if should_init {
            run_migrations(&client).await.unwrap();
        }
        client
    }
    async fn is_valid(&self, conn: &mut Self::Connection) -> bool {
        !conn.is_closed()
    }
}

pub struct PostgresConnection {
    conn: ManagedConnection<tokio_postgres::Client>,
}

impl PostgresConnection {
    pub fn new(conn: ManagedConnection<tokio_postgres::Client>) -> Self {
        PostgresConnection { conn }
    }
}

const TASK_COLUMNS: &str = "id, employee_name, category, task_name, status, date, start_time, \
     reminder_minutes, location, estimated_duration, priority, comment, collaborators";

fn task_from_row(row: &tokio_postgres::Row) -> Task {
    Task {
        id: row.get(0),
        employee_name: row.get(1),
        category: row.get(2),
        task_name: row.get(3),
        status: row.get(4),
        date: row.get(5),
        start_time: row.get(6),
        reminder_minutes: row.get(7),
        location: row.get(8),
        estimated_duration: row.get(9),
        priority: row.get(10),
        comment: row.get(11),
        collaborators: row.get(12),
    }
}

fn employee_from_row(row: &tokio_postgres::Row) -> Employee {
    Employee {
        id: row.get(0),
        name: row.get(1),
        email: row.get(2),
        department: row.get(3),
        position: row.get(4),
        active: row.get(5),
    }
}

fn job_from_row(row: &tokio_postgres::Row) -> Job {
    Job {
        id: row.get(0),
        name: row.get(1),
        scheduled_at: row.get(2),
        metadata: row.get(3),
        executed_at: row.get(4),
        error_message: row.get(5),
    }
}

#[async_trait::async_trait]
impl Connection for PostgresConnection {
    async fn insert_task(&mut self, task: &NewTask) -> Result<Task> {
        let sql = format!(
            "INSERT INTO tasks (employee_name, category, task_name, status, date, \
                start_time, reminder_minutes, location, estimated_duration, priority, \
                comment, collaborators)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {TASK_COLUMNS}"
        );
        let row = self
            .conn
            .query_one(
                sql.as_str(),
                &[
                    &task.employee_name,
                    &task.category,
                    &task.task_name,
                    &task.status,
                    &task.date,
                    &task.start_time,
                    &task.reminder_minutes,
                    &task.location,
                    &task.estimated_duration,
                    &task.priority,
                    &task.comment,
                    &task.collaborators,
                ],
            )
            .await
            .context("inserting task")?;
        Ok(task_from_row(&row))
    }

    async fn get_tasks_for_date(&mut self, date: NaiveDate) -> Result<Vec<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE date = $1 ORDER BY id");
        let rows = self
            .conn
            .query(sql.as_str(), &[&date])
            .await
            .context("fetching tasks for date")?;
        Ok(rows.iter().map(task_from_row).collect())
    }

    async fn update_task_status(&mut self, id: i64, status: &str) -> Result<()> {
        self.conn
            .execute("UPDATE tasks SET status = $2 WHERE id = $1", &[&id, &status])
            .await
            .context("updating task status")?;
        Ok(())
    }

    async fn insert_employee(&mut self, employee: &NewEmployee) -> Result<Employee> {
        let row = self
            .conn
            .query_one(
                "INSERT INTO employees (name, email, department, position, active)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING id, name, email, department, position, active",
                &[
                    &employee.name,
                    &employee.email,
                    &employee.department,
                    &employee.position,
                    &employee.active,
                ],
            )
            .await
            .context("inserting employee")?;
        Ok(employee_from_row(&row))
    }

    async fn get_employee_by_name(&mut self, name: &str) -> Result<Option<Employee>> {
        let row = self
            .conn
            .query_opt(
                "SELECT id, name, email, department, position, active
                    FROM employees WHERE name = $1",
                &[&name],
            )
            .await
            .context("fetching employee by name")?;
        Ok(row.as_ref().map(employee_from_row))
    }

    async fn get_active_employees(&mut self) -> Result<Vec<Employee>> {
        let rows = self
            .conn
            .query(
                "SELECT id, name, email, department, position, active
                    FROM employees WHERE active ORDER BY name",
                &[],
            )
            .await
            .context("fetching active employees")?;
        Ok(rows.iter().map(employee_from_row).collect())
    }

    async fn insert_job(
        &mut self,
        name: &str,
        scheduled_at: &DateTime<Utc>,
        metadata: &serde_json::Value,
    ) -> Result<()> {
        trace!("insert_job(name={})", name);

        self.conn
            .execute(
                "INSERT INTO jobs (name, scheduled_at, metadata) VALUES ($1, $2, $3)
                    ON CONFLICT (name, scheduled_at) DO UPDATE SET metadata = EXCLUDED.metadata",
                &[&name, &scheduled_at, &metadata],
            )
            .await
            .context("inserting job")?;

        Ok(())
    }

    async fn delete_job(&mut self, id: &Uuid) -> Result<()> {
        trace!("delete_job(id={})", id);

        self.conn
            .execute("DELETE FROM jobs WHERE id = $1", &[&id])
            .await
            .context("deleting job")?;

        Ok(())
    }

    async fn update_job_error_message(&mut self, id: &Uuid, message: &str) -> Result<()> {
        trace!("update_job_error_message(id={})", id);

        self.conn
            .execute(
                "UPDATE jobs SET error_message = $2 WHERE id = $1",
                &[&id, &message],
            )
            .await
            .context("updating job error message")?;

        Ok(())
    }

    async fn update_job_executed_at(&mut self, id: &Uuid) -> Result<()> {
        trace!("update_job_executed_at(id={})", id);

        self.conn
            .execute("UPDATE jobs SET executed_at = now() WHERE id = $1", &[&id])
            .await
            .context("updating job executed at")?;

        Ok(())
    }

    async fn get_job_by_name_and_scheduled_at(
        &mut self,
        name: &str,
        scheduled_at: &DateTime<Utc>,
    ) -> Result<Job> {
        let row = self
            .conn
            .query_one(
                "SELECT id, name, scheduled_at, metadata, executed_at, error_message
                    FROM jobs WHERE name = $1 AND scheduled_at = $2",
                &[&name, &scheduled_at],
            )
            .await
            .context("fetching job by name and scheduled at")?;
        Ok(job_from_row(&row))
    }

    async fn get_jobs_to_execute(&mut self) -> Result<Vec<Job>> {
        let rows = self
            .conn
            .query(
                "SELECT id, name, scheduled_at, metadata, executed_at, error_message
                    FROM jobs
                    WHERE scheduled_at <= now()
                        AND (error_message IS NULL OR executed_at <= now() - INTERVAL '60 minutes')
                    ORDER BY scheduled_at",
                &[],
            )
            .await
            .context("fetching jobs to execute")?;
        Ok(rows.iter().map(job_from_row).collect())
    }
}
