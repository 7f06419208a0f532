use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use self::employees::{Employee, NewEmployee};
use self::jobs::Job;
use self::tasks::{NewTask, Task};

pub mod employees;
pub mod jobs;
pub mod postgres;
pub mod sqlite;
pub mod tasks;

#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    // Tasks
    async fn insert_task(&mut self, task: &NewTask) -> Result<Task>;
    async fn get_tasks_for_date(&mut self, date: NaiveDate) -> Result<Vec<Task>>;
    async fn update_task_status(&mut self, id: i64, status: &str) -> Result<()>;

    // Employees
    async fn insert_employee(&mut self, employee: &NewEmployee) -> Result<Employee>;
    async fn get_employee_by_name(&mut self, name: &str) -> Result<Option<Employee>>;
    async fn get_active_employees(&mut self) -> Result<Vec<Employee>>;

    // Jobs
    async fn insert_job(
        &mut self,
        name: &str,
        scheduled_at: &DateTime<Utc>,
        metadata: &serde_json::Value,
    ) -> Result<()>;
    async fn delete_job(&mut self, id: &Uuid) -> Result<()>;
    async fn update_job_error_message(&mut self, id: &Uuid, message: &str) -> Result<()>;
    async fn update_job_executed_at(&mut self, id: &Uuid) -> Result<()>;
    async fn get_job_by_name_and_scheduled_at(
        &mut self,
        name: &str,
        scheduled_at: &DateTime<Utc>,
    ) -> Result<Job>;
    async fn get_jobs_to_execute(&mut self) -> Result<Vec<Job>>;
}

#[async_trait::async_trait]
pub trait ConnectionManager {
    type Connection;
    async fn open(&self) -> Self::Connection;
    async fn is_valid(&self, c: &mut Self::Connection) -> bool;
}

pub struct ConnectionPool<M: ConnectionManager> {
    connections: Arc<Mutex<Vec<M::Connection>>>,
    permits: Arc<Semaphore>,
    manager: M,
}

pub struct ManagedConnection<T> {
    conn: Option<T>,
    connections: Arc<Mutex<Vec<T>>>,
    #[allow(unused)]
    permit: OwnedSemaphorePermit,
}

impl<T> std::ops::Deref for ManagedConnection<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().unwrap()
    }
}
impl<T> std::ops::DerefMut for ManagedConnection<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().unwrap()
    }
}

impl<T> Drop for ManagedConnection<T> {
    fn drop(&mut self) {
        let conn = self.conn.take().unwrap();
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(conn);
    }
}

impl<T, M> ConnectionPool<M>
where
    T: Send,
    M: ConnectionManager<Connection = T>,
{
    fn new(manager: M) -> Self {
        ConnectionPool {
            connections: Arc::new(Mutex::new(Vec::with_capacity(16))),
            permits: Arc::new(Semaphore::new(16)),
            manager,
        }
    }

    async fn get(&self) -> ManagedConnection<T> {
        let permit = self.permits.clone().acquire_owned().await.unwrap();
        let conn = {
            let mut slots = self.connections.lock().unwrap_or_else(|e| e.into_inner());
            slots.pop()
        };
        if let Some(mut c) = conn {
            if self.manager.is_valid(&mut c).await {
                return ManagedConnection {
                    conn: Some(c),
                    permit,
                    connections: self.connections.clone(),
                };
            }
        }

        let conn = self.manager.open().await;
        ManagedConnection {
            conn: Some(conn),
            connections: self.connections.clone(),
            permit,
        }
    }
}

pub enum Pool {
    Sqlite(ConnectionPool<sqlite::Sqlite>),
    Postgres(ConnectionPool<postgres::Postgres>),
}

impl Pool {
    pub async fn connection(&self) -> Box<dyn Connection> {
        match self {
            Pool::Sqlite(p) => Box::new(sqlite::SqliteConnection::new(p.get().await)),
            Pool::Postgres(p) => Box::new(postgres::PostgresConnection::new(p.get().await)),
        }
    }

    pub fn open(uri: &str) -> Pool {
        if uri.starts_with("postgres") {
            Pool::Postgres(ConnectionPool::new(postgres::Postgres::new(uri.into())))
        } else {
            Pool::Sqlite(ConnectionPool::new(sqlite::Sqlite::new(uri.into())))
        }
    }

    pub fn new_from_env() -> Pool {
        Self::open(&std::env::var("DATABASE_URL").expect("needs DATABASE_URL"))
    }
}
