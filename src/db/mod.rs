pub mod schema;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{error, info, warn};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, InterruptHandle};

use crate::deadline::Deadline;
use crate::error::QaDeskError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// The process-wide handle to the store. Cloning is cheap and every clone
/// shares the same bounded pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Opens the pool and performs the startup liveness check. Fails fast if
    /// the database cannot be opened.
    pub fn connect(db_path: &Path, pool_size: u32) -> Result<Self, QaDeskError> {
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(CONNECTION_TIMEOUT)
            .build(manager)?;

        let db = Database { pool };
        db.ping_blocking()?;

        info!(
            "Database opened at {} (pool size {})",
            db_path.display(),
            pool_size
        );

        Ok(db)
    }

    /// Runs the schema migrations on one pooled connection.
    pub fn ensure_schema(&self) -> Result<u32, QaDeskError> {
        let mut conn = self.conn()?;
        schema::ensure_schema(&mut conn).inspect_err(|e| {
            error!("Schema migration failed: {}", e);
        })
    }

    pub fn conn(&self) -> Result<DbConnection, QaDeskError> {
        Ok(self.pool.get()?)
    }

    fn ping_blocking(&self) -> Result<(), QaDeskError> {
        let conn = self.conn()?;
        ping_conn(&conn)
    }

    pub async fn ping(&self, deadline: Deadline) -> Result<(), QaDeskError> {
        self.run(deadline, "ping", ping_conn).await
    }

    /// Runs `op` inside a transaction on a pooled connection on the blocking
    /// thread pool, giving up once `deadline` passes.
    ///
    /// On timeout the running statement is interrupted, and the transaction
    /// only commits if the deadline has not passed, so a call reported as
    /// timed out leaves the store unchanged.
    pub async fn run<T, F>(&self, deadline: Deadline, what: &'static str, op: F) -> Result<T, QaDeskError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, QaDeskError> + Send + 'static,
    {
        if deadline.is_expired() {
            return Err(QaDeskError::Timeout(what));
        }

        let pool = self.pool.clone();
        let wait = deadline.remaining();
        // Holds the interrupt handle only while the task owns the connection
        let interrupt: Arc<Mutex<Option<InterruptHandle>>> = Arc::new(Mutex::new(None));
        let task_interrupt = interrupt.clone();

        let task = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get_timeout(wait)?;
            set_interrupt(&task_interrupt, Some(conn.get_interrupt_handle()));

            let result = run_in_transaction(&mut conn, deadline, what, op);

            set_interrupt(&task_interrupt, None);
            result
        });

        match tokio::time::timeout_at(deadline.instant(), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(QaDeskError::Error(format!(
                "Database task for {} failed: {}",
                what, join_err
            ))),
            Err(_) => {
                if let Ok(guard) = interrupt.lock() {
                    if let Some(handle) = guard.as_ref() {
                        handle.interrupt();
                    }
                }
                warn!("Deadline exceeded for {}", what);
                Err(QaDeskError::Timeout(what))
            }
        }
    }
}

fn set_interrupt(slot: &Mutex<Option<InterruptHandle>>, handle: Option<InterruptHandle>) {
    if let Ok(mut guard) = slot.lock() {
        *guard = handle;
    }
}

/// Commits only if `deadline` has not passed; otherwise the transaction is
/// dropped, which rolls it back.
fn run_in_transaction<T, F>(conn: &mut Connection, deadline: Deadline, what: &'static str, op: F) -> Result<T, QaDeskError>
where
    F: FnOnce(&Connection) -> Result<T, QaDeskError>,
{
    let tx = conn.transaction()?;
    let value = op(&tx)?;

    if deadline.is_expired() {
        return Err(QaDeskError::Timeout(what));
    }
    tx.commit()?;
    Ok(value)
}

fn ping_conn(conn: &Connection) -> Result<(), QaDeskError> {
    let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
    if one == 1 {
        Ok(())
    } else {
        Err(QaDeskError::Error("Database ping returned an unexpected value".into()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::deadline::SHORT_READ;
    use test_support::temp_database;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_connect_migrates_and_pings() {
        let (_dir, db) = temp_database();
        db.ping(Deadline::within(SHORT_READ)).await.unwrap();

        let version = schema::stored_version(&db.conn().unwrap()).unwrap();
        assert_eq!(version, schema::CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_connect_fails_fast_for_unreachable_store() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-dir").join("qa.db");
        assert!(Database::connect(&missing, 2).is_err());
    }

    #[tokio::test]
    async fn test_run_returns_operation_result() {
        let (_dir, db) = temp_database();
        let value = db
            .run(Deadline::within(SHORT_READ), "arithmetic", |conn| {
                Ok(conn.query_row("SELECT 40 + 2", [], |row| row.get::<_, i64>(0))?)
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let (_dir, db) = temp_database();
        let err = db
            .run(Deadline::within(Duration::from_millis(20)), "slow op", |_conn| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QaDeskError::Timeout("slow op")));
    }

    fn qa_count(db: &Database) -> i64 {
        db.conn()
            .unwrap()
            .query_row("SELECT count(*) FROM qa_pairs", [], |row| row.get(0))
            .unwrap()
    }

    #[tokio::test]
    async fn test_write_finishing_after_deadline_is_rolled_back() {
        let (_dir, db) = temp_database();
        let err = db
            .run(Deadline::within(Duration::from_millis(20)), "slow insert", |conn| {
                std::thread::sleep(Duration::from_millis(200));
                conn.execute(
                    "INSERT INTO qa_pairs (question, answer) VALUES ('q', 'a')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QaDeskError::Timeout("slow insert")));

        // Let the abandoned task run to completion
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(qa_count(&db), 0);
    }

    #[tokio::test]
    async fn test_runaway_statement_is_interrupted() {
        let (_dir, db) = temp_database();
        let (done_tx, done_rx) = oneshot::channel();

        let err = db
            .run(Deadline::within(Duration::from_millis(50)), "runaway", move |conn| {
                let result = conn.query_row(
                    "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                     SELECT count(*) FROM c",
                    [],
                    |row| row.get::<_, i64>(0),
                );
                let _ = done_tx.send(result.is_err());
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QaDeskError::Timeout("runaway")));

        let interrupted = tokio::time::timeout(Duration::from_secs(5), done_rx)
            .await
            .expect("statement kept running after the deadline")
            .unwrap();
        assert!(interrupted);
    }

    #[tokio::test]
    async fn test_successful_write_commits() {
        let (_dir, db) = temp_database();
        db.run(Deadline::within(SHORT_READ), "insert", |conn| {
            conn.execute(
                "INSERT INTO qa_pairs (question, answer) VALUES ('q', 'a')",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(qa_count(&db), 1);
    }

    #[tokio::test]
    async fn test_run_with_expired_deadline_does_not_start() {
        let (_dir, db) = temp_database();
        let deadline = Deadline::within(Duration::ZERO);
        let err = db
            .run(deadline, "never", |_conn| -> Result<(), QaDeskError> {
                panic!("operation must not run")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QaDeskError::Timeout("never")));
    }
}
