use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use tokio::sync::oneshot;

use super::migrations::{run_migrations, SchemaSource};
use crate::error::{HostError, HostResult};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
    reader: Mutex<Option<Connection>>,
}

impl DatabaseInner {
    fn shutdown(&self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }

        let mut reader = match self.reader.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        reader.take();
    }
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Shared handle to the activity store.
///
/// All writes run on one dedicated thread that owns the write connection, so
/// concurrent callers (the command loop and the usage tracker) are serialized
/// there. Aggregate reads use a second connection; with WAL enabled they never
/// wait on the writer.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub fn open(db_path: PathBuf, schema: SchemaSource) -> HostResult<Self> {
        Self::open_inner(db_path, schema).map_err(HostError::StorageInit)
    }

    fn open_inner(db_path: PathBuf, schema: SchemaSource) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("activity-db".into())
            .spawn(move || {
                let mut conn = match open_writer(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                let init_result = run_migrations(&mut conn, &schema)
                    .context("failed to apply database schema");
                let init_ok = init_result.is_ok();
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }
                if !init_ok {
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        let ready = ready_rx
            .recv()
            .context("database worker exited before signaling readiness");
        if let Err(err) = ready.and_then(|init| init) {
            let _ = worker.join();
            return Err(err);
        }

        let reader = open_reader(&db_path)?;

        info!("Database initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
                reader: Mutex::new(Some(reader)),
            }),
        })
    }

    /// Runs `task` on the writer thread.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    /// Runs `task` against the read connection on the blocking pool.
    pub async fn query<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let guard = inner
                .reader
                .lock()
                .map_err(|_| anyhow!("read connection lock poisoned"))?;
            let conn = guard.as_ref().ok_or_else(|| anyhow!("database is closed"))?;
            task(conn)
        })
        .await
        .context("read task panicked")?
    }

    /// Stops the writer thread after it drains queued work and closes both
    /// connections. Later calls fail with "database is closed".
    pub fn close(&self) {
        self.inner.shutdown();
        info!("Database closed");
    }
}

fn open_writer(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).context("failed to open SQLite database")?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .context("failed to enable WAL mode")?;
    if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
        error!("Failed to enable foreign keys: {err}");
    }
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;

    Ok(conn)
}

fn open_reader(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .context("failed to open read connection")?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout on read connection")?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("db").join("activity.db")
    }

    fn open_temp() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(db_path(&dir), SchemaSource::Embedded).unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn creates_parent_directory_and_enables_wal() {
        let (dir, db) = open_temp();
        assert!(db_path(&dir).exists());

        let mode: String = db
            .execute(|conn| {
                conn.pragma_query_value(None, "journal_mode", |row| row.get(0))
                    .map_err(Into::into)
            })
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn reopening_is_a_no_op() {
        let (dir, db) = open_temp();
        let path = db_path(&dir);
        db.close();
        drop(db);

        let db = Database::open(path, SchemaSource::Embedded).unwrap();
        let settings_rows: i64 = db
            .query(|conn| {
                conn.query_row("SELECT COUNT(*) FROM tracking_settings", [], |row| row.get(0))
                    .map_err(Into::into)
            })
            .await
            .unwrap();
        assert_eq!(settings_rows, 1);
        drop(dir);
    }

    #[tokio::test]
    async fn closed_database_rejects_work() {
        let (_dir, db) = open_temp();
        db.close();

        assert!(db.execute(|_| Ok(())).await.is_err());
        let err = db.query(|_| Ok(())).await.unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn unwritable_location_is_init_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let result = Database::open(blocker.join("activity.db"), SchemaSource::Embedded);
        assert!(matches!(result, Err(HostError::StorageInit(_))));
    }

    #[test]
    fn invalid_schema_is_init_error() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("schema.sql");
        std::fs::write(&schema, "NOT SQL AT ALL").unwrap();

        let result = Database::open(dir.path().join("activity.db"), SchemaSource::File(schema));
        assert!(matches!(result, Err(HostError::StorageInit(_))));
    }
}
