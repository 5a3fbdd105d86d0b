use sqlx::{
    Sqlite,
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous},
};
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::debug;

use std::{
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
};

pub(super) struct LedgerState {
    db_file: PathBuf,
    pool: RwLock<SqlitePool>,
}

impl std::fmt::Debug for LedgerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerState").field("db_file", &self.db_file).finish()
    }
}

impl LedgerState {
    pub(super) async fn new<P: AsRef<Path>>(db_file: P) -> anyhow::Result<Self> {
        let db_file = db_file.as_ref().to_path_buf();
        if !db_file.parent().map(|p| p.as_os_str().is_empty() || p.is_dir()).unwrap_or(false) {
            anyhow::bail!("Ledger parent directory does not exist: {:?}", db_file);
        }

        let pool = open_pool(&db_file).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!(?db_file, "ledger opened");
        Ok(Self {
            db_file,
            pool: RwLock::new(pool),
        })
    }

    /// Acquire a pooled connection and hold the pool read lock for the entire lifetime
    /// of the returned guard.
    pub(super) async fn conn(&self) -> anyhow::Result<DbConnGuard<'_>> {
        let pool_guard = self.pool.read().await;
        let conn = pool_guard.acquire().await?;
        Ok(DbConnGuard {
            _pool_guard: pool_guard,
            conn,
        })
    }

    /// Flush the WAL into the database file and release file handles.
    /// Waits for in-flight queries because it takes the write lock.
    pub(super) async fn close(&self) -> anyhow::Result<()> {
        let pool_guard = self.pool.write().await;
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE);")
            .execute(&*pool_guard)
            .await?;
        pool_guard.close().await;
        debug!(db_file = ?self.db_file, "ledger closed");
        Ok(())
    }
}

async fn open_pool(db_file: &Path) -> anyhow::Result<SqlitePool> {
    let connect_opts = SqliteConnectOptions::new()
        .filename(db_file)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    Ok(SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_opts)
        .await?)
}

pub struct DbConnGuard<'a> {
    _pool_guard: RwLockReadGuard<'a, SqlitePool>,
    conn: PoolConnection<Sqlite>,
}

impl<'a> Deref for DbConnGuard<'a> {
    type Target = PoolConnection<Sqlite>;
    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl<'a> DerefMut for DbConnGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}
