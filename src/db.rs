//! Database logistics: opening connections, the r2d2 pool, and migrations.
//! Queries containing catalog logic live in the `queries` module.

use std::fs;
use std::path::Path;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::{Error, Result};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

const BUSY_TIMEOUT_SECONDS: u64 = 5;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

#[derive(Debug)]
pub struct ConnectionOptions {
    pub enable_wal: bool,
    pub enable_foreign_keys: bool,
    pub busy_timeout: Option<Duration>,
}

impl ConnectionOptions {
    fn apply(&self, conn: &mut SqliteConnection) -> QueryResult<()> {
        if self.enable_wal {
            conn.batch_execute("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        }
        if self.enable_foreign_keys {
            conn.batch_execute("PRAGMA foreign_keys = ON;")?;
        }
        if let Some(d) = self.busy_timeout {
            conn.batch_execute(&format!("PRAGMA busy_timeout = {};", d.as_millis()))?;
        }
        Ok(())
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            enable_wal: true,
            enable_foreign_keys: true,
            busy_timeout: Some(Duration::from_secs(BUSY_TIMEOUT_SECONDS)),
        }
    }
}

impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error>
    for ConnectionOptions
{
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        self.apply(conn).map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Builds the connection pool for the catalog database, creating the
/// database file (and its parent directory) if it does not exist yet.
pub fn connection_pool(db_path: &Path) -> Result<DbPool> {
    let db_path_str = path_str(db_path)?;

    // Ensure the db file exists at the path. This doesn't run the
    // migrations, we just ensure the file exists.
    if !db_path.exists() {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        SqliteConnection::establish(db_path_str)?;
    }

    let manager = ConnectionManager::<SqliteConnection>::new(db_path_str);

    let pool = Pool::builder()
        .test_on_check_out(true)
        .connection_customizer(Box::new(ConnectionOptions::default()))
        .build(manager)?;

    Ok(pool)
}

/// Opens a single standalone connection with the same pragmas the pool
/// applies. Used by the importer and by tests.
pub fn establish(db_path: &Path) -> Result<SqliteConnection> {
    let mut conn = SqliteConnection::establish(path_str(db_path)?)?;
    ConnectionOptions::default().apply(&mut conn)?;
    Ok(conn)
}

pub fn run_migrations(conn: &mut SqliteConnection) -> Result<()> {
    // This error size isn't known at compile-time, so convert it here.
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| Error::Migration(e.to_string()))?;
    Ok(())
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| Error::NonUtf8Path(path.to_path_buf()))
}
