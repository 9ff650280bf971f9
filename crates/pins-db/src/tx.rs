use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use pins_common::{Error, Result};
use rusqlite::{Connection, Transaction};
use tracing::{debug, info};

/// Runs units of work against one SQLite connection, each inside its own
/// transaction.
pub struct TxRunner {
    conn: Mutex<Connection>,
}

impl TxRunner {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening migration database at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::database("failed to open database", e))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::database("failed to set pragmas", e))?;

        Ok(Self::new(conn))
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::database("failed to open in-memory database", e))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::database("failed to set pragmas", e))?;

        Ok(Self::new(conn))
    }

    /// Attach `path` to the connection as `schema`. `schema` must already be
    /// a validated identifier.
    pub fn attach(&self, path: &Path, schema: &str) -> Result<()> {
        info!(schema, "attaching {}", path.display());
        self.with_connection(|conn| {
            conn.execute(
                &format!("ATTACH DATABASE ?1 AS {schema}"),
                [path.to_string_lossy()],
            )
            .map(|_| ())
            .map_err(|e| {
                Error::database(
                    format!("failed to attach '{}' as {schema}", path.display()),
                    e,
                )
            })
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::LockPoisoned("migration database"))
    }

    /// Run `work` inside a transaction. Commits when it returns `Ok`, rolls
    /// back when it returns `Err`.
    pub fn run<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::database("failed to begin transaction", e))?;

        match work(&tx) {
            Ok(value) => {
                tx.commit()
                    .map_err(|e| Error::database("failed to commit transaction", e))?;
                Ok(value)
            }
            Err(err) => {
                debug!("rolling back transaction: {err}");
                match tx.rollback() {
                    Ok(()) => Err(err),
                    Err(e) => Err(err.layer(Error::database("failed to roll back transaction", e))),
                }
            }
        }
    }

    /// Direct access to the connection outside any transaction, e.g. to
    /// `ATTACH` the database holding a configured schema.
    pub fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connection()?;
        work(&conn)
    }
}
