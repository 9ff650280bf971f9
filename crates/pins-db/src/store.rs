use pins_common::{Error, Result};
use pins_config::MigratorConfig;
use rusqlite::{Transaction, params};

use crate::migration::{Migration, MigrationLog};
use crate::version;

/// Persistence for the migration log. Every operation runs inside the
/// caller's transaction and never commits or rolls back on its own.
pub trait MigrationLogStore {
    /// Log table name as used in SQL.
    fn table(&self) -> &str;

    fn setup_migration_table(&self, tx: &Transaction<'_>) -> Result<()>;

    /// All rows, ascending by version.
    fn get_migration_logs(&self, tx: &Transaction<'_>) -> Result<Vec<MigrationLog>>;

    /// Insert `log` and return the id the database assigned to it.
    fn insert_migration_log(&self, tx: &Transaction<'_>, log: &MigrationLog) -> Result<i64>;

    fn update_migration_status(&self, tx: &Transaction<'_>, log: &MigrationLog) -> Result<()>;

    fn delete_migration_log(&self, tx: &Transaction<'_>, log: &MigrationLog) -> Result<()>;

    fn execute_query(&self, tx: &Transaction<'_>, migration: &Migration) -> Result<()>;

    fn execute_rollback(&self, tx: &Transaction<'_>, migration: &Migration) -> Result<()>;
}

/// `MigrationLogStore` backed by a SQLite table.
#[derive(Debug, Clone)]
pub struct SqliteMigrationLogStore {
    table: String,
    table_name: String,
    schema: Option<String>,
    separator: String,
}

impl SqliteMigrationLogStore {
    pub fn new(config: &MigratorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            table: config.qualified_table(),
            table_name: config.table.clone(),
            schema: config.schema.clone(),
            separator: config.version_separator.clone(),
        })
    }

    fn columns(&self, tx: &Transaction<'_>) -> Result<Vec<String>> {
        let pragma = match &self.schema {
            Some(schema) => format!("PRAGMA {schema}.table_info({})", self.table_name),
            None => format!("PRAGMA table_info({})", self.table_name),
        };
        let mut stmt = tx
            .prepare(&pragma)
            .map_err(|e| Error::database("failed to prepare table info query", e))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(|e| Error::database("failed to read table info", e))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::database("failed to read table info row", e))
    }
}

impl MigrationLogStore for SqliteMigrationLogStore {
    fn table(&self) -> &str {
        &self.table
    }

    fn setup_migration_table(&self, tx: &Transaction<'_>) -> Result<()> {
        let context = || format!("error in creating migration log table {}", self.table);
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                version TEXT NOT NULL UNIQUE,
                query TEXT NOT NULL,
                \"rollback\" TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'SUCCESS',
                date INTEGER NOT NULL,
                hash TEXT NOT NULL
            );",
            self.table
        ))
        .map_err(|e| Error::database(context(), e))?;

        // Tables created before status tracking existed only hold applied rows.
        let columns = self.columns(tx).map_err(|e| e.context(context()))?;
        if !columns.iter().any(|c| c.eq_ignore_ascii_case("status")) {
            tx.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN status TEXT NOT NULL DEFAULT 'SUCCESS';",
                self.table
            ))
            .map_err(|e| Error::database(format!("{}: failed to add status column", context()), e))?;
        }
        Ok(())
    }

    fn get_migration_logs(&self, tx: &Transaction<'_>) -> Result<Vec<MigrationLog>> {
        let context = "error while getting migration logs from db";
        let mut stmt = tx
            .prepare(&format!(
                "SELECT id, name, version, query, \"rollback\", status, date, hash FROM {}",
                self.table
            ))
            .map_err(|e| Error::database(context, e))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(MigrationLog {
                    id: row.get(0)?,
                    migration: Migration {
                        name: row.get(1)?,
                        version: row.get(2)?,
                        query: row.get(3)?,
                        rollback: row.get(4)?,
                    },
                    status: row.get(5)?,
                    date: row.get(6)?,
                    hash: row.get(7)?,
                })
            })
            .map_err(|e| Error::database(context, e))?;

        let mut logs = rows
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::database(context, e))?;
        version::sort_by_version(&mut logs, &self.separator, |l| l.version());
        Ok(logs)
    }

    fn insert_migration_log(&self, tx: &Transaction<'_>, log: &MigrationLog) -> Result<i64> {
        tx.execute(
            &format!(
                "INSERT INTO {} (name, version, query, \"rollback\", status, date, hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                self.table
            ),
            params![
                log.migration.name,
                log.migration.version,
                log.migration.query,
                log.migration.rollback,
                log.status,
                log.date,
                log.hash,
            ],
        )
        .map_err(|e| Error::database("error in database while inserting migration log", e))?;
        Ok(tx.last_insert_rowid())
    }

    fn update_migration_status(&self, tx: &Transaction<'_>, log: &MigrationLog) -> Result<()> {
        let context = "error while updating migration log status";
        let updated = tx
            .execute(
                &format!("UPDATE {} SET status = ?1 WHERE id = ?2", self.table),
                params![log.status, log.id],
            )
            .map_err(|e| Error::database(context, e))?;
        if updated == 0 {
            return Err(Error::database(
                format!("{context}: no row with id {}", log.id),
                rusqlite::Error::QueryReturnedNoRows,
            ));
        }
        Ok(())
    }

    fn delete_migration_log(&self, tx: &Transaction<'_>, log: &MigrationLog) -> Result<()> {
        tx.execute(
            &format!("DELETE FROM {} WHERE version = ?1", self.table),
            params![log.migration.version],
        )
        .map_err(|e| Error::database("error while deleting migration log", e))?;
        Ok(())
    }

    fn execute_query(&self, tx: &Transaction<'_>, migration: &Migration) -> Result<()> {
        tx.execute_batch(&migration.query).map_err(|e| {
            Error::database(
                format!("error while executing query for migration '{migration}'"),
                e,
            )
        })
    }

    fn execute_rollback(&self, tx: &Transaction<'_>, migration: &Migration) -> Result<()> {
        tx.execute_batch(&migration.rollback).map_err(|e| {
            Error::database(
                format!(
                    "error while executing rollback query for version '{}'",
                    migration.version
                ),
                e,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MigrationStatus;
    use crate::tx::TxRunner;

    fn setup() -> (TxRunner, SqliteMigrationLogStore) {
        let runner = TxRunner::in_memory().unwrap();
        let store = SqliteMigrationLogStore::new(&MigratorConfig::default()).unwrap();
        runner.run(|tx| store.setup_migration_table(tx)).unwrap();
        (runner, store)
    }

    fn log(version: &str, name: &str) -> MigrationLog {
        MigrationLog::started(&Migration::new(
            version,
            name,
            format!("SELECT '{version}';"),
            "SELECT 0;",
        ))
    }

    #[test]
    fn crud_keeps_version_order() {
        let (runner, store) = setup();
        runner
            .run(|tx| {
                store.insert_migration_log(tx, &log("1-1", "add-column"))?;
                store.insert_migration_log(tx, &log("2", "create-test-table2"))?;
                let first = store.insert_migration_log(tx, &log("1", "create-test-table"))?;

                let logs = store.get_migration_logs(tx)?;
                let versions: Vec<_> = logs.iter().map(|l| l.version()).collect();
                assert_eq!(versions, vec!["1", "1-1", "2"]);
                assert_eq!(logs[0].id, first);
                assert_eq!(logs[0].status, MigrationStatus::Started);
                assert_eq!(logs[0].hash, log("1", "x").hash);

                store.delete_migration_log(tx, &logs[0])?;
                assert_eq!(store.get_migration_logs(tx)?.len(), 2);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn setup_is_idempotent() {
        let (runner, store) = setup();
        runner.run(|tx| store.setup_migration_table(tx)).unwrap();
        runner
            .run(|tx| {
                store.insert_migration_log(tx, &log("1", "init"))?;
                store.setup_migration_table(tx)?;
                assert_eq!(store.get_migration_logs(tx)?.len(), 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn duplicate_version_is_rejected_by_the_table() {
        let (runner, store) = setup();
        let err = runner
            .run(|tx| {
                store.insert_migration_log(tx, &log("1", "init"))?;
                store.insert_migration_log(tx, &log("1", "again"))
            })
            .unwrap_err();
        assert!(err.to_string().contains("error in database while inserting migration log"));
    }

    #[test]
    fn update_changes_only_status() {
        let (runner, store) = setup();
        runner
            .run(|tx| {
                let mut row = log("1", "init");
                row.id = store.insert_migration_log(tx, &row)?;
                row.status = MigrationStatus::Success;
                row.migration.query = "SELECT 'changed';".into();
                store.update_migration_status(tx, &row)?;

                let stored = &store.get_migration_logs(tx)?[0];
                assert_eq!(stored.status, MigrationStatus::Success);
                assert_eq!(stored.migration.query, "SELECT '1';");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn update_of_missing_row_fails() {
        let (runner, store) = setup();
        let mut row = log("1", "init");
        row.id = 42;
        let err = runner
            .run(|tx| store.update_migration_status(tx, &row))
            .unwrap_err();
        assert!(err.to_string().contains("no row with id 42"));
    }

    #[test]
    fn setup_fails_with_table_context_for_unknown_schema() {
        let runner = TxRunner::in_memory().unwrap();
        let config = MigratorConfig {
            schema: Some("missing".into()),
            ..Default::default()
        };
        let store = SqliteMigrationLogStore::new(&config).unwrap();
        let err = runner.run(|tx| store.setup_migration_table(tx)).unwrap_err();
        assert!(
            err.to_string()
                .contains("error in creating migration log table missing.migration_log")
        );
    }

    #[test]
    fn schema_qualified_table_works_for_attached_database() {
        let runner = TxRunner::in_memory().unwrap();
        runner
            .with_connection(|conn| {
                conn.execute_batch("ATTACH DATABASE ':memory:' AS audit")
                    .map_err(|e| Error::database("attach failed", e))
            })
            .unwrap();
        let config = MigratorConfig {
            schema: Some("audit".into()),
            ..Default::default()
        };
        let store = SqliteMigrationLogStore::new(&config).unwrap();
        assert_eq!(store.table(), "audit.migration_log");
        runner
            .run(|tx| {
                store.setup_migration_table(tx)?;
                store.insert_migration_log(tx, &log("1", "init"))?;
                assert_eq!(store.get_migration_logs(tx)?.len(), 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn legacy_table_without_status_is_upgraded() {
        let runner = TxRunner::in_memory().unwrap();
        runner
            .with_connection(|conn| {
                conn.execute_batch(
                    "CREATE TABLE migration_log (
                        id INTEGER PRIMARY KEY,
                        name TEXT NOT NULL,
                        version TEXT NOT NULL UNIQUE,
                        query TEXT NOT NULL,
                        \"rollback\" TEXT NOT NULL,
                        date INTEGER NOT NULL,
                        hash TEXT NOT NULL
                    );
                    INSERT INTO migration_log (name, version, query, \"rollback\", date, hash)
                    VALUES ('init', '1', 'SELECT 1;', 'SELECT 0;', 0, 'h');",
                )
                .map_err(|e| Error::database("legacy setup failed", e))
            })
            .unwrap();

        let store = SqliteMigrationLogStore::new(&MigratorConfig::default()).unwrap();
        let logs = runner
            .run(|tx| {
                store.setup_migration_table(tx)?;
                store.get_migration_logs(tx)
            })
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, MigrationStatus::Success);
    }

    #[test]
    fn unknown_status_value_is_a_read_error() {
        let (runner, store) = setup();
        let err = runner
            .run(|tx| {
                store.insert_migration_log(tx, &log("1", "init"))?;
                tx.execute_batch("UPDATE migration_log SET status = 'DONE'")
                    .map_err(|e| Error::database("corrupt failed", e))?;
                store.get_migration_logs(tx)
            })
            .unwrap_err();
        assert!(err.to_string().contains("error while getting migration logs from db"));
    }

    #[test]
    fn executes_forward_and_reverse_scripts() {
        let (runner, store) = setup();
        let m = Migration::new(
            "1",
            "users",
            "CREATE TABLE users (id INTEGER); INSERT INTO users VALUES (1);",
            "DROP TABLE users;",
        );
        runner
            .run(|tx| {
                store.execute_query(tx, &m)?;
                let count: i64 = tx
                    .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
                    .map_err(|e| Error::database("count failed", e))?;
                assert_eq!(count, 1);
                store.execute_rollback(tx, &m)
            })
            .unwrap();

        let err = runner
            .run(|tx| store.execute_rollback(tx, &m))
            .unwrap_err();
        assert!(err.to_string().contains("error while executing rollback query for version '1'"));

        let broken = Migration::new("2", "broken", "CREATE TABLE (", "SELECT 0;");
        let err = runner.run(|tx| store.execute_query(tx, &broken)).unwrap_err();
        assert!(err.to_string().contains("error while executing query for migration '2-broken'"));
    }
}
