use std::collections::HashMap;
use std::path::Path;

use pins_common::{Error, Result};
use pins_config::MigratorConfig;
use tracing::{debug, error, info, warn};

use crate::migration::{Migration, MigrationLog, MigrationStatus, validate_migrations};
use crate::parser::parse_directory;
use crate::store::{MigrationLogStore, SqliteMigrationLogStore};
use crate::tx::TxRunner;
use crate::version;

/// Reconciles migrations from source against the migration log: applies
/// what is pending, verifies what was applied, and rolls back on request.
pub struct Migrator<S = SqliteMigrationLogStore> {
    runner: TxRunner,
    store: S,
    separator: String,
}

impl Migrator<SqliteMigrationLogStore> {
    /// Open the database file named by `config`. A configured schema is
    /// attached from [`MigratorConfig::schema_database`].
    pub fn open(config: &MigratorConfig) -> Result<Self> {
        let store = SqliteMigrationLogStore::new(config)?;
        let runner = TxRunner::open(&config.database)?;
        if let (Some(schema), Some(path)) = (config.schema.as_deref(), config.schema_database()) {
            runner.attach(&path, schema)?;
        }
        Ok(Self::new(runner, store, &config.version_separator))
    }

    /// In-memory database; a configured schema is attached as a second
    /// in-memory database.
    pub fn in_memory(config: &MigratorConfig) -> Result<Self> {
        let store = SqliteMigrationLogStore::new(config)?;
        let runner = TxRunner::in_memory()?;
        if let (Some(schema), Some(_)) = (config.schema.as_deref(), config.schema_database()) {
            runner.attach(Path::new(":memory:"), schema)?;
        }
        Ok(Self::new(runner, store, &config.version_separator))
    }
}

impl<S: MigrationLogStore> Migrator<S> {
    pub fn new(runner: TxRunner, store: S, separator: impl Into<String>) -> Self {
        Self {
            runner,
            store,
            separator: separator.into(),
        }
    }

    pub fn runner(&self) -> &TxRunner {
        &self.runner
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Every log row, ascending by version.
    pub fn get_migration_logs(&self) -> Result<Vec<MigrationLog>> {
        self.runner.run(|tx| self.store.get_migration_logs(tx))
    }

    /// Parse `path` and migrate to it.
    pub fn run_migrations_from_directory(&self, path: &Path) -> Result<Vec<MigrationLog>> {
        let migrations = parse_directory(path, &self.separator).map_err(|e| {
            e.context(format!(
                "error while running migrations from path '{}'",
                path.display()
            ))
        })?;
        self.migrate(&migrations)
    }

    /// Apply every migration that has no successful log row yet, in version
    /// order. Returns the rows executed by this run.
    ///
    /// Checksums of already-logged versions are all verified before anything
    /// executes. The first failure stops the run; migrations applied before it
    /// stay committed.
    pub fn migrate(&self, migrations: &[Migration]) -> Result<Vec<MigrationLog>> {
        validate_migrations(migrations).map_err(|e| e.context("error while running migrations"))?;

        self.runner
            .run(|tx| self.store.setup_migration_table(tx))
            .map_err(|e| e.context("error while running migrations"))?;

        let logged = self
            .version_map()
            .map_err(|e| e.context("error while executing migration queries"))?;

        let mut ordered: Vec<&Migration> = migrations.iter().collect();
        version::sort_by_version(&mut ordered, &self.separator, |m| m.version.as_str());

        for migration in &ordered {
            if let Some(log) = logged.get(&migration.version) {
                self.validate_hash(log, migration)?;
            }
        }

        let mut executed = Vec::new();
        for migration in ordered {
            match logged.get(&migration.version) {
                Some(log) if log.is_success() => {
                    debug!(version = %migration.version, "migration '{migration}' already applied");
                }
                Some(log) => executed.push(self.reattempt(log.clone())?),
                None => executed.push(self.apply(migration)?),
            }
        }

        info!(
            executed = executed.len(),
            total = migrations.len(),
            "migration run completed"
        );
        Ok(executed)
    }

    /// Roll back every logged migration newer than `target`, newest first.
    /// A `target` that matches no row is not an error: everything above it
    /// is rolled back. Returns the rows removed.
    pub fn rollback(&self, target: &str) -> Result<Vec<MigrationLog>> {
        let mut logs = self
            .get_migration_logs()
            .map_err(|e| e.context("error in executing rollback"))?;
        version::sort_by_version_desc(&mut logs, &self.separator, |l| l.version());

        let mut rolled_back = Vec::new();
        for log in logs {
            if version::compare(log.version(), target, &self.separator) {
                break;
            }

            self.runner
                .run(|tx| {
                    if log.is_success() {
                        self.store.execute_rollback(tx, &log.migration)?;
                    } else {
                        warn!(
                            version = %log.version(),
                            status = %log.status,
                            "skipping rollback script of '{}', its query never committed",
                            log.migration
                        );
                    }
                    self.store.delete_migration_log(tx, &log)
                })
                .inspect_err(|e| error!("rollback of '{}' failed: {e}", log.migration))?;

            info!(version = %log.version(), "rolled back migration '{}'", log.migration);
            rolled_back.push(log);
        }
        Ok(rolled_back)
    }

    fn version_map(&self) -> Result<HashMap<String, MigrationLog>> {
        let logs = self.get_migration_logs()?;
        Ok(logs
            .into_iter()
            .map(|log| (log.migration.version.clone(), log))
            .collect())
    }

    fn validate_hash(&self, log: &MigrationLog, migration: &Migration) -> Result<()> {
        if log.matches(migration) {
            return Ok(());
        }
        error!(version = %log.version(), "checksum mismatch for migration '{}'", log.migration);
        Err(Error::Checksum {
            version: log.version().to_string(),
            name: log.name().to_string(),
            table: self.store.table().to_string(),
        }
        .context(format!(
            "error in execution while validating hash for '{}'",
            log.migration
        )))
    }

    fn apply(&self, migration: &Migration) -> Result<MigrationLog> {
        info!(version = %migration.version, "applying migration '{migration}'");
        let mut log = MigrationLog::started(migration);
        log.id = self
            .runner
            .run(|tx| self.store.insert_migration_log(tx, &log))
            .map_err(|e| {
                e.context(format!(
                    "error while inserting migration log for migration '{migration}'"
                ))
            })?;
        self.execute(log)
    }

    /// Run a row again that is logged as STARTED or FAILED.
    fn reattempt(&self, mut log: MigrationLog) -> Result<MigrationLog> {
        warn!(
            version = %log.version(),
            status = %log.status,
            "re-attempting migration '{}'",
            log.migration
        );
        log.status = MigrationStatus::Started;
        self.runner
            .run(|tx| self.store.update_migration_status(tx, &log))
            .map_err(|e| {
                e.context(format!(
                    "error while updating status of migration '{}'",
                    log.migration
                ))
            })?;
        self.execute(log)
    }

    /// Execute the query of a STARTED row and record the outcome.
    fn execute(&self, mut log: MigrationLog) -> Result<MigrationLog> {
        let outcome = self.runner.run(|tx| {
            self.store.execute_query(tx, &log.migration)?;
            let done = MigrationLog {
                status: MigrationStatus::Success,
                ..log.clone()
            };
            self.store.update_migration_status(tx, &done)
        });

        match outcome {
            Ok(()) => {
                log.status = MigrationStatus::Success;
                info!(version = %log.version(), "migration '{}' applied", log.migration);
                Ok(log)
            }
            Err(err) => {
                error!(version = %log.version(), "migration '{}' failed: {err}", log.migration);
                log.status = MigrationStatus::Failed;
                match self
                    .runner
                    .run(|tx| self.store.update_migration_status(tx, &log))
                {
                    Ok(()) => Err(err),
                    Err(status_err) => Err(err.layer(status_err.context(format!(
                        "error while marking migration '{}' as {}",
                        log.migration,
                        MigrationStatus::Failed
                    )))),
                }
            }
        }
    }
}
