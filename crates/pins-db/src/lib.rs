//! SQLite-backed schema migrations.
//!
//! Migrations are pairs of forward (`query`) and reverse (`rollback`) SQL
//! scripts identified by a segmented version string. [`Migrator`] applies
//! pending ones in version order, records each attempt in a log table with a
//! digest of its forward script, refuses to continue when an applied script
//! has changed, and rolls back newest-first down to a target version.
//!
//! ```no_run
//! use std::path::Path;
//!
//! use pins_config::MigratorConfig;
//! use pins_db::Migrator;
//!
//! # fn main() -> pins_common::Result<()> {
//! let migrator = Migrator::open(&MigratorConfig::default())?;
//! migrator.run_migrations_from_directory(Path::new("migrations"))?;
//! migrator.rollback("1")?;
//! # Ok(())
//! # }
//! ```

pub mod migration;
pub mod migrator;
pub mod parser;
pub mod store;
pub mod tx;
pub mod version;

pub use migration::{Migration, MigrationLog, MigrationStatus, hash_query};
pub use migrator::Migrator;
pub use parser::parse_directory;
pub use store::{MigrationLogStore, SqliteMigrationLogStore};
pub use tx::TxRunner;
