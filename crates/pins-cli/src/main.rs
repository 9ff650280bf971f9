mod table;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pins_common::Error;
use pins_config::{ConfigLoader, MigratorConfig};
use pins_db::{MigrationLogStore, Migrator};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::table::render_migration_table;

#[derive(Parser, Debug)]
#[command(name = "pins", version, about = "Apply and roll back versioned SQL migrations")]
struct Cli {
    /// Config file (.yml, .yaml or .toml)
    #[arg(long, global = true, env = "PINS_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file, overrides the config file
    #[arg(long, global = true, env = "PINS_DATABASE")]
    database: Option<PathBuf>,

    /// Migration log table name
    #[arg(long, global = true)]
    table: Option<String>,

    /// Schema (attached database) holding the migration log table
    #[arg(long, global = true)]
    schema: Option<String>,

    /// Database file attached as the schema, defaults to <database>_<schema>.db
    #[arg(long, global = true)]
    schema_path: Option<PathBuf>,

    /// Separator between version segments
    #[arg(long, global = true)]
    separator: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse the migrations under PATH and apply the pending ones
    Run { path: PathBuf },
    /// Roll back every applied migration newer than VERSION
    Rollback { version: String },
    /// Show the migration log
    Status {
        /// Print rows as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = run(cli) {
        error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Config file first, then command-line overrides.
fn resolve_config(cli: &Cli) -> pins_common::Result<MigratorConfig> {
    let mut config = ConfigLoader::load_or_default(cli.config.as_deref())?;
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    if let Some(table) = &cli.table {
        config.table = table.clone();
    }
    if let Some(schema) = &cli.schema {
        config.schema = Some(schema.clone());
    }
    if let Some(schema_path) = &cli.schema_path {
        config.schema_path = Some(schema_path.clone());
    }
    if let Some(separator) = &cli.separator {
        config.version_separator = separator.clone();
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    let migrator = Migrator::open(&config)?;

    match cli.command {
        Command::Run { path } => {
            migrator.run_migrations_from_directory(&path)?;
            let logs = migrator.get_migration_logs().map_err(|e| {
                e.context("migration completed, but error in fetching migration log")
            })?;
            info!("migration completed, following are the migrations executed / verified");
            println!("{}", render_migration_table(&logs));
        }
        Command::Rollback { version } => {
            if version.trim().is_empty() {
                return Err(Error::Usage(
                    "rollback needs a version as argument, e.g. 'rollback 1-1'".into(),
                )
                .into());
            }
            migrator.rollback(&version)?;
            let logs = migrator.get_migration_logs().map_err(|e| {
                e.context("rollback completed, but error in fetching migration log")
            })?;
            info!("migration rollback completed, following are the remaining migrations");
            println!("{}", render_migration_table(&logs));
        }
        Command::Status { json } => {
            migrator
                .runner()
                .run(|tx| migrator.store().setup_migration_table(tx))?;
            let logs = migrator.get_migration_logs()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&logs)?);
            } else {
                println!("{}", render_migration_table(&logs));
            }
        }
    }
    Ok(())
}
