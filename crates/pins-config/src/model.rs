use std::path::PathBuf;

use pins_common::Result;
use serde::{Deserialize, Serialize};

use crate::validation::IdentifierValidator;

pub const DEFAULT_TABLE: &str = "migration_log";
pub const DEFAULT_VERSION_SEPARATOR: &str = "-";
pub const DEFAULT_DATABASE: &str = "pins.db";

/// Settings for one migration target: which database, which log table and
/// how version strings are segmented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigratorConfig {
    pub database: PathBuf,
    pub table: String,
    pub schema: Option<String>,
    /// Database file attached as `schema`. Defaults to `<stem>_<schema>.db`
    /// next to `database`.
    pub schema_path: Option<PathBuf>,
    pub version_separator: String,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            table: DEFAULT_TABLE.to_string(),
            schema: None,
            schema_path: None,
            version_separator: DEFAULT_VERSION_SEPARATOR.to_string(),
        }
    }
}

impl MigratorConfig {
    /// Table name as it appears in SQL, qualified by the schema when one is set.
    pub fn qualified_table(&self) -> String {
        match self.schema.as_deref() {
            Some(schema) => format!("{schema}.{}", self.table),
            None => self.table.clone(),
        }
    }

    /// Database file to `ATTACH` under the schema name, if a schema is set.
    /// `main` names the primary database and needs no attachment.
    pub fn schema_database(&self) -> Option<PathBuf> {
        let schema = self
            .schema
            .as_deref()
            .filter(|s| !s.eq_ignore_ascii_case("main"))?;
        if let Some(path) = &self.schema_path {
            return Some(path.clone());
        }
        let stem = self
            .database
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pins".to_string());
        Some(self.database.with_file_name(format!("{stem}_{schema}.db")))
    }

    /// Table and schema end up interpolated into SQL text, so both must be
    /// plain identifiers.
    pub fn validate(&self) -> Result<()> {
        IdentifierValidator::validate("table", &self.table)?;
        if let Some(schema) = &self.schema {
            IdentifierValidator::validate("schema", schema)?;
        }
        if self.version_separator.is_empty() {
            return Err(pins_common::Error::Config(
                "version separator cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = MigratorConfig::default();
        assert_eq!(config.table, "migration_log");
        assert_eq!(config.version_separator, "-");
        assert_eq!(config.database, PathBuf::from("pins.db"));
        assert!(config.schema.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn qualified_table_includes_schema() {
        let mut config = MigratorConfig::default();
        assert_eq!(config.qualified_table(), "migration_log");

        config.schema = Some("my_schema".into());
        assert_eq!(config.qualified_table(), "my_schema.migration_log");
    }

    #[test]
    fn schema_database_defaults_next_to_main_database() {
        let mut config = MigratorConfig {
            database: PathBuf::from("/var/lib/app/main.db"),
            ..Default::default()
        };
        assert_eq!(config.schema_database(), None);

        config.schema = Some("audit".into());
        assert_eq!(
            config.schema_database(),
            Some(PathBuf::from("/var/lib/app/main_audit.db"))
        );

        config.schema_path = Some(PathBuf::from("/srv/audit.sqlite"));
        assert_eq!(
            config.schema_database(),
            Some(PathBuf::from("/srv/audit.sqlite"))
        );

        config.schema = Some("main".into());
        assert_eq!(config.schema_database(), None);
    }

    #[test]
    fn validate_rejects_bad_identifiers_and_separator() {
        let config = MigratorConfig {
            table: "migration_log; DROP TABLE users".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MigratorConfig {
            schema: Some("1schema".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MigratorConfig {
            version_separator: String::new(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("version separator"));
    }
}
