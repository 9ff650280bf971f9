use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use chrono::Utc;
use pins_common::{Error, Result};
use ring::digest::{SHA256, digest};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// A versioned pair of forward and reverse SQL scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    pub name: String,
    pub version: String,
    pub query: String,
    pub rollback: String,
}

impl Migration {
    pub fn new(
        version: impl Into<String>,
        name: impl Into<String>,
        query: impl Into<String>,
        rollback: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            query: query.into(),
            rollback: rollback.into(),
        }
    }

    /// Digest of the forward script, as stored in the log.
    pub fn hash(&self) -> String {
        hash_query(&self.query)
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.version, self.name)
    }
}

/// SHA-256 of `query`, URL-safe base64 encoded.
pub fn hash_query(query: &str) -> String {
    URL_SAFE.encode(digest(&SHA256, query.as_bytes()))
}

/// Check that every migration has both halves and that no version repeats.
pub fn validate_migrations(migrations: &[Migration]) -> Result<()> {
    let mut seen = HashSet::new();
    for m in migrations {
        if m.query.is_empty() {
            return Err(Error::MissingQuery {
                version: m.version.clone(),
                name: m.name.clone(),
            });
        }
        if m.rollback.is_empty() {
            return Err(Error::MissingRollback {
                version: m.version.clone(),
                name: m.name.clone(),
            });
        }
        if !seen.insert(m.version.as_str()) {
            return Err(Error::DuplicateVersion {
                version: m.version.clone(),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MigrationStatus {
    Started,
    Success,
    Failed,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown migration status: {0}")]
pub struct UnknownStatus(String);

impl FromStr for MigrationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "STARTED" => Ok(Self::Started),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl ToSql for MigrationStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MigrationStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// A persisted record of one migration's application attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationLog {
    pub id: i64,
    #[serde(flatten)]
    pub migration: Migration,
    pub status: MigrationStatus,
    /// Epoch milliseconds of the execution attempt.
    pub date: i64,
    pub hash: String,
}

impl MigrationLog {
    /// A fresh STARTED row for `migration`. The id is assigned on insert.
    pub fn started(migration: &Migration) -> Self {
        Self {
            id: 0,
            migration: migration.clone(),
            status: MigrationStatus::Started,
            date: Utc::now().timestamp_millis(),
            hash: migration.hash(),
        }
    }

    pub fn version(&self) -> &str {
        &self.migration.version
    }

    pub fn name(&self) -> &str {
        &self.migration.name
    }

    pub fn is_success(&self) -> bool {
        self.status == MigrationStatus::Success
    }

    /// Whether the stored digest still matches `migration`'s forward script.
    pub fn matches(&self, migration: &Migration) -> bool {
        self.hash == migration.hash()
    }
}

impl fmt::Display for MigrationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.migration, self.status)
    }
}
