use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

const FILE_NAME_EXAMPLE: &str = "E.g. 1-1.user-setup.query.sql, 1-1.user-setup.rollback.sql";

#[derive(Error, Debug)]
pub enum Error {
    #[error(
        "invalid filename - {file}. File name has to be of format 'ver.name.query|rollback.sql'. {}",
        FILE_NAME_EXAMPLE
    )]
    FileName { file: String },

    #[error(
        "invalid filename - {file}. Only files with sql extensions are supported. {}",
        FILE_NAME_EXAMPLE
    )]
    FileType { file: String },

    #[error(
        "invalid filenames - {first} {second}. Version and name must be same for query and rollback files"
    )]
    NameMismatch { first: String, second: String },

    #[error("missing query file for version: {version}, name: {name}")]
    MissingQuery { version: String, name: String },

    #[error("missing rollback file for version: {version}, name: {name}")]
    MissingRollback { version: String, name: String },

    #[error("duplicate migration version: {version}")]
    DuplicateVersion { version: String },

    #[error(
        "migration checksum failed for version {version} ({name}). Please manually roll back the changes \
         from the latest migration down to this version and delete the matching entries from {table}"
    )]
    Checksum {
        version: String,
        name: String,
        table: String,
    },

    #[error("{context}: {source}")]
    Database {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{context} '{}': {source}", path.display())]
    Io {
        context: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{source}; additionally: {additional}")]
    Layered {
        #[source]
        source: Box<Error>,
        additional: Box<Error>,
    },

    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("usage error: {0}")]
    Usage(String),
}

impl Error {
    pub fn database(context: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::Database {
            context: context.into(),
            source,
        }
    }

    pub fn io(context: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            path: path.into(),
            source,
        }
    }

    /// Wrap `self` with a message describing the operation that failed.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Attach a second failure that happened while handling `self`.
    pub fn layer(self, additional: Error) -> Self {
        Self::Layered {
            source: Box::new(self),
            additional: Box::new(additional),
        }
    }

    /// The innermost error beneath any context or layering.
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::Context { source, .. } | Self::Layered { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_checksum(&self) -> bool {
        matches!(self.root_cause(), Self::Checksum { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn error_display_includes_context() {
        let e = Error::Config("bad yaml".into());
        assert_eq!(e.to_string(), "configuration error: bad yaml");

        let e = Error::MissingRollback {
            version: "1-1".into(),
            name: "add-description".into(),
        };
        assert_eq!(
            e.to_string(),
            "missing rollback file for version: 1-1, name: add-description"
        );

        let e = Error::Usage("unknown command".into());
        assert_eq!(e.to_string(), "usage error: unknown command");
    }

    #[test]
    fn context_and_layers_keep_the_cause_text() {
        let cause = Error::database(
            "error while executing query for migration '1-init'",
            rusqlite::Error::InvalidQuery,
        );
        let e = cause
            .layer(Error::Config("status update failed".into()))
            .context("error while running migrations");

        let text = e.to_string();
        assert!(text.starts_with("error while running migrations: "));
        assert!(text.contains("error while executing query for migration '1-init'"));
        assert!(text.contains("additionally: configuration error: status update failed"));
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn checksum_is_detected_through_wrappers() {
        let e = Error::Checksum {
            version: "2".into(),
            name: "add-col".into(),
            table: "migration_log".into(),
        }
        .context("error while validating hash");
        assert!(e.is_checksum());
        assert!(e.to_string().contains("migration checksum failed for version 2"));
        assert!(!Error::Usage("x".into()).is_checksum());
    }

    #[test]
    fn root_cause_skips_wrappers() {
        let e = Error::FileName {
            file: "1.init.sql".into(),
        }
        .context("error while processing dir")
        .context("error while running migrations from path");
        assert!(matches!(e.root_cause(), Error::FileName { file } if file == "1.init.sql"));
    }
}
