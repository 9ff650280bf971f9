//! Reads migrations from a directory tree of paired SQL files named
//! `<version>.<name>.<query|rollback>.sql`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use pins_common::{Error, Result};

use crate::migration::{Migration, validate_migrations};
use crate::version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Query,
    Rollback,
}

#[derive(Debug, PartialEq, Eq)]
struct FileName<'a> {
    version: &'a str,
    name: &'a str,
    kind: FileKind,
}

/// Parse every migration under `path`, recursing into sub-directories.
/// The result is sorted ascending by version.
pub fn parse_directory(path: &Path, separator: &str) -> Result<Vec<Migration>> {
    let mut by_version: HashMap<String, Migration> = HashMap::new();
    add_dir(path, &mut by_version)?;

    let mut migrations: Vec<Migration> = by_version.into_values().collect();
    version::sort_by_version(&mut migrations, separator, |m| m.version.as_str());

    validate_migrations(&migrations)
        .map_err(|e| e.context("error while validating migrations"))?;
    Ok(migrations)
}

fn add_dir(dir: &Path, by_version: &mut HashMap<String, Migration>) -> Result<()> {
    let entries =
        fs::read_dir(dir).map_err(|e| Error::io("error in reading directory", dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| Error::io("error in reading directory", dir, e))?;
        let path = entry.path();
        // Symlinks are never followed, a link back up the tree would recurse forever.
        let file_type = entry
            .file_type()
            .map_err(|e| Error::io("error in reading directory", &path, e))?;
        if file_type.is_dir() {
            add_dir(&path, by_version)?;
        } else {
            add_file(&path, by_version)?;
        }
    }
    Ok(())
}

fn add_file(path: &Path, by_version: &mut HashMap<String, Migration>) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| Error::FileName {
            file: path.display().to_string(),
        })?;
    let parsed = parse_file_name(file_name)?;

    let contents =
        fs::read_to_string(path).map_err(|e| Error::io("error in reading file", path, e))?;

    let migration = by_version
        .entry(parsed.version.to_string())
        .or_insert_with(|| Migration::new(parsed.version, parsed.name, "", ""));
    if migration.name != parsed.name {
        return Err(Error::NameMismatch {
            first: migration.to_string(),
            second: format!("{}-{}", parsed.version, parsed.name),
        });
    }

    match parsed.kind {
        FileKind::Query => migration.query = contents,
        FileKind::Rollback => migration.rollback = contents,
    }
    Ok(())
}

fn parse_file_name(file_name: &str) -> Result<FileName<'_>> {
    let parts: Vec<&str> = file_name.split('.').collect();
    let [version, name, kind, ext] = parts.as_slice() else {
        return Err(Error::FileName {
            file: file_name.to_string(),
        });
    };

    if *ext != "sql" {
        return Err(Error::FileType {
            file: file_name.to_string(),
        });
    }
    if version.is_empty() || name.is_empty() {
        return Err(Error::FileName {
            file: file_name.to_string(),
        });
    }

    let kind = match *kind {
        "query" => FileKind::Query,
        "rollback" => FileKind::Rollback,
        _ => {
            return Err(Error::FileName {
                file: file_name.to_string(),
            });
        }
    };

    Ok(FileName {
        version: *version,
        name: *name,
        kind,
    })
}
