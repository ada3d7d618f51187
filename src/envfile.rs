//! Environment-file projection.
//!
//! Writes one `{NAME}_DB_URL=<uri>` line per instance into a target file for
//! application consumption. Only line-oriented `KEY=VALUE` detection is
//! performed; unrelated lines (comments, exports, blank lines, other
//! variables) are preserved verbatim. Managed keys are de-duplicated.

use crate::error::{Error, Result};
use crate::store::RegistryMap;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// The projected variable name for an instance: uppercased, `-` → `_`,
/// suffixed `_DB_URL`.
pub fn var_name(instance_name: &str) -> String {
    format!(
        "{}_DB_URL",
        instance_name.to_ascii_uppercase().replace('-', "_")
    )
}

/// Project connection URIs into `path`, returning the number of variables
/// written. The file is created when missing.
pub fn project(instances: &RegistryMap, path: &Path) -> Result<usize> {
    let desired: BTreeMap<String, String> = instances
        .values()
        .map(|inst| (var_name(&inst.name), inst.uri.clone()))
        .collect();

    let existing = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(Error::Persistence {
                action: "read",
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let mut emitted: BTreeSet<&str> = BTreeSet::new();
    let mut lines: Vec<String> = Vec::new();

    for line in existing.lines() {
        let managed = line
            .split_once('=')
            .and_then(|(key, _)| desired.get_key_value(key.trim()));
        match managed {
            Some((key, value)) => {
                // First occurrence is rewritten in place; duplicates drop.
                if emitted.insert(key) {
                    lines.push(format!("{}={}", key, value));
                }
            }
            None => lines.push(line.to_string()),
        }
    }

    for (key, value) in &desired {
        if !emitted.contains(key.as_str()) {
            lines.push(format!("{}={}", key, value));
        }
    }

    let mut contents = lines.join("\n");
    if !contents.is_empty() {
        contents.push('\n');
    }

    fs::write(path, contents).map_err(|e| Error::Persistence {
        action: "write",
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(desired.len())
}

/// Validate an environment variable name (POSIX rules: leading letter or
/// underscore, then alphanumerics and underscores).
pub fn validate_env_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation {
            what: "environment variable name",
            reason: "name cannot be empty".to_string(),
        });
    }

    let first = name.chars().next().unwrap();
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(Error::Validation {
            what: "environment variable name",
            reason: format!("'{}' must start with a letter or underscore", name),
        });
    }

    if let Some(bad) = name.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '_') {
        return Err(Error::Validation {
            what: "environment variable name",
            reason: format!("'{}' contains invalid character '{}'", name, bad),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Instance, Status};
    use chrono::Utc;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn registry_with(pairs: &[(&str, &str)]) -> RegistryMap {
        let mut registry = RegistryMap::new();
        for (name, uri) in pairs {
            registry.insert(
                name.to_string(),
                Instance {
                    name: name.to_string(),
                    engine: "redis".to_string(),
                    port: 5001,
                    volume: PathBuf::from("/tmp"),
                    environment: Default::default(),
                    status: Status::Stopped,
                    created_at: Utc::now(),
                    uri: uri.to_string(),
                },
            );
        }
        registry
    }

    #[test]
    fn test_var_name_mapping() {
        assert_eq!(var_name("cache"), "CACHE_DB_URL");
        assert_eq!(var_name("my-app"), "MY_APP_DB_URL");
        assert_eq!(var_name("db_2"), "DB_2_DB_URL");
    }

    #[test]
    fn test_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        let registry = registry_with(&[("cache", "redis://:pw@localhost:5001")]);

        let written = project(&registry, &path).unwrap();
        assert_eq!(written, 1);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "CACHE_DB_URL=redis://:pw@localhost:5001\n"
        );
    }

    #[test]
    fn test_preserves_unrelated_lines_verbatim() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        fs::write(
            &path,
            "# app settings\nAPI_KEY=abc123\n\nexport WEIRD LINE\nCACHE_DB_URL=old-value\n",
        )
        .unwrap();

        let registry = registry_with(&[("cache", "redis://:pw@localhost:5001")]);
        project(&registry, &path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "# app settings\nAPI_KEY=abc123\n\nexport WEIRD LINE\nCACHE_DB_URL=redis://:pw@localhost:5001\n"
        );
    }

    #[test]
    fn test_deduplicates_managed_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "CACHE_DB_URL=one\nOTHER=x\nCACHE_DB_URL=two\n").unwrap();

        let registry = registry_with(&[("cache", "redis://:pw@localhost:5001")]);
        project(&registry, &path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents.matches("CACHE_DB_URL").count(),
            1,
            "contents: {}",
            contents
        );
        assert!(contents.contains("OTHER=x"));
    }

    #[test]
    fn test_appends_new_variables() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "EXISTING=1\n").unwrap();

        let registry = registry_with(&[
            ("cache", "redis://:pw@localhost:5001"),
            ("app", "postgresql://u:p@localhost:5000/app"),
        ]);
        project(&registry, &path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("EXISTING=1\n"));
        assert!(contents.contains("APP_DB_URL=postgresql://u:p@localhost:5000/app\n"));
        assert!(contents.contains("CACHE_DB_URL=redis://:pw@localhost:5001\n"));
    }

    #[test]
    fn test_validate_env_name() {
        assert!(validate_env_name("POSTGRES_PASSWORD").is_ok());
        assert!(validate_env_name("_private").is_ok());
        assert!(validate_env_name("").is_err());
        assert!(validate_env_name("1BAD").is_err());
        assert!(validate_env_name("BAD-NAME").is_err());
    }
}
