use miette::Diagnostic;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Invalid {what}: {reason}")]
    #[diagnostic(code(dbdock::validation))]
    Validation { what: &'static str, reason: String },

    #[error("Instance '{0}' already exists")]
    #[diagnostic(
        code(dbdock::instance::duplicate),
        help("Pick another name, or remove the existing instance with `dbdock remove {0}`")
    )]
    DuplicateName(String),

    #[error("Instance not found: {0}")]
    #[diagnostic(
        code(dbdock::instance::not_found),
        help("List known instances with `dbdock list`")
    )]
    NotFound(String),

    #[error("Unknown engine: {0}")]
    #[diagnostic(
        code(dbdock::engine::unknown),
        help("Supported engines: postgresql, mysql, mariadb, redis, mongodb, sqlite")
    )]
    UnknownEngine(String),

    #[error("No free port in range {start}-{end}")]
    #[diagnostic(
        code(dbdock::port::exhausted),
        help("Remove unused instances to free ports, or widen the range with --port-range")
    )]
    PortExhaustion { start: u16, end: u16 },

    #[error("Container engine failed during {operation}: {diagnostic}")]
    #[diagnostic(
        code(dbdock::engine::invocation),
        help("Check that Docker is running with `docker ps`")
    )]
    EngineInvocation { operation: String, diagnostic: String },

    #[error("Failed to {action} {path}: {source}")]
    #[diagnostic(code(dbdock::persistence))]
    Persistence {
        action: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::DuplicateName(name) => Some(format!(
                "An instance named '{}' is already registered. Remove it first with: dbdock remove {}",
                name, name
            )),
            Error::NotFound(name) => Some(format!(
                "No instance named '{}'. Check 'dbdock list' for registered instances.",
                name
            )),
            Error::UnknownEngine(_) => Some(
                "Supported engines: postgresql, mysql, mariadb, redis, mongodb, sqlite".to_string(),
            ),
            Error::PortExhaustion { start, end } => Some(format!(
                "Every port in {}-{} is allocated or occupied. Free ports by removing instances, or pass a wider --port-range.",
                start, end
            )),
            Error::EngineInvocation { .. } => {
                Some("Check that Docker is running: docker ps".to_string())
            }
            Error::Persistence { path, .. } => Some(format!(
                "Check permissions and free disk space for {}",
                path.display()
            )),
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}

/// Validate an instance name for registry and filesystem use.
///
/// Names become container names, volume directory names and environment
/// variable prefixes, so the charset is deliberately narrow: lowercase
/// alphanumerics, '-' and '_', starting with an alphanumeric, at most 63
/// characters (the container-name limit).
pub fn validate_instance_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation {
            what: "instance name",
            reason: "name cannot be empty".to_string(),
        });
    }

    if name.len() > 63 {
        return Err(Error::Validation {
            what: "instance name",
            reason: format!("'{}' is too long (max 63 characters)", name),
        });
    }

    let first = name.chars().next().unwrap();
    if !first.is_ascii_alphanumeric() {
        return Err(Error::Validation {
            what: "instance name",
            reason: format!("'{}' must start with a letter or digit", name),
        });
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(Error::Validation {
            what: "instance name",
            reason: format!(
                "'{}' contains invalid characters. Only lowercase alphanumeric, '-' and '_' allowed.",
                name
            ),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name_valid() {
        assert!(validate_instance_name("cache").is_ok());
        assert!(validate_instance_name("my-app-db").is_ok());
        assert!(validate_instance_name("db_2").is_ok());
        assert!(validate_instance_name("x").is_ok());
    }

    #[test]
    fn test_validate_name_invalid() {
        assert!(validate_instance_name("").is_err());
        assert!(validate_instance_name("-leading-dash").is_err());
        assert!(validate_instance_name("_leading_underscore").is_err());
        assert!(validate_instance_name("has space").is_err());
        assert!(validate_instance_name("Uppercase").is_err());
        assert!(validate_instance_name("slash/name").is_err());
        assert!(validate_instance_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_suggestion_for_not_found() {
        let err = Error::NotFound("missing".to_string());
        let hint = err.suggestion().unwrap();
        assert!(hint.contains("dbdock list"));
        assert!(err.with_suggestion().contains("Hint:"));
    }
}
