use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Lifecycle status of an instance.
///
/// `Error` is reached when an engine invocation fails during start/stop and
/// is recoverable by retrying either operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Stopped,
    Running,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Stopped => "stopped",
            Status::Running => "running",
            Status::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stopped" => Ok(Status::Stopped),
            "running" => Ok(Status::Running),
            "error" => Ok(Status::Error),
            other => Err(format!(
                "unknown status '{}' (expected stopped, running or error)",
                other
            )),
        }
    }
}

/// A registered database instance.
///
/// The registry file is the authoritative record; the compose descriptor is
/// derived from these and never read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub engine: String,
    /// Allocated host port. 0 means the engine is embedded and exposes none.
    pub port: u16,
    /// Exclusively owned host directory backing the container's data volume.
    pub volume: PathBuf,
    pub environment: BTreeMap<String, String>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    /// Connection URI, computed once at creation from the allocated port.
    pub uri: String,
}

impl Instance {
    /// The deterministic compose service name for this instance.
    pub fn service_name(&self) -> String {
        format!("{}-db", self.name)
    }
}
