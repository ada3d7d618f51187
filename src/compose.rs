//! Descriptor synthesis.
//!
//! A pure projection of the registry onto a Docker Compose document. The
//! registry file stays authoritative; the descriptor is regenerated
//! immediately before every engine invocation and is never read back. All
//! collections are `BTreeMap`s so an unchanged registry serializes to
//! byte-identical YAML, letting the engine treat it as a no-op.

use crate::catalog;
use crate::error::Result;
use crate::store::RegistryMap;
use serde::Serialize;
use std::collections::BTreeMap;

/// Project-wide settings applied to every synthesized service.
#[derive(Debug, Clone)]
pub struct GlobalDefaults {
    /// Compose project name, also the prefix for container names.
    pub project: String,
    pub network: String,
    pub restart_policy: String,
}

impl Default for GlobalDefaults {
    fn default() -> Self {
        Self {
            project: "dbdock".to_string(),
            network: "dbdock".to_string(),
            restart_policy: "unless-stopped".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposeFile {
    pub services: BTreeMap<String, ComposeService>,
    pub volumes: BTreeMap<String, ComposeVolume>,
    pub networks: BTreeMap<String, ComposeNetwork>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposeService {
    pub image: String,
    pub container_name: String,
    pub restart: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    pub volumes: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<ComposeHealthcheck>,
    pub networks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposeHealthcheck {
    pub test: Vec<String>,
    pub interval: String,
    pub timeout: String,
    pub retries: u32,
}

/// Named volume bind-mounted onto the instance's exclusive host directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposeVolume {
    pub driver: String,
    pub driver_opts: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposeNetwork {}

/// Derive the descriptor from the registry.
///
/// One service per instance, named `{name}-db`. A port mapping is emitted
/// only for nonzero allocated ports. Registry records whose engine has
/// vanished from the catalog are skipped with a warning rather than
/// poisoning every other instance.
pub fn synthesize(instances: &RegistryMap, defaults: &GlobalDefaults) -> ComposeFile {
    let mut services = BTreeMap::new();
    let mut volumes = BTreeMap::new();

    for (name, instance) in instances {
        let Some(spec) = catalog::lookup(&instance.engine) else {
            tracing::warn!(
                "Instance '{}' references unknown engine '{}', leaving it out of the descriptor",
                name,
                instance.engine
            );
            continue;
        };

        let volume_name = format!("{}-data", name);
        let mut driver_opts = BTreeMap::new();
        driver_opts.insert("type".to_string(), "none".to_string());
        driver_opts.insert("o".to_string(), "bind".to_string());
        driver_opts.insert("device".to_string(), instance.volume.display().to_string());
        volumes.insert(
            volume_name.clone(),
            ComposeVolume {
                driver: "local".to_string(),
                driver_opts,
            },
        );

        let ports = if instance.port != 0 {
            vec![format!("{}:{}", instance.port, spec.default_port)]
        } else {
            Vec::new()
        };

        let command = spec
            .command
            .map(|tpl| catalog::render_template(tpl, &instance.environment, instance.port, &instance.volume));

        let healthcheck = spec.healthcheck.map(|hc| ComposeHealthcheck {
            test: hc.test.iter().map(|s| s.to_string()).collect(),
            interval: format!("{}s", hc.interval_secs),
            timeout: format!("{}s", hc.timeout_secs),
            retries: hc.retries,
        });

        services.insert(
            instance.service_name(),
            ComposeService {
                image: spec.image.to_string(),
                container_name: format!("{}-{}", defaults.project, name),
                restart: defaults.restart_policy.clone(),
                command,
                ports,
                volumes: vec![format!("{}:{}", volume_name, spec.data_path)],
                environment: instance.environment.clone(),
                healthcheck,
                networks: vec![defaults.network.clone()],
            },
        );
    }

    let mut networks = BTreeMap::new();
    networks.insert(defaults.network.clone(), ComposeNetwork {});

    ComposeFile {
        services,
        volumes,
        networks,
    }
}

/// Serialize a descriptor to YAML.
pub fn to_yaml(file: &ComposeFile) -> Result<String> {
    Ok(serde_yaml::to_string(file)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Instance, Status};
    use chrono::TimeZone;
    use chrono::Utc;
    use std::path::PathBuf;

    fn instance(name: &str, engine: &str, port: u16) -> Instance {
        let mut environment = BTreeMap::new();
        if engine == "redis" {
            environment.insert("REDIS_PASSWORD".to_string(), "hunter2".to_string());
        }
        Instance {
            name: name.to_string(),
            engine: engine.to_string(),
            port,
            volume: PathBuf::from(format!("/var/dbdock/data/{}", name)),
            environment,
            status: Status::Stopped,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            uri: String::new(),
        }
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let mut registry = RegistryMap::new();
        registry.insert("cache".to_string(), instance("cache", "redis", 5001));
        registry.insert("app".to_string(), instance("app", "postgresql", 5000));

        let defaults = GlobalDefaults::default();
        let first = to_yaml(&synthesize(&registry, &defaults)).unwrap();
        let second = to_yaml(&synthesize(&registry, &defaults)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_adding_instance_leaves_existing_blocks_untouched() {
        let mut registry = RegistryMap::new();
        registry.insert("app".to_string(), instance("app", "postgresql", 5000));
        let defaults = GlobalDefaults::default();
        let before = synthesize(&registry, &defaults);

        registry.insert("cache".to_string(), instance("cache", "redis", 5001));
        let after = synthesize(&registry, &defaults);

        assert_eq!(after.services.len(), 2);
        assert_eq!(after.services["app-db"], before.services["app-db"]);
        assert!(after.services.contains_key("cache-db"));
    }

    #[test]
    fn test_embedded_engine_has_no_port_mapping() {
        let mut registry = RegistryMap::new();
        registry.insert("files".to_string(), instance("files", "sqlite", 0));

        let file = synthesize(&registry, &GlobalDefaults::default());
        let service = &file.services["files-db"];
        assert!(service.ports.is_empty());
        assert!(service.healthcheck.is_none());

        let yaml = to_yaml(&file).unwrap();
        assert!(!yaml.contains("ports:"), "yaml: {}", yaml);
    }

    #[test]
    fn test_port_mapping_targets_container_default() {
        let mut registry = RegistryMap::new();
        registry.insert("cache".to_string(), instance("cache", "redis", 5001));

        let file = synthesize(&registry, &GlobalDefaults::default());
        assert_eq!(file.services["cache-db"].ports, vec!["5001:6379".to_string()]);
    }

    #[test]
    fn test_command_template_is_rendered() {
        let mut registry = RegistryMap::new();
        registry.insert("cache".to_string(), instance("cache", "redis", 5001));

        let file = synthesize(&registry, &GlobalDefaults::default());
        assert_eq!(
            file.services["cache-db"].command.as_deref(),
            Some("redis-server --requirepass hunter2")
        );
    }

    #[test]
    fn test_volume_binds_instance_directory() {
        let mut registry = RegistryMap::new();
        registry.insert("app".to_string(), instance("app", "postgresql", 5000));

        let file = synthesize(&registry, &GlobalDefaults::default());
        let volume = &file.volumes["app-data"];
        assert_eq!(volume.driver, "local");
        assert_eq!(volume.driver_opts["device"], "/var/dbdock/data/app");
        assert_eq!(
            file.services["app-db"].volumes,
            vec!["app-data:/var/lib/postgresql/data".to_string()]
        );
    }

    #[test]
    fn test_unknown_engine_is_skipped() {
        let mut registry = RegistryMap::new();
        registry.insert("ghost".to_string(), instance("ghost", "dbase", 5002));
        registry.insert("app".to_string(), instance("app", "postgresql", 5000));

        let file = synthesize(&registry, &GlobalDefaults::default());
        assert_eq!(file.services.len(), 1);
        assert!(file.services.contains_key("app-db"));
    }

    #[test]
    fn test_top_level_sections_always_present() {
        let yaml = to_yaml(&synthesize(&RegistryMap::new(), &GlobalDefaults::default())).unwrap();
        assert!(yaml.contains("services:"));
        assert!(yaml.contains("volumes:"));
        assert!(yaml.contains("networks:"));
    }
}
