//! Instance registry and reconciliation.
//!
//! [`Orchestrator`] is the per-command context object: constructed once per
//! invocation, it loads the registry and port map from the store, applies
//! one mutation, persists, and is dropped when the process exits. Nothing is
//! shared between invocations except the persisted files, and concurrent
//! invocations are unsupported (no cross-process locking).

use crate::catalog;
use crate::compose::{self, GlobalDefaults};
use crate::engine::ContainerEngine;
use crate::envfile;
use crate::error::{validate_instance_name, Error, Result};
use crate::instance::{Instance, Status};
use crate::port::{PortAllocator, PortRange};
use crate::store::{RegistryMap, StateStore};
use chrono::Utc;
use rand::Rng;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Options for [`Orchestrator::create`].
#[derive(Debug, Default)]
pub struct CreateOptions {
    /// Requested host port. Honored when free; rejected for embedded
    /// engines, which take no port at all.
    pub preferred_port: Option<u16>,
    /// Explicit overrides, highest priority.
    pub env_overrides: BTreeMap<String, String>,
    /// Optional .env file merged between catalog defaults and overrides.
    pub env_file: Option<PathBuf>,
}

pub struct Orchestrator {
    store: Arc<dyn StateStore>,
    engine: Box<dyn ContainerEngine>,
    defaults: GlobalDefaults,
    allocator: PortAllocator,
    instances: RegistryMap,
}

impl Orchestrator {
    /// Load all persisted state and build the context for one command.
    pub fn new(
        store: Arc<dyn StateStore>,
        engine: Box<dyn ContainerEngine>,
        range: PortRange,
        defaults: GlobalDefaults,
    ) -> Result<Self> {
        let instances = store.load_registry()?;
        let allocator = PortAllocator::load(store.clone(), range)?;
        Ok(Self {
            store,
            engine,
            defaults,
            allocator,
            instances,
        })
    }

    // ── Read operations ─────────────────────────────────────────────

    pub fn get(&self, name: &str) -> Option<&Instance> {
        self.instances.get(name)
    }

    pub fn instances(&self) -> &RegistryMap {
        &self.instances
    }

    pub fn list(&self, filter: Option<Status>) -> Vec<&Instance> {
        self.instances
            .values()
            .filter(|inst| filter.map_or(true, |f| inst.status == f))
            .collect()
    }

    // ── Lifecycle operations ────────────────────────────────────────

    /// Register a new instance: allocate its port (unless embedded), create
    /// its volume directory, compute the connection URI, persist.
    pub async fn create(
        &mut self,
        name: &str,
        engine_id: &str,
        options: CreateOptions,
    ) -> Result<Instance> {
        validate_instance_name(name)?;
        if self.instances.contains_key(name) {
            return Err(Error::DuplicateName(name.to_string()));
        }

        let spec = catalog::lookup(engine_id)
            .ok_or_else(|| Error::UnknownEngine(engine_id.to_string()))?;

        let environment = merge_environment(spec, &options)?;

        // Embedded engines take no network port; requesting one is a
        // misunderstanding worth surfacing rather than ignoring.
        let port = if spec.default_port == 0 {
            if options.preferred_port.is_some() {
                return Err(Error::Validation {
                    what: "port",
                    reason: format!("engine '{}' is embedded and exposes no port", spec.id),
                });
            }
            0
        } else {
            self.allocator.allocate(name, options.preferred_port)?
        };

        let volume = self.store.volumes_dir().join(name);
        if let Err(e) = fs::create_dir_all(&volume) {
            self.rollback_port(port);
            return Err(Error::Persistence {
                action: "create",
                path: volume,
                source: e,
            });
        }

        let uri = catalog::render_template(spec.uri_template, &environment, port, &volume);

        let record = Instance {
            name: name.to_string(),
            engine: spec.id.to_string(),
            port,
            volume: volume.clone(),
            environment,
            status: Status::Stopped,
            created_at: Utc::now(),
            uri,
        };

        self.instances.insert(name.to_string(), record.clone());
        if let Err(e) = self.persist() {
            // Roll back so the volume-exists-iff-registered invariant holds.
            self.instances.remove(name);
            self.rollback_port(port);
            if let Err(rm_err) = fs::remove_dir_all(&volume) {
                tracing::warn!("Failed to clean up volume {}: {}", volume.display(), rm_err);
            }
            return Err(e);
        }

        self.write_descriptor()?;
        if port != 0 {
            tracing::info!("Created instance '{}' ({} on port {})", name, spec.id, port);
        } else {
            tracing::info!("Created instance '{}' ({}, embedded)", name, spec.id);
        }
        Ok(record)
    }

    /// Remove an instance. The engine stop is best-effort: a failure there
    /// is logged and swallowed so bookkeeping never orphans a registry
    /// entry, port or volume behind an unreachable container engine.
    pub async fn remove(&mut self, name: &str) -> Result<Instance> {
        let record = self
            .instances
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        let descriptor = self.write_descriptor()?;
        if let Err(e) = self
            .engine
            .stop(&descriptor, &[record.service_name()])
            .await
        {
            tracing::warn!(
                "Engine stop during removal of '{}' failed (continuing): {}",
                name,
                e
            );
        }

        // Registry first, port map second: failing between the two writes
        // leaves at worst an orphaned port-map entry, never a registered
        // instance whose port the allocator could hand out again.
        self.instances.remove(name);
        if let Err(e) = self.persist() {
            self.instances.insert(name.to_string(), record);
            return Err(e);
        }

        if record.port != 0 {
            self.allocator.deallocate(record.port)?;
        }

        if let Err(e) = fs::remove_dir_all(&record.volume) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    "Failed to remove volume {} (continuing): {}",
                    record.volume.display(),
                    e
                );
            }
        }
        self.write_descriptor()?;
        tracing::info!("Removed instance '{}'", name);
        Ok(record)
    }

    /// Start one instance. On engine failure the `error` status is persisted
    /// before the error surfaces, so `list` reflects reality afterwards.
    pub async fn start(&mut self, name: &str) -> Result<Instance> {
        self.reconcile_one(name, Verb::Start).await
    }

    /// Stop one instance, with the same error semantics as [`Self::start`].
    pub async fn stop(&mut self, name: &str) -> Result<Instance> {
        self.reconcile_one(name, Verb::Stop).await
    }

    /// Start every instance with a single engine invocation. Failure marks
    /// every instance `error`: the descriptor is one file and the engine
    /// call is all-or-nothing at that granularity.
    pub async fn start_all(&mut self) -> Result<()> {
        self.reconcile_all(Verb::Start).await
    }

    /// Stop every instance with a single engine invocation.
    pub async fn stop_all(&mut self) -> Result<()> {
        self.reconcile_all(Verb::Stop).await
    }

    /// Project connection URIs into an env file.
    pub fn project_env(&self, path: &Path) -> Result<usize> {
        envfile::project(&self.instances, path)
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn reconcile_one(&mut self, name: &str, verb: Verb) -> Result<Instance> {
        if !self.instances.contains_key(name) {
            return Err(Error::NotFound(name.to_string()));
        }

        let descriptor = self.write_descriptor()?;
        let services = vec![self.instances[name].service_name()];
        let outcome = self.invoke(verb, &descriptor, &services).await;

        let status = match &outcome {
            Ok(()) => verb.success_status(),
            Err(_) => Status::Error,
        };
        let record = match self.instances.get_mut(name) {
            Some(record) => {
                record.status = status;
                record.clone()
            }
            None => return Err(Error::NotFound(name.to_string())),
        };

        match outcome {
            Ok(()) => {
                self.persist()?;
                tracing::info!("{} instance '{}'", verb.past_tense(), name);
                Ok(record)
            }
            Err(e) => {
                if let Err(persist_err) = self.persist() {
                    tracing::warn!(
                        "Failed to persist error status for '{}': {}",
                        name,
                        persist_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn reconcile_all(&mut self, verb: Verb) -> Result<()> {
        if self.instances.is_empty() {
            return Ok(());
        }

        let descriptor = self.write_descriptor()?;
        let services: Vec<String> = self
            .instances
            .values()
            .map(Instance::service_name)
            .collect();
        let outcome = self.invoke(verb, &descriptor, &services).await;

        let status = match &outcome {
            Ok(()) => verb.success_status(),
            Err(_) => Status::Error,
        };
        for record in self.instances.values_mut() {
            record.status = status;
        }

        match outcome {
            Ok(()) => {
                self.persist()?;
                tracing::info!("{} all {} instances", verb.past_tense(), services.len());
                Ok(())
            }
            Err(e) => {
                if let Err(persist_err) = self.persist() {
                    tracing::warn!("Failed to persist error statuses: {}", persist_err);
                }
                Err(e)
            }
        }
    }

    async fn invoke(&self, verb: Verb, descriptor: &Path, services: &[String]) -> Result<()> {
        match verb {
            Verb::Start => self.engine.up(descriptor, services).await,
            Verb::Stop => self.engine.stop(descriptor, services).await,
        }
    }

    /// Regenerate the descriptor from the current registry and write it.
    /// Called immediately before every engine invocation: the registry may
    /// have changed since the descriptor was last on disk.
    fn write_descriptor(&self) -> Result<PathBuf> {
        let file = compose::synthesize(&self.instances, &self.defaults);
        let yaml = compose::to_yaml(&file)?;
        self.store.write_descriptor(&yaml)
    }

    fn persist(&self) -> Result<()> {
        self.store.save_registry(&self.instances)
    }

    fn rollback_port(&mut self, port: u16) {
        if port != 0 {
            if let Err(e) = self.allocator.deallocate(port) {
                tracing::warn!("Failed to release port {} during rollback: {}", port, e);
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Verb {
    Start,
    Stop,
}

impl Verb {
    fn success_status(self) -> Status {
        match self {
            Verb::Start => Status::Running,
            Verb::Stop => Status::Stopped,
        }
    }

    fn past_tense(self) -> &'static str {
        match self {
            Verb::Start => "Started",
            Verb::Stop => "Stopped",
        }
    }
}

/// Merge environment: catalog defaults, then the env file, then explicit
/// overrides (highest priority). The engine's password variable gets a
/// generated value when nothing supplied one, so instances never share a
/// default credential.
fn merge_environment(
    spec: &catalog::EngineSpec,
    options: &CreateOptions,
) -> Result<BTreeMap<String, String>> {
    let mut environment: BTreeMap<String, String> = spec
        .env_defaults
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    if let Some(path) = &options.env_file {
        let iter = dotenvy::from_path_iter(path).map_err(|e| Error::Validation {
            what: "env file",
            reason: format!("{}: {}", path.display(), e),
        })?;
        for item in iter {
            let (key, value) = item.map_err(|e| Error::Validation {
                what: "env file",
                reason: format!("{}: {}", path.display(), e),
            })?;
            envfile::validate_env_name(&key)?;
            environment.insert(key, value);
        }
    }

    for (key, value) in &options.env_overrides {
        envfile::validate_env_name(key)?;
        environment.insert(key.clone(), value.clone());
    }

    if let Some(password_var) = spec.password_var {
        environment
            .entry(password_var.to_string())
            .or_insert_with(generate_password);
    }

    Ok(environment)
}

/// Random 24-character alphanumeric credential.
fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(rand::distributions::Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}
