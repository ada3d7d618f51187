//! Container engine invocation.
//!
//! All `docker compose` subprocess calls go through [`ComposeRunner`], which
//! detects v2 (`docker compose`) vs v1 (`docker-compose`) once per process
//! and maps nonzero exits to [`Error::EngineInvocation`] with the captured
//! stderr. Calls are awaited to completion with no timeout: a hung engine
//! hangs the command, an accepted property of a local single-user tool.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::OnceCell;

/// Seam between the orchestrator and the container engine. The real
/// implementation shells out to Docker Compose; tests substitute a fake.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Bring the named services up (create + start), detached.
    async fn up(&self, descriptor: &Path, services: &[String]) -> Result<()>;

    /// Stop the named services without removing their state.
    async fn stop(&self, descriptor: &Path, services: &[String]) -> Result<()>;
}

#[async_trait]
impl<T: ContainerEngine + ?Sized> ContainerEngine for std::sync::Arc<T> {
    async fn up(&self, descriptor: &Path, services: &[String]) -> Result<()> {
        (**self).up(descriptor, services).await
    }

    async fn stop(&self, descriptor: &Path, services: &[String]) -> Result<()> {
        (**self).stop(descriptor, services).await
    }
}

/// Docker Compose command flavor.
#[derive(Debug, Clone, Copy)]
enum ComposeCommand {
    V2, // docker compose
    V1, // docker-compose
}

static COMPOSE_COMMAND: OnceCell<ComposeCommand> = OnceCell::const_new();

impl ComposeCommand {
    async fn detect() -> Result<ComposeCommand> {
        let v2_check = tokio::process::Command::new("docker")
            .args(["compose", "version"])
            .output()
            .await;
        if let Ok(output) = v2_check {
            if output.status.success() {
                return Ok(ComposeCommand::V2);
            }
        }

        let v1_check = tokio::process::Command::new("docker-compose")
            .args(["--version"])
            .output()
            .await;
        if let Ok(output) = v1_check {
            if output.status.success() {
                return Ok(ComposeCommand::V1);
            }
        }

        Err(Error::EngineInvocation {
            operation: "detect".to_string(),
            diagnostic: "Neither 'docker compose' (v2) nor 'docker-compose' (v1) found"
                .to_string(),
        })
    }

    async fn get() -> Result<ComposeCommand> {
        COMPOSE_COMMAND
            .get_or_try_init(|| async { Self::detect().await })
            .await
            .copied()
    }

    fn command_and_args(&self) -> (&'static str, Vec<&'static str>) {
        match self {
            ComposeCommand::V2 => ("docker", vec!["compose"]),
            ComposeCommand::V1 => ("docker-compose", vec![]),
        }
    }
}

/// Compose-backed engine scoped to one project.
pub struct ComposeRunner {
    project: String,
}

impl ComposeRunner {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
        }
    }

    async fn run(&self, descriptor: &Path, operation: &str, args: &[&str]) -> Result<()> {
        let compose = ComposeCommand::get().await?;
        let (cmd, base_args) = compose.command_and_args();

        let descriptor_str = descriptor.to_str().ok_or_else(|| Error::Validation {
            what: "descriptor path",
            reason: format!("{} is not valid UTF-8", descriptor.display()),
        })?;

        let mut command = tokio::process::Command::new(cmd);
        command.args(base_args);
        command.args(["-f", descriptor_str, "-p", &self.project]);
        command.args(args);

        tracing::debug!("Invoking container engine: {} {:?}", cmd, args);

        // Awaited to completion, no timeout (single-shot process model).
        let output = command.output().await.map_err(|e| Error::EngineInvocation {
            operation: operation.to_string(),
            diagnostic: format!("failed to spawn {}: {}", cmd, e),
        })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Error::EngineInvocation {
            operation: operation.to_string(),
            diagnostic: stderr.trim().to_string(),
        })
    }
}

#[async_trait]
impl ContainerEngine for ComposeRunner {
    async fn up(&self, descriptor: &Path, services: &[String]) -> Result<()> {
        let mut args: Vec<&str> = vec!["up", "-d"];
        args.extend(services.iter().map(String::as_str));
        let operation = format!("up {}", services.join(" "));
        self.run(descriptor, &operation, &args).await
    }

    async fn stop(&self, descriptor: &Path, services: &[String]) -> Result<()> {
        let mut args: Vec<&str> = vec!["stop"];
        args.extend(services.iter().map(String::as_str));
        let operation = format!("stop {}", services.join(" "));
        self.run(descriptor, &operation, &args).await
    }
}

/// Scripted engine for tests: records every call and fails on demand.
pub struct FakeEngine {
    calls: parking_lot::Mutex<Vec<(String, Vec<String>)>>,
    fail_up: std::sync::atomic::AtomicBool,
    fail_stop: std::sync::atomic::AtomicBool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            calls: parking_lot::Mutex::new(Vec::new()),
            fail_up: std::sync::atomic::AtomicBool::new(false),
            fail_stop: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn fail_up(&self, fail: bool) {
        self.fail_up.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn fail_stop(&self, fail: bool) {
        self.fail_stop
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Calls recorded so far as `(verb, service names)`.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().clone()
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn up(&self, _descriptor: &Path, services: &[String]) -> Result<()> {
        self.calls
            .lock()
            .push(("up".to_string(), services.to_vec()));
        if self.fail_up.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::EngineInvocation {
                operation: format!("up {}", services.join(" ")),
                diagnostic: "simulated engine failure".to_string(),
            });
        }
        Ok(())
    }

    async fn stop(&self, _descriptor: &Path, services: &[String]) -> Result<()> {
        self.calls
            .lock()
            .push(("stop".to_string(), services.to_vec()));
        if self.fail_stop.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::EngineInvocation {
                operation: format!("stop {}", services.join(" ")),
                diagnostic: "simulated engine failure".to_string(),
            });
        }
        Ok(())
    }
}
