//! # dbdock
//!
//! Provision and supervise named local database containers without a
//! long-lived daemon.
//!
//! A developer declares an instance by name and engine; dbdock keeps a
//! persistent mapping of name → running container → connection details.
//! Every invocation reloads state from disk, applies one mutation, persists
//! it and exits. Cross-invocation state lives entirely in the files under
//! the data directory (`instances.json`, `ports.json`, `compose.yaml`).
//!
//! ## Quick start
//!
//! ```no_run
//! use dbdock::{
//!     ComposeRunner, CreateOptions, FileStore, GlobalDefaults, Orchestrator, PortRange,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), dbdock::Error> {
//! let store = Arc::new(FileStore::new("/home/me/.dbdock")?);
//! let engine = Box::new(ComposeRunner::new("dbdock"));
//! let mut orchestrator = Orchestrator::new(
//!     store,
//!     engine,
//!     PortRange::default(),
//!     GlobalDefaults::default(),
//! )?;
//!
//! let record = orchestrator
//!     .create("cache", "redis", CreateOptions::default())
//!     .await?;
//! println!("{}", record.uri);
//!
//! orchestrator.start("cache").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency model
//!
//! Execution is single-threaded and sequential within one invocation. There
//! is no cross-process locking: concurrent invocations are unsupported
//! (last writer wins), a documented limitation of the tool. Engine
//! subprocess calls are awaited to completion with no timeout.

pub mod catalog;
pub mod compose;
pub mod engine;
pub mod envfile;
pub mod error;
pub mod instance;
pub mod port;
pub mod registry;
pub mod store;

// Re-export commonly used types
pub use compose::GlobalDefaults;
pub use engine::{ComposeRunner, ContainerEngine, FakeEngine};
pub use error::{Error, Result};
pub use instance::{Instance, Status};
pub use port::{PortAllocator, PortRange};
pub use registry::{CreateOptions, Orchestrator};
pub use store::{FileStore, MemoryStore, StateStore};
