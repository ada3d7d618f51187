use clap::{Parser, Subcommand};
use dbdock::PortRange;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dbdock")]
#[command(about = "Provision and supervise named local database containers")]
#[command(version)]
pub struct Cli {
    /// State directory (defaults to ~/.dbdock)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Port range scanned for automatic allocation
    #[arg(long, global = true, default_value = "5000-5999", value_name = "START-END")]
    pub port_range: PortRange,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new database instance
    Create {
        /// Instance name (lowercase alphanumeric, '-' and '_')
        name: String,

        /// Engine id (postgresql, mysql, mariadb, redis, mongodb, sqlite)
        engine: String,

        /// Preferred host port (scanned range is used when omitted or taken)
        #[arg(short, long)]
        port: Option<u16>,

        /// Environment override, repeatable
        #[arg(short, long, value_name = "KEY=VALUE")]
        env: Vec<String>,

        /// .env file merged between engine defaults and --env overrides
        #[arg(long, value_name = "PATH")]
        env_file: Option<PathBuf>,
    },
    /// Remove an instance, its port allocation and its data volume
    #[command(alias = "rm")]
    Remove {
        /// Instance name
        name: String,
    },
    /// Start an instance (all instances when no name is given)
    Start {
        /// Instance name
        name: Option<String>,
    },
    /// Stop an instance (all instances when no name is given)
    Stop {
        /// Instance name
        name: Option<String>,
    },
    /// List registered instances
    #[command(alias = "ls")]
    List {
        /// Only show instances with this status (stopped, running, error)
        #[arg(long)]
        status: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write connection URIs into an env file
    Env {
        /// Target file
        #[arg(short, long, default_value = ".env")]
        file: PathBuf,
    },
}
