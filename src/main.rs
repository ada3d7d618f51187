mod cli;
mod commands;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use dbdock::{ComposeRunner, Error as DbdockError, FileStore, GlobalDefaults, Orchestrator};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(dbdock_error) = e.downcast_ref::<DbdockError>() {
            eprintln!("Error: {}", dbdock_error);
            if let Some(suggestion) = dbdock_error.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing();

    let data_dir = resolve_data_dir(cli.data_dir)?;
    let defaults = GlobalDefaults::default();

    let store = Arc::new(FileStore::new(data_dir)?);
    let engine = Box::new(ComposeRunner::new(defaults.project.clone()));
    let mut orchestrator = Orchestrator::new(store, engine, cli.port_range, defaults)?;

    match cli.command {
        Commands::Create {
            name,
            engine,
            port,
            env,
            env_file,
        } => {
            commands::run_create(
                &mut orchestrator,
                &name,
                &engine,
                port,
                env,
                env_file,
                &output::CliOutput,
            )
            .await?;
        }
        Commands::Remove { name } => {
            commands::run_remove(&mut orchestrator, &name, &output::CliOutput).await?;
        }
        Commands::Start { name } => {
            commands::run_start(&mut orchestrator, name, &output::CliOutput).await?;
        }
        Commands::Stop { name } => {
            commands::run_stop(&mut orchestrator, name, &output::CliOutput).await?;
        }
        Commands::List { status, json } => {
            commands::run_list(&orchestrator, status, json, &output::CliOutput)?;
        }
        Commands::Env { file } => {
            commands::run_env(&orchestrator, &file, &output::CliOutput)?;
        }
    }

    Ok(())
}

/// Resolve the state directory from `--data-dir` or `~/.dbdock`.
fn resolve_data_dir(data_dir: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = data_dir {
        return Ok(dir);
    }
    let home = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory; pass --data-dir"))?;
    Ok(home.join(".dbdock"))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
