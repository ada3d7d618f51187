use crate::output::UserOutput;
use dbdock::{CreateOptions, Error, Orchestrator};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub async fn run_create(
    orchestrator: &mut Orchestrator,
    name: &str,
    engine: &str,
    port: Option<u16>,
    env: Vec<String>,
    env_file: Option<PathBuf>,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let mut env_overrides = BTreeMap::new();
    for pair in env {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(Error::Validation {
                what: "environment override",
                reason: format!("'{}' is not KEY=VALUE", pair),
            }
            .into());
        };
        env_overrides.insert(key.to_string(), value.to_string());
    }

    let options = CreateOptions {
        preferred_port: port,
        env_overrides,
        env_file,
    };

    let record = orchestrator.create(name, engine, options).await?;

    out.success(&format!("Created '{}' ({})", record.name, record.engine));
    if record.port != 0 {
        out.status(&format!("  port: {}", record.port));
    }
    out.status(&format!("  data: {}", record.volume.display()));
    out.status(&format!("  url:  {}", record.uri));
    out.status(&format!(
        "\nStart it with: dbdock start {}",
        record.name
    ));

    Ok(())
}
