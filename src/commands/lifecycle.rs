use crate::output::UserOutput;
use dbdock::{Orchestrator, Status};

pub async fn run_start(
    orchestrator: &mut Orchestrator,
    name: Option<String>,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    match name {
        Some(name) => {
            let record = orchestrator.start(&name).await?;
            out.success(&format!("Started '{}'", record.name));
            if record.port != 0 {
                out.status(&format!("  listening on localhost:{}", record.port));
            }
        }
        None => {
            let count = orchestrator.instances().len();
            if count == 0 {
                out.status("No instances registered. Create one with: dbdock create <name> <engine>");
                return Ok(());
            }
            orchestrator.start_all().await?;
            out.success(&format!("Started {} instance(s)", count));
        }
    }
    Ok(())
}

pub async fn run_stop(
    orchestrator: &mut Orchestrator,
    name: Option<String>,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    match name {
        Some(name) => {
            let record = orchestrator.stop(&name).await?;
            out.success(&format!("Stopped '{}'", record.name));
        }
        None => {
            let running = orchestrator.list(Some(Status::Running)).len();
            orchestrator.stop_all().await?;
            out.success(&format!("Stopped {} running instance(s)", running));
        }
    }
    Ok(())
}
