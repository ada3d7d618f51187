use crate::output::UserOutput;
use dbdock::Orchestrator;

pub async fn run_remove(
    orchestrator: &mut Orchestrator,
    name: &str,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let record = orchestrator.remove(name).await?;
    out.success(&format!("Removed '{}' ({})", record.name, record.engine));
    if record.port != 0 {
        out.status(&format!("  freed port {}", record.port));
    }
    Ok(())
}
