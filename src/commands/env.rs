use crate::output::UserOutput;
use dbdock::Orchestrator;
use std::path::Path;

pub fn run_env(
    orchestrator: &Orchestrator,
    file: &Path,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let written = orchestrator.project_env(file)?;
    out.success(&format!(
        "Wrote {} connection variable(s) to {}",
        written,
        file.display()
    ));
    Ok(())
}
