use crate::output::UserOutput;
use dbdock::{Error, Orchestrator, Status};

pub fn run_list(
    orchestrator: &Orchestrator,
    status: Option<String>,
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let filter = match status {
        Some(s) => Some(s.parse::<Status>().map_err(|reason| Error::Validation {
            what: "status filter",
            reason,
        })?),
        None => None,
    };

    let instances = orchestrator.list(filter);

    if json {
        out.status(&serde_json::to_string_pretty(&instances)?);
        return Ok(());
    }

    if instances.is_empty() {
        out.status("No instances found");
        return Ok(());
    }

    out.status(&format!(
        "  {:<20} {:<12} {:<8} {:<9} URL",
        "NAME", "ENGINE", "PORT", "STATUS"
    ));
    for inst in instances {
        let port = if inst.port == 0 {
            "-".to_string()
        } else {
            inst.port.to_string()
        };
        let icon = match inst.status {
            Status::Running => "+",
            Status::Stopped => "o",
            Status::Error => "x",
        };
        out.status(&format!(
            "{} {:<20} {:<12} {:<8} {:<9} {}",
            icon, inst.name, inst.engine, port, inst.status, inst.uri
        ));
    }

    Ok(())
}
