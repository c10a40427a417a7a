//! QoS command handlers.

use tabled::Tabled;

use netorch_core::{ActivePolicy, ComplianceViolation, NetworkOrchestrator};

use crate::cli::{GlobalOpts, QosCommand};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct PolicyRow {
    #[tabled(rename = "Client")]
    client: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Queue")]
    queue: String,
    #[tabled(rename = "Down/Up (Mbps)")]
    rate: String,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Devices")]
    devices: String,
}

impl From<&ActivePolicy> for PolicyRow {
    fn from(p: &ActivePolicy) -> Self {
        Self {
            client: p.client_id.to_string(),
            package: p.package_id.to_string(),
            queue: p.queue_name.clone(),
            rate: format!("{}/{}", p.plan.max_down_mbps, p.plan.max_up_mbps),
            priority: p.plan.priority.to_string(),
            devices: p
                .device_ids
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

#[derive(Tabled)]
struct ViolationRow {
    #[tabled(rename = "Client")]
    client: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Observed")]
    observed: String,
    #[tabled(rename = "Allowed")]
    allowed: String,
}

impl From<&ComplianceViolation> for ViolationRow {
    fn from(v: &ComplianceViolation) -> Self {
        Self {
            client: v.client_id.to_string(),
            device: v.device_id.to_string(),
            observed: format!("{:.1} Mbps", v.observed_down_mbps),
            allowed: format!("{:.1} Mbps", v.allowed_down_mbps),
        }
    }
}

pub async fn handle(
    orchestrator: &NetworkOrchestrator,
    command: QosCommand,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match command {
        QosCommand::List => {
            let policies = orchestrator.active_policies().await;
            let out = output::render_list(
                &global.output,
                &policies,
                |p| PolicyRow::from(p),
                |p| p.client_id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        QosCommand::Check => {
            let violations = orchestrator.check_compliance().await;
            let out = output::render_list(
                &global.output,
                &violations,
                |v| ViolationRow::from(v),
                |v| v.client_id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            if !global.quiet && violations.is_empty() {
                eprintln!("All clients within plan");
            }
            Ok(())
        }
    }
}
