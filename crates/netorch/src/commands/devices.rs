//! Device command handlers.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tabled::Tabled;

use netorch_core::{DeviceStatus, DiscoveredDevice, HealthReport, NetworkOrchestrator};

use crate::cli::{DevicesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Family")]
    family: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Last Seen")]
    last_seen: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Mem")]
    memory: String,
}

impl DeviceRow {
    fn new(d: &DeviceStatus, color: bool) -> Self {
        let resource = d.resource.as_ref();
        Self {
            id: d.id.to_string(),
            name: d.name.clone(),
            address: d.address.to_string(),
            family: d.family.to_string(),
            status: output::paint_status(d.status, color),
            last_seen: output::or_dash(d.last_seen.map(|t| t.format("%Y-%m-%d %H:%M:%S"))),
            cpu: output::or_dash(resource.and_then(|r| r.cpu_pct).map(|p| format!("{p}%"))),
            memory: output::or_dash(resource.and_then(|r| r.memory_pct).map(|p| format!("{p}%"))),
        }
    }
}

#[derive(Tabled)]
struct HealthRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Changed")]
    changed: String,
    #[tabled(rename = "Uptime")]
    uptime: String,
    #[tabled(rename = "Error")]
    error: String,
}

impl HealthRow {
    fn new(r: &HealthReport, color: bool) -> Self {
        Self {
            device: r.device_id.to_string(),
            status: output::paint_status(r.current, color),
            changed: if r.changed() {
                format!("{} -> {}", r.previous, r.current)
            } else {
                String::new()
            },
            uptime: output::or_dash(
                r.resource
                    .and_then(|s| s.uptime_secs)
                    .map(|secs| humantime::format_duration(Duration::from_secs(secs))),
            ),
            error: r.error.clone().unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct DiscoveredRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Identity")]
    identity: String,
    #[tabled(rename = "Board")]
    board: String,
    #[tabled(rename = "Version")]
    version: String,
}

impl From<&DiscoveredDevice> for DiscoveredRow {
    fn from(d: &DiscoveredDevice) -> Self {
        Self {
            id: d.record.id.to_string(),
            address: d.address.to_string(),
            identity: output::or_dash(d.identity.identity.as_ref()),
            board: output::or_dash(d.identity.board.as_ref()),
            version: output::or_dash(d.identity.version.as_ref()),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    orchestrator: &NetworkOrchestrator,
    command: DevicesCommand,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    match command {
        DevicesCommand::List => {
            let devices = orchestrator.get_device_status();
            let out = output::render_list(
                &global.output,
                &devices,
                |d| DeviceRow::new(d, color),
                |d| d.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Check => {
            let reports = orchestrator.check_health().await?;
            let out = output::render_list(
                &global.output,
                &reports,
                |r| HealthRow::new(r, color),
                |r| format!("{} {}", r.device_id, r.current),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Discover { .. } => {
            if orchestrator.config().network_ranges.is_empty() {
                return Err(CliError::Validation {
                    field: "monitor.network_ranges".into(),
                    reason: "no ranges configured; pass --range".into(),
                });
            }
            let spinner = sweep_spinner(global.quiet);
            let found = orchestrator.discover().await;
            spinner.finish_and_clear();

            let found = found?;
            let out = output::render_list(
                &global.output,
                &found,
                |d| DiscoveredRow::from(d),
                |d| d.address.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            if !global.quiet && found.is_empty() {
                eprintln!("No new devices found");
            }
            Ok(())
        }
    }
}

fn sweep_spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} ({elapsed})") {
        spinner.set_style(style);
    }
    spinner.set_message("Sweeping network ranges");
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}
