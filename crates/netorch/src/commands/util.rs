//! Shared helpers for command handlers.

use std::sync::Arc;

use chrono::SecondsFormat;
use tabled::Tabled;
use tokio::sync::broadcast;

use netorch_core::{EventKind, NetworkEvent};

use crate::error::CliError;
use crate::output;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Map a dialoguer / interactive I/O failure into CliError.
pub fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// Everything already queued on `rx`. Lagged gaps are skipped.
pub fn drain(rx: &mut broadcast::Receiver<Arc<NetworkEvent>>) -> Vec<NetworkEvent> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => out.push(NetworkEvent::clone(&event)),
            Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }
    out
}

// ── Event rendering ──────────────────────────────────────────────────

#[derive(Tabled)]
pub struct EventRow {
    #[tabled(rename = "Time")]
    pub time: String,
    #[tabled(rename = "Event")]
    pub event: String,
    #[tabled(rename = "Client")]
    pub client: String,
    #[tabled(rename = "Device")]
    pub device: String,
    #[tabled(rename = "By")]
    pub actor: String,
    #[tabled(rename = "Result")]
    pub result: String,
    #[tabled(rename = "Detail")]
    pub detail: String,
}

impl EventRow {
    pub fn new(e: &NetworkEvent, color: bool) -> Self {
        Self {
            time: e.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            event: e.kind.name().into(),
            client: output::or_dash(e.client_id.as_ref()),
            device: output::or_dash(e.device_id.as_ref()),
            actor: e.triggered_by.to_string(),
            result: output::paint_success(e.success, color),
            detail: summarize(&e.kind),
        }
    }
}

/// One-line human summary of an event payload.
pub fn summarize(kind: &EventKind) -> String {
    match kind {
        EventKind::QosApplied {
            package_id,
            plan,
            error,
        } => {
            let base = format!(
                "package {package_id}: {}/{} Mbps ({})",
                plan.max_down_mbps, plan.max_up_mbps, plan.priority
            );
            with_error(base, error.as_deref())
        }
        EventKind::QosRemoved { package_id, error } => {
            with_error(format!("package {package_id}"), error.as_deref())
        }
        EventKind::ClientDisconnected { steps } | EventKind::ClientReconnected { steps } => steps
            .iter()
            .map(|s| match &s.error {
                Some(err) => format!("{}: {err}", s.step),
                None => format!("{}: ok", s.step),
            })
            .collect::<Vec<_>>()
            .join("; "),
        EventKind::ComplianceViolation {
            observed_down_mbps,
            allowed_down_mbps,
        } => format!("{observed_down_mbps:.1} Mbps observed, {allowed_down_mbps:.1} allowed"),
        EventKind::DataCapWarning {
            level,
            usage_gb,
            cap_gb,
        } => format!("{}%: {usage_gb:.2} of {cap_gb:.0} GB", level.percent()),
        EventKind::DataCapSuspended { usage_gb, cap_gb } => {
            format!("{usage_gb:.2} of {cap_gb:.0} GB")
        }
        EventKind::DeviceStatusChanged { previous, current } => format!("{previous} -> {current}"),
        EventKind::DeviceDiscovered {
            address,
            identity,
            model,
        } => format!(
            "{address} {} {}",
            identity.as_deref().unwrap_or("-"),
            model.as_deref().unwrap_or("")
        )
        .trim_end()
        .to_owned(),
    }
}

fn with_error(base: String, error: Option<&str>) -> String {
    match error {
        Some(err) => format!("{base} ({err})"),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netorch_core::model::{Step, StepOutcome};
    use netorch_core::{Actor, BandwidthPlan, PackageId, PriorityTier, Reachability};

    #[test]
    fn summarizes_steps_with_their_errors() {
        let kind = EventKind::ClientDisconnected {
            steps: vec![
                StepOutcome {
                    step: Step::TerminateSession,
                    ok: true,
                    error: None,
                },
                StepOutcome {
                    step: Step::DisableSecret,
                    ok: false,
                    error: Some("device unreachable".into()),
                },
            ],
        };
        let text = summarize(&kind);
        assert!(text.starts_with("terminate_session: ok; "));
        assert!(text.ends_with("disable_secret: device unreachable"));
    }

    #[test]
    fn summarizes_plans_and_transitions() {
        let applied = EventKind::QosApplied {
            package_id: PackageId::new("7"),
            plan: BandwidthPlan {
                max_down_mbps: 30,
                max_up_mbps: 24,
                priority: PriorityTier::Low,
            },
            error: None,
        };
        assert_eq!(summarize(&applied), "package 7: 30/24 Mbps (low)");

        let changed = EventKind::DeviceStatusChanged {
            previous: Reachability::Online,
            current: Reachability::Offline,
        };
        assert_eq!(summarize(&changed), "online -> offline");
    }

    #[test]
    fn drains_queued_events() {
        let (tx, mut rx) = broadcast::channel(8);
        for _ in 0..3 {
            let event = NetworkEvent::new(
                EventKind::DataCapSuspended {
                    usage_gb: 101.0,
                    cap_gb: 100.0,
                },
                Actor::UsageMonitor,
                true,
            );
            let _ = tx.send(Arc::new(event));
        }
        assert_eq!(drain(&mut rx).len(), 3);
        assert!(drain(&mut rx).is_empty());
    }
}
