// ── Network event types ──
//
// The audit trail of every configuration attempt. One event is written per
// device acted upon; multi-step operations carry each step's outcome in the
// payload so partial application stays visible.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use super::client::BandwidthPlan;
use super::device::Reachability;
use super::ids::{ClientId, DeviceId, PackageId};

/// Who (or what) triggered an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Actor {
    System,
    Billing,
    UsageMonitor,
    HealthMonitor,
    ComplianceMonitor,
    Operator(String),
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::Billing => f.write_str("billing"),
            Self::UsageMonitor => f.write_str("usage_monitor"),
            Self::HealthMonitor => f.write_str("health_monitor"),
            Self::ComplianceMonitor => f.write_str("compliance_monitor"),
            Self::Operator(name) => write!(f, "operator:{name}"),
        }
    }
}

impl FromStr for Actor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "system" => Self::System,
            "billing" => Self::Billing,
            "usage_monitor" => Self::UsageMonitor,
            "health_monitor" => Self::HealthMonitor,
            "compliance_monitor" => Self::ComplianceMonitor,
            other => match other.strip_prefix("operator:") {
                Some(name) => Self::Operator(name.to_owned()),
                None => return Err(format!("unknown actor: {other}")),
            },
        })
    }
}

impl From<Actor> for String {
    fn from(actor: Actor) -> Self {
        actor.to_string()
    }
}

impl TryFrom<String> for Actor {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// One step of a multi-step device operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Step {
    TerminateSession,
    DisableSecret,
    DisableQueue,
    EnableSecret,
    CreateQueue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: Step,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn from_result<T, E: fmt::Display>(step: Step, result: &Result<T, E>) -> Self {
        Self {
            step,
            ok: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
        }
    }
}

/// Data-cap warning level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WarningLevel {
    #[serde(rename = "75")]
    Percent75,
    #[serde(rename = "90")]
    Percent90,
}

impl WarningLevel {
    pub fn percent(self) -> u8 {
        match self {
            Self::Percent75 => 75,
            Self::Percent90 => 90,
        }
    }
}

/// Closed set of event kinds, each with its own payload.
///
/// Serialized adjacently so a persisted row has `event_type` and
/// `event_data` columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "event_data", rename_all = "snake_case")]
pub enum EventKind {
    QosApplied {
        package_id: PackageId,
        plan: BandwidthPlan,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    QosRemoved {
        package_id: PackageId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ClientDisconnected {
        steps: Vec<StepOutcome>,
    },
    ClientReconnected {
        steps: Vec<StepOutcome>,
    },
    ComplianceViolation {
        observed_down_mbps: f64,
        allowed_down_mbps: f64,
    },
    DataCapWarning {
        level: WarningLevel,
        usage_gb: f64,
        cap_gb: f64,
    },
    DataCapSuspended {
        usage_gb: f64,
        cap_gb: f64,
    },
    DeviceStatusChanged {
        previous: Reachability,
        current: Reachability,
    },
    DeviceDiscovered {
        address: IpAddr,
        #[serde(default)]
        identity: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
}

impl EventKind {
    /// The `event_type` column value.
    pub fn name(&self) -> &'static str {
        match self {
            Self::QosApplied { .. } => "qos_applied",
            Self::QosRemoved { .. } => "qos_removed",
            Self::ClientDisconnected { .. } => "client_disconnected",
            Self::ClientReconnected { .. } => "client_reconnected",
            Self::ComplianceViolation { .. } => "compliance_violation",
            Self::DataCapWarning { .. } => "data_cap_warning",
            Self::DataCapSuspended { .. } => "data_cap_suspended",
            Self::DeviceStatusChanged { .. } => "device_status_changed",
            Self::DeviceDiscovered { .. } => "device_discovered",
        }
    }
}

/// Immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub id: Uuid,
    pub client_id: Option<ClientId>,
    pub device_id: Option<DeviceId>,
    pub triggered_by: Actor,
    #[serde(flatten)]
    pub kind: EventKind,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

impl NetworkEvent {
    pub fn new(kind: EventKind, triggered_by: Actor, success: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: None,
            device_id: None,
            triggered_by,
            kind,
            success,
            timestamp: Utc::now(),
        }
    }

    pub fn client(mut self, id: &ClientId) -> Self {
        self.client_id = Some(id.clone());
        self
    }

    pub fn device(mut self, id: &DeviceId) -> Self {
        self.device_id = Some(id.clone());
        self
    }
}
