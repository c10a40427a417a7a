// ── Device domain types ──

use std::collections::BTreeSet;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::ids::DeviceId;

/// Broad hardware family, normalized from the catalog's free-text `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceFamily {
    Router,
    Switch,
    AccessPoint,
    Other,
}

impl DeviceFamily {
    /// Map a catalog `type` column onto a family. Unknown values are `Other`.
    pub fn from_catalog(raw: &str) -> Self {
        let raw = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match raw.as_str() {
            "router" | "gateway" | "concentrator" | "bras" => Self::Router,
            "switch" => Self::Switch,
            "access_point" | "ap" | "wireless" | "cpe" => Self::AccessPoint,
            _ => Self::Other,
        }
    }
}

/// A feature a device is believed to support.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    Routing,
    Qos,
    Vlan,
    Firewall,
    Wireless,
    Vpn,
    RouterOs,
    Api,
}

pub type CapabilitySet = BTreeSet<Capability>;

/// Last-known reachability.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Reachability {
    Online,
    Offline,
    #[default]
    Unknown,
}

impl Reachability {
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

/// Catalog approval state. Discovery only ever proposes `Pending`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ApprovalStatus {
    Approved,
    #[default]
    Pending,
    Rejected,
    Retired,
}

/// Management credentials for one device.
#[derive(Debug, Clone)]
pub struct DeviceCredentials {
    pub username: String,
    pub password: SecretString,
}

/// The most recent system-resource sample taken by the health monitor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub uptime_secs: Option<u64>,
    pub cpu_pct: Option<u8>,
    pub memory_pct: Option<u8>,
    pub sampled_at: DateTime<Utc>,
}

/// A managed network device as held by the registry.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub address: IpAddr,
    /// Per-device override; `None` uses the configured defaults.
    pub credentials: Option<DeviceCredentials>,
    pub family: DeviceFamily,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub capabilities: CapabilitySet,
    pub status: Reachability,
    pub approval: ApprovalStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub resource: Option<ResourceSample>,
}

impl Device {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Read-only dashboard view of a device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub id: DeviceId,
    pub name: String,
    pub address: IpAddr,
    pub family: DeviceFamily,
    pub status: Reachability,
    pub last_seen: Option<DateTime<Utc>>,
    pub capabilities: CapabilitySet,
    pub resource: Option<ResourceSample>,
}

impl From<&Device> for DeviceStatus {
    fn from(d: &Device) -> Self {
        Self {
            id: d.id.clone(),
            name: d.name.clone(),
            address: d.address,
            family: d.family,
            status: d.status,
            last_seen: d.last_seen,
            capabilities: d.capabilities.clone(),
            resource: d.resource,
        }
    }
}

/// One row of the persistent equipment catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentRecord {
    pub id: DeviceId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub approval_status: Option<String>,
    #[serde(default)]
    pub api_username: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_password: Option<String>,
}

impl EquipmentRecord {
    pub fn approval(&self) -> ApprovalStatus {
        self.approval_status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    pub fn address(&self) -> Option<IpAddr> {
        let raw = self.ip_address.as_deref()?.trim();
        // Catalogs sometimes store the address with a prefix length.
        raw.split('/').next()?.parse().ok()
    }
}

/// A discovery insert: an address that answered the identity probe.
#[derive(Debug, Clone, Serialize)]
pub struct NewEquipment {
    pub name: String,
    pub ip_address: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: Reachability,
    pub approval_status: ApprovalStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_from_catalog_is_forgiving() {
        assert_eq!(DeviceFamily::from_catalog("Router"), DeviceFamily::Router);
        assert_eq!(
            DeviceFamily::from_catalog("access-point"),
            DeviceFamily::AccessPoint
        );
        assert_eq!(DeviceFamily::from_catalog("Access Point"), DeviceFamily::AccessPoint);
        assert_eq!(DeviceFamily::from_catalog("olt"), DeviceFamily::Other);
    }

    #[test]
    fn record_address_strips_prefix() {
        let rec = EquipmentRecord {
            ip_address: Some("10.0.0.1/24".into()),
            ..EquipmentRecord::default()
        };
        assert_eq!(rec.address(), "10.0.0.1".parse().ok());
    }

    #[test]
    fn unknown_approval_defaults_to_pending() {
        let rec = EquipmentRecord {
            approval_status: Some("under-review".into()),
            ..EquipmentRecord::default()
        };
        assert_eq!(rec.approval(), ApprovalStatus::Pending);
        let rec = EquipmentRecord {
            approval_status: Some("APPROVED".into()),
            ..EquipmentRecord::default()
        };
        assert_eq!(rec.approval(), ApprovalStatus::Approved);
    }
}
