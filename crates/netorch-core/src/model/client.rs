// ── Client, package and usage types ──

use std::net::IpAddr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::ids::{ClientId, PackageId};
use crate::config::PolicyConfig;
use crate::error::CoreError;

#[allow(clippy::unwrap_used)]
static LEADING_INT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(\d+)").unwrap());

/// Billing-side account status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ClientStatus {
    Active,
    Suspended,
    Disconnected,
    Pending,
    Inactive,
}

/// A subscriber as read from the store. Never cached across operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub status: ClientStatus,
    #[serde(default)]
    pub service_package_id: Option<PackageId>,
    /// PPPoE secret name on the access concentrator.
    #[serde(default)]
    pub pppoe_username: Option<String>,
    #[serde(default)]
    pub ip_address: Option<IpAddr>,
}

impl Client {
    /// Name of the per-client simple queue.
    pub fn queue_name(&self) -> String {
        format!("client-{}", self.id)
    }

    /// PPPoE secret name, falling back to the queue name.
    pub fn secret_name(&self) -> String {
        self.pppoe_username
            .clone()
            .unwrap_or_else(|| self.queue_name())
    }

    /// Queue target: the client's `/32` when known, else the PPPoE interface.
    pub fn queue_target(&self) -> String {
        match self.ip_address {
            Some(IpAddr::V4(ip)) => format!("{ip}/32"),
            Some(IpAddr::V6(ip)) => format!("{ip}/128"),
            None => format!("<pppoe-{}>", self.secret_name()),
        }
    }
}

/// A sellable bandwidth package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicePackage {
    pub id: PackageId,
    #[serde(default)]
    pub name: String,
    /// Advertised speed, e.g. `"50 Mbps"`.
    pub speed: String,
    #[serde(default)]
    pub upload_speed_mbps: Option<u32>,
    #[serde(default)]
    pub data_cap_gb: Option<f64>,
}

impl ServicePackage {
    /// Resolve the concrete bandwidth plan for this package.
    pub fn plan(&self, policy: &PolicyConfig) -> Result<BandwidthPlan, CoreError> {
        let max_down = parse_speed_mbps(&self.speed).ok_or_else(|| CoreError::Validation {
            message: format!(
                "package {} has unparseable speed {:?}",
                self.id, self.speed
            ),
        })?;
        let max_up = self
            .upload_speed_mbps
            .unwrap_or_else(|| scaled(max_down, policy.upload_ratio));
        Ok(BandwidthPlan {
            max_down_mbps: max_down,
            max_up_mbps: max_up,
            priority: PriorityTier::for_speed(max_down, policy),
        })
    }
}

/// Leading integer of a speed string (`"50 Mbps"` ⇒ 50).
pub fn parse_speed_mbps(speed: &str) -> Option<u32> {
    LEADING_INT.captures(speed)?.get(1)?.as_str().parse().ok()
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::as_conversions
)]
fn scaled(mbps: u32, ratio: f64) -> u32 {
    (f64::from(mbps) * ratio).floor().max(0.0) as u32
}

/// Queue priority tier derived from the download speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PriorityTier {
    High,
    Medium,
    Low,
}

impl PriorityTier {
    pub fn for_speed(max_down_mbps: u32, policy: &PolicyConfig) -> Self {
        if max_down_mbps >= policy.high_priority_mbps {
            Self::High
        } else if max_down_mbps >= policy.medium_priority_mbps {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// RouterOS queue priority (1 = highest, 8 = lowest).
    pub fn queue_priority(self) -> u8 {
        match self {
            Self::High => 1,
            Self::Medium => 4,
            Self::Low => 8,
        }
    }
}

/// Concrete shaping parameters for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandwidthPlan {
    pub max_down_mbps: u32,
    pub max_up_mbps: u32,
    pub priority: PriorityTier,
}

/// One persisted traffic delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSample {
    pub client_id: ClientId,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub recorded_at: DateTime<Utc>,
}

impl UsageSample {
    pub fn total_bytes(&self) -> u64 {
        self.bytes_in.saturating_add(self.bytes_out)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn package(speed: &str) -> ServicePackage {
        ServicePackage {
            id: PackageId::from("p1"),
            name: "Home".into(),
            speed: speed.into(),
            upload_speed_mbps: None,
            data_cap_gb: None,
        }
    }

    #[test]
    fn fifty_mbps_is_medium_with_eighty_percent_upload() {
        let plan = package("50 Mbps").plan(&PolicyConfig::default()).unwrap();
        assert_eq!(
            plan,
            BandwidthPlan {
                max_down_mbps: 50,
                max_up_mbps: 40,
                priority: PriorityTier::Medium,
            }
        );
    }

    #[test]
    fn priority_tiers_follow_thresholds() {
        let policy = PolicyConfig::default();
        assert_eq!(
            package("120 Mbps").plan(&policy).unwrap().priority,
            PriorityTier::High
        );
        assert_eq!(
            package("20 Mbps").plan(&policy).unwrap().priority,
            PriorityTier::Low
        );
        assert_eq!(
            package("100Mbps").plan(&policy).unwrap().priority,
            PriorityTier::High
        );
    }

    #[test]
    fn explicit_upload_wins() {
        let mut pkg = package("30 Mbps");
        pkg.upload_speed_mbps = Some(10);
        let plan = pkg.plan(&PolicyConfig::default()).unwrap();
        assert_eq!((plan.max_down_mbps, plan.max_up_mbps), (30, 10));
    }

    #[test]
    fn odd_speeds_floor_the_upload() {
        let plan = package("33 Mbps").plan(&PolicyConfig::default()).unwrap();
        assert_eq!(plan.max_up_mbps, 26);
    }

    #[test]
    fn speed_without_leading_integer_is_rejected() {
        let err = package("Unlimited").plan(&PolicyConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[test]
    fn queue_target_prefers_static_ip() {
        let client = Client {
            id: ClientId::from(7),
            status: ClientStatus::Active,
            service_package_id: None,
            pppoe_username: Some("alice".into()),
            ip_address: "10.20.0.7".parse().ok(),
        };
        assert_eq!(client.queue_target(), "10.20.0.7/32");
        assert_eq!(client.queue_name(), "client-7");
        assert_eq!(client.secret_name(), "alice");
    }
}
