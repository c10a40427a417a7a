// ── Device command API ──
//
// Idempotent configuration primitives against a single device. The
// `DeviceTransport` port hides the device protocol; `DeviceCommandClient`
// layers capability checks, per-attempt timeouts and bounded retry on
// top. Expected failures come back as `CommandError` values, never as
// panics or `CoreError`s.

mod client;
mod routeros;
mod simulated;

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use client::DeviceCommandClient;
pub use routeros::{RouterOsTransport, parse_uptime};
pub use simulated::{SimCall, SimQueue, SimulatedTransport};

use crate::model::{Capability, Device, DeviceCredentials};

// ── Outcome types ────────────────────────────────────────────────────

/// An expected device-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("device unreachable: {0}")]
    Unreachable(String),

    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("command rejected: {0}")]
    Rejected(String),

    #[error("unsupported: device lacks the {0} capability")]
    Unsupported(Capability),
}

impl CommandError {
    /// Worth retrying: the device may answer next time.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout(_))
    }
}

pub type CommandOutcome<T> = Result<T, CommandError>;

// ── Primitive payloads ───────────────────────────────────────────────

/// A per-client rate-limit queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimit {
    pub name: String,
    pub target: String,
    pub max_down_mbps: u32,
    pub max_up_mbps: u32,
    /// 1 (highest) to 8 (lowest).
    pub priority: Option<u8>,
    pub disabled: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveSession {
    pub id: String,
    /// Account (secret) name the session logged in with.
    pub name: String,
    pub address: Option<String>,
    pub uptime: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SystemResource {
    pub uptime: Option<Duration>,
    pub cpu_pct: Option<u8>,
    pub memory_pct: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceCounters {
    pub name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub running: bool,
}

/// Counters and current throughput of one client queue.
///
/// `in` is traffic towards the client (download), `out` is from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QueueStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub rate_down_bps: u64,
    pub rate_up_bps: u64,
}

/// What a discovery probe learned about an address.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DeviceIdentity {
    pub identity: Option<String>,
    pub brand: Option<String>,
    pub board: Option<String>,
    pub version: Option<String>,
}

// ── Transport port ───────────────────────────────────────────────────

/// Device protocol adapter.
///
/// Each primitive must be safe to retry. "Already in the requested state"
/// is success: disabling a missing queue or secret, or terminating a
/// session that already ended, returns `Ok`.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    async fn create_or_update_rate_limit(
        &self,
        device: &Device,
        limit: &RateLimit,
    ) -> CommandOutcome<()>;

    async fn disable_rate_limit(&self, device: &Device, name: &str) -> CommandOutcome<()>;

    /// Enabling a secret that does not exist is `Rejected`.
    async fn set_secret_enabled(
        &self,
        device: &Device,
        secret: &str,
        enabled: bool,
    ) -> CommandOutcome<()>;

    async fn list_active_sessions(&self, device: &Device) -> CommandOutcome<Vec<ActiveSession>>;

    async fn terminate_session(&self, device: &Device, session_id: &str) -> CommandOutcome<()>;

    async fn read_system_resource(&self, device: &Device) -> CommandOutcome<SystemResource>;

    async fn read_interface_counters(
        &self,
        device: &Device,
    ) -> CommandOutcome<Vec<InterfaceCounters>>;

    /// `Ok(None)` when no queue with that name exists.
    async fn read_queue_stats(
        &self,
        device: &Device,
        name: &str,
    ) -> CommandOutcome<Option<QueueStats>>;

    /// Probe an address that is not yet in the catalog. `None`
    /// credentials use the adapter's defaults.
    async fn identify(
        &self,
        address: IpAddr,
        credentials: Option<&DeviceCredentials>,
    ) -> CommandOutcome<Option<DeviceIdentity>>;
}
