// ── Persistent store port ──
//
// The billing database is the system of record for devices, clients,
// packages, assignments, usage samples and the event log. Orchestration
// code only sees this trait; adapters decide how rows are fetched.

mod memory;
mod postgrest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use postgrest::PostgrestStore;

use crate::error::CoreError;
use crate::model::{
    Client, ClientId, ClientStatus, DeviceId, EquipmentRecord, NetworkEvent, NewEquipment,
    PackageId, Reachability, ServicePackage, UsageSample,
};

/// Generic query/update interface over the persistent store.
///
/// Implementations must tolerate concurrent external writers; callers
/// re-read authoritative rows at the start of every operation.
#[async_trait]
pub trait NetworkStore: Send + Sync {
    // ── Equipment catalog ────────────────────────────────────────────

    /// Every catalog row, regardless of approval state.
    async fn list_equipment(&self) -> Result<Vec<EquipmentRecord>, CoreError>;

    /// Insert a discovered device. Returns the stored row.
    async fn insert_equipment(&self, device: &NewEquipment)
    -> Result<EquipmentRecord, CoreError>;

    async fn update_device_status(
        &self,
        id: &DeviceId,
        status: Reachability,
        seen_at: Option<DateTime<Utc>>,
    ) -> Result<(), CoreError>;

    // ── Clients & packages ───────────────────────────────────────────

    async fn get_client(&self, id: &ClientId) -> Result<Option<Client>, CoreError>;

    async fn list_clients_by_status(&self, status: ClientStatus)
    -> Result<Vec<Client>, CoreError>;

    async fn update_client_status(
        &self,
        id: &ClientId,
        status: ClientStatus,
    ) -> Result<(), CoreError>;

    async fn get_package(&self, id: &PackageId) -> Result<Option<ServicePackage>, CoreError>;

    /// Devices the client's traffic flows through.
    async fn assigned_devices(&self, client: &ClientId) -> Result<Vec<DeviceId>, CoreError>;

    // ── Usage ────────────────────────────────────────────────────────

    async fn append_usage(&self, sample: &UsageSample) -> Result<(), CoreError>;

    /// Total bytes (in + out) recorded for `client` at or after `since`.
    async fn usage_since(
        &self,
        client: &ClientId,
        since: DateTime<Utc>,
    ) -> Result<u64, CoreError>;

    // ── Event log ────────────────────────────────────────────────────

    async fn append_event(&self, event: &NetworkEvent) -> Result<(), CoreError>;

    /// Newest first.
    async fn recent_events(&self, limit: usize) -> Result<Vec<NetworkEvent>, CoreError>;
}
