// In-memory store for tests, demos and dry runs.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::NetworkStore;
use crate::error::CoreError;
use crate::model::{
    Client, ClientId, ClientStatus, DeviceId, EquipmentRecord, NetworkEvent, NewEquipment,
    PackageId, Reachability, ServicePackage, UsageSample,
};

/// A `NetworkStore` backed by process memory.
///
/// Seed it with the `insert_*` / `assign` helpers. `fail_event_writes`
/// makes `append_event` error, which exercises the "event log down"
/// path without a real database.
#[derive(Default)]
pub struct MemoryStore {
    equipment: DashMap<DeviceId, EquipmentRecord>,
    clients: DashMap<ClientId, Client>,
    packages: DashMap<PackageId, ServicePackage>,
    assignments: DashMap<ClientId, Vec<DeviceId>>,
    usage: RwLock<Vec<UsageSample>>,
    events: RwLock<Vec<NetworkEvent>>,
    fail_event_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Seeding ──────────────────────────────────────────────────────

    pub fn insert_equipment_record(&self, record: EquipmentRecord) {
        self.equipment.insert(record.id.clone(), record);
    }

    pub fn insert_client(&self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    pub fn insert_package(&self, package: ServicePackage) {
        self.packages.insert(package.id.clone(), package);
    }

    /// Replace the client's device assignment.
    pub fn assign(&self, client: &ClientId, devices: &[DeviceId]) {
        self.assignments.insert(client.clone(), devices.to_vec());
    }

    pub fn set_fail_event_writes(&self, fail: bool) {
        self.fail_event_writes.store(fail, Ordering::SeqCst);
    }

    // ── Inspection ───────────────────────────────────────────────────

    pub fn equipment(&self, id: &DeviceId) -> Option<EquipmentRecord> {
        self.equipment.get(id).map(|r| r.value().clone())
    }

    pub fn client(&self, id: &ClientId) -> Option<Client> {
        self.clients.get(id).map(|r| r.value().clone())
    }

    /// Every event in append order.
    pub async fn events(&self) -> Vec<NetworkEvent> {
        self.events.read().await.clone()
    }

    pub async fn usage_samples(&self) -> Vec<UsageSample> {
        self.usage.read().await.clone()
    }
}

#[async_trait]
impl NetworkStore for MemoryStore {
    async fn list_equipment(&self) -> Result<Vec<EquipmentRecord>, CoreError> {
        Ok(self.equipment.iter().map(|r| r.value().clone()).collect())
    }

    async fn insert_equipment(
        &self,
        device: &NewEquipment,
    ) -> Result<EquipmentRecord, CoreError> {
        let record = EquipmentRecord {
            id: DeviceId::new(Uuid::new_v4().to_string()),
            name: Some(device.name.clone()),
            ip_address: Some(device.ip_address.clone()),
            brand: device.brand.clone(),
            model: device.model.clone(),
            kind: Some(device.kind.clone()),
            status: Some(device.status.to_string()),
            approval_status: Some(device.approval_status.to_string()),
            api_username: None,
            api_password: None,
        };
        self.equipment.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_device_status(
        &self,
        id: &DeviceId,
        status: Reachability,
        _seen_at: Option<DateTime<Utc>>,
    ) -> Result<(), CoreError> {
        let mut row = self
            .equipment
            .get_mut(id)
            .ok_or_else(|| CoreError::DeviceNotFound { id: id.clone() })?;
        row.status = Some(status.to_string());
        Ok(())
    }

    async fn get_client(&self, id: &ClientId) -> Result<Option<Client>, CoreError> {
        Ok(self.client(id))
    }

    async fn list_clients_by_status(
        &self,
        status: ClientStatus,
    ) -> Result<Vec<Client>, CoreError> {
        let mut clients: Vec<Client> = self
            .clients
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.value().clone())
            .collect();
        clients.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(clients)
    }

    async fn update_client_status(
        &self,
        id: &ClientId,
        status: ClientStatus,
    ) -> Result<(), CoreError> {
        let mut row = self
            .clients
            .get_mut(id)
            .ok_or_else(|| CoreError::ClientNotFound { id: id.clone() })?;
        row.status = status;
        Ok(())
    }

    async fn get_package(&self, id: &PackageId) -> Result<Option<ServicePackage>, CoreError> {
        Ok(self.packages.get(id).map(|r| r.value().clone()))
    }

    async fn assigned_devices(&self, client: &ClientId) -> Result<Vec<DeviceId>, CoreError> {
        Ok(self
            .assignments
            .get(client)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    async fn append_usage(&self, sample: &UsageSample) -> Result<(), CoreError> {
        self.usage.write().await.push(sample.clone());
        Ok(())
    }

    async fn usage_since(
        &self,
        client: &ClientId,
        since: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        Ok(self
            .usage
            .read()
            .await
            .iter()
            .filter(|s| &s.client_id == client && s.recorded_at >= since)
            .fold(0u64, |acc, s| acc.saturating_add(s.total_bytes())))
    }

    async fn append_event(&self, event: &NetworkEvent) -> Result<(), CoreError> {
        if self.fail_event_writes.load(Ordering::SeqCst) {
            return Err(CoreError::StoreUnavailable {
                message: "event log unavailable".into(),
            });
        }
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<NetworkEvent>, CoreError> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn usage_since_filters_by_client_and_time() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let c1 = ClientId::from("c1");
        for (client, at, bytes) in [
            ("c1", now - Duration::days(40), 1_000),
            ("c1", now, 10),
            ("c2", now, 500),
        ] {
            store
                .append_usage(&UsageSample {
                    client_id: ClientId::from(client),
                    bytes_in: bytes,
                    bytes_out: 1,
                    recorded_at: at,
                })
                .await
                .unwrap();
        }
        let total = store
            .usage_since(&c1, now - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(total, 11);
    }

    #[tokio::test]
    async fn unknown_device_status_update_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_device_status(&DeviceId::from("ghost"), Reachability::Online, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DeviceNotFound { .. }));
    }
}
