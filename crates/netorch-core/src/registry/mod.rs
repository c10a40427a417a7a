// ── Device registry ──
//
// Loads the approved, IP-addressed part of the equipment catalog into a
// reactive collection keyed by device id. Runtime state sampled by the
// health monitor (status, last-seen, resource) survives reloads.

mod capabilities;
mod collection;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub use capabilities::{capabilities_of, family_defaults};
use collection::EntityCollection;

use crate::error::CoreError;
use crate::model::{
    ApprovalStatus, Device, DeviceCredentials, DeviceFamily, DeviceId, EquipmentRecord,
    Reachability, ResourceSample,
};
use crate::store::NetworkStore;

/// Cached view of the managed devices.
pub struct DeviceRegistry {
    devices: EntityCollection<DeviceId, Device>,
    store: Arc<dyn NetworkStore>,
}

impl DeviceRegistry {
    pub fn new(store: Arc<dyn NetworkStore>) -> Self {
        Self {
            devices: EntityCollection::new(),
            store,
        }
    }

    /// Refresh from the catalog. Idempotent: devices are keyed by id and
    /// overwritten, and devices no longer approved are pruned.
    pub async fn load(&self) -> Result<usize, CoreError> {
        let records = self.store.list_equipment().await?;
        let total = records.len();

        let items: Vec<(DeviceId, Device)> = records
            .into_iter()
            .filter_map(|rec| self.device_from_record(rec))
            .map(|d| (d.id.clone(), d))
            .collect();
        let kept = items.len();

        self.devices.upsert_and_prune(items);
        info!(catalog = total, managed = kept, "device registry loaded");
        Ok(kept)
    }

    fn device_from_record(&self, rec: EquipmentRecord) -> Option<Device> {
        if rec.approval() != ApprovalStatus::Approved {
            return None;
        }
        let Some(address) = rec.address() else {
            debug!(device = %rec.id, ip = ?rec.ip_address, "skipping device without a usable address");
            return None;
        };

        let family = DeviceFamily::from_catalog(rec.kind.as_deref().unwrap_or_default());
        let capabilities = capabilities_of(family, rec.brand.as_deref(), rec.model.as_deref());
        let credentials = match (rec.api_username, rec.api_password) {
            (Some(username), Some(password)) => Some(DeviceCredentials {
                username,
                password: SecretString::from(password),
            }),
            _ => None,
        };

        // Keep what the health monitor last observed.
        let existing = self.devices.get(&rec.id);
        let catalog_status = rec
            .status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let (status, last_seen, resource) = match existing {
            Some(prev) => (prev.status, prev.last_seen, prev.resource),
            None => (catalog_status, None, None),
        };

        Some(Device {
            name: rec.name.unwrap_or_else(|| address.to_string()),
            id: rec.id,
            address,
            credentials,
            family,
            brand: rec.brand,
            model: rec.model,
            capabilities,
            status,
            approval: ApprovalStatus::Approved,
            last_seen,
            resource,
        })
    }

    pub fn get(&self, id: &DeviceId) -> Option<Arc<Device>> {
        self.devices.get(id)
    }

    /// All managed devices, ordered by name.
    pub fn snapshot(&self) -> Vec<Arc<Device>> {
        let mut devices: Vec<Arc<Device>> = self.devices.snapshot().iter().cloned().collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        devices
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Device>>>> {
        self.devices.subscribe()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mutation counter; changes whenever any device changes.
    pub fn version(&self) -> u64 {
        self.devices.version()
    }

    /// Set reachability. Returns the previous status, or `None` if the
    /// device is not in the registry.
    pub fn update_status(
        &self,
        id: &DeviceId,
        status: Reachability,
        seen_at: Option<DateTime<Utc>>,
    ) -> Option<Reachability> {
        let prev = self.devices.modify(id, |d| {
            let prev = d.status;
            d.status = status;
            if seen_at.is_some() {
                d.last_seen = seen_at;
            }
            prev
        });
        if prev.is_none() {
            warn!(device = %id, "status update for unknown device");
        }
        prev
    }

    pub fn record_resource(&self, id: &DeviceId, sample: ResourceSample) {
        self.devices.modify(id, |d| d.resource = Some(sample));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::Capability;
    use crate::store::MemoryStore;

    fn record(id: &str, ip: Option<&str>, approval: &str) -> EquipmentRecord {
        EquipmentRecord {
            id: DeviceId::from(id),
            name: Some(format!("dev-{id}")),
            ip_address: ip.map(str::to_owned),
            brand: Some("MikroTik".into()),
            model: Some("hEX S".into()),
            kind: Some("router".into()),
            approval_status: Some(approval.into()),
            ..EquipmentRecord::default()
        }
    }

    #[tokio::test]
    async fn load_filters_unapproved_and_unaddressed() {
        let store = Arc::new(MemoryStore::new());
        store.insert_equipment_record(record("1", Some("10.0.0.1"), "approved"));
        store.insert_equipment_record(record("2", Some("10.0.0.2"), "pending"));
        store.insert_equipment_record(record("3", None, "approved"));
        store.insert_equipment_record(record("4", Some("not-an-ip"), "approved"));

        let registry = DeviceRegistry::new(store);
        assert_eq!(registry.load().await.unwrap(), 1);
        let dev = registry.get(&DeviceId::from("1")).unwrap();
        assert!(dev.supports(Capability::RouterOs));
        assert!(dev.supports(Capability::Qos));
    }

    #[tokio::test]
    async fn reload_is_idempotent_and_keeps_runtime_state() {
        let store = Arc::new(MemoryStore::new());
        store.insert_equipment_record(record("1", Some("10.0.0.1"), "approved"));
        store.insert_equipment_record(record("2", Some("10.0.0.2"), "approved"));

        let registry = DeviceRegistry::new(store.clone());
        registry.load().await.unwrap();
        let seen = Utc::now();
        registry.update_status(&DeviceId::from("1"), Reachability::Online, Some(seen));

        registry.load().await.unwrap();
        registry.load().await.unwrap();
        assert_eq!(registry.len(), 2);
        let dev = registry.get(&DeviceId::from("1")).unwrap();
        assert_eq!(dev.status, Reachability::Online);
        assert_eq!(dev.last_seen, Some(seen));
    }

    #[tokio::test]
    async fn reload_prunes_devices_that_lost_approval() {
        let store = Arc::new(MemoryStore::new());
        store.insert_equipment_record(record("1", Some("10.0.0.1"), "approved"));
        let registry = DeviceRegistry::new(store.clone());
        registry.load().await.unwrap();

        store.insert_equipment_record(record("1", Some("10.0.0.1"), "retired"));
        registry.load().await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn update_status_returns_previous() {
        let store = Arc::new(MemoryStore::new());
        store.insert_equipment_record(record("1", Some("10.0.0.1"), "approved"));
        let registry = DeviceRegistry::new(store);
        registry.load().await.unwrap();

        let id = DeviceId::from("1");
        assert_eq!(
            registry.update_status(&id, Reachability::Offline, None),
            Some(Reachability::Unknown)
        );
        assert_eq!(
            registry.update_status(&id, Reachability::Online, None),
            Some(Reachability::Offline)
        );
        assert_eq!(
            registry.update_status(&DeviceId::from("9"), Reachability::Online, None),
            None
        );
    }
}
