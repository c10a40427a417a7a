// Shared fixtures for unit tests: a seeded in-memory store, a simulated
// transport and the components wired on top of them.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use crate::command::{DeviceCommandClient, SimulatedTransport};
use crate::config::RetryPolicy;
use crate::events::EventLog;
use crate::model::{
    Client, ClientId, ClientStatus, DeviceId, EquipmentRecord, PackageId, ServicePackage,
};
use crate::registry::DeviceRegistry;
use crate::store::MemoryStore;

pub(crate) struct Fixture {
    pub store: Arc<MemoryStore>,
    pub sim: Arc<SimulatedTransport>,
    pub registry: Arc<DeviceRegistry>,
    pub commands: DeviceCommandClient,
    pub events: Arc<EventLog>,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let sim = Arc::new(SimulatedTransport::new());
        let registry = Arc::new(DeviceRegistry::new(store.clone()));
        let commands = DeviceCommandClient::new(
            sim.clone(),
            Duration::from_millis(500),
            RetryPolicy {
                max_attempts: 1,
                backoff: Duration::ZERO,
            },
        );
        let events = Arc::new(EventLog::new(store.clone()));
        Self {
            store,
            sim,
            registry,
            commands,
            events,
        }
    }

    /// An approved MikroTik router, known to the simulator.
    pub fn router(&self, id: &str, ip: &str) -> DeviceId {
        let id = DeviceId::from(id);
        self.store.insert_equipment_record(EquipmentRecord {
            id: id.clone(),
            name: Some(format!("router-{id}")),
            ip_address: Some(ip.into()),
            brand: Some("MikroTik".into()),
            model: Some("CCR2004".into()),
            kind: Some("router".into()),
            approval_status: Some("approved".into()),
            ..EquipmentRecord::default()
        });
        self.sim.add_device(&id);
        id
    }

    pub fn package(&self, id: &str, speed: &str, cap_gb: Option<f64>) -> PackageId {
        let id = PackageId::from(id);
        self.store.insert_package(ServicePackage {
            id: id.clone(),
            name: format!("{speed} plan"),
            speed: speed.into(),
            upload_speed_mbps: None,
            data_cap_gb: cap_gb,
        });
        id
    }

    /// An active PPPoE client assigned to `devices`.
    pub fn client(&self, id: &str, package: &PackageId, devices: &[DeviceId]) -> ClientId {
        let id = ClientId::from(id);
        self.store.insert_client(Client {
            id: id.clone(),
            status: ClientStatus::Active,
            service_package_id: Some(package.clone()),
            pppoe_username: Some(format!("pppoe-{id}")),
            ip_address: None,
        });
        self.store.assign(&id, devices);
        for device in devices {
            self.sim.add_secret(device, &format!("pppoe-{id}"), true);
        }
        id
    }

    pub async fn load(&self) {
        self.registry.load().await.unwrap();
    }
}
