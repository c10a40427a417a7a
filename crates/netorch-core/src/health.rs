// ── Health & discovery monitor ──
//
// Health: probe every managed device, keep the registry's reachability
// current and announce transitions. Discovery: sweep configured ranges for
// RouterOS devices the catalog has never seen and propose them as pending.

use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use ipnet::IpNet;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::command::{DeviceCommandClient, DeviceIdentity};
use crate::error::CoreError;
use crate::events::EventLog;
use crate::model::{
    Actor, ApprovalStatus, DeviceId, EquipmentRecord, EventKind, NetworkEvent, NewEquipment,
    Reachability, ResourceSample,
};
use crate::registry::DeviceRegistry;
use crate::store::NetworkStore;

/// Result of probing one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub device_id: DeviceId,
    pub previous: Reachability,
    pub current: Reachability,
    pub resource: Option<ResourceSample>,
    pub error: Option<String>,
}

impl HealthReport {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// A device found by a discovery sweep and added to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredDevice {
    pub address: IpAddr,
    pub identity: DeviceIdentity,
    pub record: EquipmentRecord,
}

pub struct HealthMonitor {
    store: Arc<dyn NetworkStore>,
    registry: Arc<DeviceRegistry>,
    commands: DeviceCommandClient,
    events: Arc<EventLog>,
    discovery_concurrency: usize,
    discovery_max_hosts: usize,
}

impl HealthMonitor {
    pub fn new(
        store: Arc<dyn NetworkStore>,
        registry: Arc<DeviceRegistry>,
        commands: DeviceCommandClient,
        events: Arc<EventLog>,
        discovery_concurrency: usize,
        discovery_max_hosts: usize,
    ) -> Self {
        Self {
            store,
            registry,
            commands,
            events,
            discovery_concurrency: discovery_concurrency.max(1),
            discovery_max_hosts,
        }
    }

    // ── Health ───────────────────────────────────────────────────────

    /// Probe every managed device concurrently.
    pub async fn check_health(&self) -> Vec<HealthReport> {
        let devices = self.registry.snapshot();
        let probes = join_all(devices.iter().map(|device| async move {
            let result = self.commands.read_system_resource(device).await;
            (device, result)
        }))
        .await;

        let mut reports = Vec::with_capacity(probes.len());
        for (device, result) in probes {
            let now = Utc::now();
            let (current, resource, error) = match result {
                Ok(res) => {
                    let sample = ResourceSample {
                        uptime_secs: res.uptime.map(|u| u.as_secs()),
                        cpu_pct: res.cpu_pct,
                        memory_pct: res.memory_pct,
                        sampled_at: now,
                    };
                    self.registry.record_resource(&device.id, sample);
                    (Reachability::Online, Some(sample), None)
                }
                Err(e) => (Reachability::Offline, None, Some(e.to_string())),
            };

            let seen_at = current.is_online().then_some(now);
            let previous = self
                .registry
                .update_status(&device.id, current, seen_at)
                .unwrap_or(device.status);

            let report = HealthReport {
                device_id: device.id.clone(),
                previous,
                current,
                resource,
                error,
            };
            if report.changed() {
                self.announce_transition(&report).await;
            }
            reports.push(report);
        }

        let online = reports.iter().filter(|r| r.current.is_online()).count();
        debug!(devices = reports.len(), online, "health check complete");
        reports
    }

    async fn announce_transition(&self, report: &HealthReport) {
        info!(
            device = %report.device_id,
            previous = %report.previous,
            current = %report.current,
            "device status changed"
        );
        let seen_at = report.resource.map(|r| r.sampled_at);
        if let Err(e) = self
            .store
            .update_device_status(&report.device_id, report.current, seen_at)
            .await
        {
            warn!(device = %report.device_id, error = %e, "failed to persist device status");
        }
        let event = NetworkEvent::new(
            EventKind::DeviceStatusChanged {
                previous: report.previous,
                current: report.current,
            },
            Actor::HealthMonitor,
            true,
        )
        .device(&report.device_id);
        self.events.record(event).await;
    }

    // ── Discovery ────────────────────────────────────────────────────

    /// Probe every host in `ranges` not already in the catalog.
    ///
    /// Each range contributes at most `discovery_max_hosts` addresses.
    /// Found devices are inserted as pending; nothing is ever approved here.
    pub async fn discover(&self, ranges: &[IpNet]) -> Result<Vec<DiscoveredDevice>, CoreError> {
        let catalog = self.store.list_equipment().await?;
        let known: HashSet<IpAddr> = catalog.iter().filter_map(EquipmentRecord::address).collect();

        let candidates: BTreeSet<IpAddr> = ranges
            .iter()
            .flat_map(|net| net.hosts().take(self.discovery_max_hosts))
            .filter(|addr| !known.contains(addr))
            .collect();
        debug!(ranges = ranges.len(), candidates = candidates.len(), "starting discovery sweep");

        let probes: Vec<_> = stream::iter(candidates)
            .map(|address| async move { (address, self.commands.identify(address, None).await) })
            .buffer_unordered(self.discovery_concurrency)
            .collect()
            .await;

        let mut found = Vec::new();
        for (address, result) in probes {
            let identity = match result {
                Ok(Some(identity)) => identity,
                Ok(None) => continue,
                Err(e) => {
                    trace!(%address, error = %e, "no device answered");
                    continue;
                }
            };
            match self.propose(address, &identity).await {
                Ok(record) => found.push(DiscoveredDevice {
                    address,
                    identity,
                    record,
                }),
                Err(e) => warn!(%address, error = %e, "failed to record discovered device"),
            }
        }
        found.sort_by_key(|d| d.address);
        info!(found = found.len(), "discovery sweep complete");
        Ok(found)
    }

    async fn propose(
        &self,
        address: IpAddr,
        identity: &DeviceIdentity,
    ) -> Result<EquipmentRecord, CoreError> {
        let new = NewEquipment {
            name: identity
                .identity
                .clone()
                .unwrap_or_else(|| format!("discovered-{address}")),
            ip_address: address.to_string(),
            brand: identity.brand.clone(),
            model: identity.board.clone(),
            kind: "router".into(),
            status: Reachability::Online,
            approval_status: ApprovalStatus::Pending,
        };
        let record = self.store.insert_equipment(&new).await?;

        let event = NetworkEvent::new(
            EventKind::DeviceDiscovered {
                address,
                identity: identity.identity.clone(),
                model: identity.board.clone(),
            },
            Actor::HealthMonitor,
            true,
        )
        .device(&record.id);
        self.events.record(event).await;
        Ok(record)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use pretty_assertions::assert_eq;

    fn monitor(fx: &Fixture) -> HealthMonitor {
        HealthMonitor::new(
            fx.store.clone(),
            fx.registry.clone(),
            fx.commands.clone(),
            fx.events.clone(),
            8,
            16,
        )
    }

    fn status_events(events: &[NetworkEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::DeviceStatusChanged { .. }))
            .count()
    }

    #[tokio::test]
    async fn transitions_emit_one_event_each() {
        let fx = Fixture::new();
        let r1 = fx.router("r1", "10.0.0.1");
        fx.load().await;
        let health = monitor(&fx);

        let reports = health.check_health().await;
        assert_eq!(reports[0].previous, Reachability::Unknown);
        assert_eq!(reports[0].current, Reachability::Online);
        assert!(reports[0].resource.is_some());

        // Steady state: nothing new.
        health.check_health().await;
        assert_eq!(status_events(&fx.store.events().await), 1);

        fx.sim.set_unreachable(&r1, true);
        let reports = health.check_health().await;
        assert!(reports[0].changed());
        assert_eq!(fx.registry.get(&r1).unwrap().status, Reachability::Offline);
        assert_eq!(status_events(&fx.store.events().await), 2);
        assert_eq!(fx.store.equipment(&r1).unwrap().status.as_deref(), Some("offline"));
    }

    #[tokio::test]
    async fn event_store_outage_does_not_abort_the_batch() {
        let fx = Fixture::new();
        fx.router("r1", "10.0.0.1");
        fx.router("r2", "10.0.0.2");
        fx.load().await;
        fx.store.set_fail_event_writes(true);

        let reports = monitor(&fx).check_health().await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.current.is_online()));
    }

    #[tokio::test]
    async fn discovery_skips_known_addresses() {
        let fx = Fixture::new();
        fx.router("r1", "192.168.88.1");
        fx.load().await;
        let identity = |name: &str| DeviceIdentity {
            identity: Some(name.into()),
            brand: Some("MikroTik".into()),
            board: Some("hEX S".into()),
            version: Some("7.14".into()),
        };
        fx.sim.add_discoverable("192.168.88.1".parse().unwrap(), identity("known"));
        fx.sim.add_discoverable("192.168.88.5".parse().unwrap(), identity("tower-5"));

        let ranges = ["192.168.88.0/29".parse().unwrap()];
        let found = monitor(&fx).discover(&ranges).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address.to_string(), "192.168.88.5");
        let record = fx.store.equipment(&found[0].record.id).unwrap();
        assert_eq!(record.approval(), ApprovalStatus::Pending);
        assert_eq!(record.name.as_deref(), Some("tower-5"));

        // A second sweep finds nothing new.
        assert!(monitor(&fx).discover(&ranges).await.unwrap().is_empty());
    }
}
