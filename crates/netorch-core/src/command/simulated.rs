// In-memory device transport.
//
// Behaves like a fleet of routers held in memory: queues, PPP secrets,
// live sessions and counters. Individual devices can be made unreachable,
// made to reject commands, or slowed down. Every call is appended to a
// call log so tests can assert on ordering.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::{
    ActiveSession, CommandError, CommandOutcome, DeviceIdentity, DeviceTransport,
    InterfaceCounters, QueueStats, RateLimit, SystemResource,
};
use crate::model::{Device, DeviceCredentials, DeviceId};

/// One queue as held by a simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimQueue {
    pub limit: RateLimit,
    pub stats: QueueStats,
}

impl SimQueue {
    pub fn is_disabled(&self) -> bool {
        self.limit.disabled
    }
}

/// One entry of the call log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimCall {
    pub device: DeviceId,
    pub op: &'static str,
    /// Queue, secret or session the call addressed, if any.
    pub subject: Option<String>,
}

#[derive(Debug, Default)]
struct SimDevice {
    queues: HashMap<String, SimQueue>,
    /// Secret name => enabled.
    secrets: HashMap<String, bool>,
    sessions: Vec<ActiveSession>,
    interfaces: Vec<InterfaceCounters>,
    resource: SystemResource,
    unreachable: bool,
    rejecting: bool,
    latency: Duration,
}

#[derive(Default)]
pub struct SimulatedTransport {
    devices: DashMap<DeviceId, SimDevice>,
    discoverable: DashMap<IpAddr, DeviceIdentity>,
    calls: Mutex<Vec<SimCall>>,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Fleet setup ──────────────────────────────────────────────────

    /// Register a reachable device with an empty configuration.
    pub fn add_device(&self, id: &DeviceId) {
        self.devices.entry(id.clone()).or_insert_with(|| SimDevice {
            resource: SystemResource {
                uptime: Some(Duration::from_secs(86_400)),
                cpu_pct: Some(5),
                memory_pct: Some(30),
            },
            ..SimDevice::default()
        });
    }

    pub fn set_unreachable(&self, id: &DeviceId, unreachable: bool) {
        self.with_device(id, |d| d.unreachable = unreachable);
    }

    pub fn set_rejecting(&self, id: &DeviceId, rejecting: bool) {
        self.with_device(id, |d| d.rejecting = rejecting);
    }

    pub fn set_latency(&self, id: &DeviceId, latency: Duration) {
        self.with_device(id, |d| d.latency = latency);
    }

    pub fn add_secret(&self, id: &DeviceId, name: &str, enabled: bool) {
        self.with_device(id, |d| {
            d.secrets.insert(name.to_owned(), enabled);
        });
    }

    pub fn add_session(&self, id: &DeviceId, session_id: &str, account: &str) {
        self.with_device(id, |d| {
            d.sessions.push(ActiveSession {
                id: session_id.to_owned(),
                name: account.to_owned(),
                address: None,
                uptime: None,
            });
        });
    }

    pub fn set_interfaces(&self, id: &DeviceId, interfaces: Vec<InterfaceCounters>) {
        self.with_device(id, |d| d.interfaces = interfaces);
    }

    /// Overwrite a queue's counters and rates. No-op if the queue is absent.
    pub fn set_queue_stats(&self, id: &DeviceId, queue: &str, stats: QueueStats) {
        self.with_device(id, |d| {
            if let Some(q) = d.queues.get_mut(queue) {
                q.stats = stats;
            }
        });
    }

    /// Make `address` answer discovery probes.
    pub fn add_discoverable(&self, address: IpAddr, identity: DeviceIdentity) {
        self.discoverable.insert(address, identity);
    }

    // ── Inspection ───────────────────────────────────────────────────

    pub fn queue(&self, id: &DeviceId, name: &str) -> Option<SimQueue> {
        self.devices.get(id)?.queues.get(name).cloned()
    }

    pub fn secret_enabled(&self, id: &DeviceId, name: &str) -> Option<bool> {
        self.devices.get(id)?.secrets.get(name).copied()
    }

    pub fn sessions(&self, id: &DeviceId) -> Vec<ActiveSession> {
        self.devices
            .get(id)
            .map(|d| d.sessions.clone())
            .unwrap_or_default()
    }

    /// Every call made so far, in order.
    pub async fn calls(&self) -> Vec<SimCall> {
        self.calls.lock().await.clone()
    }

    pub async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    // ── Internals ────────────────────────────────────────────────────

    fn with_device(&self, id: &DeviceId, f: impl FnOnce(&mut SimDevice)) {
        self.add_device(id);
        if let Some(mut d) = self.devices.get_mut(id) {
            f(&mut d);
        }
    }

    /// Log the call, wait out the device's latency, then check its switches.
    async fn enter(
        &self,
        device: &Device,
        op: &'static str,
        subject: Option<&str>,
    ) -> CommandOutcome<()> {
        self.calls.lock().await.push(SimCall {
            device: device.id.clone(),
            op,
            subject: subject.map(str::to_owned),
        });

        let (latency, unreachable, rejecting) = match self.devices.get(&device.id) {
            Some(d) => (d.latency, d.unreachable, d.rejecting),
            None => (Duration::ZERO, true, false),
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if unreachable {
            return Err(CommandError::Unreachable(format!(
                "no route to {}",
                device.address
            )));
        }
        if rejecting {
            return Err(CommandError::Rejected(format!("{op} refused by device")));
        }
        Ok(())
    }

    fn mutate<T>(&self, id: &DeviceId, f: impl FnOnce(&mut SimDevice) -> CommandOutcome<T>) -> CommandOutcome<T> {
        match self.devices.get_mut(id) {
            Some(mut d) => f(&mut d),
            None => Err(CommandError::Unreachable(format!("unknown device {id}"))),
        }
    }
}

#[async_trait]
impl DeviceTransport for SimulatedTransport {
    async fn create_or_update_rate_limit(
        &self,
        device: &Device,
        limit: &RateLimit,
    ) -> CommandOutcome<()> {
        self.enter(device, "create_or_update_rate_limit", Some(&limit.name))
            .await?;
        self.mutate(&device.id, |d| {
            let stats = d
                .queues
                .get(&limit.name)
                .map(|q| q.stats)
                .unwrap_or_default();
            d.queues.insert(
                limit.name.clone(),
                SimQueue {
                    limit: limit.clone(),
                    stats,
                },
            );
            Ok(())
        })
    }

    async fn disable_rate_limit(&self, device: &Device, name: &str) -> CommandOutcome<()> {
        self.enter(device, "disable_rate_limit", Some(name)).await?;
        self.mutate(&device.id, |d| {
            if let Some(q) = d.queues.get_mut(name) {
                q.limit.disabled = true;
            }
            Ok(())
        })
    }

    async fn set_secret_enabled(
        &self,
        device: &Device,
        secret: &str,
        enabled: bool,
    ) -> CommandOutcome<()> {
        let op = if enabled { "enable_secret" } else { "disable_secret" };
        self.enter(device, op, Some(secret)).await?;
        self.mutate(&device.id, |d| match d.secrets.get_mut(secret) {
            Some(state) => {
                *state = enabled;
                Ok(())
            }
            None if enabled => Err(CommandError::Rejected(format!(
                "no PPP secret named {secret}"
            ))),
            None => Ok(()),
        })
    }

    async fn list_active_sessions(&self, device: &Device) -> CommandOutcome<Vec<ActiveSession>> {
        self.enter(device, "list_active_sessions", None).await?;
        self.mutate(&device.id, |d| Ok(d.sessions.clone()))
    }

    async fn terminate_session(&self, device: &Device, session_id: &str) -> CommandOutcome<()> {
        self.enter(device, "terminate_session", Some(session_id))
            .await?;
        self.mutate(&device.id, |d| {
            d.sessions.retain(|s| s.id != session_id);
            Ok(())
        })
    }

    async fn read_system_resource(&self, device: &Device) -> CommandOutcome<SystemResource> {
        self.enter(device, "read_system_resource", None).await?;
        self.mutate(&device.id, |d| Ok(d.resource))
    }

    async fn read_interface_counters(
        &self,
        device: &Device,
    ) -> CommandOutcome<Vec<InterfaceCounters>> {
        self.enter(device, "read_interface_counters", None).await?;
        self.mutate(&device.id, |d| Ok(d.interfaces.clone()))
    }

    async fn read_queue_stats(
        &self,
        device: &Device,
        name: &str,
    ) -> CommandOutcome<Option<QueueStats>> {
        self.enter(device, "read_queue_stats", Some(name)).await?;
        self.mutate(&device.id, |d| Ok(d.queues.get(name).map(|q| q.stats)))
    }

    async fn identify(
        &self,
        address: IpAddr,
        _credentials: Option<&DeviceCredentials>,
    ) -> CommandOutcome<Option<DeviceIdentity>> {
        self.discoverable
            .get(&address)
            .map(|r| Some(r.value().clone()))
            .ok_or_else(|| CommandError::Unreachable(format!("no answer from {address}")))
    }
}
