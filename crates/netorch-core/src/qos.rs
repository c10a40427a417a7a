// ── QoS policy manager ──
//
// Derives bandwidth plans from service packages and pushes them to every
// device a client is assigned to. The in-memory map records what was
// *attempted*, one entry per client, so later removal knows which devices
// to clean up even after a partial failure.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::command::{CommandError, CommandOutcome, DeviceCommandClient, RateLimit};
use crate::config::PolicyConfig;
use crate::error::CoreError;
use crate::events::EventLog;
use crate::model::{
    Actor, BandwidthPlan, Client, ClientId, ClientStatus, Device, DeviceId, EventKind,
    NetworkEvent, PackageId, ServicePackage,
};
use crate::registry::DeviceRegistry;
use crate::store::NetworkStore;

/// The plan last pushed to a client's devices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivePolicy {
    pub client_id: ClientId,
    pub package_id: PackageId,
    pub queue_name: String,
    pub device_ids: Vec<DeviceId>,
    pub plan: BandwidthPlan,
    pub applied_at: DateTime<Utc>,
}

/// A client observed above its plan on one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceViolation {
    pub client_id: ClientId,
    pub device_id: DeviceId,
    pub observed_down_mbps: f64,
    pub allowed_down_mbps: f64,
}

/// Everything an operation needs to know about a client, read fresh.
pub(crate) struct ClientContext {
    pub client: Client,
    pub package: ServicePackage,
    pub devices: Vec<Arc<Device>>,
}

/// Read the client, its package and its managed devices from the store.
///
/// Assigned devices missing from the registry (unapproved, no address)
/// are skipped. An empty result is `NoAssignedDevices`.
pub(crate) async fn client_context(
    store: &dyn NetworkStore,
    registry: &DeviceRegistry,
    client_id: &ClientId,
    package_id: Option<&PackageId>,
) -> Result<ClientContext, CoreError> {
    let client = store
        .get_client(client_id)
        .await?
        .ok_or_else(|| CoreError::ClientNotFound {
            id: client_id.clone(),
        })?;

    let package_id = package_id
        .or(client.service_package_id.as_ref())
        .cloned()
        .ok_or_else(|| CoreError::NoPackage {
            client: client_id.clone(),
        })?;
    let package = store
        .get_package(&package_id)
        .await?
        .ok_or(CoreError::PackageNotFound { id: package_id })?;

    let devices = managed_devices(store, registry, client_id).await?;
    Ok(ClientContext {
        client,
        package,
        devices,
    })
}

pub(crate) async fn managed_devices(
    store: &dyn NetworkStore,
    registry: &DeviceRegistry,
    client_id: &ClientId,
) -> Result<Vec<Arc<Device>>, CoreError> {
    let assigned = store.assigned_devices(client_id).await?;
    let devices: Vec<Arc<Device>> = assigned
        .iter()
        .filter_map(|id| {
            let device = registry.get(id);
            if device.is_none() {
                debug!(client = %client_id, device = %id, "assigned device is not managed");
            }
            device
        })
        .collect();
    if devices.is_empty() {
        return Err(CoreError::NoAssignedDevices {
            client: client_id.clone(),
        });
    }
    Ok(devices)
}

/// The rate-limit queue for `client` under `plan`.
pub(crate) fn rate_limit(client: &Client, plan: &BandwidthPlan) -> RateLimit {
    RateLimit {
        name: client.queue_name(),
        target: client.queue_target(),
        max_down_mbps: plan.max_down_mbps,
        max_up_mbps: plan.max_up_mbps,
        priority: Some(plan.priority.queue_priority()),
        disabled: false,
        comment: Some(format!("netorch client {}", client.id)),
    }
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn bps_to_mbps(bps: u64) -> f64 {
    bps as f64 / 1_000_000.0
}

fn error_text<T>(result: &CommandOutcome<T>) -> Option<String> {
    result.as_ref().err().map(ToString::to_string)
}

pub struct QosPolicyManager {
    store: Arc<dyn NetworkStore>,
    registry: Arc<DeviceRegistry>,
    commands: DeviceCommandClient,
    events: Arc<EventLog>,
    policy: PolicyConfig,
    active: RwLock<HashMap<ClientId, ActivePolicy>>,
}

impl QosPolicyManager {
    pub fn new(
        store: Arc<dyn NetworkStore>,
        registry: Arc<DeviceRegistry>,
        commands: DeviceCommandClient,
        events: Arc<EventLog>,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            store,
            registry,
            commands,
            events,
            policy,
            active: RwLock::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    // ── Apply ────────────────────────────────────────────────────────

    /// Push `package`'s plan to every device `client` is assigned to.
    ///
    /// Returns `Ok(true)` only if every device accepted the queue. The
    /// policy map is updated even when devices fail, so a later removal
    /// still reaches them.
    pub async fn apply_policy(
        &self,
        client_id: &ClientId,
        package_id: &PackageId,
        actor: &Actor,
    ) -> Result<bool, CoreError> {
        let ctx = client_context(
            self.store.as_ref(),
            &self.registry,
            client_id,
            Some(package_id),
        )
        .await?;
        let plan = ctx.package.plan(&self.policy)?;
        let limit = rate_limit(&ctx.client, &plan);

        let new_ids: HashSet<&DeviceId> = ctx.devices.iter().map(|d| &d.id).collect();
        let previous = self.active.read().await.get(client_id).cloned();
        if let Some(prev) = previous {
            let stale: Vec<DeviceId> = prev
                .device_ids
                .iter()
                .filter(|id| !new_ids.contains(id))
                .cloned()
                .collect();
            if !stale.is_empty() {
                self.neutralize(&prev, &stale, actor).await;
            }
        }

        let results = join_all(ctx.devices.iter().map(|device| {
            let limit = &limit;
            async move {
                let result = self.commands.create_or_update_rate_limit(device, limit).await;
                (device.id.clone(), result)
            }
        }))
        .await;

        let mut all_ok = true;
        for (device_id, result) in &results {
            all_ok &= result.is_ok();
            let event = NetworkEvent::new(
                EventKind::QosApplied {
                    package_id: package_id.clone(),
                    plan,
                    error: error_text(result),
                },
                actor.clone(),
                result.is_ok(),
            )
            .client(client_id)
            .device(device_id);
            self.events.record(event).await;
        }

        let entry = ActivePolicy {
            client_id: client_id.clone(),
            package_id: package_id.clone(),
            queue_name: limit.name.clone(),
            device_ids: results.into_iter().map(|(id, _)| id).collect(),
            plan,
            applied_at: Utc::now(),
        };
        self.active.write().await.insert(client_id.clone(), entry);

        info!(
            client = %client_id,
            package = %package_id,
            down = plan.max_down_mbps,
            up = plan.max_up_mbps,
            ok = all_ok,
            "QoS policy applied"
        );
        Ok(all_ok)
    }

    /// Disable the client's queue on devices it no longer flows through.
    async fn neutralize(&self, prev: &ActivePolicy, stale: &[DeviceId], actor: &Actor) {
        let outcomes = self.disable_on(&prev.queue_name, stale).await;
        for (device_id, result) in outcomes {
            if let Err(e) = &result {
                warn!(client = %prev.client_id, device = %device_id, error = %e, "could not clear stale queue");
            }
            let event = NetworkEvent::new(
                EventKind::QosRemoved {
                    package_id: prev.package_id.clone(),
                    error: error_text(&result),
                },
                actor.clone(),
                result.is_ok(),
            )
            .client(&prev.client_id)
            .device(&device_id);
            self.events.record(event).await;
        }
    }

    async fn disable_on(
        &self,
        queue_name: &str,
        device_ids: &[DeviceId],
    ) -> Vec<(DeviceId, CommandOutcome<()>)> {
        join_all(device_ids.iter().map(|id| async move {
            let result = match self.registry.get(id) {
                Some(device) => self.commands.disable_rate_limit(&device, queue_name).await,
                None => Err(CommandError::Unreachable("device is no longer managed".into())),
            };
            (id.clone(), result)
        }))
        .await
    }

    // ── Remove ───────────────────────────────────────────────────────

    /// Disable the client's queue everywhere it was applied.
    ///
    /// With no recorded policy this is a no-op that returns `true`.
    pub async fn remove_policy(&self, client_id: &ClientId, actor: &Actor) -> bool {
        let Some(entry) = self.active.read().await.get(client_id).cloned() else {
            debug!(client = %client_id, "no active policy to remove");
            return true;
        };

        let outcomes = self.disable_on(&entry.queue_name, &entry.device_ids).await;
        self.active.write().await.remove(client_id);

        let mut all_ok = true;
        for (device_id, result) in outcomes {
            all_ok &= result.is_ok();
            let event = NetworkEvent::new(
                EventKind::QosRemoved {
                    package_id: entry.package_id.clone(),
                    error: error_text(&result),
                },
                actor.clone(),
                result.is_ok(),
            )
            .client(client_id)
            .device(&device_id);
            self.events.record(event).await;
        }

        info!(client = %client_id, ok = all_ok, "QoS policy removed");
        all_ok
    }

    /// Remove, then apply. The apply runs even if removal failed.
    pub async fn update_policy(
        &self,
        client_id: &ClientId,
        package_id: &PackageId,
        actor: &Actor,
    ) -> Result<bool, CoreError> {
        let removed = self.remove_policy(client_id, actor).await;
        let applied = self.apply_policy(client_id, package_id, actor).await?;
        Ok(removed && applied)
    }

    // ── Compliance ───────────────────────────────────────────────────

    /// Compare each client's live download rate against its plan.
    ///
    /// Devices that cannot be read are skipped. Never fails.
    pub async fn check_compliance(&self) -> Vec<ComplianceViolation> {
        let policies: Vec<ActivePolicy> = self.active.read().await.values().cloned().collect();

        let probes = policies.iter().flat_map(|policy| {
            policy.device_ids.iter().map(move |device_id| async move {
                let device = self.registry.get(device_id)?;
                match self.commands.read_queue_stats(&device, &policy.queue_name).await {
                    Ok(Some(stats)) => Some((policy, device_id, stats)),
                    Ok(None) => None,
                    Err(e) => {
                        debug!(client = %policy.client_id, device = %device_id, error = %e, "compliance read failed");
                        None
                    }
                }
            })
        });
        let samples = join_all(probes).await;

        let mut violations = Vec::new();
        for (policy, device_id, stats) in samples.into_iter().flatten() {
            let observed = bps_to_mbps(stats.rate_down_bps);
            let allowed = f64::from(policy.plan.max_down_mbps) * self.policy.compliance_tolerance;
            if observed <= allowed {
                continue;
            }
            warn!(
                client = %policy.client_id,
                device = %device_id,
                observed_mbps = observed,
                allowed_mbps = allowed,
                "client exceeds bandwidth plan"
            );
            let violation = ComplianceViolation {
                client_id: policy.client_id.clone(),
                device_id: device_id.clone(),
                observed_down_mbps: observed,
                allowed_down_mbps: allowed,
            };
            let event = NetworkEvent::new(
                EventKind::ComplianceViolation {
                    observed_down_mbps: observed,
                    allowed_down_mbps: allowed,
                },
                Actor::ComplianceMonitor,
                true,
            )
            .client(&violation.client_id)
            .device(&violation.device_id);
            self.events.record(event).await;
            violations.push(violation);
        }
        violations
    }

    // ── Startup & queries ────────────────────────────────────────────

    /// Rebuild the policy map by re-applying every active client's package.
    ///
    /// Clients without a package or managed devices are skipped. Returns
    /// the number of clients whose policy was recorded.
    pub async fn initialize_from_store(&self) -> Result<usize, CoreError> {
        let clients = self.store.list_clients_by_status(ClientStatus::Active).await?;
        let mut applied = 0;
        for client in clients {
            let Some(package_id) = client.service_package_id.clone() else {
                warn!(client = %client.id, "active client has no package, skipping");
                continue;
            };
            match self.apply_policy(&client.id, &package_id, &Actor::System).await {
                Ok(_) => applied += 1,
                Err(e) if e.is_data_inconsistency() || matches!(e, CoreError::Validation { .. }) => {
                    warn!(client = %client.id, error = %e, "skipping client during QoS rebuild");
                }
                Err(e) => return Err(e),
            }
        }
        info!(clients = applied, "QoS policy map rebuilt");
        Ok(applied)
    }

    pub async fn active_policy(&self, client_id: &ClientId) -> Option<ActivePolicy> {
        self.active.read().await.get(client_id).cloned()
    }

    /// All recorded policies, ordered by client id.
    pub async fn active_policies(&self) -> Vec<ActivePolicy> {
        let mut policies: Vec<ActivePolicy> = self.active.read().await.values().cloned().collect();
        policies.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        policies
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::QueueStats;
    use crate::model::PriorityTier;
    use crate::testing::Fixture;
    use pretty_assertions::assert_eq;

    fn manager(fx: &Fixture) -> QosPolicyManager {
        QosPolicyManager::new(
            fx.store.clone(),
            fx.registry.clone(),
            fx.commands.clone(),
            fx.events.clone(),
            PolicyConfig::default(),
        )
    }

    #[tokio::test]
    async fn apply_pushes_queue_to_every_device() {
        let fx = Fixture::new();
        let r1 = fx.router("r1", "10.0.0.1");
        let r2 = fx.router("r2", "10.0.0.2");
        let pkg = fx.package("p50", "50 Mbps", None);
        let client = fx.client("c1", &pkg, &[r1.clone(), r2.clone()]);
        fx.load().await;
        let qos = manager(&fx);

        assert!(qos.apply_policy(&client, &pkg, &Actor::Billing).await.unwrap());

        for device in [&r1, &r2] {
            let queue = fx.sim.queue(device, "client-c1").unwrap();
            assert_eq!(queue.limit.max_down_mbps, 50);
            assert_eq!(queue.limit.max_up_mbps, 40);
            assert!(!queue.is_disabled());
        }
        let policy = qos.active_policy(&client).await.unwrap();
        assert_eq!(policy.plan.priority, PriorityTier::Medium);
        assert_eq!(policy.device_ids.len(), 2);
        assert_eq!(fx.store.events().await.len(), 2);
    }

    #[tokio::test]
    async fn zero_devices_is_an_error_without_side_effects() {
        let fx = Fixture::new();
        let pkg = fx.package("p50", "50 Mbps", None);
        let client = fx.client("c1", &pkg, &[]);
        fx.load().await;
        let qos = manager(&fx);

        let err = qos.apply_policy(&client, &pkg, &Actor::Billing).await.unwrap_err();
        assert!(matches!(err, CoreError::NoAssignedDevices { .. }));
        assert!(qos.active_policy(&client).await.is_none());
        assert!(fx.sim.calls().await.is_empty());
        assert!(fx.store.events().await.is_empty());
    }

    #[tokio::test]
    async fn failed_apply_is_still_recorded() {
        let fx = Fixture::new();
        let r1 = fx.router("r1", "10.0.0.1");
        let pkg = fx.package("p20", "20 Mbps", None);
        let client = fx.client("c1", &pkg, &[r1.clone()]);
        fx.load().await;
        fx.sim.set_unreachable(&r1, true);
        let qos = manager(&fx);

        assert!(!qos.apply_policy(&client, &pkg, &Actor::Billing).await.unwrap());
        assert!(qos.active_policy(&client).await.is_some());
        let events = fx.store.events().await;
        assert_eq!(events.len(), 1);
        assert!(!events[0].success);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let fx = Fixture::new();
        let r1 = fx.router("r1", "10.0.0.1");
        let pkg = fx.package("p50", "50 Mbps", None);
        let client = fx.client("c1", &pkg, &[r1.clone()]);
        fx.load().await;
        let qos = manager(&fx);
        qos.apply_policy(&client, &pkg, &Actor::Billing).await.unwrap();

        assert!(qos.remove_policy(&client, &Actor::Billing).await);
        assert!(fx.sim.queue(&r1, "client-c1").unwrap().is_disabled());
        let events_after_first = fx.store.events().await.len();
        fx.sim.clear_calls().await;

        assert!(qos.remove_policy(&client, &Actor::Billing).await);
        assert!(fx.sim.calls().await.is_empty());
        assert_eq!(fx.store.events().await.len(), events_after_first);
    }

    #[tokio::test]
    async fn reassignment_clears_the_old_device() {
        let fx = Fixture::new();
        let r1 = fx.router("r1", "10.0.0.1");
        let r2 = fx.router("r2", "10.0.0.2");
        let pkg = fx.package("p50", "50 Mbps", None);
        let client = fx.client("c1", &pkg, &[r1.clone()]);
        fx.load().await;
        let qos = manager(&fx);
        qos.apply_policy(&client, &pkg, &Actor::Billing).await.unwrap();

        fx.store.assign(&client, &[r2.clone()]);
        assert!(qos.apply_policy(&client, &pkg, &Actor::Billing).await.unwrap());

        assert!(fx.sim.queue(&r1, "client-c1").unwrap().is_disabled());
        assert!(!fx.sim.queue(&r2, "client-c1").unwrap().is_disabled());
        assert_eq!(qos.active_policy(&client).await.unwrap().device_ids, vec![r2]);
        assert_eq!(qos.active_policies().await.len(), 1);
    }

    #[tokio::test]
    async fn update_changes_the_plan() {
        let fx = Fixture::new();
        let r1 = fx.router("r1", "10.0.0.1");
        let slow = fx.package("p20", "20 Mbps", None);
        let fast = fx.package("p100", "100 Mbps", None);
        let client = fx.client("c1", &slow, &[r1.clone()]);
        fx.load().await;
        let qos = manager(&fx);
        qos.apply_policy(&client, &slow, &Actor::Billing).await.unwrap();

        assert!(qos.update_policy(&client, &fast, &Actor::Billing).await.unwrap());
        let queue = fx.sim.queue(&r1, "client-c1").unwrap();
        assert_eq!(queue.limit.max_down_mbps, 100);
        assert_eq!(queue.limit.priority, Some(1));
        assert!(!queue.is_disabled());
    }

    #[tokio::test]
    async fn compliance_flags_only_above_tolerance() {
        let fx = Fixture::new();
        let r1 = fx.router("r1", "10.0.0.1");
        let pkg = fx.package("p50", "50 Mbps", None);
        let fast = fx.client("c1", &pkg, &[r1.clone()]);
        let fine = fx.client("c2", &pkg, &[r1.clone()]);
        fx.load().await;
        let qos = manager(&fx);
        qos.apply_policy(&fast, &pkg, &Actor::Billing).await.unwrap();
        qos.apply_policy(&fine, &pkg, &Actor::Billing).await.unwrap();

        let stats = |mbps: u64| QueueStats {
            rate_down_bps: mbps * 1_000_000,
            ..QueueStats::default()
        };
        fx.sim.set_queue_stats(&r1, "client-c1", stats(60));
        fx.sim.set_queue_stats(&r1, "client-c2", stats(54));

        let violations = qos.check_compliance().await;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].client_id, fast);
        assert!((violations[0].allowed_down_mbps - 55.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn initialize_skips_clients_without_devices() {
        let fx = Fixture::new();
        let r1 = fx.router("r1", "10.0.0.1");
        let pkg = fx.package("p50", "50 Mbps", None);
        fx.client("c1", &pkg, &[r1]);
        fx.client("c2", &pkg, &[]);
        fx.load().await;
        let qos = manager(&fx);

        assert_eq!(qos.initialize_from_store().await.unwrap(), 1);
        assert!(qos.active_policy(&ClientId::from("c2")).await.is_none());
    }
}
