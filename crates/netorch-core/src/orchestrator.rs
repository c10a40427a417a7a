// ── Network orchestration facade ──
//
// The entry point billing code talks to. Wires the registry, command
// client, QoS manager and monitors together, serializes configuration
// changes per client, and owns the lifecycle of the periodic tasks.

use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::{Mutex, OwnedMutexGuard, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{DeviceCommandClient, DeviceTransport};
use crate::config::OrchestratorConfig;
use crate::error::CoreError;
use crate::events::EventLog;
use crate::health::{DiscoveredDevice, HealthMonitor, HealthReport};
use crate::model::{
    Actor, Capability, ClientId, ClientStatus, Device, DeviceStatus, EventKind, NetworkEvent,
    PackageId, Step, StepOutcome,
};
use crate::qos::{self, ActivePolicy, ComplianceViolation, QosPolicyManager};
use crate::registry::DeviceRegistry;
use crate::schedule::spawn_periodic;
use crate::store::NetworkStore;
use crate::usage::{UsageAction, UsageEvaluation, UsageMonitor};

/// High-level orchestration API.
///
/// Cheaply cloneable via `Arc<OrchestratorInner>`. Operations that change
/// a client's configuration hold that client's lock for their whole
/// duration, so two operations on one client never interleave while
/// different clients proceed in parallel.
#[derive(Clone)]
pub struct NetworkOrchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    config: OrchestratorConfig,
    store: Arc<dyn NetworkStore>,
    registry: Arc<DeviceRegistry>,
    commands: DeviceCommandClient,
    events: Arc<EventLog>,
    qos: QosPolicyManager,
    usage: UsageMonitor,
    health: HealthMonitor,
    client_locks: DashMap<ClientId, Arc<Mutex<()>>>,
    monitoring: Mutex<Option<Monitoring>>,
}

/// Holds one client's lock. On release the map entry is dropped when no
/// other operation is holding or waiting for it.
struct ClientLease<'a> {
    locks: &'a DashMap<ClientId, Arc<Mutex<()>>>,
    client_id: ClientId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ClientLease<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.client_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

struct Monitoring {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl NetworkOrchestrator {
    /// Wire up the components. Does not touch the network: call
    /// [`initialize()`](Self::initialize) to load devices and policies.
    pub fn new(
        store: Arc<dyn NetworkStore>,
        transport: Arc<dyn DeviceTransport>,
        config: OrchestratorConfig,
    ) -> Self {
        let registry = Arc::new(DeviceRegistry::new(store.clone()));
        let commands = DeviceCommandClient::new(transport, config.command_timeout, config.retry);
        let events = Arc::new(EventLog::new(store.clone()));

        let qos = QosPolicyManager::new(
            store.clone(),
            registry.clone(),
            commands.clone(),
            events.clone(),
            config.policy.clone(),
        );
        let usage = UsageMonitor::new(
            store.clone(),
            registry.clone(),
            commands.clone(),
            events.clone(),
            config.timezone,
        );
        let health = HealthMonitor::new(
            store.clone(),
            registry.clone(),
            commands.clone(),
            events.clone(),
            config.discovery_concurrency,
            config.discovery_max_hosts,
        );

        Self {
            inner: Arc::new(OrchestratorInner {
                config,
                store,
                registry,
                commands,
                events,
                qos,
                usage,
                health,
                client_locks: DashMap::new(),
                monitoring: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    /// Load the device registry and rebuild the QoS policy map.
    pub async fn initialize(&self) -> Result<(), CoreError> {
        let devices = self.inner.registry.load().await?;
        let policies = self.inner.qos.initialize_from_store().await?;
        info!(devices, policies, "orchestrator initialized");
        Ok(())
    }

    async fn lock_client(&self, client_id: &ClientId) -> ClientLease<'_> {
        let lock = self
            .inner
            .client_locks
            .entry(client_id.clone())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        ClientLease {
            locks: &self.inner.client_locks,
            client_id: client_id.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.inner.client_locks.len()
    }

    // ── Client operations ────────────────────────────────────────────

    /// Cut a client off: remove its QoS policy, then on every assigned
    /// device terminate its sessions, disable its secret and disable its
    /// queue. Session and secret steps run only on routing devices, the
    /// queue step only on QoS devices. Every applicable step is attempted;
    /// nothing is rolled back.
    pub async fn disconnect_client(
        &self,
        client_id: &ClientId,
        actor: &Actor,
    ) -> Result<bool, CoreError> {
        let _lease = self.lock_client(client_id).await;
        self.disconnect_locked(client_id, actor).await
    }

    async fn disconnect_locked(
        &self,
        client_id: &ClientId,
        actor: &Actor,
    ) -> Result<bool, CoreError> {
        let inner = &self.inner;
        let client = inner
            .store
            .get_client(client_id)
            .await?
            .ok_or_else(|| CoreError::ClientNotFound {
                id: client_id.clone(),
            })?;
        let devices = qos::managed_devices(inner.store.as_ref(), &inner.registry, client_id).await?;

        let removed = inner.qos.remove_policy(client_id, actor).await;

        let secret = client.secret_name();
        let queue = client.queue_name();
        let per_device = join_all(devices.iter().map(|device| {
            let (secret, queue) = (&secret, &queue);
            async move {
                let mut steps = Vec::with_capacity(3);
                if device.supports(Capability::Routing) {
                    let terminated = inner.commands.terminate_sessions_for(device, secret).await;
                    steps.push(StepOutcome::from_result(Step::TerminateSession, &terminated));
                    let disabled = inner.commands.set_secret_enabled(device, secret, false).await;
                    steps.push(StepOutcome::from_result(Step::DisableSecret, &disabled));
                }
                if device.supports(Capability::Qos) {
                    let unqueued = inner.commands.disable_rate_limit(device, queue).await;
                    steps.push(StepOutcome::from_result(Step::DisableQueue, &unqueued));
                }
                (device, steps)
            }
        }))
        .await;

        let all_ok = self
            .record_steps(client_id, actor, per_device, |steps| {
                EventKind::ClientDisconnected { steps }
            })
            .await;

        info!(client = %client_id, ok = removed && all_ok, "client disconnected");
        Ok(removed && all_ok)
    }

    /// Restore a client: on every assigned device enable its secret
    /// (routing devices) and recreate its queue from the current package
    /// (QoS devices), then re-apply the QoS policy.
    pub async fn reconnect_client(
        &self,
        client_id: &ClientId,
        actor: &Actor,
    ) -> Result<bool, CoreError> {
        let _lease = self.lock_client(client_id).await;
        let inner = &self.inner;

        let ctx = qos::client_context(inner.store.as_ref(), &inner.registry, client_id, None).await?;
        let plan = ctx.package.plan(inner.qos.policy())?;
        let limit = qos::rate_limit(&ctx.client, &plan);
        let secret = ctx.client.secret_name();

        let per_device = join_all(ctx.devices.iter().map(|device| {
            let (secret, limit) = (&secret, &limit);
            async move {
                let mut steps = Vec::with_capacity(2);
                if device.supports(Capability::Routing) {
                    let enabled = inner.commands.set_secret_enabled(device, secret, true).await;
                    steps.push(StepOutcome::from_result(Step::EnableSecret, &enabled));
                }
                if device.supports(Capability::Qos) {
                    let queued = inner.commands.create_or_update_rate_limit(device, limit).await;
                    steps.push(StepOutcome::from_result(Step::CreateQueue, &queued));
                }
                (device, steps)
            }
        }))
        .await;

        let all_ok = self
            .record_steps(client_id, actor, per_device, |steps| {
                EventKind::ClientReconnected { steps }
            })
            .await;

        let applied = inner.qos.apply_policy(client_id, &ctx.package.id, actor).await?;
        info!(client = %client_id, ok = all_ok && applied, "client reconnected");
        Ok(all_ok && applied)
    }

    /// Switch a client to `package`'s plan.
    pub async fn apply_speed_limit(
        &self,
        client_id: &ClientId,
        package_id: &PackageId,
        actor: &Actor,
    ) -> Result<bool, CoreError> {
        let _lease = self.lock_client(client_id).await;
        self.inner.qos.update_policy(client_id, package_id, actor).await
    }

    /// Persist the suspension, record it and disconnect the client.
    pub async fn suspend_for_data_cap(
        &self,
        evaluation: &UsageEvaluation,
    ) -> Result<bool, CoreError> {
        let client_id = &evaluation.client_id;
        let _lease = self.lock_client(client_id).await;
        let inner = &self.inner;

        inner
            .store
            .update_client_status(client_id, ClientStatus::Suspended)
            .await?;
        let event = NetworkEvent::new(
            EventKind::DataCapSuspended {
                usage_gb: evaluation.usage_gb,
                cap_gb: evaluation.cap_gb,
            },
            Actor::UsageMonitor,
            true,
        )
        .client(client_id);
        inner.events.record(event).await;

        warn!(client = %client_id, usage_gb = evaluation.usage_gb, cap_gb = evaluation.cap_gb, "suspending client over data cap");
        self.disconnect_locked(client_id, &Actor::UsageMonitor).await
    }

    /// One event per device, `success` only if every step succeeded.
    /// Devices with no applicable step get no event. Returns the AND
    /// across devices.
    async fn record_steps(
        &self,
        client_id: &ClientId,
        actor: &Actor,
        per_device: Vec<(&Arc<Device>, Vec<StepOutcome>)>,
        kind: impl Fn(Vec<StepOutcome>) -> EventKind,
    ) -> bool {
        let mut all_ok = true;
        for (device, steps) in per_device {
            if steps.is_empty() {
                debug!(client = %client_id, device = %device.id, "no applicable steps on device");
                continue;
            }
            let ok = steps.iter().all(|s| s.ok);
            all_ok &= ok;
            let event = NetworkEvent::new(kind(steps), actor.clone(), ok)
                .client(client_id)
                .device(&device.id);
            self.inner.events.record(event).await;
        }
        all_ok
    }

    // ── Monitoring cycles ────────────────────────────────────────────

    /// Reload the catalog, then probe every device.
    pub async fn check_health(&self) -> Result<Vec<HealthReport>, CoreError> {
        self.inner.registry.load().await?;
        Ok(self.inner.health.check_health().await)
    }

    /// Sweep the configured ranges.
    pub async fn discover(&self) -> Result<Vec<DiscoveredDevice>, CoreError> {
        self.inner.health.discover(&self.inner.config.network_ranges).await
    }

    /// Run a usage cycle and suspend every client over its cap.
    pub async fn run_usage_cycle(&self) -> Result<Vec<UsageEvaluation>, CoreError> {
        let evaluations = self.inner.usage.poll_once().await?;
        for evaluation in evaluations.iter().filter(|e| e.action == UsageAction::Suspend) {
            if let Err(e) = self.suspend_for_data_cap(evaluation).await {
                warn!(client = %evaluation.client_id, error = %e, "data cap suspension failed");
            }
        }
        Ok(evaluations)
    }

    pub async fn check_compliance(&self) -> Vec<ComplianceViolation> {
        self.inner.qos.check_compliance().await
    }

    // ── Read-only views ──────────────────────────────────────────────

    pub fn get_device_status(&self) -> Vec<DeviceStatus> {
        self.inner
            .registry
            .snapshot()
            .iter()
            .map(|d| DeviceStatus::from(d.as_ref()))
            .collect()
    }

    pub async fn active_policy(&self, client_id: &ClientId) -> Option<ActivePolicy> {
        self.inner.qos.active_policy(client_id).await
    }

    pub async fn active_policies(&self) -> Vec<ActivePolicy> {
        self.inner.qos.active_policies().await
    }

    /// Subscribe to every event as it is recorded.
    pub fn events(&self) -> broadcast::Receiver<Arc<NetworkEvent>> {
        self.inner.events.subscribe()
    }

    /// Newest first.
    pub async fn recent_events(&self, limit: usize) -> Result<Vec<NetworkEvent>, CoreError> {
        self.inner.store.recent_events(limit).await
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the periodic tasks under a child of `cancel`.
    ///
    /// Tasks with a zero interval are not started; discovery also needs
    /// at least one configured range. Calling this while monitoring is
    /// already running does nothing.
    pub async fn start_monitoring(&self, cancel: &CancellationToken) {
        let mut monitoring = self.inner.monitoring.lock().await;
        if monitoring.is_some() {
            debug!("monitoring already running");
            return;
        }

        let token = cancel.child_token();
        let config = &self.inner.config;
        let mut handles = Vec::new();

        if !config.health_interval.is_zero() {
            let orch = self.clone();
            handles.push(spawn_periodic(
                "health",
                config.health_interval,
                token.clone(),
                move || {
                    let orch = orch.clone();
                    async move { orch.check_health().await.map(|_| ()) }
                },
            ));
        }

        if !config.discovery_interval.is_zero() && !config.network_ranges.is_empty() {
            let orch = self.clone();
            handles.push(spawn_periodic(
                "discovery",
                config.discovery_interval,
                token.clone(),
                move || {
                    let orch = orch.clone();
                    async move { orch.discover().await.map(|_| ()) }
                },
            ));
        }

        if !config.usage_interval.is_zero() {
            let orch = self.clone();
            handles.push(spawn_periodic(
                "usage",
                config.usage_interval,
                token.clone(),
                move || {
                    let orch = orch.clone();
                    async move { orch.run_usage_cycle().await.map(|_| ()) }
                },
            ));
        }

        if !config.compliance_interval.is_zero() {
            let orch = self.clone();
            handles.push(spawn_periodic(
                "compliance",
                config.compliance_interval,
                token.clone(),
                move || {
                    let orch = orch.clone();
                    async move {
                        orch.check_compliance().await;
                        Ok(())
                    }
                },
            ));
        }

        info!(tasks = handles.len(), "monitoring started");
        *monitoring = Some(Monitoring {
            cancel: token,
            handles,
        });
    }

    /// Stop the periodic tasks and wait for them to finish. On-demand
    /// operations already in flight are unaffected.
    pub async fn stop_monitoring(&self) {
        let Some(monitoring) = self.inner.monitoring.lock().await.take() else {
            return;
        };
        monitoring.cancel.cancel();
        for handle in monitoring.handles {
            let _ = handle.await;
        }
        info!("monitoring stopped");
    }

    pub async fn is_monitoring(&self) -> bool {
        self.inner.monitoring.lock().await.is_some()
    }
}
