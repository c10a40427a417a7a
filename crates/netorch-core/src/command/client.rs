use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{
    ActiveSession, CommandError, CommandOutcome, DeviceIdentity, DeviceTransport,
    InterfaceCounters, QueueStats, RateLimit, SystemResource,
};
use crate::config::RetryPolicy;
use crate::model::{Capability, Device, DeviceCredentials};

/// Executes primitives through a [`DeviceTransport`].
///
/// Adds three guarantees the transport does not have to provide itself:
/// a capability check before any I/O, a `tokio::time::timeout` around
/// every attempt, and bounded retry of transient failures. Rejections
/// are never retried.
#[derive(Clone)]
pub struct DeviceCommandClient {
    transport: Arc<dyn DeviceTransport>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl DeviceCommandClient {
    pub fn new(transport: Arc<dyn DeviceTransport>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            transport,
            timeout,
            retry,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run<T, F, Fut>(
        &self,
        device: &Device,
        op: &'static str,
        required: Option<Capability>,
        call: F,
    ) -> CommandOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = CommandOutcome<T>>,
    {
        if let Some(capability) = required {
            if !device.supports(capability) {
                debug!(device = %device.id, op, %capability, "skipping unsupported command");
                return Err(CommandError::Unsupported(capability));
            }
        }
        self.attempt(op, &device.id.to_string(), call).await
    }

    async fn attempt<T, F, Fut>(
        &self,
        op: &'static str,
        device_id: &str,
        call: F,
    ) -> CommandOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = CommandOutcome<T>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(CommandError::Timeout(self.timeout)),
            };
            match result {
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    debug!(device = device_id, op, attempt, error = %e, "transient device failure, retrying");
                    tokio::time::sleep(self.retry.backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(device = device_id, op, attempt, error = %e, "device command failed");
                    return Err(e);
                }
                ok => return ok,
            }
        }
    }

    // ── Queues ───────────────────────────────────────────────────────

    pub async fn create_or_update_rate_limit(
        &self,
        device: &Device,
        limit: &RateLimit,
    ) -> CommandOutcome<()> {
        self.run(device, "create_or_update_rate_limit", Some(Capability::Qos), || {
            self.transport.create_or_update_rate_limit(device, limit)
        })
        .await
    }

    pub async fn disable_rate_limit(&self, device: &Device, name: &str) -> CommandOutcome<()> {
        self.run(device, "disable_rate_limit", Some(Capability::Qos), || {
            self.transport.disable_rate_limit(device, name)
        })
        .await
    }

    pub async fn read_queue_stats(
        &self,
        device: &Device,
        name: &str,
    ) -> CommandOutcome<Option<QueueStats>> {
        self.run(device, "read_queue_stats", Some(Capability::Qos), || {
            self.transport.read_queue_stats(device, name)
        })
        .await
    }

    // ── PPP ──────────────────────────────────────────────────────────

    pub async fn set_secret_enabled(
        &self,
        device: &Device,
        secret: &str,
        enabled: bool,
    ) -> CommandOutcome<()> {
        self.run(device, "set_secret_enabled", Some(Capability::Routing), || {
            self.transport.set_secret_enabled(device, secret, enabled)
        })
        .await
    }

    pub async fn list_active_sessions(
        &self,
        device: &Device,
    ) -> CommandOutcome<Vec<ActiveSession>> {
        self.run(device, "list_active_sessions", Some(Capability::Routing), || {
            self.transport.list_active_sessions(device)
        })
        .await
    }

    pub async fn terminate_session(&self, device: &Device, session_id: &str) -> CommandOutcome<()> {
        self.run(device, "terminate_session", Some(Capability::Routing), || {
            self.transport.terminate_session(device, session_id)
        })
        .await
    }

    /// Terminate every live session logged in as `account`.
    /// Having none is success.
    pub async fn terminate_sessions_for(&self, device: &Device, account: &str) -> CommandOutcome<()> {
        let sessions = self.list_active_sessions(device).await?;
        for session in sessions.iter().filter(|s| s.name == account) {
            self.terminate_session(device, &session.id).await?;
        }
        Ok(())
    }

    // ── Monitoring reads ─────────────────────────────────────────────

    pub async fn read_system_resource(&self, device: &Device) -> CommandOutcome<SystemResource> {
        self.run(device, "read_system_resource", None, || {
            self.transport.read_system_resource(device)
        })
        .await
    }

    pub async fn read_interface_counters(
        &self,
        device: &Device,
    ) -> CommandOutcome<Vec<InterfaceCounters>> {
        self.run(device, "read_interface_counters", None, || {
            self.transport.read_interface_counters(device)
        })
        .await
    }

    /// Discovery probe. Not retried: a silent address is the common case.
    pub async fn identify(
        &self,
        address: IpAddr,
        credentials: Option<&DeviceCredentials>,
    ) -> CommandOutcome<Option<DeviceIdentity>> {
        match tokio::time::timeout(self.timeout, self.transport.identify(address, credentials)).await
        {
            Ok(result) => result,
            Err(_) => Err(CommandError::Timeout(self.timeout)),
        }
    }
}
