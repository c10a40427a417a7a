// RouterOS v7 REST adapter.
//
// One `RouterOsClient` per device, built lazily and cached by device id.
// All clients share a single `reqwest::Client` connection pool.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use secrecy::SecretString;
use tracing::debug;
use url::Url;

use netorch_api::routeros::SimpleQueueSpec;
use netorch_api::{RouterOsClient, TlsMode, TransportConfig};

use super::{
    ActiveSession, CommandError, CommandOutcome, DeviceIdentity, DeviceTransport,
    InterfaceCounters, QueueStats, RateLimit, SystemResource,
};
use crate::config::DeviceAccess;
use crate::error::CoreError;
use crate::model::{Device, DeviceCredentials, DeviceId};

/// Parse a RouterOS uptime such as `1w2d03:04:05` or `3h4m5s`.
pub fn parse_uptime(raw: &str) -> Option<Duration> {
    let mut secs: u64 = 0;
    let mut num: u64 = 0;
    let mut digits = false;
    let mut rest = raw.trim();

    // Trailing `hh:mm:ss` clock form.
    if let Some(idx) = rest.rfind(|c: char| c.is_ascii_alphabetic()) {
        let clock = &rest[idx + 1..];
        if clock.contains(':') {
            secs = parse_clock(clock)?;
            rest = &rest[..=idx];
        }
    } else if rest.contains(':') {
        return parse_clock(rest).map(Duration::from_secs);
    }

    for c in rest.chars() {
        if let Some(d) = c.to_digit(10) {
            num = num.checked_mul(10)?.checked_add(u64::from(d))?;
            digits = true;
            continue;
        }
        let unit = match c {
            'w' => 604_800,
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        if !digits {
            return None;
        }
        secs = secs.checked_add(num.checked_mul(unit)?)?;
        num = 0;
        digits = false;
    }
    if digits {
        return None;
    }
    Some(Duration::from_secs(secs))
}

fn parse_clock(clock: &str) -> Option<u64> {
    let mut parts = clock.split(':').map(str::parse::<u64>);
    let h = parts.next()?.ok()?;
    let m = parts.next()?.ok()?;
    let s = parts.next()?.ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(h * 3_600 + m * 60 + s)
}

/// Translate an API error into the command failure taxonomy.
fn command_error(err: &netorch_api::Error) -> CommandError {
    if err.is_unreachable() || err.is_transient() {
        CommandError::Unreachable(err.to_string())
    } else {
        match err {
            netorch_api::Error::RouterOs {
                message,
                detail: Some(detail),
                ..
            } => CommandError::Rejected(format!("{message}: {detail}")),
            other => CommandError::Rejected(other.to_string()),
        }
    }
}

fn percent(used: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    u8::try_from(used.saturating_mul(100) / total).ok()
}

pub struct RouterOsTransport {
    http: reqwest::Client,
    access: DeviceAccess,
    clients: DashMap<DeviceId, (IpAddr, RouterOsClient)>,
}

impl RouterOsTransport {
    pub fn new(access: DeviceAccess, timeout: Duration) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            tls: if access.accept_invalid_certs {
                TlsMode::DangerAcceptInvalid
            } else {
                TlsMode::System
            },
            timeout,
        };
        let http = transport.build_client()?;
        Ok(Self {
            http,
            access,
            clients: DashMap::new(),
        })
    }

    fn base_url(&self, address: IpAddr) -> CommandOutcome<Url> {
        let scheme = if self.access.use_tls { "https" } else { "http" };
        let host = match address {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{v6}]"),
        };
        let mut url = Url::parse(&format!("{scheme}://{host}"))
            .map_err(|e| CommandError::Rejected(format!("invalid device address: {e}")))?;
        if let Some(port) = self.access.port {
            url.set_port(Some(port))
                .map_err(|()| CommandError::Rejected("cannot set port on device URL".into()))?;
        }
        Ok(url)
    }

    fn build_client(
        &self,
        address: IpAddr,
        credentials: Option<&DeviceCredentials>,
    ) -> CommandOutcome<RouterOsClient> {
        let creds = credentials.unwrap_or(&self.access.default_credentials);
        Ok(RouterOsClient::with_client(
            self.http.clone(),
            self.base_url(address)?,
            creds.username.clone(),
            SecretString::clone(&creds.password),
        ))
    }

    fn client(&self, device: &Device) -> CommandOutcome<RouterOsClient> {
        if let Some(cached) = self.clients.get(&device.id) {
            if cached.0 == device.address {
                return Ok(cached.1.clone());
            }
        }
        let client = self.build_client(device.address, device.credentials.as_ref())?;
        debug!(device = %device.id, url = %client.base_url(), "created RouterOS client");
        self.clients
            .insert(device.id.clone(), (device.address, client.clone()));
        Ok(client)
    }
}

#[async_trait]
impl DeviceTransport for RouterOsTransport {
    async fn create_or_update_rate_limit(
        &self,
        device: &Device,
        limit: &RateLimit,
    ) -> CommandOutcome<()> {
        let spec = SimpleQueueSpec {
            name: Some(limit.name.clone()),
            target: Some(limit.target.clone()),
            // RouterOS orders the pair upload/download.
            max_limit: Some(format!("{}M/{}M", limit.max_up_mbps, limit.max_down_mbps)),
            priority: limit.priority.map(|p| format!("{p}/{p}")),
            disabled: Some(if limit.disabled { "yes" } else { "no" }.to_owned()),
            comment: limit.comment.clone(),
        };
        self.client(device)?
            .upsert_queue(&spec)
            .await
            .map(|_| ())
            .map_err(|e| command_error(&e))
    }

    async fn disable_rate_limit(&self, device: &Device, name: &str) -> CommandOutcome<()> {
        let client = self.client(device)?;
        let Some(queue) = client.find_queue(name).await.map_err(|e| command_error(&e))? else {
            return Ok(());
        };
        if queue.is_disabled() {
            return Ok(());
        }
        let spec = SimpleQueueSpec {
            disabled: Some("yes".into()),
            ..SimpleQueueSpec::default()
        };
        client
            .update_queue(&queue.id, &spec)
            .await
            .map(|_| ())
            .map_err(|e| command_error(&e))
    }

    async fn set_secret_enabled(
        &self,
        device: &Device,
        secret: &str,
        enabled: bool,
    ) -> CommandOutcome<()> {
        let client = self.client(device)?;
        let found = client
            .find_secret(secret)
            .await
            .map_err(|e| command_error(&e))?;
        match found {
            None if enabled => Err(CommandError::Rejected(format!(
                "no PPP secret named {secret}"
            ))),
            None => Ok(()),
            Some(s) if s.is_disabled() != enabled => Ok(()),
            Some(s) => client
                .set_secret_disabled(&s.id, !enabled)
                .await
                .map(|_| ())
                .map_err(|e| command_error(&e)),
        }
    }

    async fn list_active_sessions(&self, device: &Device) -> CommandOutcome<Vec<ActiveSession>> {
        let sessions = self
            .client(device)?
            .list_active(None)
            .await
            .map_err(|e| command_error(&e))?;
        Ok(sessions
            .into_iter()
            .map(|s| ActiveSession {
                uptime: s.uptime.as_deref().and_then(parse_uptime),
                id: s.id,
                name: s.name,
                address: s.address,
            })
            .collect())
    }

    async fn terminate_session(&self, device: &Device, session_id: &str) -> CommandOutcome<()> {
        match self.client(device)?.remove_active(session_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(command_error(&e)),
        }
    }

    async fn read_system_resource(&self, device: &Device) -> CommandOutcome<SystemResource> {
        let res = self
            .client(device)?
            .system_resource()
            .await
            .map_err(|e| command_error(&e))?;
        let memory_pct = match (res.total_memory_bytes(), res.free_memory_bytes()) {
            (Some(total), Some(free)) => percent(total.saturating_sub(free), total),
            _ => None,
        };
        Ok(SystemResource {
            uptime: res.uptime.as_deref().and_then(parse_uptime),
            cpu_pct: res.cpu_load_pct(),
            memory_pct,
        })
    }

    async fn read_interface_counters(
        &self,
        device: &Device,
    ) -> CommandOutcome<Vec<InterfaceCounters>> {
        let interfaces = self
            .client(device)?
            .interfaces()
            .await
            .map_err(|e| command_error(&e))?;
        Ok(interfaces
            .into_iter()
            .map(|i| InterfaceCounters {
                rx_bytes: i.rx_bytes(),
                tx_bytes: i.tx_bytes(),
                running: i.is_running(),
                name: i.name,
            })
            .collect())
    }

    async fn read_queue_stats(
        &self,
        device: &Device,
        name: &str,
    ) -> CommandOutcome<Option<QueueStats>> {
        let queue = self
            .client(device)?
            .find_queue(name)
            .await
            .map_err(|e| command_error(&e))?;
        Ok(queue.map(|q| {
            // Pairs are upload/download from the target's point of view.
            let (bytes_out, bytes_in) = q.byte_counters().unwrap_or_default();
            let (rate_up_bps, rate_down_bps) = q.rate_bps().unwrap_or_default();
            QueueStats {
                bytes_in,
                bytes_out,
                rate_down_bps,
                rate_up_bps,
            }
        }))
    }

    async fn identify(
        &self,
        address: IpAddr,
        credentials: Option<&DeviceCredentials>,
    ) -> CommandOutcome<Option<DeviceIdentity>> {
        let client = self.build_client(address, credentials)?;
        let identity = match client.system_identity().await {
            Ok(identity) => identity,
            // A RouterOS REST endpoint that refuses our credentials is
            // still a router worth proposing.
            Err(netorch_api::Error::Authentication { .. }) => {
                return Ok(Some(DeviceIdentity {
                    brand: Some("MikroTik".into()),
                    ..DeviceIdentity::default()
                }));
            }
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(command_error(&e)),
        };
        let resource = client.system_resource().await.ok();
        Ok(Some(DeviceIdentity {
            identity: Some(identity.name),
            brand: Some("MikroTik".into()),
            board: resource.as_ref().and_then(|r| r.board_name.clone()),
            version: resource.and_then(|r| r.version),
        }))
    }
}
