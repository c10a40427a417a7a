// ── Usage monitor ──
//
// Turns cumulative queue counters into usage samples and evaluates each
// capped client against its monthly allowance. Warnings are emitted here;
// suspension is handed back to the facade, which owns the client lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use strum::Display;
use tracing::{debug, info, warn};

use crate::command::{DeviceCommandClient, QueueStats};
use crate::error::CoreError;
use crate::events::EventLog;
use crate::model::{
    Actor, Capability, Client, ClientId, ClientStatus, DeviceId, EventKind, NetworkEvent,
    UsageSample, WarningLevel,
};
use crate::qos::managed_devices;
use crate::registry::DeviceRegistry;
use crate::store::NetworkStore;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
pub fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GB
}

/// First instant of the calendar month containing `now`, in `tz`.
pub fn month_start(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local = now.with_timezone(&tz);
    NaiveDate::from_ymd_opt(local.year(), local.month(), 1)
        .and_then(|day| tz.from_local_datetime(&day.and_time(NaiveTime::MIN)).earliest())
        .map_or(now, |start| start.with_timezone(&Utc))
}

/// The single action a cycle takes for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UsageAction {
    None,
    Warn75,
    Warn90,
    Suspend,
}

impl UsageAction {
    /// Highest threshold reached by `ratio` (usage / cap).
    pub fn classify(ratio: f64) -> Self {
        if ratio >= 1.0 {
            Self::Suspend
        } else if ratio >= 0.9 {
            Self::Warn90
        } else if ratio >= 0.75 {
            Self::Warn75
        } else {
            Self::None
        }
    }

    fn warning_level(self) -> Option<WarningLevel> {
        match self {
            Self::Warn75 => Some(WarningLevel::Percent75),
            Self::Warn90 => Some(WarningLevel::Percent90),
            Self::None | Self::Suspend => None,
        }
    }
}

/// Outcome of evaluating one capped client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageEvaluation {
    pub client_id: ClientId,
    pub usage_gb: f64,
    pub cap_gb: f64,
    pub action: UsageAction,
    /// Bytes appended this cycle; `None` on a baseline or unreadable cycle.
    pub recorded_bytes: Option<u64>,
    /// Whether a warning event went out this cycle.
    pub notified: bool,
}

#[derive(Debug, Clone, Copy)]
struct Counters {
    bytes_in: u64,
    bytes_out: u64,
}

/// Delta between two cumulative readings. A counter that went backwards
/// was reset, so the new value is all traffic since the reset.
fn counter_delta(previous: u64, current: u64) -> u64 {
    if current >= previous {
        current - previous
    } else {
        current
    }
}

pub struct UsageMonitor {
    store: Arc<dyn NetworkStore>,
    registry: Arc<DeviceRegistry>,
    commands: DeviceCommandClient,
    events: Arc<EventLog>,
    timezone: Tz,
    /// Per client, every device's counters from the last cycle in which
    /// at least one device answered.
    last_counters: DashMap<ClientId, HashMap<DeviceId, Counters>>,
    /// Highest warning sent per client, with the month it applies to.
    warned: DashMap<ClientId, (DateTime<Utc>, WarningLevel)>,
}

impl UsageMonitor {
    pub fn new(
        store: Arc<dyn NetworkStore>,
        registry: Arc<DeviceRegistry>,
        commands: DeviceCommandClient,
        events: Arc<EventLog>,
        timezone: Tz,
    ) -> Self {
        Self {
            store,
            registry,
            commands,
            events,
            timezone,
            last_counters: DashMap::new(),
            warned: DashMap::new(),
        }
    }

    /// One monitoring cycle over every active, capped client.
    ///
    /// Only the initial client listing can fail; per-client errors are
    /// logged and that client is skipped.
    pub async fn poll_once(&self) -> Result<Vec<UsageEvaluation>, CoreError> {
        let now = Utc::now();
        let month = month_start(now, self.timezone);
        let clients = self.store.list_clients_by_status(ClientStatus::Active).await?;
        self.forget_inactive(&clients, month);

        let mut evaluations = Vec::new();
        for client in &clients {
            match self.evaluate(client, now, month).await {
                Ok(Some(evaluation)) => evaluations.push(evaluation),
                Ok(None) => {}
                Err(e) => warn!(client = %client.id, error = %e, "usage evaluation failed"),
            }
        }
        debug!(clients = clients.len(), evaluated = evaluations.len(), "usage cycle complete");
        Ok(evaluations)
    }

    fn forget_inactive(&self, clients: &[Client], month: DateTime<Utc>) {
        let active: HashSet<&ClientId> = clients.iter().map(|c| &c.id).collect();
        self.last_counters.retain(|id, _| active.contains(id));
        self.warned
            .retain(|id, (sent_month, _)| active.contains(id) && *sent_month == month);
    }

    async fn evaluate(
        &self,
        client: &Client,
        now: DateTime<Utc>,
        month: DateTime<Utc>,
    ) -> Result<Option<UsageEvaluation>, CoreError> {
        let Some(package_id) = &client.service_package_id else {
            return Ok(None);
        };
        let Some(package) = self.store.get_package(package_id).await? else {
            return Ok(None);
        };
        let Some(cap_gb) = package.data_cap_gb.filter(|cap| *cap > 0.0) else {
            return Ok(None);
        };

        let readings = self.read_counters(client).await;
        let recorded_bytes = self.record_delta(client, &readings, now).await?;

        let used = self.store.usage_since(&client.id, month).await?;
        let usage_gb = bytes_to_gb(used);
        let action = UsageAction::classify(usage_gb / cap_gb);

        let notified = match action.warning_level() {
            Some(level) => self.warn_once(client, level, month, usage_gb, cap_gb).await,
            None => false,
        };
        if action == UsageAction::Suspend {
            info!(client = %client.id, usage_gb, cap_gb, "data cap exhausted");
        }

        Ok(Some(UsageEvaluation {
            client_id: client.id.clone(),
            usage_gb,
            cap_gb,
            action,
            recorded_bytes,
            notified,
        }))
    }

    /// Counters from every assigned QoS device that has them, in
    /// assignment order.
    async fn read_counters(&self, client: &Client) -> Vec<(DeviceId, Counters)> {
        let devices = match managed_devices(self.store.as_ref(), &self.registry, &client.id).await {
            Ok(devices) => devices,
            Err(e) => {
                debug!(client = %client.id, error = %e, "no device to read usage from");
                return Vec::new();
            }
        };
        let queue = client.queue_name();
        let queue = &queue;
        let reads = join_all(
            devices
                .iter()
                .filter(|d| d.supports(Capability::Qos))
                .map(|device| async move {
                    let result = self.commands.read_queue_stats(device, queue).await;
                    (device, result)
                }),
        )
        .await;

        reads
            .into_iter()
            .filter_map(|(device, result)| match result {
                Ok(Some(QueueStats {
                    bytes_in,
                    bytes_out,
                    ..
                })) => Some((device.id.clone(), Counters { bytes_in, bytes_out })),
                Ok(None) => None,
                Err(e) => {
                    debug!(client = %client.id, device = %device.id, error = %e, "counter read failed");
                    None
                }
            })
            .collect()
    }

    /// Book the traffic since the previous cycle, measured on the first
    /// device that was read both then and now. Counters are only ever
    /// compared with the same device's earlier reading; a device seen for
    /// the first time (or again after missing a cycle) only sets a baseline.
    async fn record_delta(
        &self,
        client: &Client,
        readings: &[(DeviceId, Counters)],
        now: DateTime<Utc>,
    ) -> Result<Option<u64>, CoreError> {
        if readings.is_empty() {
            return Ok(None);
        }
        let current: HashMap<DeviceId, Counters> = readings.iter().cloned().collect();
        let previous = self.last_counters.insert(client.id.clone(), current);

        let delta = previous.as_ref().and_then(|previous| {
            readings.iter().find_map(|(device, latest)| {
                previous.get(device).map(|before| {
                    (
                        counter_delta(before.bytes_in, latest.bytes_in),
                        counter_delta(before.bytes_out, latest.bytes_out),
                    )
                })
            })
        });
        let Some((bytes_in, bytes_out)) = delta else {
            debug!(client = %client.id, "usage baseline established");
            return Ok(None);
        };

        let sample = UsageSample {
            client_id: client.id.clone(),
            bytes_in,
            bytes_out,
            recorded_at: now,
        };
        self.store.append_usage(&sample).await?;
        Ok(Some(sample.total_bytes()))
    }

    /// Emit a warning unless this level (or a higher one) already went out
    /// this month.
    async fn warn_once(
        &self,
        client: &Client,
        level: WarningLevel,
        month: DateTime<Utc>,
        usage_gb: f64,
        cap_gb: f64,
    ) -> bool {
        if let Some(sent) = self.warned.get(&client.id) {
            let (sent_month, sent_level) = *sent;
            if sent_month == month && sent_level.percent() >= level.percent() {
                return false;
            }
        }
        self.warned.insert(client.id.clone(), (month, level));

        info!(client = %client.id, level = level.percent(), usage_gb, cap_gb, "data cap warning");
        let event = NetworkEvent::new(
            EventKind::DataCapWarning {
                level,
                usage_gb,
                cap_gb,
            },
            Actor::UsageMonitor,
            true,
        )
        .client(&client.id);
        self.events.record(event).await;
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::{DeviceTransport, RateLimit};
    use crate::testing::Fixture;
    use pretty_assertions::assert_eq;

    const GB: u64 = 1024 * 1024 * 1024;

    fn monitor(fx: &Fixture) -> UsageMonitor {
        UsageMonitor::new(
            fx.store.clone(),
            fx.registry.clone(),
            fx.commands.clone(),
            fx.events.clone(),
            Tz::UTC,
        )
    }

    async fn seed_usage(fx: &Fixture, client: &ClientId, bytes: u64) {
        fx.store
            .append_usage(&UsageSample {
                client_id: client.clone(),
                bytes_in: bytes,
                bytes_out: 0,
                recorded_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[test]
    fn thresholds_pick_the_highest() {
        assert_eq!(UsageAction::classify(0.5), UsageAction::None);
        assert_eq!(UsageAction::classify(0.75), UsageAction::Warn75);
        assert_eq!(UsageAction::classify(0.95), UsageAction::Warn90);
        assert_eq!(UsageAction::classify(1.0), UsageAction::Suspend);
        assert_eq!(UsageAction::classify(1.05), UsageAction::Suspend);
    }

    #[test]
    fn counter_reset_counts_the_new_value() {
        assert_eq!(counter_delta(100, 150), 50);
        assert_eq!(counter_delta(500, 20), 20);
    }

    #[test]
    fn month_start_respects_timezone() {
        let now = Utc.with_ymd_and_hms(2026, 3, 31, 23, 30, 0).unwrap();
        // Already April 1st in Nairobi (UTC+3).
        let start = month_start(now, chrono_tz::Africa::Nairobi);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 31, 21, 0, 0).unwrap());
        assert_eq!(
            month_start(now, Tz::UTC),
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn highest_threshold_below_the_cap_only_warns() {
        let fx = Fixture::new();
        let r1 = fx.router("r1", "10.0.0.1");
        let pkg = fx.package("capped", "20 Mbps", Some(10.0));
        let client = fx.client("c1", &pkg, &[r1]);
        fx.load().await;
        seed_usage(&fx, &client, GB * 95 / 10).await;

        let evals = monitor(&fx).poll_once().await.unwrap();
        assert_eq!(evals.len(), 1);
        assert_eq!(evals[0].action, UsageAction::Warn90);
        let events = fx.store.events().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].kind,
            EventKind::DataCapWarning {
                level: WarningLevel::Percent90,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn over_cap_suspends_without_warning() {
        let fx = Fixture::new();
        let r1 = fx.router("r1", "10.0.0.1");
        let pkg = fx.package("capped", "20 Mbps", Some(10.0));
        let client = fx.client("c1", &pkg, &[r1]);
        fx.load().await;
        seed_usage(&fx, &client, GB * 105 / 10).await;

        let evals = monitor(&fx).poll_once().await.unwrap();
        assert_eq!(evals[0].action, UsageAction::Suspend);
        assert!(!evals[0].notified);
        assert!(fx.store.events().await.is_empty());
    }

    #[tokio::test]
    async fn warnings_fire_once_per_level_per_month() {
        let fx = Fixture::new();
        let r1 = fx.router("r1", "10.0.0.1");
        let pkg = fx.package("capped", "20 Mbps", Some(10.0));
        let client = fx.client("c1", &pkg, &[r1]);
        fx.load().await;
        let usage = monitor(&fx);

        seed_usage(&fx, &client, GB * 8).await;
        assert!(usage.poll_once().await.unwrap()[0].notified);
        assert!(!usage.poll_once().await.unwrap()[0].notified);

        seed_usage(&fx, &client, GB).await;
        let evals = usage.poll_once().await.unwrap();
        assert_eq!(evals[0].action, UsageAction::Warn90);
        assert!(evals[0].notified);
        assert_eq!(fx.store.events().await.len(), 2);
    }

    #[tokio::test]
    async fn first_reading_is_a_baseline() {
        let fx = Fixture::new();
        let r1 = fx.router("r1", "10.0.0.1");
        let pkg = fx.package("capped", "20 Mbps", Some(100.0));
        let client = fx.client("c1", &pkg, &[r1.clone()]);
        fx.load().await;
        fx.sim
            .create_or_update_rate_limit(
                &fx.registry.get(&r1).unwrap(),
                &RateLimit {
                    name: "client-c1".into(),
                    target: "<pppoe-pppoe-c1>".into(),
                    max_down_mbps: 20,
                    max_up_mbps: 16,
                    priority: None,
                    disabled: false,
                    comment: None,
                },
            )
            .await
            .unwrap();
        let usage = monitor(&fx);
        let counters = |bytes_in, bytes_out| QueueStats {
            bytes_in,
            bytes_out,
            ..QueueStats::default()
        };

        fx.sim.set_queue_stats(&r1, "client-c1", counters(1_000, 100));
        assert_eq!(usage.poll_once().await.unwrap()[0].recorded_bytes, None);
        assert!(fx.store.usage_samples().await.is_empty());

        fx.sim.set_queue_stats(&r1, "client-c1", counters(1_500, 300));
        assert_eq!(usage.poll_once().await.unwrap()[0].recorded_bytes, Some(700));

        // Router rebooted: counters restart from zero.
        fx.sim.set_queue_stats(&r1, "client-c1", counters(40, 10));
        assert_eq!(usage.poll_once().await.unwrap()[0].recorded_bytes, Some(50));

        let total: u64 = fx.store.usage_samples().await.iter().map(UsageSample::total_bytes).sum();
        assert_eq!(total, 750);
        assert_eq!(fx.store.usage_since(&client, month_start(Utc::now(), Tz::UTC)).await.unwrap(), 750);
    }

    async fn install_queue(fx: &Fixture, device: &DeviceId, client: &str) {
        fx.sim
            .create_or_update_rate_limit(
                &fx.registry.get(device).unwrap(),
                &RateLimit {
                    name: format!("client-{client}"),
                    target: format!("<pppoe-pppoe-{client}>"),
                    max_down_mbps: 20,
                    max_up_mbps: 16,
                    priority: None,
                    disabled: false,
                    comment: None,
                },
            )
            .await
            .unwrap();
    }

    fn inbound(bytes_in: u64) -> QueueStats {
        QueueStats {
            bytes_in,
            ..QueueStats::default()
        }
    }

    #[tokio::test]
    async fn counters_are_only_compared_within_one_device() {
        let fx = Fixture::new();
        let r1 = fx.router("r1", "10.0.0.1");
        let r2 = fx.router("r2", "10.0.0.2");
        let pkg = fx.package("capped", "20 Mbps", Some(10.0));
        let client = fx.client("c1", &pkg, &[r1.clone(), r2.clone()]);
        fx.load().await;
        install_queue(&fx, &r1, "c1").await;
        install_queue(&fx, &r2, "c1").await;
        let usage = monitor(&fx);

        fx.sim.set_queue_stats(&r1, "client-c1", inbound(1_000));
        fx.sim.set_queue_stats(&r2, "client-c1", inbound(8 * GB));
        assert_eq!(usage.poll_once().await.unwrap()[0].recorded_bytes, None);

        // r1 drops out for a cycle; r2 carries on from its own baseline.
        fx.sim.set_unreachable(&r1, true);
        fx.sim.set_queue_stats(&r2, "client-c1", inbound(8 * GB + 500));
        assert_eq!(usage.poll_once().await.unwrap()[0].recorded_bytes, Some(500));

        // r1 is back but missed a cycle, so it is only re-baselined.
        fx.sim.set_unreachable(&r1, false);
        fx.sim.set_queue_stats(&r1, "client-c1", inbound(1_300));
        fx.sim.set_queue_stats(&r2, "client-c1", inbound(8 * GB + 900));
        assert_eq!(usage.poll_once().await.unwrap()[0].recorded_bytes, Some(400));

        // Both answered last cycle: r1 is preferred again.
        fx.sim.set_queue_stats(&r1, "client-c1", inbound(1_450));
        fx.sim.set_queue_stats(&r2, "client-c1", inbound(8 * GB + 1_000));
        let evals = usage.poll_once().await.unwrap();
        assert_eq!(evals[0].recorded_bytes, Some(150));
        assert_eq!(evals[0].action, UsageAction::None);

        let month = month_start(Utc::now(), Tz::UTC);
        assert_eq!(fx.store.usage_since(&client, month).await.unwrap(), 1_050);
    }

    #[tokio::test]
    async fn outage_on_every_device_keeps_the_baseline() {
        let fx = Fixture::new();
        let r1 = fx.router("r1", "10.0.0.1");
        let pkg = fx.package("capped", "20 Mbps", Some(10.0));
        fx.client("c1", &pkg, &[r1.clone()]);
        fx.load().await;
        install_queue(&fx, &r1, "c1").await;
        let usage = monitor(&fx);

        fx.sim.set_queue_stats(&r1, "client-c1", inbound(1_000));
        usage.poll_once().await.unwrap();
        fx.sim.set_unreachable(&r1, true);
        assert_eq!(usage.poll_once().await.unwrap()[0].recorded_bytes, None);

        fx.sim.set_unreachable(&r1, false);
        fx.sim.set_queue_stats(&r1, "client-c1", inbound(3_000));
        assert_eq!(usage.poll_once().await.unwrap()[0].recorded_bytes, Some(2_000));
    }

    #[tokio::test]
    async fn state_for_clients_no_longer_active_is_dropped() {
        let fx = Fixture::new();
        let r1 = fx.router("r1", "10.0.0.1");
        let pkg = fx.package("capped", "20 Mbps", Some(10.0));
        let client = fx.client("c1", &pkg, &[r1.clone()]);
        fx.load().await;
        install_queue(&fx, &r1, "c1").await;
        fx.sim.set_queue_stats(&r1, "client-c1", inbound(1_000));
        seed_usage(&fx, &client, GB * 8).await;
        let usage = monitor(&fx);

        assert!(usage.poll_once().await.unwrap()[0].notified);
        assert_eq!(usage.last_counters.len(), 1);
        assert_eq!(usage.warned.len(), 1);

        fx.store
            .update_client_status(&client, ClientStatus::Suspended)
            .await
            .unwrap();
        assert!(usage.poll_once().await.unwrap().is_empty());
        assert!(usage.last_counters.is_empty());
        assert!(usage.warned.is_empty());
    }
}
