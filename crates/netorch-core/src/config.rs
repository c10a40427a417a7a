// ── Runtime orchestration configuration ──
//
// These types describe how the orchestrator talks to devices and how often
// it polls. They carry credential data and tuning, but never touch disk.
// The CLI builds an `OrchestratorConfig` and hands it in.

use std::time::Duration;

use chrono_tz::Tz;
use ipnet::IpNet;
use secrecy::SecretString;

use crate::model::DeviceCredentials;

/// Tunable policy constants for bandwidth plans and compliance.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyConfig {
    /// Upload as a fraction of download when a package sets none.
    pub upload_ratio: f64,
    /// Allowed overshoot of `max_down` before flagging a violation.
    pub compliance_tolerance: f64,
    pub high_priority_mbps: u32,
    pub medium_priority_mbps: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            upload_ratio: 0.8,
            compliance_tolerance: 1.1,
            high_priority_mbps: 100,
            medium_priority_mbps: 50,
        }
    }
}

/// Bounded retry of transient device failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never below 1.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

/// How the RouterOS adapter reaches devices.
#[derive(Debug, Clone)]
pub struct DeviceAccess {
    /// Used for every device without its own credentials.
    pub default_credentials: DeviceCredentials,
    pub use_tls: bool,
    /// `None` uses the scheme default (443 / 80).
    pub port: Option<u16>,
    pub accept_invalid_certs: bool,
}

impl Default for DeviceAccess {
    fn default() -> Self {
        Self {
            default_credentials: DeviceCredentials {
                username: "admin".into(),
                password: SecretString::from(String::new()),
            },
            use_tls: true,
            port: None,
            accept_invalid_certs: true,
        }
    }
}

/// Orchestrator configuration, passed to [`NetworkOrchestrator`](crate::NetworkOrchestrator).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Bound on a single device command attempt.
    pub command_timeout: Duration,
    pub retry: RetryPolicy,
    /// Zero disables the task.
    pub health_interval: Duration,
    pub discovery_interval: Duration,
    pub usage_interval: Duration,
    pub compliance_interval: Duration,
    /// Ranges scanned by discovery. Empty disables discovery.
    pub network_ranges: Vec<IpNet>,
    pub discovery_concurrency: usize,
    /// Hosts probed per range at most.
    pub discovery_max_hosts: usize,
    pub policy: PolicyConfig,
    /// Month boundaries for data-cap accounting.
    pub timezone: Tz,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            health_interval: Duration::from_secs(60),
            discovery_interval: Duration::from_secs(3600),
            usage_interval: Duration::from_secs(300),
            compliance_interval: Duration::from_secs(120),
            network_ranges: Vec::new(),
            discovery_concurrency: 32,
            discovery_max_hosts: 1024,
            policy: PolicyConfig::default(),
            timezone: Tz::UTC,
        }
    }
}
