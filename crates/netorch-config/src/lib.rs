//! Configuration for the netorch CLI and any other embedder.
//!
//! One TOML file (platform config dir) layered over built-in defaults and
//! `NETORCH_` environment variables, credential resolution (env + keyring +
//! plaintext), and translation to the `netorch_core` runtime types.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use ipnet::IpNet;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use netorch_core::model::DeviceCredentials;
use netorch_core::{DeviceAccess, OrchestratorConfig, PolicyConfig, RetryPolicy};

/// Keyring service name for every stored secret.
pub const KEYRING_SERVICE: &str = "netorch";

/// Environment variable holding the store API key.
pub const STORE_KEY_ENV: &str = "NETORCH_STORE_KEY";

/// Environment variable holding the default RouterOS password.
pub const ROUTEROS_PASSWORD_ENV: &str = "NETORCH_ROUTEROS_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no {what} configured")]
    NoCredentials { what: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub defaults: Defaults,
    pub store: StoreSection,
    pub routeros: RouterOsSection,
    pub monitor: MonitorSection,
    pub policy: PolicySection,
    pub usage: UsageSection,
}

/// CLI presentation defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Defaults {
    pub output: String,
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: "table".into(),
            color: "auto".into(),
        }
    }
}

/// The billing database, reached over PostgREST.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSection {
    /// REST endpoint, e.g. `https://db.example.net/rest/v1`.
    pub url: Option<String>,
    /// Environment variable containing the API key.
    pub api_key_env: Option<String>,
    /// API key (plaintext, prefer keyring or env var).
    pub api_key: Option<String>,
    pub timeout: Option<u64>,
}

/// How devices are reached.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterOsSection {
    pub username: String,
    /// Password (plaintext, prefer keyring or env var).
    pub password: Option<String>,
    pub password_env: Option<String>,
    pub use_tls: bool,
    pub port: Option<u16>,
    pub insecure: bool,
    /// Seconds per command attempt.
    pub timeout: u64,
    /// Total attempts for transient failures, including the first.
    pub attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for RouterOsSection {
    fn default() -> Self {
        Self {
            username: "admin".into(),
            password: None,
            password_env: None,
            use_tls: true,
            port: None,
            insecure: true,
            timeout: 10,
            attempts: 2,
            retry_backoff_ms: 500,
        }
    }
}

/// Periodic task intervals in seconds. Zero disables a task.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorSection {
    pub health_interval: u64,
    pub discovery_interval: u64,
    pub usage_interval: u64,
    pub compliance_interval: u64,
    /// CIDR ranges swept by discovery.
    pub network_ranges: Vec<String>,
    pub discovery_concurrency: usize,
    pub discovery_max_hosts: usize,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            health_interval: 60,
            discovery_interval: 3600,
            usage_interval: 300,
            compliance_interval: 120,
            network_ranges: Vec::new(),
            discovery_concurrency: 32,
            discovery_max_hosts: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicySection {
    pub upload_ratio: f64,
    pub compliance_tolerance: f64,
    pub high_priority_mbps: u32,
    pub medium_priority_mbps: u32,
}

impl Default for PolicySection {
    fn default() -> Self {
        let policy = PolicyConfig::default();
        Self {
            upload_ratio: policy.upload_ratio,
            compliance_tolerance: policy.compliance_tolerance,
            high_priority_mbps: policy.high_priority_mbps,
            medium_priority_mbps: policy.medium_priority_mbps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct UsageSection {
    /// IANA timezone for month boundaries.
    pub timezone: String,
}

impl Default for UsageSection {
    fn default() -> Self {
        Self {
            timezone: "UTC".into(),
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("net", "netorch", "netorch").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("netorch");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load from the canonical path plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Defaults, then `path` (if present), then `NETORCH_` variables.
///
/// Nested keys use a double underscore:
/// `NETORCH_MONITOR__HEALTH_INTERVAL=30`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("NETORCH_").split("__"));

    Ok(figment.extract()?)
}

// ── Config saving ───────────────────────────────────────────────────

pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(cfg)?)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Env var, then keyring entry, then plaintext.
fn resolve_secret(
    env_names: &[&str],
    keyring_user: &str,
    plaintext: Option<&String>,
) -> Option<SecretString> {
    for name in env_names {
        if let Ok(val) = std::env::var(name) {
            if !val.is_empty() {
                return Some(SecretString::from(val));
            }
        }
    }

    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, keyring_user) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    plaintext.map(|s| SecretString::from(s.clone()))
}

/// Resolve the store API key.
pub fn resolve_store_key(store: &StoreSection) -> Result<SecretString, ConfigError> {
    let mut envs = Vec::new();
    if let Some(ref name) = store.api_key_env {
        envs.push(name.as_str());
    }
    envs.push(STORE_KEY_ENV);
    resolve_secret(&envs, "store/api-key", store.api_key.as_ref()).ok_or_else(|| {
        ConfigError::NoCredentials {
            what: "store API key".into(),
        }
    })
}

/// Resolve the default RouterOS password. An unset password means the
/// factory-default empty one.
pub fn resolve_routeros_password(routeros: &RouterOsSection) -> SecretString {
    let mut envs = Vec::new();
    if let Some(ref name) = routeros.password_env {
        envs.push(name.as_str());
    }
    envs.push(ROUTEROS_PASSWORD_ENV);
    resolve_secret(&envs, "routeros/password", routeros.password.as_ref())
        .unwrap_or_else(|| SecretString::from(String::new()))
}

/// Store a secret in the system keyring. `key` is `store` or `routeros`.
pub fn store_secret(key: &str, secret: &str) -> Result<(), ConfigError> {
    let user = match key {
        "store" => "store/api-key",
        "routeros" => "routeros/password",
        other => return Err(invalid("secret", format!("unknown secret '{other}'"))),
    };
    keyring::Entry::new(KEYRING_SERVICE, user)
        .and_then(|entry| entry.set_password(secret))
        .map_err(|e| invalid("keyring", e.to_string()))
}

// ── Translation into runtime types ──────────────────────────────────

impl Config {
    /// The store endpoint.
    pub fn store_url(&self) -> Result<Url, ConfigError> {
        let raw = self.store.url.as_deref().ok_or_else(|| {
            invalid("store.url", "not set (run `netorch config init` or set NETORCH_STORE__URL)")
        })?;
        Url::parse(raw).map_err(|e| invalid("store.url", format!("{raw}: {e}")))
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store.timeout.unwrap_or(30))
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        Tz::from_str(&self.usage.timezone)
            .map_err(|_| invalid("usage.timezone", format!("unknown timezone '{}'", self.usage.timezone)))
    }

    pub fn network_ranges(&self) -> Result<Vec<IpNet>, ConfigError> {
        self.monitor
            .network_ranges
            .iter()
            .map(|raw| {
                raw.parse::<IpNet>()
                    .map_err(|e| invalid("monitor.network_ranges", format!("{raw}: {e}")))
            })
            .collect()
    }

    pub fn policy(&self) -> Result<PolicyConfig, ConfigError> {
        let p = &self.policy;
        if p.upload_ratio <= 0.0 || p.upload_ratio > 1.0 {
            return Err(invalid("policy.upload_ratio", "must be in (0, 1]"));
        }
        if p.compliance_tolerance < 1.0 {
            return Err(invalid("policy.compliance_tolerance", "must be at least 1.0"));
        }
        if p.medium_priority_mbps > p.high_priority_mbps {
            return Err(invalid(
                "policy.medium_priority_mbps",
                "must not exceed high_priority_mbps",
            ));
        }
        Ok(PolicyConfig {
            upload_ratio: p.upload_ratio,
            compliance_tolerance: p.compliance_tolerance,
            high_priority_mbps: p.high_priority_mbps,
            medium_priority_mbps: p.medium_priority_mbps,
        })
    }

    /// Build the orchestrator configuration.
    pub fn orchestrator_config(&self) -> Result<OrchestratorConfig, ConfigError> {
        let ros = &self.routeros;
        let mon = &self.monitor;
        if ros.timeout == 0 {
            return Err(invalid("routeros.timeout", "must be at least 1 second"));
        }
        Ok(OrchestratorConfig {
            command_timeout: Duration::from_secs(ros.timeout),
            retry: RetryPolicy {
                max_attempts: ros.attempts.max(1),
                backoff: Duration::from_millis(ros.retry_backoff_ms),
            },
            health_interval: Duration::from_secs(mon.health_interval),
            discovery_interval: Duration::from_secs(mon.discovery_interval),
            usage_interval: Duration::from_secs(mon.usage_interval),
            compliance_interval: Duration::from_secs(mon.compliance_interval),
            network_ranges: self.network_ranges()?,
            discovery_concurrency: mon.discovery_concurrency.max(1),
            discovery_max_hosts: mon.discovery_max_hosts,
            policy: self.policy()?,
            timezone: self.timezone()?,
        })
    }

    /// Device access settings with the password resolved.
    pub fn device_access(&self) -> DeviceAccess {
        let ros = &self.routeros;
        DeviceAccess {
            default_credentials: DeviceCredentials {
                username: ros.username.clone(),
                password: resolve_routeros_password(ros),
            },
            use_tls: ros.use_tls,
            port: ros.port,
            accept_invalid_certs: ros.insecure,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_match_the_orchestrator() {
        let cfg = Config::default().orchestrator_config().unwrap();
        let expected = OrchestratorConfig::default();
        assert_eq!(cfg.command_timeout, expected.command_timeout);
        assert_eq!(cfg.retry, expected.retry);
        assert_eq!(cfg.health_interval, expected.health_interval);
        assert_eq!(cfg.usage_interval, expected.usage_interval);
        assert_eq!(cfg.policy, expected.policy);
        assert_eq!(cfg.timezone, Tz::UTC);
    }

    #[test]
    fn file_values_override_defaults() {
        let file = write_toml(
            r#"
            [store]
            url = "https://db.example.net/rest/v1"

            [monitor]
            health_interval = 0
            network_ranges = ["10.10.0.0/24", "10.20.0.0/28"]

            [policy]
            upload_ratio = 0.5

            [usage]
            timezone = "Africa/Nairobi"
            "#,
        );
        let cfg = load_config_from(file.path()).unwrap();
        assert_eq!(cfg.store_url().unwrap().host_str(), Some("db.example.net"));
        assert_eq!(cfg.routeros.username, "admin");

        let orch = cfg.orchestrator_config().unwrap();
        assert!(orch.health_interval.is_zero());
        assert_eq!(orch.network_ranges.len(), 2);
        assert!((orch.policy.upload_ratio - 0.5).abs() < f64::EPSILON);
        assert_eq!(orch.timezone, chrono_tz::Africa::Nairobi);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.monitor, MonitorSection::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut cfg = Config::default();
        cfg.monitor.network_ranges = vec!["10.0.0.0/33".into()];
        assert!(matches!(
            cfg.orchestrator_config(),
            Err(ConfigError::Validation { field, .. }) if field == "monitor.network_ranges"
        ));

        let mut cfg = Config::default();
        cfg.usage.timezone = "Mars/Olympus".into();
        assert!(cfg.timezone().is_err());

        let mut cfg = Config::default();
        cfg.policy.compliance_tolerance = 0.9;
        assert!(cfg.policy().is_err());

        assert!(Config::default().store_url().is_err());
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.store.url = Some("https://db.example.net/rest/v1".into());
        cfg.monitor.network_ranges = vec!["192.168.88.0/24".into()];

        save_config_to(&cfg, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), cfg);
    }
}
