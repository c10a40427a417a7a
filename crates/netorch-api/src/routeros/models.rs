// RouterOS REST wire types
//
// RouterOS v7 serializes every value as a string, including booleans and
// counters. Structs keep the raw strings and expose typed accessors so a
// firmware that adds or reformats a field never breaks deserialization.

use serde::{Deserialize, Serialize};

/// Parse a RouterOS boolean (`"true"` / `"false"`, `"yes"` / `"no"`).
pub fn parse_bool(raw: &str) -> bool {
    matches!(raw, "true" | "yes")
}

/// Split a RouterOS `"a/b"` pair into two integers.
///
/// Used for `bytes`, `rate` and `max-limit`, which always carry the
/// upload (target-outbound) half first.
pub fn parse_pair(raw: &str) -> Option<(u64, u64)> {
    let (a, b) = raw.split_once('/')?;
    Some((parse_scaled(a)?, parse_scaled(b)?))
}

/// Parse an integer with an optional `k`/`M`/`G` suffix (`"40M"` = 40_000_000).
fn parse_scaled(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let (digits, multiplier) = match raw.chars().last()? {
        'k' | 'K' => (&raw[..raw.len() - 1], 1_000),
        'M' => (&raw[..raw.len() - 1], 1_000_000),
        'G' => (&raw[..raw.len() - 1], 1_000_000_000),
        _ => (raw, 1),
    };
    digits.parse::<u64>().ok()?.checked_mul(multiplier)
}

// ── Simple queues (/queue/simple) ───────────────────────────────────

/// A `/queue/simple` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SimpleQueue {
    #[serde(rename = ".id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub max_limit: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub bytes: Option<String>,
    #[serde(default)]
    pub rate: Option<String>,
    #[serde(default)]
    pub disabled: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl SimpleQueue {
    pub fn is_disabled(&self) -> bool {
        self.disabled.as_deref().is_some_and(parse_bool)
    }

    /// Configured `(upload, download)` ceiling in bits per second.
    pub fn max_limit_bps(&self) -> Option<(u64, u64)> {
        self.max_limit.as_deref().and_then(parse_pair)
    }

    /// Cumulative `(upload, download)` byte counters.
    pub fn byte_counters(&self) -> Option<(u64, u64)> {
        self.bytes.as_deref().and_then(parse_pair)
    }

    /// Current `(upload, download)` rate in bits per second.
    pub fn rate_bps(&self) -> Option<(u64, u64)> {
        self.rate.as_deref().and_then(parse_pair)
    }
}

/// Body for creating or updating a simple queue.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SimpleQueueSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_limit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

// ── PPP (/ppp/secret, /ppp/active) ──────────────────────────────────

/// A `/ppp/secret` entry (a PPPoE account).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PppSecret {
    #[serde(rename = ".id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub disabled: Option<String>,
}

impl PppSecret {
    pub fn is_disabled(&self) -> bool {
        self.disabled.as_deref().is_some_and(parse_bool)
    }
}

/// A `/ppp/active` entry (a live PPPoE session).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PppActive {
    #[serde(rename = ".id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub caller_id: Option<String>,
    #[serde(default)]
    pub uptime: Option<String>,
}

// ── System (/system/resource, /system/identity) ─────────────────────

/// `/system/resource` snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SystemResource {
    #[serde(default)]
    pub uptime: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub cpu_load: Option<String>,
    #[serde(default)]
    pub free_memory: Option<String>,
    #[serde(default)]
    pub total_memory: Option<String>,
    #[serde(default)]
    pub board_name: Option<String>,
    #[serde(default)]
    pub architecture_name: Option<String>,
}

impl SystemResource {
    pub fn cpu_load_pct(&self) -> Option<u8> {
        self.cpu_load.as_deref()?.parse().ok()
    }

    pub fn free_memory_bytes(&self) -> Option<u64> {
        self.free_memory.as_deref()?.parse().ok()
    }

    pub fn total_memory_bytes(&self) -> Option<u64> {
        self.total_memory.as_deref()?.parse().ok()
    }
}

/// `/system/identity`: the device's configured name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemIdentity {
    pub name: String,
}

// ── Interfaces (/interface) ──────────────────────────────────────────

/// An `/interface` entry with its traffic counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Interface {
    #[serde(rename = ".id")]
    pub id: String,
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub rx_byte: Option<String>,
    #[serde(default)]
    pub tx_byte: Option<String>,
    #[serde(default)]
    pub running: Option<String>,
    #[serde(default)]
    pub disabled: Option<String>,
}

impl Interface {
    pub fn rx_bytes(&self) -> u64 {
        self.rx_byte.as_deref().and_then(|v| v.parse().ok()).unwrap_or(0)
    }

    pub fn tx_bytes(&self) -> u64 {
        self.tx_byte.as_deref().and_then(|v| v.parse().ok()).unwrap_or(0)
    }

    pub fn is_running(&self) -> bool {
        self.running.as_deref().is_some_and(parse_bool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_queue_wire_format() {
        let json = r#"{
            ".id": "*1A",
            "name": "client-42",
            "target": "10.20.0.42/32",
            "max-limit": "40M/50M",
            "bytes": "1024/2048",
            "rate": "0/51000000",
            "disabled": "false"
        }"#;
        let q: SimpleQueue = serde_json::from_str(json).unwrap_or_default();
        assert_eq!(q.id, "*1A");
        assert!(!q.is_disabled());
        assert_eq!(q.max_limit_bps(), Some((40_000_000, 50_000_000)));
        assert_eq!(q.byte_counters(), Some((1024, 2048)));
        assert_eq!(q.rate_bps(), Some((0, 51_000_000)));
    }

    #[test]
    fn pair_rejects_garbage() {
        assert_eq!(parse_pair("unlimited"), None);
        assert_eq!(parse_pair("10/x"), None);
        assert_eq!(parse_pair("5k/1"), Some((5_000, 1)));
    }

    #[test]
    fn spec_omits_unset_fields() {
        let spec = SimpleQueueSpec {
            disabled: Some("yes".into()),
            ..SimpleQueueSpec::default()
        };
        let json = serde_json::to_value(&spec).unwrap_or_default();
        assert_eq!(json, serde_json::json!({ "disabled": "yes" }));
    }
}
