// ── Core error types ──
//
// Errors surfaced by orchestration operations. Device-level failures are
// never raised through this type; they become `CommandError` values and
// per-device events. `CoreError` covers the store, data inconsistencies,
// and programming/configuration mistakes.

use thiserror::Error;

use crate::model::{ClientId, DeviceId, PackageId};

#[derive(Debug, Error)]
pub enum CoreError {
    // ── Data inconsistencies ─────────────────────────────────────────
    #[error("Client not found: {id}")]
    ClientNotFound { id: ClientId },

    #[error("Service package not found: {id}")]
    PackageNotFound { id: PackageId },

    #[error("Device not found: {id}")]
    DeviceNotFound { id: DeviceId },

    #[error("Client {client} has no service package")]
    NoPackage { client: ClientId },

    #[error("Client {client} has no assigned devices")]
    NoAssignedDevices { client: ClientId },

    // ── Programming / configuration errors ───────────────────────────
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Persistent store ─────────────────────────────────────────────
    #[error("Store authentication failed: {message}")]
    StoreAuthentication { message: String },

    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Store error: {message}")]
    Store {
        message: String,
        /// Backend-specific error code (e.g. a Postgres SQLSTATE).
        code: Option<String>,
        status: Option<u16>,
    },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// `true` for the "operation cannot start" class: missing rows or
    /// assignments discovered before any device command was issued.
    pub fn is_data_inconsistency(&self) -> bool {
        matches!(
            self,
            Self::ClientNotFound { .. }
                | Self::PackageNotFound { .. }
                | Self::DeviceNotFound { .. }
                | Self::NoPackage { .. }
                | Self::NoAssignedDevices { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<netorch_api::Error> for CoreError {
    fn from(err: netorch_api::Error) -> Self {
        match err {
            netorch_api::Error::Authentication { message } => {
                CoreError::StoreAuthentication { message }
            }
            netorch_api::Error::Transport(ref e) if e.is_connect() || e.is_timeout() => {
                CoreError::StoreUnavailable {
                    message: e.to_string(),
                }
            }
            netorch_api::Error::Timeout { timeout_secs } => CoreError::StoreUnavailable {
                message: format!("request timed out after {timeout_secs}s"),
            },
            netorch_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            netorch_api::Error::Tls(message) => CoreError::Config { message },
            netorch_api::Error::Postgrest {
                status,
                message,
                code,
                hint,
            } => CoreError::Store {
                message: match hint {
                    Some(hint) => format!("{message} (hint: {hint})"),
                    None => message,
                },
                code,
                status: Some(status),
            },
            netorch_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            other => CoreError::Store {
                status: other.status(),
                message: other.to_string(),
                code: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgrest_hint_is_kept() {
        let err: CoreError = netorch_api::Error::Postgrest {
            status: 400,
            message: "column does not exist".into(),
            code: Some("42703".into()),
            hint: Some("check the schema".into()),
        }
        .into();
        match err {
            CoreError::Store { message, code, .. } => {
                assert!(message.contains("check the schema"));
                assert_eq!(code.as_deref(), Some("42703"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn missing_rows_are_data_inconsistencies() {
        assert!(
            CoreError::NoAssignedDevices {
                client: ClientId::from("c1")
            }
            .is_data_inconsistency()
        );
        assert!(
            !CoreError::Validation {
                message: "x".into()
            }
            .is_data_inconsistency()
        );
    }
}
