//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use netorch_config::ConfigError;
use netorch_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    /// The operation ran but at least one device step failed.
    pub const PARTIAL: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Store ────────────────────────────────────────────────────────

    #[error("Billing store unavailable: {message}")]
    #[diagnostic(
        code(netorch::store_unavailable),
        help("Check store.url and that the store is reachable from this host.")
    )]
    StoreUnavailable { message: String },

    #[error("Billing store rejected the API key: {message}")]
    #[diagnostic(
        code(netorch::auth_failed),
        help(
            "Update the key with: netorch config set-secret store\n\
             Or set NETORCH_STORE_KEY."
        )
    )]
    AuthFailed { message: String },

    #[error("No {what} configured")]
    #[diagnostic(
        code(netorch::no_credentials),
        help(
            "Store it with: netorch config set-secret store\n\
             Or set NETORCH_STORE_KEY."
        )
    )]
    NoCredentials { what: String },

    #[error("Store error ({code}): {message}")]
    #[diagnostic(code(netorch::store_error))]
    Store { code: String, message: String },

    // ── Data ─────────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(code(netorch::not_found), help("{hint}"))]
    NotFound {
        resource_type: String,
        identifier: String,
        hint: String,
    },

    #[error("{message}")]
    #[diagnostic(
        code(netorch::inconsistent),
        help("Fix the client's package or device assignments in the billing console.")
    )]
    Inconsistent { message: String },

    #[error("{operation} for client '{client}' did not complete on every device")]
    #[diagnostic(
        code(netorch::partial_failure),
        help(
            "The per-device results are in the event log: netorch events list\n\
             The operation is safe to retry."
        )
    )]
    PartialFailure { operation: String, client: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(netorch::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Billing store is not configured")]
    #[diagnostic(
        code(netorch::no_config),
        help(
            "Create a config with: netorch config init\n\
             Expected at: {path}\n\
             Or set NETORCH_STORE__URL."
        )
    )]
    NoConfig { path: String },

    #[error("Configuration could not be loaded: {message}")]
    #[diagnostic(code(netorch::config))]
    Config { message: String },

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON rendering failed: {0}")]
    #[diagnostic(code(netorch::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML rendering failed: {0}")]
    #[diagnostic(code(netorch::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(netorch::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::StoreUnavailable { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Inconsistent { .. } => exit_code::CONFLICT,
            Self::PartialFailure { .. } => exit_code::PARTIAL,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ClientNotFound { id } => CliError::NotFound {
                resource_type: "client".into(),
                identifier: id.to_string(),
                hint: "Check the client ID in the billing console.".into(),
            },
            CoreError::PackageNotFound { id } => CliError::NotFound {
                resource_type: "service package".into(),
                identifier: id.to_string(),
                hint: "Check the package ID in the billing console.".into(),
            },
            CoreError::DeviceNotFound { id } => CliError::NotFound {
                resource_type: "device".into(),
                identifier: id.to_string(),
                hint: "Run: netorch devices list".into(),
            },
            err @ (CoreError::NoPackage { .. } | CoreError::NoAssignedDevices { .. }) => {
                CliError::Inconsistent {
                    message: err.to_string(),
                }
            }
            CoreError::Validation { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Config { message } => CliError::Config { message },
            CoreError::StoreAuthentication { message } => CliError::AuthFailed { message },
            CoreError::StoreUnavailable { message } => CliError::StoreUnavailable { message },
            CoreError::Store {
                message,
                code,
                status,
            } => CliError::Store {
                code: code
                    .or_else(|| status.map(|s| s.to_string()))
                    .unwrap_or_else(|| "unknown".into()),
                message,
            },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

impl From<netorch_api::Error> for CliError {
    fn from(err: netorch_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { what } => CliError::NoCredentials { what },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netorch_core::{ClientId, PackageId};

    #[test]
    fn data_errors_map_to_distinct_exit_codes() {
        let missing: CliError = CoreError::ClientNotFound {
            id: ClientId::new("c-1"),
        }
        .into();
        assert_eq!(missing.exit_code(), exit_code::NOT_FOUND);

        let unassigned: CliError = CoreError::NoAssignedDevices {
            client: ClientId::new("c-1"),
        }
        .into();
        assert_eq!(unassigned.exit_code(), exit_code::CONFLICT);

        let package: CliError = CoreError::PackageNotFound {
            id: PackageId::new("p-9"),
        }
        .into();
        assert!(package.to_string().contains("p-9"));
    }

    #[test]
    fn store_errors_prefer_the_backend_code() {
        let err: CliError = CoreError::Store {
            message: "duplicate key".into(),
            code: Some("23505".into()),
            status: Some(409),
        }
        .into();
        assert_eq!(err.to_string(), "Store error (23505): duplicate key");

        let err: CliError = CoreError::Store {
            message: "boom".into(),
            code: None,
            status: Some(500),
        }
        .into();
        assert_eq!(err.to_string(), "Store error (500): boom");
    }

    #[test]
    fn unreachable_store_is_a_connection_failure() {
        let err: CliError = CoreError::StoreUnavailable {
            message: "connection refused".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::CONNECTION);
    }
}
