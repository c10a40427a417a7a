use thiserror::Error;

/// Top-level error type for the `netorch-api` crate.
///
/// Covers every failure mode across both HTTP surfaces:
/// authentication, transport, RouterOS REST, and PostgREST.
/// `netorch-core` maps these into command outcomes or store errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Credentials rejected (HTTP 401).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── RouterOS ────────────────────────────────────────────────────
    /// Structured error from the RouterOS REST API
    /// (`{"error": 400, "message": "Bad Request", "detail": "..."}`).
    #[error("RouterOS error (HTTP {status}): {message}")]
    RouterOs {
        status: u16,
        message: String,
        detail: Option<String>,
    },

    /// The addressed resource does not exist (HTTP 404).
    #[error("Not found: {path}")]
    NotFound { path: String },

    // ── PostgREST ───────────────────────────────────────────────────
    /// Structured error from PostgREST (`{"code", "message", "details", "hint"}`).
    #[error("PostgREST error (HTTP {status}): {message}")]
    Postgrest {
        status: u16,
        message: String,
        code: Option<String>,
        hint: Option<String>,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            Self::RouterOs { status, .. } | Self::Postgrest { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the device or service could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_connect() || e.is_timeout(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::RouterOs { status: 404, .. } | Self::Postgrest { status: 404, .. } => true,
            _ => false,
        }
    }

    /// HTTP status of the failed request, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { .. } => Some(401),
            Self::NotFound { .. } => Some(404),
            Self::RouterOs { status, .. } | Self::Postgrest { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = Error::RouterOs {
            status: 503,
            message: "Service Unavailable".into(),
            detail: None,
        };
        assert!(err.is_transient());
        assert!(!err.is_unreachable());
    }

    #[test]
    fn bad_request_is_not_transient() {
        let err = Error::RouterOs {
            status: 400,
            message: "Bad Request".into(),
            detail: Some("input does not match any value of target".into()),
        };
        assert!(!err.is_transient());
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn not_found_variants() {
        assert!(Error::NotFound { path: "/rest/ppp/active/*1".into() }.is_not_found());
        assert!(
            Error::Postgrest {
                status: 404,
                message: "relation does not exist".into(),
                code: Some("42P01".into()),
                hint: None,
            }
            .is_not_found()
        );
        assert!(Error::Timeout { timeout_secs: 5 }.is_unreachable());
    }
}
