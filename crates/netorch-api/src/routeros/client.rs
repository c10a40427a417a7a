// RouterOS REST API HTTP client
//
// Wraps `reqwest::Client` with RouterOS-specific URL construction, basic
// auth, and error-body decoding. Endpoint groups (queues, PPP, system) are
// implemented as inherent methods in sibling files to keep this module
// focused on transport mechanics.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// RouterOS reports failures as `{"error": 400, "message": "...", "detail": "..."}`.
#[derive(serde::Deserialize)]
struct RouterOsErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Raw HTTP client for a single RouterOS v7 device.
///
/// Every request is authenticated with HTTP basic auth against the
/// device's `/rest` endpoint. All values on the wire are strings; the
/// typed accessors on the models in [`super::models`] do the parsing.
#[derive(Clone)]
pub struct RouterOsClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: SecretString,
}

impl std::fmt::Debug for RouterOsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterOsClient")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl RouterOsClient {
    /// Create a client for the device reachable at `base_url`
    /// (e.g. `https://10.0.0.1` or `http://10.0.0.1:8080`).
    pub fn new(
        base_url: Url,
        username: impl Into<String>,
        password: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, username, password))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            http,
            base_url,
            username: username.into(),
            password,
        }
    }

    /// The device base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build a full URL for a REST menu path: `{base}/rest/{path}`.
    pub(crate) fn rest_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/rest/{path}"))?)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.basic_auth(&self.username, Some(self.password.expose_secret()))
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request, optionally filtered by `key=value` query pairs.
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        filter: &[(&str, &str)],
    ) -> Result<T, Error> {
        let url = self.rest_url(path)?;
        debug!("GET {}", url);

        let resp = self
            .authed(self.http.get(url.clone()).query(filter))
            .send()
            .await?;

        Self::parse_response(&url, resp).await
    }

    /// Send a PUT request (RouterOS "add") and return the created record.
    pub(crate) async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &(impl Serialize + Sync),
    ) -> Result<T, Error> {
        let url = self.rest_url(path)?;
        debug!("PUT {}", url);

        let resp = self.authed(self.http.put(url.clone()).json(body)).send().await?;

        Self::parse_response(&url, resp).await
    }

    /// Send a PATCH request (RouterOS "set") and return the updated record.
    pub(crate) async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &(impl Serialize + Sync),
    ) -> Result<T, Error> {
        let url = self.rest_url(path)?;
        debug!("PATCH {}", url);

        let resp = self
            .authed(self.http.patch(url.clone()).json(body))
            .send()
            .await?;

        Self::parse_response(&url, resp).await
    }

    /// Send a DELETE request (RouterOS "remove"). Success has no body.
    pub(crate) async fn delete(&self, path: &str) -> Result<(), Error> {
        let url = self.rest_url(path)?;
        debug!("DELETE {}", url);

        let resp = self.authed(self.http.delete(url.clone())).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        Err(Self::error_from(&url, resp).await)
    }

    /// Decode a successful body, or turn a failure status into an [`Error`].
    async fn parse_response<T: DeserializeOwned>(
        url: &Url,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        if !resp.status().is_success() {
            return Err(Self::error_from(url, resp).await);
        }

        let body = resp.text().await?;
        trace!(bytes = body.len(), "routeros response");

        serde_json::from_str(&body).map_err(|e| {
            let preview = &body[..body.len().min(200)];
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })
    }

    async fn error_from(url: &Url, resp: reqwest::Response) -> Error {
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Error::Authentication {
                message: "device rejected the configured credentials".into(),
            };
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Error::NotFound {
                path: url.path().to_owned(),
            };
        }

        let body = resp.text().await.unwrap_or_default();
        match serde_json::from_str::<RouterOsErrorBody>(&body) {
            Ok(parsed) => Error::RouterOs {
                status: status.as_u16(),
                message: parsed
                    .message
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").into()),
                detail: parsed.detail,
            },
            Err(_) => Error::RouterOs {
                status: status.as_u16(),
                message: format!("HTTP {status}: {}", &body[..body.len().min(200)]),
                detail: None,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> RouterOsClient {
        RouterOsClient::with_client(
            reqwest::Client::new(),
            Url::parse(base).unwrap(),
            "admin",
            SecretString::from("secret".to_string()),
        )
    }

    #[test]
    fn rest_url_joins_without_double_slash() {
        let c = client("https://10.0.0.1/");
        assert_eq!(
            c.rest_url("/queue/simple").unwrap().as_str(),
            "https://10.0.0.1/rest/queue/simple"
        );
    }

    #[test]
    fn rest_url_keeps_port() {
        let c = client("http://10.0.0.1:8080");
        assert_eq!(
            c.rest_url("ppp/active/*1").unwrap().as_str(),
            "http://10.0.0.1:8080/rest/ppp/active/*1"
        );
    }

    #[test]
    fn debug_does_not_leak_password() {
        let c = client("https://10.0.0.1");
        let rendered = format!("{c:?}");
        assert!(!rendered.contains("secret"));
    }
}
