use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::query::Query;
use crate::error::Error;
use crate::transport::TransportConfig;

/// PostgREST error body: `{"code", "message", "details", "hint"}`.
#[derive(serde::Deserialize)]
struct PostgrestErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

/// HTTP client for a PostgREST (or Supabase REST) endpoint.
///
/// The API key is sent both as `apikey` and as a bearer token, which
/// satisfies plain PostgREST JWT auth and the Supabase gateway alike.
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    http: reqwest::Client,
    base_url: Url,
}

impl PostgrestClient {
    /// `base_url` is the REST root, e.g. `https://db.example.net/rest/v1`.
    pub fn new(
        base_url: Url,
        api_key: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key.expose_secret())
            .map_err(|e| Error::Authentication {
                message: format!("invalid API key header value: {e}"),
            })?;
        key.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
            .map_err(|e| Error::Authentication {
                message: format!("invalid API key header value: {e}"),
            })?;
        bearer.set_sensitive(true);
        headers.insert("apikey", key);
        headers.insert(reqwest::header::AUTHORIZATION, bearer);

        let http = transport.build_client_with_headers(headers)?;
        Ok(Self::with_client(http, base_url))
    }

    /// Create a client with a pre-built `reqwest::Client` carrying auth headers.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    fn table_url(&self, table: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{table}"))?)
    }

    // ── Verbs ────────────────────────────────────────────────────────

    /// `GET /{table}?{filters}`
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<Vec<T>, Error> {
        let url = self.table_url(table)?;
        debug!("GET {} {:?}", url, query.params());

        let resp = self.http.get(url).query(query.params()).send().await?;
        Self::parse_response(resp).await
    }

    /// `POST /{table}` returning the inserted rows.
    pub async fn insert<T: DeserializeOwned>(
        &self,
        table: &str,
        body: &(impl Serialize + Sync),
    ) -> Result<Vec<T>, Error> {
        let url = self.table_url(table)?;
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        Self::parse_response(resp).await
    }

    /// `PATCH /{table}?{filters}`. Returns the number of rows touched.
    pub async fn update(
        &self,
        table: &str,
        query: &Query,
        patch: &(impl Serialize + Sync),
    ) -> Result<usize, Error> {
        let url = self.table_url(table)?;
        debug!("PATCH {} {:?}", url, query.params());

        let resp = self
            .http
            .patch(url)
            .query(query.params())
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await?;
        let rows: Vec<serde_json::Value> = Self::parse_response(resp).await?;
        Ok(rows.len())
    }

    async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: "PostgREST rejected the API key".into(),
            });
        }

        let body = resp.text().await?;
        if !status.is_success() {
            let parsed = serde_json::from_str::<PostgrestErrorBody>(&body).ok();
            return Err(Error::Postgrest {
                status: status.as_u16(),
                message: parsed
                    .as_ref()
                    .and_then(|p| p.message.clone())
                    .unwrap_or_else(|| format!("HTTP {status}")),
                code: parsed.as_ref().and_then(|p| p.code.clone()),
                hint: parsed.and_then(|p| p.hint),
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}
