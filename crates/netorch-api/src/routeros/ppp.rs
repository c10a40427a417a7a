// PPP endpoints (/rest/ppp/secret, /rest/ppp/active)

use serde::Serialize;

use super::client::RouterOsClient;
use super::models::{PppActive, PppSecret};
use crate::error::Error;

#[derive(Serialize)]
struct DisabledPatch<'a> {
    disabled: &'a str,
}

impl RouterOsClient {
    /// Look up a PPP secret by account name.
    pub async fn find_secret(&self, name: &str) -> Result<Option<PppSecret>, Error> {
        let mut found: Vec<PppSecret> = self.get("ppp/secret", &[("name", name)]).await?;
        Ok(found.pop())
    }

    /// Enable or disable a PPP secret by `.id`.
    pub async fn set_secret_disabled(
        &self,
        id: &str,
        disabled: bool,
    ) -> Result<PppSecret, Error> {
        let patch = DisabledPatch {
            disabled: if disabled { "yes" } else { "no" },
        };
        self.patch(&format!("ppp/secret/{id}"), &patch).await
    }

    /// List live PPP sessions, optionally filtered to one account name.
    pub async fn list_active(&self, name: Option<&str>) -> Result<Vec<PppActive>, Error> {
        match name {
            Some(name) => self.get("ppp/active", &[("name", name)]).await,
            None => self.get("ppp/active", &[]).await,
        }
    }

    /// Drop a live session by `.id`.
    pub async fn remove_active(&self, id: &str) -> Result<(), Error> {
        self.delete(&format!("ppp/active/{id}")).await
    }
}
