// System endpoints (/rest/system/resource, /rest/system/identity, /rest/interface)

use super::client::RouterOsClient;
use super::models::{Interface, SystemIdentity, SystemResource};
use crate::error::Error;

impl RouterOsClient {
    /// Resource snapshot: uptime, firmware version, CPU and memory.
    pub async fn system_resource(&self) -> Result<SystemResource, Error> {
        self.get("system/resource", &[]).await
    }

    /// The device's configured identity name.
    pub async fn system_identity(&self) -> Result<SystemIdentity, Error> {
        self.get("system/identity", &[]).await
    }

    /// Every interface with its cumulative byte counters.
    pub async fn interfaces(&self) -> Result<Vec<Interface>, Error> {
        self.get("interface", &[]).await
    }
}
