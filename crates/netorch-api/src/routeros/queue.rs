// Simple queue endpoints (/rest/queue/simple)

use tracing::debug;

use super::client::RouterOsClient;
use super::models::{SimpleQueue, SimpleQueueSpec};
use crate::error::Error;

impl RouterOsClient {
    /// List every simple queue on the device.
    pub async fn list_queues(&self) -> Result<Vec<SimpleQueue>, Error> {
        self.get("queue/simple", &[]).await
    }

    /// Look up a queue by its unique `name`.
    pub async fn find_queue(&self, name: &str) -> Result<Option<SimpleQueue>, Error> {
        let mut found: Vec<SimpleQueue> = self.get("queue/simple", &[("name", name)]).await?;
        Ok(found.pop())
    }

    /// Create a queue.
    pub async fn add_queue(&self, spec: &SimpleQueueSpec) -> Result<SimpleQueue, Error> {
        debug!(name = ?spec.name, "adding simple queue");
        self.put("queue/simple", spec).await
    }

    /// Patch an existing queue by `.id`.
    pub async fn update_queue(
        &self,
        id: &str,
        spec: &SimpleQueueSpec,
    ) -> Result<SimpleQueue, Error> {
        self.patch(&format!("queue/simple/{id}"), spec).await
    }

    /// Remove a queue by `.id`.
    pub async fn remove_queue(&self, id: &str) -> Result<(), Error> {
        self.delete(&format!("queue/simple/{id}")).await
    }

    /// Create the named queue, or overwrite it when it already exists.
    pub async fn upsert_queue(&self, spec: &SimpleQueueSpec) -> Result<SimpleQueue, Error> {
        let existing = match spec.name.as_deref() {
            Some(name) => self.find_queue(name).await?,
            None => None,
        };
        match existing {
            Some(queue) => self.update_queue(&queue.id, spec).await,
            None => self.add_queue(spec).await,
        }
    }
}
