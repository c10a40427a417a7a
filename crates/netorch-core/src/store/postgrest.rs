// PostgREST-backed store: the billing database's REST interface.
//
// Tables: equipment, clients, service_packages, client_equipment,
// client_usage, network_events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use netorch_api::{PostgrestClient, Query};

use super::NetworkStore;
use crate::error::CoreError;
use crate::model::{
    Actor, Client, ClientId, ClientStatus, DeviceId, EquipmentRecord, EventKind, NetworkEvent,
    NewEquipment, PackageId, Reachability, ServicePackage, UsageSample,
};

const EQUIPMENT: &str = "equipment";
const CLIENTS: &str = "clients";
const PACKAGES: &str = "service_packages";
const ASSIGNMENTS: &str = "client_equipment";
const USAGE: &str = "client_usage";
const EVENTS: &str = "network_events";

#[derive(Deserialize)]
struct AssignmentRow {
    equipment_id: DeviceId,
}

#[derive(Deserialize)]
struct UsageRow {
    #[serde(default)]
    bytes_in: u64,
    #[serde(default)]
    bytes_out: u64,
}

/// `network_events` row: the event kind split into its two columns.
#[derive(Serialize, Deserialize)]
struct EventRow {
    id: Uuid,
    client_id: Option<ClientId>,
    device_id: Option<DeviceId>,
    triggered_by: String,
    event_type: String,
    event_data: serde_json::Value,
    success: bool,
    timestamp: DateTime<Utc>,
}

impl TryFrom<&NetworkEvent> for EventRow {
    type Error = CoreError;

    fn try_from(event: &NetworkEvent) -> Result<Self, Self::Error> {
        let kind = serde_json::to_value(&event.kind)
            .map_err(|e| CoreError::Internal(format!("event encode: {e}")))?;
        Ok(Self {
            id: event.id,
            client_id: event.client_id.clone(),
            device_id: event.device_id.clone(),
            triggered_by: event.triggered_by.to_string(),
            event_type: event.kind.name().to_owned(),
            event_data: kind.get("event_data").cloned().unwrap_or_default(),
            success: event.success,
            timestamp: event.timestamp,
        })
    }
}

impl TryFrom<EventRow> for NetworkEvent {
    type Error = CoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let kind: EventKind = serde_json::from_value(json!({
            "event_type": row.event_type,
            "event_data": row.event_data,
        }))
        .map_err(|e| CoreError::Internal(format!("event decode: {e}")))?;
        let triggered_by: Actor = row.triggered_by.parse().map_err(CoreError::Internal)?;
        Ok(Self {
            id: row.id,
            client_id: row.client_id,
            device_id: row.device_id,
            triggered_by,
            kind,
            success: row.success,
            timestamp: row.timestamp,
        })
    }
}

/// A `NetworkStore` over PostgREST.
#[derive(Debug, Clone)]
pub struct PostgrestStore {
    client: PostgrestClient,
}

impl PostgrestStore {
    pub fn new(client: PostgrestClient) -> Self {
        Self { client }
    }

    async fn first<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        query: Query,
    ) -> Result<Option<T>, CoreError> {
        let mut rows: Vec<T> = self.client.select(table, &query.limit(1)).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }
}

#[async_trait]
impl NetworkStore for PostgrestStore {
    async fn list_equipment(&self) -> Result<Vec<EquipmentRecord>, CoreError> {
        Ok(self.client.select(EQUIPMENT, &Query::new()).await?)
    }

    async fn insert_equipment(
        &self,
        device: &NewEquipment,
    ) -> Result<EquipmentRecord, CoreError> {
        let mut rows: Vec<EquipmentRecord> = self.client.insert(EQUIPMENT, device).await?;
        rows.pop().ok_or_else(|| CoreError::Store {
            message: "insert returned no row".into(),
            code: None,
            status: None,
        })
    }

    async fn update_device_status(
        &self,
        id: &DeviceId,
        status: Reachability,
        seen_at: Option<DateTime<Utc>>,
    ) -> Result<(), CoreError> {
        let patch = match seen_at {
            Some(at) => json!({ "status": status, "last_seen": at }),
            None => json!({ "status": status }),
        };
        let touched = self
            .client
            .update(EQUIPMENT, &Query::new().eq("id", id), &patch)
            .await?;
        if touched == 0 {
            return Err(CoreError::DeviceNotFound { id: id.clone() });
        }
        Ok(())
    }

    async fn get_client(&self, id: &ClientId) -> Result<Option<Client>, CoreError> {
        self.first(CLIENTS, Query::new().eq("id", id)).await
    }

    async fn list_clients_by_status(
        &self,
        status: ClientStatus,
    ) -> Result<Vec<Client>, CoreError> {
        Ok(self
            .client
            .select(CLIENTS, &Query::new().eq("status", status).order("id", false))
            .await?)
    }

    async fn update_client_status(
        &self,
        id: &ClientId,
        status: ClientStatus,
    ) -> Result<(), CoreError> {
        let touched = self
            .client
            .update(
                CLIENTS,
                &Query::new().eq("id", id),
                &json!({ "status": status }),
            )
            .await?;
        if touched == 0 {
            return Err(CoreError::ClientNotFound { id: id.clone() });
        }
        Ok(())
    }

    async fn get_package(&self, id: &PackageId) -> Result<Option<ServicePackage>, CoreError> {
        self.first(PACKAGES, Query::new().eq("id", id)).await
    }

    async fn assigned_devices(&self, client: &ClientId) -> Result<Vec<DeviceId>, CoreError> {
        let rows: Vec<AssignmentRow> = self
            .client
            .select(
                ASSIGNMENTS,
                &Query::new().select("equipment_id").eq("client_id", client),
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.equipment_id).collect())
    }

    async fn append_usage(&self, sample: &UsageSample) -> Result<(), CoreError> {
        let _: Vec<serde_json::Value> = self.client.insert(USAGE, sample).await?;
        Ok(())
    }

    async fn usage_since(
        &self,
        client: &ClientId,
        since: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        let rows: Vec<UsageRow> = self
            .client
            .select(
                USAGE,
                &Query::new()
                    .select("bytes_in,bytes_out")
                    .eq("client_id", client)
                    .gte("recorded_at", since.to_rfc3339()),
            )
            .await?;
        debug!(client = %client, samples = rows.len(), "summing month-to-date usage");
        Ok(rows.iter().fold(0u64, |acc, r| {
            acc.saturating_add(r.bytes_in).saturating_add(r.bytes_out)
        }))
    }

    async fn append_event(&self, event: &NetworkEvent) -> Result<(), CoreError> {
        let row = EventRow::try_from(event)?;
        let _: Vec<serde_json::Value> = self.client.insert(EVENTS, &row).await?;
        Ok(())
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<NetworkEvent>, CoreError> {
        let rows: Vec<EventRow> = self
            .client
            .select(EVENTS, &Query::new().order("timestamp", true).limit(limit))
            .await?;
        rows.into_iter().map(NetworkEvent::try_from).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{Reachability, Step, StepOutcome};

    #[test]
    fn event_row_round_trips_kind() {
        let event = NetworkEvent::new(
            EventKind::ClientReconnected {
                steps: vec![StepOutcome {
                    step: Step::CreateQueue,
                    ok: true,
                    error: None,
                }],
            },
            Actor::Billing,
            true,
        )
        .client(&ClientId::from("c9"));

        let row = EventRow::try_from(&event).unwrap();
        assert_eq!(row.event_type, "client_reconnected");
        assert_eq!(row.event_data["steps"][0]["step"], "create_queue");

        let back = NetworkEvent::try_from(row).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn status_change_row_has_flat_payload() {
        let event = NetworkEvent::new(
            EventKind::DeviceStatusChanged {
                previous: Reachability::Unknown,
                current: Reachability::Online,
            },
            Actor::HealthMonitor,
            true,
        );
        let row = EventRow::try_from(&event).unwrap();
        assert_eq!(
            row.event_data,
            json!({ "previous": "unknown", "current": "online" })
        );
    }
}
