//! Network device orchestration for an ISP billing console.
//!
//! This crate sits between billing code and the routers that enforce it.
//! Callers construct a [`NetworkOrchestrator`] from a [`store::NetworkStore`]
//! (the billing database), a [`command::DeviceTransport`] (how devices are
//! reached) and an [`OrchestratorConfig`], then drive it with a handful of
//! client-level operations:
//!
//! - **[`NetworkOrchestrator::disconnect_client`]** / **[`NetworkOrchestrator::reconnect_client`]**:
//!   cut a subscriber off or restore them across every device they are assigned to.
//! - **[`NetworkOrchestrator::apply_speed_limit`]**: move a subscriber to a package's
//!   bandwidth plan.
//! - **[`NetworkOrchestrator::start_monitoring`]**: periodic health checks, discovery,
//!   data-cap accounting and plan compliance under a caller-supplied
//!   `CancellationToken`.
//!
//! Every device action is recorded as a [`NetworkEvent`], persisted to the
//! store and broadcast to [`NetworkOrchestrator::events`] subscribers.
//! Device-level failures never surface as errors: operations return
//! `Ok(false)` and the per-device events say what went wrong. `Err` is
//! reserved for data inconsistencies and store failures detected before any
//! device is touched.

pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod model;
pub mod orchestrator;
pub mod qos;
pub mod registry;
mod schedule;
pub mod store;
pub mod usage;

#[cfg(test)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{
    CommandError, CommandOutcome, DeviceCommandClient, DeviceTransport, RouterOsTransport,
    SimulatedTransport,
};
pub use config::{DeviceAccess, OrchestratorConfig, PolicyConfig, RetryPolicy};
pub use error::CoreError;
pub use health::{DiscoveredDevice, HealthReport};
pub use orchestrator::NetworkOrchestrator;
pub use qos::{ActivePolicy, ComplianceViolation};
pub use registry::DeviceRegistry;
pub use store::{MemoryStore, NetworkStore, PostgrestStore};
pub use usage::{UsageAction, UsageEvaluation};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Actor, BandwidthPlan, Capability, Client, ClientId, ClientStatus, Device, DeviceId,
    DeviceStatus, EventKind, NetworkEvent, PackageId, PriorityTier, Reachability,
    ServicePackage,
};
