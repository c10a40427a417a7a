// ── Domain model ──
//
// Canonical types shared by every orchestration component. Store adapters
// map their rows onto these; nothing outside this module invents its own
// shapes for devices, clients or events.

pub mod client;
pub mod device;
pub mod event;
pub mod ids;

// ── Re-exports ──────────────────────────────────────────────────────

pub use ids::{ClientId, DeviceId, PackageId};

pub use device::{
    ApprovalStatus, Capability, CapabilitySet, Device, DeviceCredentials, DeviceFamily,
    DeviceStatus, EquipmentRecord, NewEquipment, Reachability, ResourceSample,
};

pub use client::{
    BandwidthPlan, Client, ClientStatus, PriorityTier, ServicePackage, UsageSample,
    parse_speed_mbps,
};

pub use event::{Actor, EventKind, NetworkEvent, Step, StepOutcome, WarningLevel};
