// netorch-api: Async Rust clients for MikroTik RouterOS (REST) and PostgREST

pub mod error;
pub mod postgrest;
pub mod routeros;
pub mod transport;

pub use error::Error;
pub use postgrest::{PostgrestClient, Query};
pub use routeros::RouterOsClient;
pub use transport::{TlsMode, TransportConfig};
