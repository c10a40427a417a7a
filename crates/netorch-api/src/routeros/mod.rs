// RouterOS v7 REST API client
//
// One client per device. Endpoint groups live in their own files as
// inherent `impl RouterOsClient` blocks.

mod client;
pub mod models;
mod ppp;
mod queue;
mod system;

pub use client::RouterOsClient;
pub use models::{
    Interface, PppActive, PppSecret, SimpleQueue, SimpleQueueSpec, SystemIdentity, SystemResource,
};
