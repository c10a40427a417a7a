//! CLI configuration: thin wrapper around `netorch_config`.
//!
//! Loads the config honoring `--config`, and turns it into a connected,
//! initialized `NetworkOrchestrator`.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use netorch_api::{PostgrestClient, TlsMode, TransportConfig};
use netorch_config::Config;
use netorch_core::{Actor, NetworkOrchestrator, PostgrestStore, RouterOsTransport};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// The file this invocation reads and writes.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(netorch_config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = config_file(global);
    debug!(path = %path.display(), "loading config");
    Ok(netorch_config::load_config_from(&path)?)
}

/// The actor recorded on events this invocation triggers.
pub fn operator(global: &GlobalOpts) -> Actor {
    Actor::Operator(global.operator.clone())
}

/// How much state a command needs before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    /// Device registry only.
    Registry,
    /// Registry plus the QoS policy map, which re-applies every active
    /// client's plan to its devices.
    Full,
}

/// Build the store and device transport, then load state per `startup`.
pub async fn connect(
    cfg: &Config,
    global: &GlobalOpts,
    startup: Startup,
) -> Result<NetworkOrchestrator, CliError> {
    if cfg.store.url.is_none() {
        return Err(CliError::NoConfig {
            path: config_file(global).display().to_string(),
        });
    }
    let url = cfg.store_url()?;
    let key = netorch_config::resolve_store_key(&cfg.store)?;
    let transport = TransportConfig {
        tls: TlsMode::System,
        timeout: cfg.store_timeout(),
    };
    let store = Arc::new(PostgrestStore::new(PostgrestClient::new(url, &key, &transport)?));

    let orch_cfg = cfg.orchestrator_config()?;
    let devices = Arc::new(RouterOsTransport::new(
        cfg.device_access(),
        orch_cfg.command_timeout,
    )?);

    let orchestrator = NetworkOrchestrator::new(store, devices, orch_cfg);
    match startup {
        Startup::Registry => {
            orchestrator.registry().load().await?;
        }
        Startup::Full => orchestrator.initialize().await?,
    }
    Ok(orchestrator)
}
