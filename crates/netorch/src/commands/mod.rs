//! Command dispatch: bridges CLI args -> orchestrator calls -> output formatting.

pub mod clients;
pub mod config_cmd;
pub mod devices;
pub mod events;
pub mod monitor;
pub mod qos;
pub mod util;

use netorch_config::Config;

use crate::cli::{Command, DevicesArgs, DevicesCommand, GlobalOpts};
use crate::config::{self, Startup};
use crate::error::CliError;

/// Connect and dispatch a store-bound command to its handler.
pub async fn dispatch(cmd: Command, mut cfg: Config, global: &GlobalOpts) -> Result<(), CliError> {
    if let Command::Devices(DevicesArgs {
        command: DevicesCommand::Discover { ranges },
    }) = &cmd
    {
        if !ranges.is_empty() {
            cfg.monitor.network_ranges.clone_from(ranges);
        }
    }

    let startup = match &cmd {
        Command::Qos(_) | Command::Monitor(_) => Startup::Full,
        _ => Startup::Registry,
    };
    let orchestrator = config::connect(&cfg, global, startup).await?;

    match cmd {
        Command::Devices(args) => devices::handle(&orchestrator, args.command, global).await,
        Command::Clients(args) => clients::handle(&orchestrator, args.command, global).await,
        Command::Qos(args) => qos::handle(&orchestrator, args.command, global).await,
        Command::Monitor(args) => monitor::handle(&orchestrator, args, global).await,
        Command::Events(args) => events::handle(&orchestrator, args.command, global).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "local command routed to the store dispatcher".into(),
        )),
    }
}
