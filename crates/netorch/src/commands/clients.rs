//! Client command handlers.
//!
//! Each operation prints the per-device events it produced, then fails
//! with a partial-failure exit code if any device step did not succeed.

use netorch_core::{ClientId, NetworkEvent, NetworkOrchestrator, PackageId};

use crate::cli::{ClientsCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util::{self, EventRow};

pub async fn handle(
    orchestrator: &NetworkOrchestrator,
    command: ClientsCommand,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let actor = config::operator(global);
    let mut rx = orchestrator.events();

    let (operation, client, ok) = match command {
        ClientsCommand::Disconnect { client } => {
            let client = ClientId::new(client);
            if !util::confirm(&format!("Disconnect client {client}?"), global.yes)? {
                return Ok(());
            }
            let ok = orchestrator.disconnect_client(&client, &actor).await?;
            ("Disconnect", client, ok)
        }
        ClientsCommand::Reconnect { client } => {
            let client = ClientId::new(client);
            let ok = orchestrator.reconnect_client(&client, &actor).await?;
            ("Reconnect", client, ok)
        }
        ClientsCommand::Limit { client, package } => {
            let client = ClientId::new(client);
            let package = PackageId::new(package);
            let ok = orchestrator
                .apply_speed_limit(&client, &package, &actor)
                .await?;
            ("Speed limit", client, ok)
        }
    };

    let events: Vec<NetworkEvent> = util::drain(&mut rx)
        .into_iter()
        .filter(|e| e.client_id.as_ref() == Some(&client))
        .collect();
    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &events,
        |e| EventRow::new(e, color),
        |e| e.id.to_string(),
    )?;
    output::print_output(&out, global.quiet);

    if ok {
        if !global.quiet {
            eprintln!("{operation} applied to client {client}");
        }
        Ok(())
    } else {
        Err(CliError::PartialFailure {
            operation: operation.into(),
            client: client.to_string(),
        })
    }
}
