//! Event log handlers.

use netorch_core::NetworkOrchestrator;

use crate::cli::{EventsCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util::EventRow;

pub async fn handle(
    orchestrator: &NetworkOrchestrator,
    command: EventsCommand,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match command {
        EventsCommand::List { limit } => {
            let events = orchestrator.recent_events(limit).await?;
            let color = output::should_color(&global.color);
            let out = output::render_list(
                &global.output,
                &events,
                |e| EventRow::new(e, color),
                |e| e.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
