//! Foreground monitoring.
//!
//! Starts the periodic loops and streams every event they produce until
//! Ctrl-C or the `--for` deadline, then stops the loops cleanly.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use netorch_core::{NetworkEvent, NetworkOrchestrator};

use crate::cli::{GlobalOpts, MonitorArgs, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(
    orchestrator: &NetworkOrchestrator,
    args: MonitorArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let run_for = args.run_for.as_deref().map(parse_duration).transpose()?;
    let color = output::should_color(&global.color);

    let mut rx = orchestrator.events();
    let cancel = CancellationToken::new();
    orchestrator.start_monitoring(&cancel).await;

    let deadline = async {
        match run_for {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(deadline, interrupted);

    loop {
        tokio::select! {
            _ = &mut interrupted => {
                info!("interrupted, stopping monitors");
                break;
            }
            () = &mut deadline => break,
            received = rx.recv() => match received {
                Ok(event) => print_event(&event, global, color)?,
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    cancel.cancel();
    orchestrator.stop_monitoring().await;
    Ok(())
}

fn parse_duration(raw: &str) -> Result<Duration, CliError> {
    humantime::parse_duration(raw).map_err(|e| CliError::Validation {
        field: "for".into(),
        reason: format!("{raw}: {e}"),
    })
}

/// Stream one event. Structured formats emit one compact document per line.
fn print_event(event: &NetworkEvent, global: &GlobalOpts, color: bool) -> Result<(), CliError> {
    let line = match global.output {
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(event)?,
        OutputFormat::Yaml => format!("---\n{}", serde_yaml::to_string(event)?),
        OutputFormat::Plain => event.id.to_string(),
        OutputFormat::Table => {
            let row = util::EventRow::new(event, color);
            [
                row.time,
                row.event,
                row.client,
                row.device,
                row.result,
                row.detail,
            ]
            .join("  ")
        }
    };
    output::print_output(&line, global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_human_durations() {
        assert_eq!(parse_duration("90s").ok(), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("2h").ok(), Some(Duration::from_secs(7200)));
        assert!(matches!(
            parse_duration("soon"),
            Err(CliError::Validation { .. })
        ));
    }
}
