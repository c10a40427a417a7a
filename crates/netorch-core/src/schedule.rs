// Periodic background tasks.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CoreError;

/// Run `cycle` every `period` until `cancel` fires.
///
/// The first cycle runs one full period after spawning. A failed cycle
/// is logged and the loop carries on; a slow cycle delays the next one
/// instead of bunching ticks up.
pub(crate) fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut cycle: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // consume the immediate first tick
        debug!(task = name, period_secs = period.as_secs(), "periodic task started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = cycle().await {
                        warn!(task = name, error = %e, "periodic cycle failed");
                    }
                }
            }
        }
        debug!(task = name, "periodic task stopped");
    })
}
