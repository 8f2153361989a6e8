//! Long-polling loop

use super::MediaBot;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause after a failed poll before asking again
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Poll for updates until `shutdown` fires, one task per update
///
/// On shutdown no new updates are fetched; requests already running are
/// awaited, not cancelled. Returns the number of updates dispatched.
pub async fn run_polling(bot: MediaBot, shutdown: CancellationToken) -> usize {
    let poll_timeout = bot.config().telegram.poll_timeout;
    let mut offset: Option<i64> = None;
    let mut tasks = JoinSet::new();
    let mut dispatched = 0;

    info!("polling for updates");

    loop {
        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "request task panicked");
            }
        }

        let polled = tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,
            polled = bot.api().get_updates(offset, poll_timeout) => polled,
        };

        match polled {
            Ok(updates) => {
                for update in updates {
                    offset = Some(update.update_id + 1);
                    debug!(update_id = update.update_id, "dispatching update");
                    let bot = bot.clone();
                    tasks.spawn(async move { bot.handle_update(update).await });
                    dispatched += 1;
                }
            }
            Err(e) => {
                warn!(error = %e, retry_in = ?POLL_RETRY_DELAY, "polling failed");
                tokio::select! {
                    biased;

                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                }
            }
        }
    }

    info!(in_flight = tasks.len(), "polling stopped, waiting for running requests");
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "request task panicked");
        }
    }
    info!(dispatched, "all requests finished");
    dispatched
}
