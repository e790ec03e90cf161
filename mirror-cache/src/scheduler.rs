//! Background refresh loop.

use std::sync::Weak;
use std::time::Duration;

use mirror_core::Fetcher;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::cache::Cache;

/// Tick every `period` until the cache is stopped or dropped.
///
/// The first tick fires one period after start; the caller has already done
/// the initial refresh. Each tick's refresh runs in its own task so a slow
/// fetch never delays the ticker: ticks landing while it is in flight are
/// skipped by the cache's in-flight flag.
///
/// The loop holds only a weak reference, so dropping the last handle to the
/// cache ends it at the next tick.
pub(crate) async fn refresh_loop<F: Fetcher>(
    cache: Weak<Cache<F>>,
    period: Duration,
    epoch: u64,
    mut epoch_rx: watch::Receiver<u64>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_ms = period.as_millis() as u64,
        epoch,
        "Mirror refresh loop started"
    );

    loop {
        tokio::select! {
            changed = epoch_rx.changed() => {
                // Err means the cache itself is gone.
                if changed.is_err() || *epoch_rx.borrow() != epoch {
                    break;
                }
            }

            _ = ticker.tick() => {
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                if !cache.is_running() || *epoch_rx.borrow() != epoch {
                    break;
                }
                tokio::spawn(async move {
                    cache.scheduled_update().await;
                });
            }
        }
    }

    tracing::info!(epoch, "Mirror refresh loop stopped");
}
