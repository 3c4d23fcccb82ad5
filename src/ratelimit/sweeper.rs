//! Background eviction of idle entries.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Handle};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::bucket::TokenBucket;
use super::table::Shared;

const THREAD_NAME: &str = "keyed-ratelimit-sweeper";

/// Start the sweeper for `shared`.
///
/// Runs on the current Tokio runtime when there is one. Otherwise, or when
/// the sweeper dies on that runtime (e.g. its timers are disabled), the
/// sweeper gets its own thread with a single-threaded runtime. Failing to
/// start leaves the table without automatic eviction but usable.
pub(super) fn spawn<B: TokenBucket>(
    shared: Arc<Shared<B>>,
    period: Duration,
    shutdown_token: CancellationToken,
) {
    let handle = match Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            warn!("No Tokio runtime available, running sweeper on a dedicated thread");
            spawn_thread(run(shared, period, shutdown_token));
            return;
        }
    };

    let task = handle.spawn(run(Arc::clone(&shared), period, shutdown_token.clone()));

    // Awaiting a JoinHandle needs no timer, so this works on any runtime.
    handle.spawn(async move {
        match task.await {
            Ok(()) => {}
            Err(e) if e.is_panic() => {
                if shutdown_token.is_cancelled() {
                    return;
                }
                warn!(error = %e, "Sweeper failed on the host runtime, restarting it on a dedicated thread");
                spawn_thread(run(shared, period, shutdown_token));
            }
            Err(_) => debug!("Sweeper cancelled with its runtime"),
        }
    });
}

fn spawn_thread<F>(task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let spawned = std::thread::Builder::new()
        .name(THREAD_NAME.to_string())
        .spawn(move || match Builder::new_current_thread().enable_time().build() {
            Ok(runtime) => runtime.block_on(task),
            Err(e) => error!(error = %e, "Failed to build sweeper runtime"),
        });

    if let Err(e) = spawned {
        error!(error = %e, "Failed to start sweeper thread");
    }
}

/// Evict idle entries every `period` until `shutdown_token` fires.
///
/// The first sweep happens immediately. Cancellation wins over a pending
/// tick, so no scan starts after the token is cancelled.
async fn run<B: TokenBucket>(
    shared: Arc<Shared<B>>,
    period: Duration,
    shutdown_token: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(period = ?period, "Sweeper started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown_token.cancelled() => {
                debug!("Sweeper shutting down");
                break;
            }
            _ = interval.tick() => {
                let evicted = shared.sweep_expired(Instant::now());
                if evicted > 0 {
                    debug!(evicted, remaining = shared.len(), "Evicted idle entries");
                }
            }
        }
    }
}
