//! Probe loop — drives one `ProbeService` against one target from a tick
//! source until shutdown.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::checker::{ProbeService, millis};
use crate::scheduler::{Scheduler, TickSource};

/// Probe `url` on every tick until shutdown. Returns the number of probes run.
///
/// Probes carry no parent deadline: shutdown stops new probes but lets an
/// in-flight probe finish on its own timeout.
pub async fn run_probe_loop<T: TickSource>(
    ticks: T,
    service: Arc<ProbeService>,
    url: String,
    shutdown: watch::Receiver<bool>,
) -> u64 {
    info!(endpoint = %url, timeout_ms = millis(service.timeout()), "probe loop starting");

    let mut scheduler = Scheduler::new(ticks);
    let service = service.as_ref();
    let url = url.as_str();
    let probes = scheduler
        .run(shutdown, move || async move {
            service.check_status(None, url).await;
        })
        .await;

    info!(endpoint = %url, probes, "probe loop stopped");
    probes
}
