use crate::monitor::{Monitor, MonitorState};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Main monitoring loop.
///
/// Runs a detection cycle, then sleeps for `interval`, until `shutdown` is
/// cancelled. Cancellation interrupts the sleep immediately; a cycle already
/// in progress is allowed to finish. A failing or panicking cycle is logged
/// and the loop carries on. Returns the number of cycles run.
pub async fn run_monitor_loop(
    monitor: Arc<Monitor>,
    interval: Duration,
    shutdown: CancellationToken,
) -> u64 {
    info!(interval_secs = interval.as_secs(), rules = monitor.rules().len(), "Monitor started");
    monitor.set_state(MonitorState::Cycling);

    let mut cycles = 0u64;
    while !shutdown.is_cancelled() {
        cycles += 1;
        info!(cycle = cycles, "Starting analysis cycle");

        // Store access is blocking
        let worker = Arc::clone(&monitor);
        match tokio::task::spawn_blocking(move || worker.run_cycle()).await {
            Ok(report) if report.has_errors() => {
                warn!(cycle = cycles, "Cycle finished with errors");
            }
            Ok(_) => {}
            Err(e) => {
                error!(cycle = cycles, "Cycle aborted: {}", e);
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    monitor.set_state(MonitorState::Idle);
    info!(cycles, "Monitor stopped");
    cycles
}
