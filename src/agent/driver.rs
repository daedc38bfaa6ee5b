//! Fixed-interval timer that drives the stall scanner.
//!
//! Each tick starts the scan on its own task, so a slow pass never delays
//! the timer. A tick that lands while a pass is still running is dropped by
//! the scanner's guard.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::agent::scanner::{ScanOutcome, StallScanner};

/// Run the scan loop forever.
pub async fn run_driver(scanner: Arc<StallScanner>, interval: Duration) {
    tracing::info!("Starting stall scan loop with interval {:?}", interval);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Don't run immediately on startup
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let scanner = Arc::clone(&scanner);
        tokio::spawn(async move {
            match scanner.run_stall_scan().await {
                Ok(ScanOutcome::AlreadyRunning) => {
                    tracing::warn!("Previous stall scan still running, tick dropped");
                }
                Ok(ScanOutcome::Completed(_)) => {}
                Err(e) => tracing::error!("Stall scan failed: {}", e),
            }
        });
    }
}

/// Spawn the scan loop as a background task.
///
/// Abort the returned handle to stop it.
pub fn spawn_stall_scanner(
    scanner: Arc<StallScanner>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_driver(scanner, interval))
}
