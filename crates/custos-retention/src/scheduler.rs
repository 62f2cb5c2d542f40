//! Interval scheduling for retention sweeps.
//!
//! The scheduler owns a background thread running the disposal engine on a
//! fixed interval. Stopping is graceful: the flag is observed between
//! partitions by the engine and between sleep slices by the loop, so a
//! sweep is never interrupted mid-partition. Compliance operators can also
//! trigger an immediate sweep via [`DisposalEngine::run_sweep`] without
//! going through the scheduler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use crate::disposal::DisposalEngine;

/// A running sweep schedule.
pub struct SweepScheduler {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SweepScheduler {
    /// Start sweeping every `interval`, beginning with an immediate run.
    pub fn start(engine: Arc<DisposalEngine>, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = std::thread::spawn(move || {
            info!(interval_secs = interval.as_secs(), "sweep scheduler started");
            while !stop_flag.load(Ordering::Relaxed) {
                match engine.run_sweep_with_cancel(Utc::now(), &stop_flag) {
                    Ok(report) if report.cancelled => break,
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "scheduled retention sweep failed"),
                }

                // Sleep in short slices so stop requests take effect quickly.
                let mut remaining = interval;
                let slice = Duration::from_millis(50);
                while !remaining.is_zero() && !stop_flag.load(Ordering::Relaxed) {
                    let nap = remaining.min(slice);
                    std::thread::sleep(nap);
                    remaining -= nap;
                }
            }
            info!("sweep scheduler stopped");
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Request a graceful stop and wait for the thread to finish.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SweepScheduler {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
