//! Background sweep worker.
//!
//! Runs `IngestPipeline::sweep` on a fixed interval from a dedicated thread,
//! independent of ingest traffic.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};
use serde::{Deserialize, Serialize};

use crate::error::{GhostError, GhostResult};
use crate::pipeline::{IngestPipeline, SweepMode};

/// Sweep configuration. The interval itself lives in the ghost policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Which records each tick broadcasts.
    pub mode: SweepMode,
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Handle to the running sweep thread. Dropping it stops and joins the thread.
#[derive(Debug)]
pub struct Sweeper {
    stop_tx: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Starts sweeping `pipeline` every `interval`.
    ///
    /// # Errors
    ///
    /// `GhostError::Internal` if the worker thread cannot be spawned.
    pub fn start(pipeline: Arc<IngestPipeline>, interval: Duration, mode: SweepMode) -> GhostResult<Self> {
        let interval = interval.max(Duration::from_millis(1));
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ticker = tick(interval);

        let join = thread::Builder::new()
            .name("ghostbus-sweeper".to_string())
            .spawn(move || {
                tracing::info!(interval_ms = millis(interval), ?mode, "sweeper started");
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            pipeline.sweep(mode);
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
                tracing::info!("sweeper stopped");
            })
            .map_err(|e| GhostError::internal(format!("failed to spawn sweeper thread: {e}")))?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            join: Some(join),
        })
    }

    /// Starts sweeping at the pipeline policy's interval.
    ///
    /// # Errors
    ///
    /// `GhostError::Internal` if the worker thread cannot be spawned.
    pub fn for_policy(pipeline: Arc<IngestPipeline>, cfg: SweepConfig) -> GhostResult<Self> {
        let interval = Duration::from_secs(pipeline.policy().sweep_interval_seconds);
        Self::start(pipeline, interval, cfg.mode)
    }

    /// Stops the worker and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Closing the stop channel wakes the select.
        drop(self.stop_tx.take());
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
