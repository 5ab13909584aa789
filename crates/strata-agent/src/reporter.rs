//! Periodic reporter loops.
//!
//! Three singleton loops push state to the coordinator: the in-flight
//! task set, per-disk capacity, and the tablet inventory. The disk and
//! tablet reporters hold off until the coordinator address is known from
//! a heartbeat, and their periodic wait is interruptible: the storage
//! engine broadcasts on [`DiskBrokenSignal`] when a disk fails so the
//! next report goes out immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, warn};

use strata_core::protocol::ReportRequest;

use crate::context::AgentContext;
use crate::metrics;

/// Broadcast from the storage engine to the reporter loops on disk
/// failure.
///
/// The acknowledgement flags record that a reporter was woken by the
/// signal (rather than by its timer), so the engine does not keep
/// notifying for the same failure.
#[derive(Debug)]
pub struct DiskBrokenSignal {
    sender: broadcast::Sender<()>,
    disk_report_already: AtomicBool,
    tablet_report_already: AtomicBool,
}

impl DiskBrokenSignal {
    /// Creates an idle signal.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(4);
        Self {
            sender,
            disk_report_already: AtomicBool::new(false),
            tablet_report_already: AtomicBool::new(false),
        }
    }

    /// Wakes every reporter currently waiting; called by the storage
    /// engine when a disk breaks.
    pub fn notify(&self) {
        self.disk_report_already.store(false, Ordering::SeqCst);
        self.tablet_report_already.store(false, Ordering::SeqCst);
        // Send only fails with no subscribers, which is fine.
        let _ = self.sender.send(());
    }

    /// Subscribes a reporter loop to wakeups.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Marks the disk reporter as having answered the last signal.
    pub fn acknowledge_disk_report(&self) {
        self.disk_report_already.store(true, Ordering::SeqCst);
    }

    /// Marks the tablet reporter as having answered the last signal.
    pub fn acknowledge_tablet_report(&self) {
        self.tablet_report_already.store(true, Ordering::SeqCst);
    }

    /// Whether the disk reporter answered the last signal.
    #[must_use]
    pub fn disk_report_already(&self) -> bool {
        self.disk_report_already.load(Ordering::SeqCst)
    }

    /// Whether the tablet reporter answered the last signal.
    #[must_use]
    pub fn tablet_report_already(&self) -> bool {
        self.tablet_report_already.load(Ordering::SeqCst)
    }
}

impl Default for DiskBrokenSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the in-flight task reporter forever.
pub async fn run_task_reporter(ctx: Arc<AgentContext>) {
    let interval = Duration::from_secs(ctx.config.report_task_interval_seconds);
    loop {
        let mut request = ReportRequest::new(ctx.backend.clone());
        request.tasks = Some(ctx.registry.snapshot_inflight());
        send_report(&ctx, "task", &request).await;
        tokio::time::sleep(interval).await;
    }
}

/// Runs the disk state reporter forever.
pub async fn run_disk_reporter(ctx: Arc<AgentContext>) {
    let interval = Duration::from_secs(ctx.config.report_disk_state_interval_seconds);
    let mut wakeups = ctx.disk_signal.subscribe();
    loop {
        if !ctx.coordinator_handle.is_ready() {
            info!("waiting for first coordinator heartbeat before disk report");
            tokio::time::sleep(ctx.config.retry_sleep()).await;
            continue;
        }

        match ctx.engine.disk_stats().await {
            Ok(disks) => {
                let mut request = ReportRequest::new(ctx.backend.clone());
                request.disks = Some(disks);
                send_report(&ctx, "disk", &request).await;
            }
            Err(error) => {
                warn!(%error, "gather disk stats failed, skipping report");
            }
        }

        if wait_or_disk_broken(interval, &mut wakeups).await {
            ctx.disk_signal.acknowledge_disk_report();
        }
    }
}

/// Runs the tablet inventory reporter forever.
pub async fn run_tablet_reporter(ctx: Arc<AgentContext>) {
    let interval = Duration::from_secs(ctx.config.report_olap_table_interval_seconds);
    let mut wakeups = ctx.disk_signal.subscribe();
    loop {
        if !ctx.coordinator_handle.is_ready() {
            info!("waiting for first coordinator heartbeat before tablet report");
            tokio::time::sleep(ctx.config.retry_sleep()).await;
            continue;
        }

        match ctx.engine.report_all_tablets().await {
            Ok(tablets) => {
                let mut request = ReportRequest::new(ctx.backend.clone());
                request.report_version = Some(ctx.report_version.current());
                request.tablets = Some(tablets);
                send_report(&ctx, "tablet", &request).await;
            }
            Err(error) => {
                warn!(%error, "enumerate tablets failed, skipping report");
            }
        }

        if wait_or_disk_broken(interval, &mut wakeups).await {
            ctx.disk_signal.acknowledge_tablet_report();
        }
    }
}

/// Waits for the reporting interval, returning early (true) when the
/// disk-broken signal fires.
async fn wait_or_disk_broken(
    interval: Duration,
    wakeups: &mut broadcast::Receiver<()>,
) -> bool {
    tokio::select! {
        () = tokio::time::sleep(interval) => false,
        result = wakeups.recv() => !matches!(result, Err(broadcast::error::RecvError::Closed)),
    }
}

async fn send_report(ctx: &AgentContext, which: &'static str, request: &ReportRequest) {
    match ctx.coordinator.report(request).await {
        Ok(result) => {
            info!(which, status = ?result.status, "report sent");
            metrics::record_report(which, true);
        }
        Err(error) => {
            warn!(which, %error, "report failed");
            metrics::record_report(which, false);
        }
    }
}
