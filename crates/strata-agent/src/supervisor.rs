//! The pool supervisor: owns the per-kind queues, routes submissions,
//! and spawns the workers and reporter loops.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use strata_core::config::AgentConfig;
use strata_core::protocol::{TaskKind, TaskRequest};

use crate::context::AgentContext;
use crate::metrics;
use crate::push::{run_push_worker, PushLane};
use crate::queue::TaskQueue;
use crate::reporter::{run_disk_reporter, run_task_reporter, run_tablet_reporter};
use crate::worker::run_worker_loop;

/// The worker pools the supervisor owns.
///
/// One pool per coordinator-facing task class; the alter pool serves both
/// schema-change and rollup kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// Tablet creation.
    CreateTable,
    /// Tablet removal.
    DropTable,
    /// Bulk load, with the two-lane fair scheduler.
    Push,
    /// Bulk delete, sharing the push execution loop.
    Delete,
    /// Schema change and rollup.
    Alter,
    /// Replica building.
    Clone,
    /// Storage medium migration.
    StorageMediumMigrate,
    /// Delete cancellation.
    CancelDeleteData,
    /// Checksum verification.
    CheckConsistency,
    /// Snapshot creation.
    MakeSnapshot,
    /// Snapshot release.
    ReleaseSnapshot,
    /// Uploads via the transfer tool.
    Upload,
    /// Restores via the transfer tool.
    Restore,
}

impl PoolKind {
    /// Every pool, in spawn order.
    pub const ALL: [Self; 13] = [
        Self::CreateTable,
        Self::DropTable,
        Self::Push,
        Self::Delete,
        Self::Alter,
        Self::Clone,
        Self::StorageMediumMigrate,
        Self::CancelDeleteData,
        Self::CheckConsistency,
        Self::MakeSnapshot,
        Self::ReleaseSnapshot,
        Self::Upload,
        Self::Restore,
    ];

    /// The pool serving a task kind, or `None` for the internal reporter
    /// kinds.
    #[must_use]
    pub const fn for_task(kind: TaskKind) -> Option<Self> {
        match kind {
            TaskKind::CreateTable => Some(Self::CreateTable),
            TaskKind::DropTable => Some(Self::DropTable),
            TaskKind::Push => Some(Self::Push),
            TaskKind::Delete => Some(Self::Delete),
            TaskKind::SchemaChange | TaskKind::Rollup => Some(Self::Alter),
            TaskKind::Clone => Some(Self::Clone),
            TaskKind::StorageMediumMigrate => Some(Self::StorageMediumMigrate),
            TaskKind::CancelDeleteData => Some(Self::CancelDeleteData),
            TaskKind::CheckConsistency => Some(Self::CheckConsistency),
            TaskKind::MakeSnapshot => Some(Self::MakeSnapshot),
            TaskKind::ReleaseSnapshot => Some(Self::ReleaseSnapshot),
            TaskKind::Upload => Some(Self::Upload),
            TaskKind::Restore => Some(Self::Restore),
            TaskKind::ReportTask | TaskKind::ReportDiskState | TaskKind::ReportTablet => None,
        }
    }

    /// Configured worker count for this pool.
    #[must_use]
    pub const fn worker_count(self, config: &AgentConfig) -> usize {
        match self {
            Self::CreateTable => config.create_table_worker_count,
            Self::DropTable => config.drop_table_worker_count,
            Self::Push => config.push_worker_count(),
            Self::Delete => config.delete_worker_count,
            Self::Alter => config.alter_table_worker_count,
            Self::Clone => config.clone_worker_count,
            Self::StorageMediumMigrate => config.storage_medium_migrate_count,
            Self::CancelDeleteData => config.cancel_delete_data_worker_count,
            Self::CheckConsistency => config.check_consistency_worker_count,
            Self::MakeSnapshot => config.make_snapshot_worker_count,
            Self::ReleaseSnapshot => config.release_snapshot_worker_count,
            Self::Upload => config.upload_worker_count,
            Self::Restore => config.restore_worker_count,
        }
    }
}

/// Outcome of a task submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Registered and enqueued.
    Accepted,
    /// Silently dropped: the signature is already in flight.
    DuplicateSignature,
    /// The kind has no coordinator-facing pool.
    Unroutable,
}

/// Owns the pools and the worker tasks that drain them.
pub struct PoolSupervisor {
    ctx: Arc<AgentContext>,
    pools: HashMap<PoolKind, Arc<TaskQueue>>,
}

impl PoolSupervisor {
    /// Builds the supervisor and one queue per pool.
    #[must_use]
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        let pools = PoolKind::ALL
            .into_iter()
            .map(|kind| (kind, Arc::new(TaskQueue::new())))
            .collect();
        Self { ctx, pools }
    }

    /// The shared worker context.
    #[must_use]
    pub fn context(&self) -> &Arc<AgentContext> {
        &self.ctx
    }

    /// The queue backing a pool, for inspection.
    ///
    /// # Panics
    ///
    /// Never panics; every pool kind gets a queue at construction.
    #[must_use]
    pub fn queue(&self, pool: PoolKind) -> Arc<TaskQueue> {
        Arc::clone(&self.pools[&pool])
    }

    /// Routes a coordinator submission to its pool.
    ///
    /// The signature registry is the de-duplication gate: a signature
    /// already in flight for the kind is dropped without enqueueing.
    pub fn submit(&self, task: TaskRequest) -> SubmitOutcome {
        let Some(pool) = PoolKind::for_task(task.kind) else {
            warn!(kind = task.kind.as_str(), "submission for unroutable task kind");
            return SubmitOutcome::Unroutable;
        };

        if !self
            .ctx
            .registry
            .try_register(task.kind, task.signature, task.accounting_user())
        {
            metrics::record_duplicate(task.kind);
            return SubmitOutcome::DuplicateSignature;
        }

        metrics::record_submitted(task.kind);
        self.pools[&pool].enqueue(task);
        SubmitOutcome::Accepted
    }

    /// Spawns every pool's workers and the three reporter loops.
    ///
    /// Workers are detached and run until process shutdown.
    pub fn start(&self) {
        for pool in PoolKind::ALL {
            let count = pool.worker_count(&self.ctx.config);
            info!(?pool, workers = count, "starting pool");
            for index in 0..count {
                let ctx = Arc::clone(&self.ctx);
                let queue = self.queue(pool);
                match pool {
                    PoolKind::Push => {
                        // The first `high` workers form the high lane.
                        let lane = if index < ctx.config.push_worker_count_high_priority {
                            PushLane::High
                        } else {
                            PushLane::Normal
                        };
                        tokio::spawn(run_push_worker(ctx, queue, lane));
                    }
                    PoolKind::Delete => {
                        tokio::spawn(run_push_worker(ctx, queue, PushLane::Normal));
                    }
                    _ => {
                        tokio::spawn(run_worker_loop(ctx, queue));
                    }
                }
            }
        }

        tokio::spawn(run_task_reporter(Arc::clone(&self.ctx)));
        tokio::spawn(run_disk_reporter(Arc::clone(&self.ctx)));
        tokio::spawn(run_tablet_reporter(Arc::clone(&self.ctx)));
    }
}

impl std::fmt::Debug for PoolSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolSupervisor")
            .field("pools", &self.pools.len())
            .finish_non_exhaustive()
    }
}
