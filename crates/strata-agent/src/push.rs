//! The push worker loop and its two-lane, user-fair task selection.
//!
//! The push pool is sized `normal + high`; the first `high` workers
//! spawned are pinned to the high-priority lane. Priority is the worker's
//! lane, not the task's:
//!
//! - A high-lane worker only ever takes the first high-priority task in
//!   the queue. Finding none, it wakes another worker and idles for one
//!   sleep unit — it starves itself, not the system.
//! - A normal-lane worker scans for the first task whose user's running
//!   share does not exceed its admitted share, skipping users already
//!   found over-share in this scan. When every queued user is over-share
//!   it falls back to the queue head, which guarantees liveness.
//!
//! The delete pool reuses this loop with all-normal workers; fair-share
//! counters only exist for the push kind, so its selection degrades to
//! head-of-queue.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{info, warn};

use strata_core::error::TaskResult;
use strata_core::protocol::{
    FinishReport, Priority, PushRequest, PushType, TabletInfo, TaskKind, TaskPayload, TaskRequest,
};

use crate::context::AgentContext;
use crate::metrics;
use crate::queue::TaskQueue;
use crate::registry::{PushCounts, SignatureRegistry};
use crate::worker::{base_report, failure_report};

/// Additional process attempts after a transient internal ingest error.
pub const PUSH_MAX_RETRY: u32 = 1;

/// The lane a push worker is pinned to at spawn time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushLane {
    /// Serves any admissible task, preferring fair users.
    Normal,
    /// Serves only high-priority tasks, head-of-queue.
    High,
}

/// Runs one push-pool (or delete-pool) worker forever.
pub async fn run_push_worker(ctx: Arc<AgentContext>, queue: Arc<TaskQueue>, lane: PushLane) {
    let total_workers = ctx.config.push_worker_count();
    loop {
        let selected = queue
            .pop_selected(|tasks| select_push_index(lane, tasks, total_workers, &ctx.registry))
            .await;
        let Some(task) = selected else {
            // No high-priority task in the queue for this lane.
            tokio::time::sleep(ctx.config.retry_sleep()).await;
            continue;
        };

        info!(
            kind = task.kind.as_str(),
            signature = task.signature,
            user = task.accounting_user(),
            lane = ?lane,
            "got push task"
        );
        let report = execute_push(&ctx, &task).await;
        metrics::record_finished(task.kind, report.status);
        ctx.finish.finish(&report).await;
        ctx.registry
            .deregister(task.kind, task.signature, task.accounting_user());
    }
}

/// Picks the queue index this worker should take, or `None` when a
/// high-lane worker finds no high-priority task.
///
/// Runs under the queue lock. On selection the chosen task's user is
/// marked running (push kind only), so admission and selection stay
/// atomic with the queue removal.
pub(crate) fn select_push_index(
    lane: PushLane,
    tasks: &VecDeque<TaskRequest>,
    total_workers: usize,
    registry: &SignatureRegistry,
) -> Option<usize> {
    let mut improper_users: HashSet<&str> = HashSet::new();
    let mut selected = None;

    for (index, task) in tasks.iter().enumerate() {
        if lane == PushLane::High {
            if task.priority == Some(Priority::High) {
                selected = Some(index);
                break;
            }
            continue;
        }

        let user = task.accounting_user();
        if improper_users.contains(user) {
            continue;
        }

        let counts = if task.kind == TaskKind::Push {
            registry.push_counts(user)
        } else {
            PushCounts::default()
        };
        if is_admissible(counts, total_workers) {
            selected = Some(index);
            break;
        }
        improper_users.insert(user);
    }

    let index = match selected {
        Some(index) => index,
        None => {
            if lane == PushLane::High {
                return None;
            }
            // Every queued user is over its share; take the head so the
            // pool keeps draining.
            0
        }
    };

    let task = &tasks[index];
    if task.kind == TaskKind::Push {
        registry.mark_running(task.accounting_user());
    }
    Some(index)
}

/// Fair-share admission: a user with nothing running is always
/// admissible; otherwise its running share (including this task) must not
/// exceed its admitted share.
///
/// An empty pool total admits only through the nothing-running arm — the
/// share ratio is taken as zero rather than dividing by zero.
#[allow(clippy::cast_precision_loss)]
fn is_admissible(counts: PushCounts, total_workers: usize) -> bool {
    if counts.running == 0 {
        return true;
    }
    let share_admit = if counts.total == 0 {
        0.0
    } else {
        f64::from(counts.user_total) / f64::from(counts.total)
    };
    let share_run = f64::from(counts.running + 1) / total_workers as f64;
    share_run <= share_admit
}

async fn execute_push(ctx: &AgentContext, task: &TaskRequest) -> FinishReport {
    let TaskPayload::Push(request) = &task.payload else {
        let error =
            strata_core::error::TaskError::invalid_request("push worker got a non-push payload");
        return failure_report(base_report(ctx, task), &error);
    };

    let mut report = base_report(ctx, task);
    if request.push_type == PushType::Delete {
        report.request_version = Some(request.version);
        report.request_version_hash = Some(request.version_hash);
    }

    let outcome = match request.push_type {
        PushType::Load | PushType::LoadDelete => run_ingest(ctx, task.signature, request).await,
        PushType::Delete => ctx.engine.delete_data(request).await,
    };

    match outcome {
        Ok(tablet_infos) => {
            let version = ctx.report_version.bump();
            info!(signature = task.signature, "push success");
            report
                .with_report_version(version)
                .with_tablet_infos(tablet_infos)
                .with_message("push success")
        }
        Err(error) => {
            warn!(signature = task.signature, %error, "push failed");
            failure_report(report, &error).with_report_version(ctx.report_version.current())
        }
    }
}

/// Initializes the ingest pipeline and processes the push, retrying the
/// transient internal class up to [`PUSH_MAX_RETRY`] extra times.
async fn run_ingest(
    ctx: &AgentContext,
    signature: i64,
    request: &PushRequest,
) -> TaskResult<Vec<TabletInfo>> {
    ctx.ingest.init(request).await?;

    let mut retries = 0;
    loop {
        match ctx.ingest.process(request).await {
            Err(error) if error.is_internal() && retries < PUSH_MAX_RETRY => {
                warn!(signature, %error, "push internal error, retrying");
                retries += 1;
            }
            outcome => return outcome,
        }
    }
}
