//! The generic one-shot worker loop.
//!
//! Used by every pool except push/delete (which run the fair-share loop in
//! [`crate::push`]). Each iteration pops the queue head, executes the
//! kind-specific operation, acknowledges the result through the finish
//! protocol, and deregisters the signature. Execution runs on its own
//! runtime task so a panicking engine call is contained: the join error
//! becomes a `RUNTIME_ERROR` report and the loop never exits.

use std::sync::Arc;

use tokio::task::JoinError;
use tracing::{info, warn, Instrument};

use strata_core::error::TaskError;
use strata_core::observability::task_span;
use strata_core::protocol::{FinishReport, FinishStatus, TaskPayload, TaskRequest};

use crate::context::AgentContext;
use crate::metrics;
use crate::queue::TaskQueue;
use crate::{alter, clone, transfer};

/// Runs one generic worker forever.
pub async fn run_worker_loop(ctx: Arc<AgentContext>, queue: Arc<TaskQueue>) {
    loop {
        let task = queue.pop().await;
        let report = execute_guarded(&ctx, &task).await;
        metrics::record_finished(task.kind, report.status);
        ctx.finish.finish(&report).await;
        ctx.registry
            .deregister(task.kind, task.signature, task.accounting_user());
    }
}

/// Executes a task on its own runtime task, converting a died execution
/// (an engine panic, mostly) into a runtime-error report.
pub(crate) async fn execute_guarded(ctx: &Arc<AgentContext>, task: &TaskRequest) -> FinishReport {
    let span = task_span(task.kind.as_str(), task.signature);
    let execution = {
        let ctx = Arc::clone(ctx);
        let task = task.clone();
        tokio::spawn(async move { execute(&ctx, &task).await }.instrument(span))
    };

    match execution.await {
        Ok(report) => report,
        Err(join_error) => {
            let message = join_message(join_error);
            warn!(
                kind = task.kind.as_str(),
                signature = task.signature,
                message = %message,
                "task execution died"
            );
            base_report(ctx, task)
                .with_status(FinishStatus::RuntimeError)
                .with_message(format!("task execution died: {message}"))
        }
    }
}

async fn execute(ctx: &AgentContext, task: &TaskRequest) -> FinishReport {
    match &task.payload {
        TaskPayload::CreateTablet(request) => {
            match ctx.engine.create_tablet(request).await {
                Ok(()) => {
                    let version = ctx.report_version.bump();
                    info!(signature = task.signature, "create tablet success");
                    base_report(ctx, task).with_report_version(version)
                }
                Err(error) => {
                    warn!(signature = task.signature, %error, "create tablet failed");
                    failure_report(base_report(ctx, task), &error)
                        .with_report_version(ctx.report_version.current())
                }
            }
        }
        TaskPayload::DropTablet(request) => {
            match ctx
                .engine
                .drop_tablet(request.tablet_id, request.schema_hash)
                .await
            {
                Ok(()) => base_report(ctx, task),
                Err(error) => {
                    warn!(signature = task.signature, %error, "drop tablet failed");
                    failure_report(base_report(ctx, task), &error)
                }
            }
        }
        TaskPayload::Migrate(request) => match ctx.engine.storage_medium_migrate(request).await {
            Ok(()) => {
                info!(signature = task.signature, "storage medium migrate success");
                base_report(ctx, task)
            }
            Err(error) => {
                warn!(signature = task.signature, %error, "storage medium migrate failed");
                failure_report(base_report(ctx, task), &error)
            }
        },
        TaskPayload::CancelDelete(request) => match ctx.engine.cancel_delete(request).await {
            Ok(()) => {
                info!(signature = task.signature, "cancel delete data success");
                base_report(ctx, task)
            }
            Err(error) => {
                warn!(signature = task.signature, %error, "cancel delete data failed");
                failure_report(base_report(ctx, task), &error)
            }
        },
        TaskPayload::CheckConsistency(request) => {
            let mut report = base_report(ctx, task);
            report.request_version = Some(request.version);
            report.request_version_hash = Some(request.version_hash);
            match ctx.engine.compute_checksum(request).await {
                Ok(checksum) => {
                    info!(signature = task.signature, checksum, "check consistency success");
                    report.tablet_checksum = Some(i64::from(checksum));
                    report
                }
                Err(error) => {
                    warn!(signature = task.signature, %error, "check consistency failed");
                    failure_report(report, &error)
                }
            }
        }
        TaskPayload::MakeSnapshot(request) => match ctx.engine.make_snapshot(request).await {
            Ok(snapshot_path) => {
                info!(
                    signature = task.signature,
                    snapshot_path = %snapshot_path,
                    "make snapshot success"
                );
                let mut report = base_report(ctx, task);
                report.snapshot_path = Some(snapshot_path);
                report
            }
            Err(error) => {
                warn!(signature = task.signature, %error, "make snapshot failed");
                failure_report(base_report(ctx, task), &error)
            }
        },
        TaskPayload::ReleaseSnapshot(request) => {
            match ctx.engine.release_snapshot(&request.snapshot_path).await {
                Ok(()) => {
                    info!(
                        signature = task.signature,
                        snapshot_path = %request.snapshot_path,
                        "release snapshot success"
                    );
                    base_report(ctx, task)
                }
                Err(error) => {
                    warn!(signature = task.signature, %error, "release snapshot failed");
                    failure_report(base_report(ctx, task), &error)
                }
            }
        }
        TaskPayload::Upload(request) => transfer::execute_upload(ctx, task, request).await,
        TaskPayload::Restore(request) => transfer::execute_restore(ctx, task, request).await,
        TaskPayload::Clone(request) => clone::execute_clone(ctx, task, request).await,
        TaskPayload::Alter(request) => alter::execute_alter(ctx, task, request).await,
        TaskPayload::Push(_) => {
            let error = TaskError::invalid_request("push task routed to a generic worker");
            failure_report(base_report(ctx, task), &error)
        }
    }
}

/// A finish report skeleton for this task with status `Ok`.
pub(crate) fn base_report(ctx: &AgentContext, task: &TaskRequest) -> FinishReport {
    FinishReport::new(ctx.backend.clone(), task.kind, task.signature)
}

/// Applies a task error's status and message to a report.
pub(crate) fn failure_report(report: FinishReport, error: &TaskError) -> FinishReport {
    report
        .with_status(error.finish_status())
        .with_message(error.to_string())
}

fn join_message(error: JoinError) -> String {
    if error.is_panic() {
        let panic = error.into_panic();
        panic
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string())
    } else {
        error.to_string()
    }
}
