//! The alter orchestrator: schema change and rollup.
//!
//! Before invoking the engine, the last alter's status is checked: a
//! FAILED predecessor left a half-built output tablet that must be
//! dropped first, and a drop failure aborts the attempt (the subsequent
//! create would fail on the leftover anyway). A RUNNING predecessor is
//! left alone and the task reports success against it.

use tracing::{info, warn};

use strata_core::error::{TaskError, TaskResult};
use strata_core::protocol::{AlterStatus, AlterTabletRequest, FinishReport, TaskKind, TaskRequest};

use crate::context::AgentContext;
use crate::worker::{base_report, failure_report};

/// Executes one schema-change or rollup task and builds its finish
/// report.
pub(crate) async fn execute_alter(
    ctx: &AgentContext,
    task: &TaskRequest,
    request: &AlterTabletRequest,
) -> FinishReport {
    let signature = task.signature;
    let process_name = match task.kind {
        TaskKind::SchemaChange => "schema change",
        TaskKind::Rollup => "rollup",
        _ => {
            warn!(
                kind = task.kind.as_str(),
                signature, "alter task kind invalid"
            );
            let error = TaskError::invalid_request(format!(
                "alter task kind invalid: {}",
                task.kind.as_str()
            ));
            return failure_report(base_report(ctx, task), &error)
                .with_report_version(ctx.report_version.current());
        }
    };

    let outcome = run_alter(ctx, task.kind, signature, request, process_name).await;

    let mut report =
        base_report(ctx, task).with_report_version(ctx.report_version.current());
    match outcome {
        Ok(()) => {
            // Partial success is tolerated: the alter went through even
            // when the info lookup for the new tablet did not.
            match ctx
                .engine
                .tablet_info(
                    request.new_tablet.tablet_id,
                    request.new_tablet.schema_hash,
                )
                .await
            {
                Ok(info) => {
                    report = report.with_tablet_infos(vec![info]);
                }
                Err(error) => {
                    warn!(
                        signature,
                        tablet_id = request.new_tablet.tablet_id,
                        %error,
                        "{process_name} done, but get new tablet info failed"
                    );
                }
            }
            info!(signature, "{process_name} success");
            report.with_message(format!("{process_name} success"))
        }
        Err(error) => {
            warn!(signature, %error, "{process_name} failed");
            failure_report(report, &error).with_message(format!("{process_name} failed"))
        }
    }
}

async fn run_alter(
    ctx: &AgentContext,
    kind: TaskKind,
    signature: i64,
    request: &AlterTabletRequest,
    process_name: &str,
) -> TaskResult<()> {
    let status = ctx
        .engine
        .show_alter_status(request.base_tablet_id, request.base_schema_hash)
        .await?;
    info!(signature, ?status, "got alter status");

    if status == AlterStatus::Failed {
        ctx.engine
            .drop_tablet(
                request.new_tablet.tablet_id,
                request.new_tablet.schema_hash,
            )
            .await
            .map_err(|error| {
                warn!(signature, %error, "delete failed alter output failed");
                TaskError::engine(format!(
                    "delete failed {process_name} output failed: {error}"
                ))
            })?;
    }

    if matches!(
        status,
        AlterStatus::Done | AlterStatus::Failed | AlterStatus::Waiting
    ) {
        match kind {
            TaskKind::SchemaChange => ctx.engine.schema_change(request).await?,
            TaskKind::Rollup => ctx.engine.create_rollup(request).await?,
            _ => unreachable!("caller validated the alter kind"),
        }
    }

    ctx.report_version.bump();
    info!(signature, "{process_name} finished");
    Ok(())
}
