//! Observability metrics for the dispatcher.
//!
//! Exposed through the `metrics` crate facade; the embedding process
//! decides on the exporter.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `strata_agent_tasks_submitted_total` | Counter | `kind` | Accepted task submissions |
//! | `strata_agent_tasks_duplicate_total` | Counter | `kind` | Submissions dropped by signature dedup |
//! | `strata_agent_tasks_finished_total` | Counter | `kind`, `status` | Finish reports built |
//! | `strata_agent_finish_rpc_attempts_total` | Counter | - | finishTask RPC attempts |
//! | `strata_agent_finish_dropped_total` | Counter | - | Finish results dropped after max retries |
//! | `strata_agent_reports_total` | Counter | `which`, `status` | Periodic report outcomes |

use metrics::counter;

use strata_core::protocol::{FinishStatus, TaskKind};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: accepted task submissions.
    pub const TASKS_SUBMITTED_TOTAL: &str = "strata_agent_tasks_submitted_total";
    /// Counter: submissions dropped by signature dedup.
    pub const TASKS_DUPLICATE_TOTAL: &str = "strata_agent_tasks_duplicate_total";
    /// Counter: finish reports built, by kind and status.
    pub const TASKS_FINISHED_TOTAL: &str = "strata_agent_tasks_finished_total";
    /// Counter: finishTask RPC attempts.
    pub const FINISH_RPC_ATTEMPTS_TOTAL: &str = "strata_agent_finish_rpc_attempts_total";
    /// Counter: finish results dropped after max retries.
    pub const FINISH_DROPPED_TOTAL: &str = "strata_agent_finish_dropped_total";
    /// Counter: periodic report outcomes, by reporter and status.
    pub const REPORTS_TOTAL: &str = "strata_agent_reports_total";
}

/// Records an accepted submission.
pub fn record_submitted(kind: TaskKind) {
    counter!(names::TASKS_SUBMITTED_TOTAL, "kind" => kind.as_str()).increment(1);
}

/// Records a submission dropped by de-duplication.
pub fn record_duplicate(kind: TaskKind) {
    counter!(names::TASKS_DUPLICATE_TOTAL, "kind" => kind.as_str()).increment(1);
}

/// Records a completed task execution.
pub fn record_finished(kind: TaskKind, status: FinishStatus) {
    let status = match status {
        FinishStatus::Ok => "ok",
        FinishStatus::AnalysisError => "analysis_error",
        FinishStatus::RuntimeError => "runtime_error",
    };
    counter!(names::TASKS_FINISHED_TOTAL, "kind" => kind.as_str(), "status" => status)
        .increment(1);
}

/// Records one finishTask RPC attempt.
pub fn record_finish_attempt() {
    counter!(names::FINISH_RPC_ATTEMPTS_TOTAL).increment(1);
}

/// Records a finish result dropped after exhausting retries.
pub fn record_finish_dropped() {
    counter!(names::FINISH_DROPPED_TOTAL).increment(1);
}

/// Records a periodic report outcome.
pub fn record_report(which: &'static str, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    counter!(names::REPORTS_TOTAL, "which" => which, "status" => status).increment(1);
}
