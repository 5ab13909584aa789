//! Bounded-retry acknowledgement of task results to the coordinator.
//!
//! Finish is best-effort: after the configured attempts the result is
//! dropped and the coordinator is expected to reissue the task.
//! Correctness relies on coordinator-side idempotency keyed by
//! `(kind, signature)`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use strata_core::protocol::FinishReport;
use strata_core::traits::Coordinator;

use crate::metrics;

/// Maximum finishTask attempts per report.
pub const TASK_FINISH_MAX_RETRY: u32 = 3;

/// Reports terminal task results to the coordinator with bounded retry.
#[derive(Clone)]
pub struct FinishProtocol {
    coordinator: Arc<dyn Coordinator>,
    retry_sleep: Duration,
}

impl std::fmt::Debug for FinishProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinishProtocol")
            .field("retry_sleep", &self.retry_sleep)
            .finish_non_exhaustive()
    }
}

impl FinishProtocol {
    /// Creates a finish protocol over the given coordinator client.
    #[must_use]
    pub fn new(coordinator: Arc<dyn Coordinator>, retry_sleep: Duration) -> Self {
        Self {
            coordinator,
            retry_sleep,
        }
    }

    /// Sends one finish report, retrying up to
    /// [`TASK_FINISH_MAX_RETRY`] times.
    ///
    /// Returns whether the coordinator acknowledged the report. Callers
    /// deregister the task either way.
    pub async fn finish(&self, report: &FinishReport) -> bool {
        for attempt in 1..=TASK_FINISH_MAX_RETRY {
            metrics::record_finish_attempt();
            match self.coordinator.finish_task(report).await {
                Ok(result) => {
                    info!(
                        kind = report.kind.as_str(),
                        signature = report.signature,
                        status = ?result.status,
                        "finish task success"
                    );
                    return true;
                }
                Err(error) => {
                    warn!(
                        kind = report.kind.as_str(),
                        signature = report.signature,
                        attempt,
                        %error,
                        "finish task failed"
                    );
                }
            }
            tokio::time::sleep(self.retry_sleep).await;
        }

        metrics::record_finish_dropped();
        warn!(
            kind = report.kind.as_str(),
            signature = report.signature,
            "finish task dropped after max retries, coordinator will reissue"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use strata_core::error::{Error, Result};
    use strata_core::protocol::{
        BackendIdentity, FinishStatus, MasterResult, ReportRequest, TaskKind,
    };

    /// Coordinator that fails the first `fail_times` finish calls.
    struct FlakyCoordinator {
        fail_times: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Coordinator for FlakyCoordinator {
        async fn finish_task(&self, _report: &FinishReport) -> Result<MasterResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                Err(Error::rpc("connection reset"))
            } else {
                Ok(MasterResult {
                    status: FinishStatus::Ok,
                })
            }
        }

        async fn report(&self, _request: &ReportRequest) -> Result<MasterResult> {
            Ok(MasterResult {
                status: FinishStatus::Ok,
            })
        }
    }

    fn report() -> FinishReport {
        FinishReport::new(
            BackendIdentity::new("backend-1", 9060, 8040),
            TaskKind::DropTable,
            3,
        )
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let coordinator = Arc::new(FlakyCoordinator {
            fail_times: 2,
            calls: AtomicU32::new(0),
        });
        let protocol = FinishProtocol::new(Arc::clone(&coordinator) as _, Duration::ZERO);

        assert!(protocol.finish(&report()).await);
        assert_eq!(coordinator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn drops_after_max_attempts() {
        let coordinator = Arc::new(FlakyCoordinator {
            fail_times: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let protocol = FinishProtocol::new(Arc::clone(&coordinator) as _, Duration::ZERO);

        assert!(!protocol.finish(&report()).await);
        assert_eq!(
            coordinator.calls.load(Ordering::SeqCst),
            TASK_FINISH_MAX_RETRY
        );
    }
}
