//! Shared state handed to every worker.

use std::sync::Arc;

use strata_core::config::AgentConfig;
use strata_core::protocol::{BackendIdentity, CoordinatorHandle};
use strata_core::traits::{
    Coordinator, IngestPipeline, PeerAgent, RemoteFileService, StorageEngine, TransferTool,
};

use crate::finish::FinishProtocol;
use crate::registry::{ReportVersion, SignatureRegistry};
use crate::reporter::DiskBrokenSignal;

/// Everything a worker needs: the process-wide accounting, the finish
/// protocol, and read-only handles to the external collaborators.
///
/// Constructed once by the pool supervisor and shared by `Arc` with every
/// worker and reporter.
pub struct AgentContext {
    /// This backend's identity, stamped on every report.
    pub backend: BackendIdentity,
    /// Dispatcher configuration.
    pub config: Arc<AgentConfig>,
    /// Cross-pool signature and fair-share accounting.
    pub registry: Arc<SignatureRegistry>,
    /// Monotonic backend report version.
    pub report_version: Arc<ReportVersion>,
    /// Coordinator RPC client.
    pub coordinator: Arc<dyn Coordinator>,
    /// Finish protocol over the coordinator client.
    pub finish: FinishProtocol,
    /// Heartbeat-updated coordinator address and token.
    pub coordinator_handle: Arc<CoordinatorHandle>,
    /// Local storage engine.
    pub engine: Arc<dyn StorageEngine>,
    /// Agent RPC to peer backends (clone snapshots).
    pub peers: Arc<dyn PeerAgent>,
    /// Push ingest pipeline.
    pub ingest: Arc<dyn IngestPipeline>,
    /// HTTP tablet file service of peer backends.
    pub files: Arc<dyn RemoteFileService>,
    /// External upload/download tool.
    pub transfer: Arc<dyn TransferTool>,
    /// Disk-failure broadcast waking the reporter loops.
    pub disk_signal: Arc<DiskBrokenSignal>,
}

impl AgentContext {
    /// Assembles a context over the given collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: BackendIdentity,
        config: Arc<AgentConfig>,
        coordinator: Arc<dyn Coordinator>,
        coordinator_handle: Arc<CoordinatorHandle>,
        engine: Arc<dyn StorageEngine>,
        peers: Arc<dyn PeerAgent>,
        ingest: Arc<dyn IngestPipeline>,
        files: Arc<dyn RemoteFileService>,
        transfer: Arc<dyn TransferTool>,
    ) -> Self {
        let finish = FinishProtocol::new(Arc::clone(&coordinator), config.retry_sleep());
        Self {
            backend,
            config,
            registry: Arc::new(SignatureRegistry::new()),
            report_version: Arc::new(ReportVersion::new()),
            coordinator,
            finish,
            coordinator_handle,
            engine,
            peers,
            ingest,
            files,
            transfer,
            disk_signal: Arc::new(DiskBrokenSignal::new()),
        }
    }
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("backend", &self.backend)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
