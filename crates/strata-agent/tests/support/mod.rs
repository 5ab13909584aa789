//! Shared fakes for dispatcher integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use strata_agent::context::AgentContext;
use strata_core::config::AgentConfig;
use strata_core::error::{Error, Result, TaskError, TaskResult};
use strata_core::protocol::{
    AlterStatus, AlterTabletRequest, BackendIdentity, CancelDeleteRequest,
    CheckConsistencyRequest, CoordinatorHandle, CoordinatorInfo, CreateTabletRequest, DiskStat,
    FinishReport, FinishStatus, MasterResult, MigrateRequest, PushRequest, ReportRequest,
    SchemaHash, SnapshotRequest, StorageMedium, TabletId, TabletInfo,
};
use strata_core::traits::{
    Coordinator, IngestPipeline, PeerAgent, RemoteFileService, StorageEngine, TransferSpec,
    TransferTool,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Polls a condition until it holds or the timeout elapses.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within timeout"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Coordinator fake recording every RPC; finish calls can be scripted to
/// fail first.
#[derive(Default)]
pub struct FakeCoordinator {
    pub finish_reports: Mutex<Vec<FinishReport>>,
    pub report_requests: Mutex<Vec<ReportRequest>>,
    pub finish_failures_remaining: AtomicU32,
    pub finish_calls: AtomicU32,
}

impl FakeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_finishes(&self, count: u32) {
        self.finish_failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn finish_reports(&self) -> Vec<FinishReport> {
        lock(&self.finish_reports).clone()
    }

    pub fn report_requests(&self) -> Vec<ReportRequest> {
        lock(&self.report_requests).clone()
    }
}

#[async_trait]
impl Coordinator for FakeCoordinator {
    async fn finish_task(&self, report: &FinishReport) -> Result<MasterResult> {
        self.finish_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.finish_failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.finish_failures_remaining
                .store(remaining - 1, Ordering::SeqCst);
            return Err(Error::rpc("injected finish failure"));
        }
        lock(&self.finish_reports).push(report.clone());
        Ok(MasterResult {
            status: FinishStatus::Ok,
        })
    }

    async fn report(&self, request: &ReportRequest) -> Result<MasterResult> {
        lock(&self.report_requests).push(request.clone());
        Ok(MasterResult {
            status: FinishStatus::Ok,
        })
    }
}

/// Scriptable storage engine fake recording every mutation.
pub struct FakeEngineState {
    pub fail_create: bool,
    pub panic_create: bool,
    pub created: Vec<CreateTabletRequest>,
    pub fail_drop: bool,
    pub dropped: Vec<(TabletId, SchemaHash)>,
    pub alter_status: AlterStatus,
    pub fail_schema_change: bool,
    pub schema_changes: u32,
    pub rollups: u32,
    pub delete_data_infos: Vec<TabletInfo>,
    pub deleted: Vec<PushRequest>,
    pub cancelled: Vec<CancelDeleteRequest>,
    pub migrated: Vec<MigrateRequest>,
    pub checksum: u32,
    pub snapshot_path: Option<String>,
    pub released_snapshots: Vec<String>,
    pub shard_root: Option<PathBuf>,
    pub headers_loaded: Vec<(TabletId, SchemaHash)>,
    pub tablet_exists: bool,
    pub tablet_info: Option<TabletInfo>,
    pub tablets: Vec<TabletInfo>,
    pub fail_report_all: bool,
    pub disks: BTreeMap<String, DiskStat>,
}

impl Default for FakeEngineState {
    fn default() -> Self {
        Self {
            fail_create: false,
            panic_create: false,
            created: Vec::new(),
            fail_drop: false,
            dropped: Vec::new(),
            alter_status: AlterStatus::Waiting,
            fail_schema_change: false,
            schema_changes: 0,
            rollups: 0,
            delete_data_infos: Vec::new(),
            deleted: Vec::new(),
            cancelled: Vec::new(),
            migrated: Vec::new(),
            checksum: 0,
            snapshot_path: None,
            released_snapshots: Vec::new(),
            shard_root: None,
            headers_loaded: Vec::new(),
            tablet_exists: false,
            tablet_info: None,
            tablets: Vec::new(),
            fail_report_all: false,
            disks: BTreeMap::new(),
        }
    }
}

#[derive(Default)]
pub struct FakeEngine {
    pub state: Mutex<FakeEngineState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state<R>(&self, apply: impl FnOnce(&mut FakeEngineState) -> R) -> R {
        apply(&mut lock(&self.state))
    }
}

#[async_trait]
impl StorageEngine for FakeEngine {
    async fn create_tablet(&self, request: &CreateTabletRequest) -> TaskResult<()> {
        let mut state = lock(&self.state);
        assert!(!state.panic_create, "injected create panic");
        if state.fail_create {
            return Err(TaskError::engine("injected create failure"));
        }
        state.created.push(request.clone());
        Ok(())
    }

    async fn drop_tablet(&self, tablet_id: TabletId, schema_hash: SchemaHash) -> TaskResult<()> {
        let mut state = lock(&self.state);
        if state.fail_drop {
            return Err(TaskError::engine("injected drop failure"));
        }
        state.dropped.push((tablet_id, schema_hash));
        Ok(())
    }

    async fn schema_change(&self, _request: &AlterTabletRequest) -> TaskResult<()> {
        let mut state = lock(&self.state);
        if state.fail_schema_change {
            return Err(TaskError::engine("injected schema change failure"));
        }
        state.schema_changes += 1;
        Ok(())
    }

    async fn create_rollup(&self, _request: &AlterTabletRequest) -> TaskResult<()> {
        lock(&self.state).rollups += 1;
        Ok(())
    }

    async fn show_alter_status(
        &self,
        _tablet_id: TabletId,
        _schema_hash: SchemaHash,
    ) -> TaskResult<AlterStatus> {
        Ok(lock(&self.state).alter_status)
    }

    async fn delete_data(&self, request: &PushRequest) -> TaskResult<Vec<TabletInfo>> {
        let mut state = lock(&self.state);
        state.deleted.push(request.clone());
        Ok(state.delete_data_infos.clone())
    }

    async fn cancel_delete(&self, request: &CancelDeleteRequest) -> TaskResult<()> {
        lock(&self.state).cancelled.push(request.clone());
        Ok(())
    }

    async fn compute_checksum(&self, _request: &CheckConsistencyRequest) -> TaskResult<u32> {
        Ok(lock(&self.state).checksum)
    }

    async fn storage_medium_migrate(&self, request: &MigrateRequest) -> TaskResult<()> {
        lock(&self.state).migrated.push(request.clone());
        Ok(())
    }

    async fn make_snapshot(&self, _request: &SnapshotRequest) -> TaskResult<String> {
        lock(&self.state)
            .snapshot_path
            .clone()
            .ok_or_else(|| TaskError::engine("injected snapshot failure"))
    }

    async fn release_snapshot(&self, snapshot_path: &str) -> TaskResult<()> {
        lock(&self.state)
            .released_snapshots
            .push(snapshot_path.to_string());
        Ok(())
    }

    async fn obtain_shard_path(&self, _medium: StorageMedium) -> TaskResult<PathBuf> {
        lock(&self.state)
            .shard_root
            .clone()
            .ok_or_else(|| TaskError::engine("no shard path configured"))
    }

    async fn load_tablet_header(
        &self,
        _shard_root: &Path,
        tablet_id: TabletId,
        schema_hash: SchemaHash,
    ) -> TaskResult<()> {
        lock(&self.state).headers_loaded.push((tablet_id, schema_hash));
        Ok(())
    }

    async fn tablet_exists(&self, _tablet_id: TabletId, _schema_hash: SchemaHash) -> bool {
        lock(&self.state).tablet_exists
    }

    async fn tablet_info(
        &self,
        tablet_id: TabletId,
        schema_hash: SchemaHash,
    ) -> TaskResult<TabletInfo> {
        lock(&self.state)
            .tablet_info
            .clone()
            .ok_or_else(|| TaskError::engine(format!("no info for tablet {tablet_id}/{schema_hash}")))
    }

    async fn report_all_tablets(&self) -> TaskResult<Vec<TabletInfo>> {
        let state = lock(&self.state);
        if state.fail_report_all {
            return Err(TaskError::engine("injected tablet enumeration failure"));
        }
        Ok(state.tablets.clone())
    }

    async fn disk_stats(&self) -> TaskResult<BTreeMap<String, DiskStat>> {
        Ok(lock(&self.state).disks.clone())
    }
}

/// Peer fake: snapshot paths scripted per host, releases recorded.
#[derive(Default)]
pub struct FakePeer {
    /// host -> snapshot path; hosts absent from the map fail the RPC,
    /// `None` means "snapshot ok but no path returned".
    pub snapshot_paths: Mutex<HashMap<String, Option<String>>>,
    pub released: Mutex<Vec<(String, String)>>,
}

impl FakePeer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve_snapshot(&self, host: &str, path: &str) {
        lock(&self.snapshot_paths).insert(host.to_string(), Some(path.to_string()));
    }

    pub fn released(&self) -> Vec<(String, String)> {
        lock(&self.released).clone()
    }
}

#[async_trait]
impl PeerAgent for FakePeer {
    async fn make_remote_snapshot(
        &self,
        backend: &BackendIdentity,
        _request: &SnapshotRequest,
    ) -> Result<Option<String>> {
        lock(&self.snapshot_paths)
            .get(&backend.host)
            .cloned()
            .ok_or_else(|| Error::rpc(format!("peer {} unreachable", backend.host)))
    }

    async fn release_remote_snapshot(
        &self,
        backend: &BackendIdentity,
        snapshot_path: &str,
    ) -> Result<()> {
        lock(&self.released).push((backend.host.clone(), snapshot_path.to_string()));
        Ok(())
    }
}

/// Ingest fake: scripted init error and a queue of process errors served
/// before success.
#[derive(Default)]
pub struct FakeIngest {
    pub init_error: Mutex<Option<TaskError>>,
    pub process_errors: Mutex<VecDeque<TaskError>>,
    pub tablet_infos: Mutex<Vec<TabletInfo>>,
    pub process_calls: AtomicU32,
}

impl FakeIngest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_process_with(&self, errors: Vec<TaskError>) {
        *lock(&self.process_errors) = errors.into();
    }
}

#[async_trait]
impl IngestPipeline for FakeIngest {
    async fn init(&self, _request: &PushRequest) -> TaskResult<()> {
        match lock(&self.init_error).clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn process(&self, _request: &PushRequest) -> TaskResult<Vec<TabletInfo>> {
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = lock(&self.process_errors).pop_front() {
            return Err(error);
        }
        Ok(lock(&self.tablet_infos).clone())
    }
}

/// Remote file service fake backed by in-memory file bodies.
#[derive(Default)]
pub struct FakeFileService {
    pub listing: Mutex<String>,
    /// file name -> body.
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    /// file name -> reported length override (for size-mismatch tests).
    pub reported_sizes: Mutex<HashMap<String, u64>>,
    /// URLs downloaded, in order.
    pub downloaded: Mutex<Vec<String>>,
    pub list_failures_remaining: AtomicU32,
}

impl FakeFileService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, listing: &str, files: Vec<(&str, &[u8])>) {
        *lock(&self.listing) = listing.to_string();
        let mut map = lock(&self.files);
        for (name, body) in files {
            map.insert(name.to_string(), body.to_vec());
        }
    }

    pub fn downloaded_names(&self) -> Vec<String> {
        lock(&self.downloaded)
            .iter()
            .map(|url| file_name_of(url))
            .collect()
    }

    fn body_for(&self, url: &str) -> Result<Vec<u8>> {
        let name = file_name_of(url);
        lock(&self.files)
            .get(&name)
            .cloned()
            .ok_or_else(|| Error::http(format!("no such remote file: {name}")))
    }
}

fn file_name_of(url: &str) -> String {
    url.rsplit('/').next().unwrap_or_default().to_string()
}

#[async_trait]
impl RemoteFileService for FakeFileService {
    async fn list_dir(&self, _url: &str) -> Result<String> {
        let remaining = self.list_failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.list_failures_remaining
                .store(remaining - 1, Ordering::SeqCst);
            return Err(Error::http("injected listing failure"));
        }
        Ok(lock(&self.listing).clone())
    }

    async fn content_length(&self, url: &str) -> Result<u64> {
        let name = file_name_of(url);
        if let Some(size) = lock(&self.reported_sizes).get(&name) {
            return Ok(*size);
        }
        self.body_for(url).map(|body| body.len() as u64)
    }

    async fn download(&self, url: &str, local_path: &Path, _timeout: Duration) -> Result<u64> {
        let body = self.body_for(url)?;
        tokio::fs::write(local_path, &body)
            .await
            .map_err(|e| Error::io_with_source("write download".to_string(), e))?;
        lock(&self.downloaded).push(url.to_string());
        Ok(body.len() as u64)
    }
}

/// Transfer tool fake recording specs; downloads materialize scripted
/// files under the local path.
#[derive(Default)]
pub struct FakeTransferTool {
    pub specs: Mutex<Vec<TransferSpec>>,
    pub fail: Mutex<bool>,
    /// (relative path, body) created under `local_path` on download runs.
    pub download_files: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakeTransferTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn specs(&self) -> Vec<TransferSpec> {
        lock(&self.specs).clone()
    }
}

#[async_trait]
impl TransferTool for FakeTransferTool {
    async fn run(&self, spec: &TransferSpec) -> Result<()> {
        lock(&self.specs).push(spec.clone());
        if *lock(&self.fail) {
            return Err(Error::transfer("injected tool failure"));
        }
        if spec.direction == strata_core::traits::TransferDirection::Download {
            let root = PathBuf::from(&spec.local_path);
            tokio::fs::create_dir_all(&root)
                .await
                .map_err(|e| Error::io_with_source("create download dir".to_string(), e))?;
            let download_files = lock(&self.download_files).clone();
            for (relative, body) in download_files {
                let path = root.join(relative);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| Error::io_with_source("create parent".to_string(), e))?;
                }
                tokio::fs::write(&path, body)
                    .await
                    .map_err(|e| Error::io_with_source("write fake file".to_string(), e))?;
            }
        }
        Ok(())
    }
}

/// Everything an integration test needs, with fast-retry config.
pub struct Harness {
    pub ctx: Arc<AgentContext>,
    pub coordinator: Arc<FakeCoordinator>,
    pub engine: Arc<FakeEngine>,
    pub peer: Arc<FakePeer>,
    pub ingest: Arc<FakeIngest>,
    pub files: Arc<FakeFileService>,
    pub transfer: Arc<FakeTransferTool>,
}

pub fn test_config() -> AgentConfig {
    AgentConfig {
        sleep_one_second: 0,
        report_task_interval_seconds: 1,
        report_disk_state_interval_seconds: 1,
        report_olap_table_interval_seconds: 1,
        ..AgentConfig::default()
    }
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: AgentConfig) -> Harness {
    let coordinator = Arc::new(FakeCoordinator::new());
    let engine = Arc::new(FakeEngine::new());
    let peer = Arc::new(FakePeer::new());
    let ingest = Arc::new(FakeIngest::new());
    let files = Arc::new(FakeFileService::new());
    let transfer = Arc::new(FakeTransferTool::new());

    let handle = Arc::new(CoordinatorHandle::with_info(CoordinatorInfo {
        host: "coordinator-1".to_string(),
        port: 9020,
        token: "cluster-token".to_string(),
    }));

    let ctx = Arc::new(AgentContext::new(
        BackendIdentity::new("backend-1", 9060, 8040),
        Arc::new(config),
        Arc::clone(&coordinator) as Arc<dyn Coordinator>,
        handle,
        Arc::clone(&engine) as Arc<dyn StorageEngine>,
        Arc::clone(&peer) as Arc<dyn PeerAgent>,
        Arc::clone(&ingest) as Arc<dyn IngestPipeline>,
        Arc::clone(&files) as Arc<dyn RemoteFileService>,
        Arc::clone(&transfer) as Arc<dyn TransferTool>,
    ));

    Harness {
        ctx,
        coordinator,
        engine,
        peer,
        ingest,
        files,
        transfer,
    }
}
