//! Seams to the node's external collaborators.
//!
//! The dispatcher core never talks to the storage engine, the coordinator,
//! peer backends, or the ingest pipeline directly; it goes through these
//! traits so tests can substitute fakes and so the transports can evolve
//! independently.
//!
//! All implementations must be safe for concurrent calls from every
//! worker.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, TaskResult};
use crate::protocol::{
    AlterStatus, AlterTabletRequest, BackendIdentity, CancelDeleteRequest,
    CheckConsistencyRequest, CreateTabletRequest, DiskStat, FinishReport, MasterResult,
    MigrateRequest, PushRequest, ReportRequest, SchemaHash, SnapshotRequest, StorageMedium,
    TabletId, TabletInfo,
};

/// Client side of the coordinator control plane.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Acknowledges a task's terminal result.
    ///
    /// Idempotent on `(kind, signature)` on the coordinator side.
    ///
    /// # Errors
    ///
    /// Returns an error when the RPC fails at the transport level.
    async fn finish_task(&self, report: &FinishReport) -> Result<MasterResult>;

    /// Pushes a periodic report (tasks, disks, or tablets).
    ///
    /// # Errors
    ///
    /// Returns an error when the RPC fails at the transport level.
    async fn report(&self, request: &ReportRequest) -> Result<MasterResult>;
}

/// Local storage engine operations consumed by the dispatcher.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Creates a tablet.
    async fn create_tablet(&self, request: &CreateTabletRequest) -> TaskResult<()>;

    /// Drops a tablet.
    async fn drop_tablet(&self, tablet_id: TabletId, schema_hash: SchemaHash) -> TaskResult<()>;

    /// Rewrites a tablet under a new schema.
    async fn schema_change(&self, request: &AlterTabletRequest) -> TaskResult<()>;

    /// Produces an aggregated rollup tablet.
    async fn create_rollup(&self, request: &AlterTabletRequest) -> TaskResult<()>;

    /// Reports the progress of the last alter on a tablet.
    async fn show_alter_status(
        &self,
        tablet_id: TabletId,
        schema_hash: SchemaHash,
    ) -> TaskResult<AlterStatus>;

    /// Applies a delete condition, returning the touched tablets.
    async fn delete_data(&self, request: &PushRequest) -> TaskResult<Vec<TabletInfo>>;

    /// Cancels a pending delete.
    async fn cancel_delete(&self, request: &CancelDeleteRequest) -> TaskResult<()>;

    /// Computes the checksum of a tablet version.
    async fn compute_checksum(&self, request: &CheckConsistencyRequest) -> TaskResult<u32>;

    /// Moves a tablet to another storage medium.
    async fn storage_medium_migrate(&self, request: &MigrateRequest) -> TaskResult<()>;

    /// Creates a snapshot, returning its path.
    async fn make_snapshot(&self, request: &SnapshotRequest) -> TaskResult<String>;

    /// Releases a snapshot by path.
    async fn release_snapshot(&self, snapshot_path: &str) -> TaskResult<()>;

    /// Picks a shard root path on the requested medium.
    async fn obtain_shard_path(&self, medium: StorageMedium) -> TaskResult<PathBuf>;

    /// Loads a tablet header from disk, registering the tablet.
    async fn load_tablet_header(
        &self,
        shard_root: &Path,
        tablet_id: TabletId,
        schema_hash: SchemaHash,
    ) -> TaskResult<()>;

    /// Whether the tablet is already registered locally.
    async fn tablet_exists(&self, tablet_id: TabletId, schema_hash: SchemaHash) -> bool;

    /// Fetches the reportable info of a single tablet.
    async fn tablet_info(
        &self,
        tablet_id: TabletId,
        schema_hash: SchemaHash,
    ) -> TaskResult<TabletInfo>;

    /// Enumerates every local tablet for the periodic report.
    async fn report_all_tablets(&self) -> TaskResult<Vec<TabletInfo>>;

    /// Gathers per-disk capacity and usage, keyed by root path.
    async fn disk_stats(&self) -> TaskResult<BTreeMap<String, DiskStat>>;
}

/// Agent-to-agent RPC against a peer backend, used by clone.
#[async_trait]
pub trait PeerAgent: Send + Sync {
    /// Asks the peer to snapshot a tablet; returns the snapshot path when
    /// the peer produced one.
    ///
    /// # Errors
    ///
    /// Returns an error when the RPC fails or the peer refuses.
    async fn make_remote_snapshot(
        &self,
        backend: &BackendIdentity,
        request: &SnapshotRequest,
    ) -> Result<Option<String>>;

    /// Asks the peer to release a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error when the RPC fails; callers treat this as
    /// best-effort.
    async fn release_remote_snapshot(
        &self,
        backend: &BackendIdentity,
        snapshot_path: &str,
    ) -> Result<()>;
}

/// The push ingest pipeline: fetches a remote file and applies it to a
/// tablet version.
#[async_trait]
pub trait IngestPipeline: Send + Sync {
    /// Validates the request and prepares the working directory.
    async fn init(&self, request: &PushRequest) -> TaskResult<()>;

    /// Runs the ingest, returning the touched tablets.
    ///
    /// An [`Engine`](crate::error::TaskError::Engine) failure is the
    /// transient-internal class the push worker retries once.
    async fn process(&self, request: &PushRequest) -> TaskResult<Vec<TabletInfo>>;
}

/// HTTP tablet file service of a peer backend.
///
/// A directory URL (ending with `/`) lists its files newline-separated;
/// a file URL streams the body; length is served via `HEAD`.
#[async_trait]
pub trait RemoteFileService: Send + Sync {
    /// Lists a remote directory, returning the raw newline-separated body.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    async fn list_dir(&self, url: &str) -> Result<String>;

    /// Returns the content length of a remote file.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a missing length header.
    async fn content_length(&self, url: &str) -> Result<u64>;

    /// Downloads a remote file to `local_path`, returning the byte count.
    ///
    /// The whole transfer must complete within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, timeout, or local I/O
    /// failure.
    async fn download(&self, url: &str, local_path: &Path, timeout: Duration) -> Result<u64>;
}

/// Direction of a shell transfer-tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Local files to remote source.
    Upload,
    /// Remote source to local files.
    Download,
}

impl TransferDirection {
    /// The command-line word the tool expects.
    #[must_use]
    pub const fn as_arg(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
        }
    }
}

/// One invocation of the external transfer tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSpec {
    /// Job label, also used to name the info file.
    pub label: String,
    /// Upload or download.
    pub direction: TransferDirection,
    /// Local directory.
    pub local_path: String,
    /// Remote location.
    pub remote_path: String,
    /// Path of the JSON info file describing the remote source.
    pub info_file: PathBuf,
    /// Optional trailing file-list argument (uploads only).
    pub file_list: Option<String>,
}

/// Shell-out seam for the upload/restore side-channel.
#[async_trait]
pub trait TransferTool: Send + Sync {
    /// Runs the tool once for the given spec.
    ///
    /// # Errors
    ///
    /// Returns an error carrying the tool's stderr when it exits
    /// unsuccessfully.
    async fn run(&self, spec: &TransferSpec) -> Result<()>;
}
