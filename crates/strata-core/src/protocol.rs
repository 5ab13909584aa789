//! Wire-level types exchanged with the coordinator and between backends.
//!
//! Every administrative task arrives as a [`TaskRequest`] carrying a
//! coordinator-assigned signature that is unique within its [`TaskKind`].
//! Workers answer with exactly one [`FinishReport`]; the reporter loops
//! push [`ReportRequest`] snapshots on a timer.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Tablet identifier assigned by the coordinator.
pub type TabletId = i64;

/// Identifier for a physical schema version of a tablet.
pub type SchemaHash = i64;

/// Task classes dispatched by the coordinator, plus the internal-only
/// reporter kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    /// Create a new tablet.
    CreateTable,
    /// Drop an existing tablet.
    DropTable,
    /// Bulk push (load) into a tablet.
    Push,
    /// Bulk delete from a tablet.
    Delete,
    /// Rewrite a tablet under a new schema.
    SchemaChange,
    /// Produce an aggregated rollup tablet.
    Rollup,
    /// Build a local replica from a remote snapshot.
    Clone,
    /// Move a tablet between storage media.
    StorageMediumMigrate,
    /// Cancel a pending delete.
    CancelDeleteData,
    /// Verify a tablet checksum.
    CheckConsistency,
    /// Create a point-in-time snapshot.
    MakeSnapshot,
    /// Release a previously created snapshot.
    ReleaseSnapshot,
    /// Upload tablet files to a remote source.
    Upload,
    /// Restore tablet files from a remote source.
    Restore,
    /// Internal: periodic in-flight task report.
    ReportTask,
    /// Internal: periodic disk state report.
    ReportDiskState,
    /// Internal: periodic tablet list report.
    ReportTablet,
}

impl TaskKind {
    /// Stable lower-case name, used for logging and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateTable => "create_table",
            Self::DropTable => "drop_table",
            Self::Push => "push",
            Self::Delete => "delete",
            Self::SchemaChange => "schema_change",
            Self::Rollup => "rollup",
            Self::Clone => "clone",
            Self::StorageMediumMigrate => "storage_medium_migrate",
            Self::CancelDeleteData => "cancel_delete_data",
            Self::CheckConsistency => "check_consistency",
            Self::MakeSnapshot => "make_snapshot",
            Self::ReleaseSnapshot => "release_snapshot",
            Self::Upload => "upload",
            Self::Restore => "restore",
            Self::ReportTask => "report_task",
            Self::ReportDiskState => "report_disk_state",
            Self::ReportTablet => "report_tablet",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two-tier priority lane for push tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Default lane.
    Normal,
    /// Served by dedicated high-priority workers.
    High,
}

/// Push subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PushType {
    /// Ingest a prepared data file.
    Load,
    /// Ingest a prepared delete file.
    LoadDelete,
    /// Apply a delete condition directly.
    Delete,
}

/// Storage medium classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageMedium {
    /// Spinning disk.
    Hdd,
    /// Solid state.
    Ssd,
}

/// Progress of a previously requested alter (schema change or rollup).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlterStatus {
    /// No alter has started yet.
    Waiting,
    /// An alter is currently executing.
    Running,
    /// The last alter completed successfully.
    Done,
    /// The last alter failed; its output tablet may linger.
    Failed,
}

/// Network identity of a backend node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendIdentity {
    /// Hostname or address.
    pub host: String,
    /// RPC port.
    pub be_port: u16,
    /// HTTP file-service port.
    pub http_port: u16,
}

impl BackendIdentity {
    /// Creates a backend identity.
    #[must_use]
    pub fn new(host: impl Into<String>, be_port: u16, http_port: u16) -> Self {
        Self {
            host: host.into(),
            be_port,
            http_port,
        }
    }
}

/// Request payload for tablet creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTabletRequest {
    /// Tablet to create.
    pub tablet_id: TabletId,
    /// Schema hash of the new tablet.
    pub schema_hash: SchemaHash,
    /// Target storage medium.
    pub storage_medium: StorageMedium,
}

/// Request payload for tablet removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropTabletRequest {
    /// Tablet to drop.
    pub tablet_id: TabletId,
    /// Schema hash of the tablet to drop.
    pub schema_hash: SchemaHash,
}

/// Request payload for push (load and delete) tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Target tablet.
    pub tablet_id: TabletId,
    /// Schema hash of the target tablet.
    pub schema_hash: SchemaHash,
    /// Push subtype.
    pub push_type: PushType,
    /// Version this push produces.
    pub version: i64,
    /// Hash of the produced version.
    pub version_hash: i64,
    /// Remote location of the prepared file, for load subtypes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_file_path: Option<String>,
}

/// Request payload for schema change and rollup tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlterTabletRequest {
    /// Source tablet.
    pub base_tablet_id: TabletId,
    /// Schema hash of the source tablet.
    pub base_schema_hash: SchemaHash,
    /// Specification of the tablet the alter produces.
    pub new_tablet: CreateTabletRequest,
}

/// Request payload for clone tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneRequest {
    /// Tablet to replicate locally.
    pub tablet_id: TabletId,
    /// Schema hash of the replica.
    pub schema_hash: SchemaHash,
    /// Storage medium the replica should land on.
    pub storage_medium: StorageMedium,
    /// Candidate source backends, tried in order.
    pub src_backends: Vec<BackendIdentity>,
    /// Version the replica is expected to reach.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed_version: Option<i64>,
    /// Hash of the expected version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed_version_hash: Option<i64>,
}

/// Request payload for storage-medium migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrateRequest {
    /// Tablet to migrate.
    pub tablet_id: TabletId,
    /// Schema hash of the tablet.
    pub schema_hash: SchemaHash,
    /// Destination medium.
    pub storage_medium: StorageMedium,
}

/// Request payload for cancelling a pending delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelDeleteRequest {
    /// Tablet whose delete is cancelled.
    pub tablet_id: TabletId,
    /// Schema hash of the tablet.
    pub schema_hash: SchemaHash,
    /// Version of the delete to cancel.
    pub version: i64,
}

/// Request payload for a consistency check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConsistencyRequest {
    /// Tablet to verify.
    pub tablet_id: TabletId,
    /// Schema hash of the tablet.
    pub schema_hash: SchemaHash,
    /// Version to checksum.
    pub version: i64,
    /// Hash of the version to checksum.
    pub version_hash: i64,
}

/// Request payload for snapshot creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRequest {
    /// Tablet to snapshot.
    pub tablet_id: TabletId,
    /// Schema hash of the tablet.
    pub schema_hash: SchemaHash,
}

/// Request payload for snapshot release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSnapshotRequest {
    /// Snapshot path to release.
    pub snapshot_path: String,
}

/// Request payload for an upload task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Tablet whose files are uploaded, if scoped to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tablet_id: Option<TabletId>,
    /// Local directory to upload from.
    pub local_file_path: String,
    /// Remote destination.
    pub remote_file_path: String,
    /// Connection properties for the remote source.
    pub remote_source_properties: BTreeMap<String, String>,
}

/// Request payload for a restore task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRequest {
    /// Tablet being restored.
    pub tablet_id: TabletId,
    /// Schema hash of the restored tablet.
    pub schema_hash: SchemaHash,
    /// Remote location to download from.
    pub remote_file_path: String,
    /// Connection properties for the remote source.
    pub remote_source_properties: BTreeMap<String, String>,
}

/// Kind-specific payload of a task request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPayload {
    /// Create a tablet.
    CreateTablet(CreateTabletRequest),
    /// Drop a tablet.
    DropTablet(DropTabletRequest),
    /// Push (load or delete) into a tablet.
    Push(PushRequest),
    /// Schema change or rollup.
    Alter(AlterTabletRequest),
    /// Clone a tablet from a remote backend.
    Clone(CloneRequest),
    /// Migrate a tablet between storage media.
    Migrate(MigrateRequest),
    /// Cancel a pending delete.
    CancelDelete(CancelDeleteRequest),
    /// Checksum a tablet version.
    CheckConsistency(CheckConsistencyRequest),
    /// Create a snapshot.
    MakeSnapshot(SnapshotRequest),
    /// Release a snapshot.
    ReleaseSnapshot(ReleaseSnapshotRequest),
    /// Upload tablet files.
    Upload(UploadRequest),
    /// Restore tablet files.
    Restore(RestoreRequest),
}

/// A task submitted by the coordinator.
///
/// Immutable after submission. The `(kind, signature)` pair identifies the
/// task for de-duplication and acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Task class.
    pub kind: TaskKind,
    /// Coordinator-assigned identifier, unique within `kind`.
    pub signature: i64,
    /// Submitting user, when resource accounting applies (push).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Priority lane hint for push tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Kind-specific request record.
    pub payload: TaskPayload,
}

impl TaskRequest {
    /// Creates a task request without user or priority.
    #[must_use]
    pub const fn new(kind: TaskKind, signature: i64, payload: TaskPayload) -> Self {
        Self {
            kind,
            signature,
            user: None,
            priority: None,
            payload,
        }
    }

    /// Attaches the submitting user.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Attaches a priority lane hint.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// The accounting user, defaulting to the anonymous user.
    #[must_use]
    pub fn accounting_user(&self) -> &str {
        self.user.as_deref().unwrap_or("")
    }
}

/// Coordinator-visible task status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishStatus {
    /// The task succeeded.
    Ok,
    /// The request itself was invalid.
    AnalysisError,
    /// The task failed at runtime.
    RuntimeError,
}

/// Summary of a tablet reported back to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletInfo {
    /// Tablet identifier.
    pub tablet_id: TabletId,
    /// Schema hash.
    pub schema_hash: SchemaHash,
    /// Highest complete version.
    pub version: i64,
    /// Hash of the highest complete version.
    pub version_hash: i64,
    /// Row count.
    pub row_count: i64,
    /// On-disk size in bytes.
    pub data_size: i64,
}

/// Per-disk capacity and usage snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskStat {
    /// Data root path on this disk.
    pub root_path: String,
    /// Total capacity in bytes.
    pub disk_total_capacity: i64,
    /// Bytes used by tablet data.
    pub data_used_capacity: i64,
    /// Remaining capacity in bytes.
    pub disk_available_capacity: i64,
    /// Whether the disk is serving traffic.
    pub is_used: bool,
}

/// Terminal result of a task, acknowledged to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishReport {
    /// Reporting backend.
    pub backend: BackendIdentity,
    /// Task class.
    pub kind: TaskKind,
    /// Task signature.
    pub signature: i64,
    /// Terminal status.
    pub status: FinishStatus,
    /// Human-readable messages accompanying the status.
    pub error_msgs: Vec<String>,
    /// Backend report version at completion, for tablet-mutating kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_version: Option<u64>,
    /// Tablets produced or touched by the task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_tablet_infos: Option<Vec<TabletInfo>>,
    /// Snapshot path, for snapshot tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<String>,
    /// Computed checksum, for consistency checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tablet_checksum: Option<i64>,
    /// Echo of the request version, for delete and consistency tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_version: Option<i64>,
    /// Echo of the request version hash.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_version_hash: Option<i64>,
}

impl FinishReport {
    /// Creates a finish report with status `Ok` and no extras.
    #[must_use]
    pub const fn new(backend: BackendIdentity, kind: TaskKind, signature: i64) -> Self {
        Self {
            backend,
            kind,
            signature,
            status: FinishStatus::Ok,
            error_msgs: Vec::new(),
            report_version: None,
            finish_tablet_infos: None,
            snapshot_path: None,
            tablet_checksum: None,
            request_version: None,
            request_version_hash: None,
        }
    }

    /// Sets the terminal status.
    #[must_use]
    pub const fn with_status(mut self, status: FinishStatus) -> Self {
        self.status = status;
        self
    }

    /// Appends a human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_msgs.push(message.into());
        self
    }

    /// Stamps the backend report version.
    #[must_use]
    pub const fn with_report_version(mut self, version: u64) -> Self {
        self.report_version = Some(version);
        self
    }

    /// Attaches produced tablet infos.
    #[must_use]
    pub fn with_tablet_infos(mut self, infos: Vec<TabletInfo>) -> Self {
        self.finish_tablet_infos = Some(infos);
        self
    }
}

/// Outcome of a coordinator RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterResult {
    /// Status returned by the coordinator.
    pub status: FinishStatus,
}

/// Periodic report pushed to the coordinator.
///
/// The coordinator applies absorb-and-replace semantics per section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    /// Reporting backend.
    pub backend: BackendIdentity,
    /// In-flight task signatures per kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<BTreeMap<TaskKind, BTreeSet<i64>>>,
    /// Disk capacity snapshot keyed by root path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disks: Option<BTreeMap<String, DiskStat>>,
    /// Full tablet inventory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tablets: Option<Vec<TabletInfo>>,
    /// Report version accompanying a tablet inventory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_version: Option<u64>,
}

impl ReportRequest {
    /// Creates an empty report for the given backend.
    #[must_use]
    pub const fn new(backend: BackendIdentity) -> Self {
        Self {
            backend,
            tasks: None,
            disks: None,
            tablets: None,
            report_version: None,
        }
    }
}

/// Address and token of the coordinator, learned from heartbeats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorInfo {
    /// Coordinator hostname.
    pub host: String,
    /// Coordinator port; zero until the first heartbeat arrives.
    pub port: u16,
    /// Cluster token used to authorize file-service requests.
    pub token: String,
}

/// Shared, heartbeat-updated view of the coordinator.
///
/// Reporter loops gate on [`CoordinatorHandle::is_ready`]; the clone
/// orchestrator reads the token for download URLs.
#[derive(Debug, Default)]
pub struct CoordinatorHandle {
    info: RwLock<CoordinatorInfo>,
}

impl CoordinatorHandle {
    /// Creates a handle with no coordinator known yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a handle pre-populated with coordinator info.
    #[must_use]
    pub fn with_info(info: CoordinatorInfo) -> Self {
        Self {
            info: RwLock::new(info),
        }
    }

    /// Replaces the coordinator info (called on heartbeat).
    pub fn update(&self, info: CoordinatorInfo) {
        if let Ok(mut guard) = self.info.write() {
            *guard = info;
        }
    }

    /// Returns a copy of the current info.
    #[must_use]
    pub fn get(&self) -> CoordinatorInfo {
        self.info
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Whether a heartbeat has been received (`port != 0`).
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.info.read().map(|guard| guard.port != 0).unwrap_or(false)
    }
}
