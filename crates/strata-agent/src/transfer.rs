//! Upload and restore via the external transfer tool.
//!
//! Both kinds shell out to `sh {trans_file_tool} {label} {direction}
//! {local} {remote} {info_file} [file_list]`. The info file is a JSON
//! rendering of the request's remote-source properties, written under the
//! agent scratch directory and removed when the task concludes. Restore
//! additionally renames the downloaded tablet files to carry the restored
//! tablet id before loading the header.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use strata_core::error::{Error, Result, TaskError, TaskResult};
use strata_core::protocol::{
    FinishReport, RestoreRequest, StorageMedium, TabletId, TabletInfo, TaskRequest, UploadRequest,
};
use strata_core::traits::{TransferDirection, TransferSpec, TransferTool};

use crate::context::AgentContext;
use crate::worker::{base_report, failure_report};

/// Worker-unique sequence for transfer labels.
static NEXT_TRANSFER_ID: AtomicU64 = AtomicU64::new(1);

/// Executes one upload task and builds its finish report.
pub(crate) async fn execute_upload(
    ctx: &AgentContext,
    task: &TaskRequest,
    request: &UploadRequest,
) -> FinishReport {
    let label = transfer_label(None);
    let info_file = ctx.config.agent_tmp_dir.join(&label);
    info!(signature = task.signature, label = %label, "got upload task");

    let outcome = run_upload(ctx, request, &label, &info_file).await;
    remove_info_file(&info_file).await;

    match outcome {
        Ok(()) => base_report(ctx, task),
        Err(error) => {
            warn!(signature = task.signature, %error, "upload failed");
            failure_report(base_report(ctx, task), &error)
        }
    }
}

async fn run_upload(
    ctx: &AgentContext,
    request: &UploadRequest,
    label: &str,
    info_file: &Path,
) -> TaskResult<()> {
    write_info_file(info_file, &request.remote_source_properties).await?;

    let mut local_path = request.local_file_path.clone();
    if let Some(tablet_id) = request.tablet_id {
        local_path = format!("{local_path}/{tablet_id}");
    }

    let spec = TransferSpec {
        label: label.to_string(),
        direction: TransferDirection::Upload,
        local_path,
        remote_path: request.remote_file_path.clone(),
        info_file: info_file.to_path_buf(),
        file_list: Some("file_list".to_string()),
    };
    ctx.transfer
        .run(&spec)
        .await
        .map_err(|error| TaskError::io(format!("upload tool failed: {error}")))
}

/// Executes one restore task and builds its finish report.
pub(crate) async fn execute_restore(
    ctx: &AgentContext,
    task: &TaskRequest,
    request: &RestoreRequest,
) -> FinishReport {
    let label = transfer_label(Some(request.tablet_id));
    let info_file = ctx.config.agent_tmp_dir.join(&label);
    info!(signature = task.signature, label = %label, "got restore task");

    let outcome = run_restore(ctx, task.signature, request, &label, &info_file).await;
    remove_info_file(&info_file).await;

    match outcome {
        Ok(tablet_infos) => base_report(ctx, task).with_tablet_infos(tablet_infos),
        Err(error) => {
            warn!(signature = task.signature, %error, "restore failed");
            failure_report(base_report(ctx, task), &error)
        }
    }
}

async fn run_restore(
    ctx: &AgentContext,
    signature: i64,
    request: &RestoreRequest,
    label: &str,
    info_file: &Path,
) -> TaskResult<Vec<TabletInfo>> {
    write_info_file(info_file, &request.remote_source_properties).await?;

    let shard_root = ctx.engine.obtain_shard_path(StorageMedium::Hdd).await?;
    let local_dir = shard_root.join(request.tablet_id.to_string());

    let spec = TransferSpec {
        label: label.to_string(),
        direction: TransferDirection::Download,
        local_path: local_dir.display().to_string(),
        remote_path: request.remote_file_path.clone(),
        info_file: info_file.to_path_buf(),
        file_list: None,
    };
    ctx.transfer
        .run(&spec)
        .await
        .map_err(|error| TaskError::io(format!("restore tool failed: {error}")))?;

    rename_restored_files(&local_dir, request.tablet_id).await?;

    ctx.engine
        .load_tablet_header(&shard_root, request.tablet_id, request.schema_hash)
        .await?;

    match ctx
        .engine
        .tablet_info(request.tablet_id, request.schema_hash)
        .await
    {
        Ok(info) => Ok(vec![info]),
        Err(error) => {
            warn!(signature, %error, "restore done, but get tablet info failed");
            Ok(Vec::new())
        }
    }
}

/// Renames every downloaded `.hdr`/`.idx`/`.dat` file so its name starts
/// with the restored tablet id.
async fn rename_restored_files(dir: &Path, tablet_id: TabletId) -> TaskResult<()> {
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&current)
            .await
            .map_err(|e| TaskError::io(format!("read {} failed: {e}", current.display())))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TaskError::io(format!("read {} failed: {e}", current.display())))?
        {
            let path = entry.path();
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                stack.push(path);
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if let Some(new_name) = restored_file_name(name, tablet_id) {
                let new_path = path.with_file_name(&new_name);
                info!(from = name, to = %new_name, "renaming restored file");
                tokio::fs::rename(&path, &new_path).await.map_err(|e| {
                    TaskError::io(format!("rename {} failed: {e}", path.display()))
                })?;
            }
        }
    }
    Ok(())
}

/// New name for a restored tablet file, or `None` when the file keeps its
/// name.
///
/// The prefix before the last `_` (last `.` for header files) is replaced
/// with the restored tablet id.
fn restored_file_name(name: &str, tablet_id: TabletId) -> Option<String> {
    let suffix = [".hdr", ".idx", ".dat"]
        .into_iter()
        .find(|suffix| name.len() > suffix.len() && name.ends_with(suffix))?;
    let separator = if suffix == ".hdr" { '.' } else { '_' };
    let at = name.rfind(separator)?;
    Some(format!("{tablet_id}{}", &name[at..]))
}

fn transfer_label(tablet_id: Option<TabletId>) -> String {
    let worker_id = NEXT_TRANSFER_ID.fetch_add(1, Ordering::Relaxed);
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    match tablet_id {
        Some(tablet_id) => format!("{worker_id}_{epoch}_{tablet_id}"),
        None => format!("{worker_id}_{epoch}"),
    }
}

async fn write_info_file(
    info_file: &Path,
    properties: &std::collections::BTreeMap<String, String>,
) -> TaskResult<()> {
    let body = serde_json::to_vec(properties)
        .map_err(|e| TaskError::io(format!("serialize remote source info failed: {e}")))?;
    if let Some(parent) = info_file.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| TaskError::io(format!("create {} failed: {e}", parent.display())))?;
    }
    tokio::fs::write(info_file, body).await.map_err(|e| {
        TaskError::io(format!(
            "write remote source info to {} failed: {e}",
            info_file.display()
        ))
    })
}

async fn remove_info_file(info_file: &Path) {
    if let Err(error) = tokio::fs::remove_file(info_file).await {
        if error.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %info_file.display(), %error, "remove info file failed");
        }
    }
}

/// [`TransferTool`] that shells out to the configured script.
#[derive(Debug, Clone)]
pub struct ShellTransferTool {
    tool_path: PathBuf,
}

impl ShellTransferTool {
    /// Creates a tool wrapper for the given script path.
    #[must_use]
    pub fn new(tool_path: impl Into<PathBuf>) -> Self {
        Self {
            tool_path: tool_path.into(),
        }
    }
}

#[async_trait]
impl TransferTool for ShellTransferTool {
    async fn run(&self, spec: &TransferSpec) -> Result<()> {
        let mut command = tokio::process::Command::new("sh");
        command
            .arg(&self.tool_path)
            .arg(&spec.label)
            .arg(spec.direction.as_arg())
            .arg(&spec.local_path)
            .arg(&spec.remote_path)
            .arg(&spec.info_file);
        if let Some(file_list) = &spec.file_list {
            command.arg(file_list);
        }
        debug!(?command, "running transfer tool");

        let output = command
            .output()
            .await
            .map_err(|e| Error::io_with_source("spawn transfer tool failed".to_string(), e))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::transfer(format!(
                "transfer tool exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}
