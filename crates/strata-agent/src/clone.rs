//! The clone orchestrator: build a local tablet replica from a remote
//! snapshot.
//!
//! Sources are tried in order until one yields a complete copy. Per
//! source: snapshot the remote tablet, list the snapshot directory over
//! HTTP, download every file with length verification, release the
//! remote snapshot, and load the local header. Header files (`.hdr`)
//! download last — their presence marks the copy complete, so a partial
//! download must never leave one behind.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use strata_core::error::{TaskError, TaskResult};
use strata_core::protocol::{
    BackendIdentity, CloneRequest, FinishReport, SnapshotRequest, TaskRequest,
};

use crate::context::AgentContext;
use crate::download::tablet_download_url;
use crate::worker::{base_report, failure_report};

/// Maximum attempts per remote fetch (listing, length probe, download).
pub const DOWNLOAD_FILE_MAX_RETRY: u32 = 3;

/// Executes one clone task end to end and builds its finish report.
pub(crate) async fn execute_clone(
    ctx: &AgentContext,
    task: &TaskRequest,
    request: &CloneRequest,
) -> FinishReport {
    let signature = task.signature;
    let mut error_msgs: Vec<String> = Vec::new();

    let pre_existing = ctx
        .engine
        .tablet_exists(request.tablet_id, request.schema_hash)
        .await;

    let mut shard_root: Option<PathBuf> = None;
    let mut outcome: TaskResult<()> = if pre_existing {
        info!(
            tablet_id = request.tablet_id,
            schema_hash = request.schema_hash,
            signature,
            "clone tablet already exists"
        );
        error_msgs.push("clone tablet already exists".to_string());
        Err(TaskError::TabletExists {
            tablet_id: request.tablet_id,
            schema_hash: request.schema_hash,
        })
    } else {
        match ctx.engine.obtain_shard_path(request.storage_medium).await {
            Ok(root) => {
                shard_root = Some(root);
                Ok(())
            }
            Err(error) => {
                warn!(signature, %error, "clone get local shard path failed");
                error_msgs.push("clone get local shard path failed".to_string());
                Err(error)
            }
        }
    };

    if outcome.is_ok() {
        if let Some(root) = &shard_root {
            outcome = clone_copy(ctx, request, signature, root, &mut error_msgs).await;
            if outcome.is_ok() {
                if let Err(error) = ctx
                    .engine
                    .load_tablet_header(root, request.tablet_id, request.schema_hash)
                    .await
                {
                    warn!(signature, %error, "load tablet header failed");
                    error_msgs.push("load tablet header failed".to_string());
                    outcome = Err(error);
                }
            }
        }
    }

    // A failed copy must not leave a partial directory behind; the
    // engine will also garbage-collect, so failures here are ignored.
    let failed = matches!(&outcome, Err(error) if !matches!(error, TaskError::TabletExists { .. }));
    if failed {
        if let Some(root) = &shard_root {
            let local_dir = tablet_dir(root, request);
            info!(
                signature,
                dir = %local_dir.display(),
                "clone failed, removing local dir"
            );
            if let Err(error) = tokio::fs::remove_dir_all(&local_dir).await {
                debug!(signature, %error, "clone cleanup failed, leaving dir for gc");
            }
        }
    }

    let mut tablet_infos = Vec::new();
    if !failed {
        match ctx
            .engine
            .tablet_info(request.tablet_id, request.schema_hash)
            .await
        {
            Ok(info) => {
                if is_stale(&info, request) {
                    info!(
                        signature,
                        version = info.version,
                        version_hash = info.version_hash,
                        committed_version = request.committed_version,
                        "cloned tablet is behind the committed version, dropping it"
                    );
                    if let Err(error) = ctx
                        .engine
                        .drop_tablet(request.tablet_id, request.schema_hash)
                        .await
                    {
                        warn!(signature, %error, "drop stale cloned tablet failed");
                    }
                    error_msgs.push("cloned tablet is stale and was dropped".to_string());
                    outcome = Err(TaskError::engine(
                        "cloned tablet version behind committed version",
                    ));
                } else {
                    tablet_infos.push(info);
                }
            }
            Err(error) => {
                warn!(signature, %error, "clone done, but get tablet info failed");
                error_msgs.push("clone done, but get tablet info failed".to_string());
                outcome = Err(error);
            }
        }
    }

    let mut report = match outcome {
        Ok(()) | Err(TaskError::TabletExists { .. }) => {
            info!(signature, "clone success");
            base_report(ctx, task).with_tablet_infos(tablet_infos)
        }
        Err(error) => {
            warn!(signature, %error, "clone failed");
            failure_report(base_report(ctx, task), &error)
        }
    };
    for message in error_msgs {
        report = report.with_message(message);
    }
    report
}

/// Copies the tablet from the first source backend that works.
async fn clone_copy(
    ctx: &AgentContext,
    request: &CloneRequest,
    signature: i64,
    shard_root: &Path,
    error_msgs: &mut Vec<String>,
) -> TaskResult<()> {
    let token = ctx.coordinator_handle.get().token;
    let mut last_error = TaskError::peer("clone request carries no source backends");

    for src in &request.src_backends {
        match clone_from_source(ctx, request, signature, shard_root, &token, src).await {
            Ok(()) => {
                info!(signature, src = %src.host, "clone copy done");
                return Ok(());
            }
            Err(error) => {
                warn!(signature, src = %src.host, %error, "clone from source failed");
                error_msgs.push(format!("clone from {} failed: {error}", src.host));
                last_error = error;
            }
        }
    }
    Err(last_error)
}

async fn clone_from_source(
    ctx: &AgentContext,
    request: &CloneRequest,
    signature: i64,
    shard_root: &Path,
    token: &str,
    src: &BackendIdentity,
) -> TaskResult<()> {
    let snapshot_request = SnapshotRequest {
        tablet_id: request.tablet_id,
        schema_hash: request.schema_hash,
    };
    let snapshot_path = ctx
        .peers
        .make_remote_snapshot(src, &snapshot_request)
        .await
        .map_err(|e| TaskError::peer(format!("make snapshot on {} failed: {e}", src.host)))?
        .ok_or_else(|| TaskError::peer("make snapshot succeeded but returned no path"))?;
    let snapshot_path = ensure_trailing_slash(snapshot_path);
    info!(signature, src = %src.host, snapshot_path = %snapshot_path, "made remote snapshot");

    let copied = copy_snapshot_files(ctx, request, signature, shard_root, token, src, &snapshot_path)
        .await;

    // The remote engine drops unreleased snapshots on its own schedule.
    if let Err(error) = ctx.peers.release_remote_snapshot(src, &snapshot_path).await {
        warn!(signature, src = %src.host, %error, "release remote snapshot failed");
    }

    copied
}

#[allow(clippy::too_many_arguments)]
async fn copy_snapshot_files(
    ctx: &AgentContext,
    request: &CloneRequest,
    signature: i64,
    shard_root: &Path,
    token: &str,
    src: &BackendIdentity,
    snapshot_path: &str,
) -> TaskResult<()> {
    let local_dir = tablet_dir(shard_root, request);
    if tokio::fs::try_exists(&local_dir).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(&local_dir)
            .await
            .map_err(|e| TaskError::io(format!("clear {} failed: {e}", local_dir.display())))?;
    }
    tokio::fs::create_dir_all(&local_dir)
        .await
        .map_err(|e| TaskError::io(format!("create {} failed: {e}", local_dir.display())))?;

    let remote_dir = format!(
        "{snapshot_path}{}/{}/",
        request.tablet_id, request.schema_hash
    );
    let listing_url = tablet_download_url(src, token, &remote_dir);
    let listing = retry_fetch(ctx, signature, "list remote dir", || {
        ctx.files.list_dir(&listing_url)
    })
    .await?;

    for file_name in order_for_download(&listing) {
        let file_url = tablet_download_url(src, token, &format!("{remote_dir}{file_name}"));
        let local_path = local_dir.join(&file_name);
        download_one(ctx, signature, &file_url, &local_path).await?;
    }
    Ok(())
}

/// Fetches one file: probe its length, derive the transfer timeout from
/// the low-speed floor, then download and verify the local size.
async fn download_one(
    ctx: &AgentContext,
    signature: i64,
    url: &str,
    local_path: &Path,
) -> TaskResult<()> {
    let file_size = retry_fetch(ctx, signature, "get file length", || {
        ctx.files.content_length(url)
    })
    .await?;

    let estimate_secs =
        (file_size / ctx.config.download_low_speed_limit_kbps / 1024).max(ctx.config.download_low_speed_time);
    let timeout = Duration::from_secs(estimate_secs);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match ctx.files.download(url, local_path, timeout).await {
            Ok(written) if written == file_size => {
                restrict_permissions(local_path).await;
                return Ok(());
            }
            Ok(written) => {
                warn!(
                    signature,
                    url,
                    remote_size = file_size,
                    local_size = written,
                    "downloaded file length mismatch"
                );
            }
            Err(error) => {
                warn!(signature, url, attempt, %error, "download file failed");
            }
        }
        if attempt >= DOWNLOAD_FILE_MAX_RETRY {
            return Err(TaskError::download(format!(
                "download {url} failed after {attempt} attempts"
            )));
        }
        tokio::time::sleep(Duration::from_secs(
            u64::from(attempt) * ctx.config.sleep_one_second,
        ))
        .await;
    }
}

/// Retries a remote fetch with an increasing sleep between attempts.
async fn retry_fetch<T, F, Fut>(
    ctx: &AgentContext,
    signature: i64,
    what: &str,
    mut fetch: F,
) -> TaskResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = strata_core::error::Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match fetch().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                warn!(signature, what, attempt, %error, "clone remote fetch failed");
                if attempt >= DOWNLOAD_FILE_MAX_RETRY {
                    return Err(TaskError::download(format!(
                        "{what} failed after {attempt} attempts: {error}"
                    )));
                }
                tokio::time::sleep(Duration::from_secs(
                    u64::from(attempt) * ctx.config.sleep_one_second,
                ))
                .await;
            }
        }
    }
}

/// Splits a newline-separated listing into download order: every
/// non-header file first (listing order preserved), `.hdr` files last.
///
/// The header's presence signals a complete copy to the engine, so it
/// must be the final file written.
fn order_for_download(listing: &str) -> Vec<String> {
    let mut files = Vec::new();
    let mut headers = Vec::new();
    for name in listing.split('\n') {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if name.ends_with(".hdr") {
            headers.push(name.to_string());
        } else {
            files.push(name.to_string());
        }
    }
    files.append(&mut headers);
    files
}

fn tablet_dir(shard_root: &Path, request: &CloneRequest) -> PathBuf {
    shard_root
        .join(request.tablet_id.to_string())
        .join(request.schema_hash.to_string())
}

fn ensure_trailing_slash(mut path: String) -> String {
    if !path.ends_with('/') {
        path.push('/');
    }
    path
}

fn is_stale(info: &strata_core::protocol::TabletInfo, request: &CloneRequest) -> bool {
    let (Some(version), Some(version_hash)) =
        (request.committed_version, request.committed_version_hash)
    else {
        return false;
    };
    info.version < version || (info.version == version && info.version_hash != version_hash)
}

async fn restrict_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(error) =
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
        {
            debug!(path = %path.display(), %error, "chmod downloaded file failed");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}
