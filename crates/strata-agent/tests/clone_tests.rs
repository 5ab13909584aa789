//! Clone orchestrator tests: download ordering, size verification,
//! multi-source fallback, and the stale-version drop.

mod support;

use std::sync::atomic::Ordering;

use strata_agent::supervisor::PoolSupervisor;
use strata_core::protocol::{
    BackendIdentity, CloneRequest, FinishStatus, StorageMedium, TabletInfo, TaskKind, TaskPayload,
    TaskRequest,
};

use support::{harness, wait_until, Harness};

const TABLET_ID: i64 = 10086;
const SCHEMA_HASH: i64 = 12345;

fn clone_task(signature: i64, sources: &[&str], committed: Option<(i64, i64)>) -> TaskRequest {
    TaskRequest::new(
        TaskKind::Clone,
        signature,
        TaskPayload::Clone(CloneRequest {
            tablet_id: TABLET_ID,
            schema_hash: SCHEMA_HASH,
            storage_medium: StorageMedium::Hdd,
            src_backends: sources
                .iter()
                .map(|host| BackendIdentity::new(*host, 9060, 8040))
                .collect(),
            committed_version: committed.map(|(version, _)| version),
            committed_version_hash: committed.map(|(_, hash)| hash),
        }),
    )
}

fn local_info(version: i64, version_hash: i64) -> TabletInfo {
    TabletInfo {
        tablet_id: TABLET_ID,
        schema_hash: SCHEMA_HASH,
        version,
        version_hash,
        row_count: 10,
        data_size: 1024,
    }
}

/// Standard happy-path wiring: one source with a three-file snapshot.
fn serve_snapshot(harness: &Harness, shard_root: &std::path::Path) {
    harness
        .engine
        .with_state(|state| state.shard_root = Some(shard_root.to_path_buf()));
    harness.peer.serve_snapshot("src1", "/snap/1");
    harness.files.serve(
        "data_0.dat\nheader.hdr\ndata_1.dat",
        vec![
            ("data_0.dat", b"0000".as_slice()),
            ("data_1.dat", b"11111".as_slice()),
            ("header.hdr", b"hh".as_slice()),
        ],
    );
}

#[tokio::test]
async fn header_file_downloads_last() {
    let harness = harness();
    let shard = tempfile::tempdir().expect("tempdir");
    serve_snapshot(&harness, shard.path());
    harness
        .engine
        .with_state(|state| state.tablet_info = Some(local_info(6, 9)));

    let supervisor = PoolSupervisor::new(harness.ctx.clone());
    supervisor.start();
    supervisor.submit(clone_task(1, &["src1"], None));
    wait_until(|| !harness.coordinator.finish_reports().is_empty()).await;

    assert_eq!(
        harness.files.downloaded_names(),
        vec!["data_0.dat", "data_1.dat", "header.hdr"]
    );

    let report = &harness.coordinator.finish_reports()[0];
    assert_eq!(report.status, FinishStatus::Ok);
    assert_eq!(
        report.finish_tablet_infos.as_deref(),
        Some(&[local_info(6, 9)][..])
    );
    // The header was loaded and the remote snapshot released.
    assert_eq!(
        harness.engine.with_state(|state| state.headers_loaded.clone()),
        vec![(TABLET_ID, SCHEMA_HASH)]
    );
    assert_eq!(
        harness.peer.released(),
        vec![("src1".to_string(), "/snap/1/".to_string())]
    );
    // Downloaded files landed in {shard}/{tablet}/{schema_hash}/.
    let local_dir = shard
        .path()
        .join(TABLET_ID.to_string())
        .join(SCHEMA_HASH.to_string());
    assert!(local_dir.join("header.hdr").exists());
}

#[tokio::test]
async fn size_mismatch_retries_then_fails_without_a_header() {
    let harness = harness();
    let shard = tempfile::tempdir().expect("tempdir");
    serve_snapshot(&harness, shard.path());
    // data_1.dat always arrives shorter than its reported length.
    harness
        .files
        .reported_sizes
        .lock()
        .unwrap()
        .insert("data_1.dat".to_string(), 999);

    let supervisor = PoolSupervisor::new(harness.ctx.clone());
    supervisor.start();
    supervisor.submit(clone_task(2, &["src1"], None));
    wait_until(|| !harness.coordinator.finish_reports().is_empty()).await;

    let report = &harness.coordinator.finish_reports()[0];
    assert_eq!(report.status, FinishStatus::RuntimeError);

    // Three attempts on the broken file, none on the header.
    let downloads = harness.files.downloaded_names();
    assert_eq!(
        downloads.iter().filter(|name| *name == "data_1.dat").count(),
        3
    );
    assert!(!downloads.contains(&"header.hdr".to_string()));

    // The partial local directory was cleaned up.
    let local_dir = shard
        .path()
        .join(TABLET_ID.to_string())
        .join(SCHEMA_HASH.to_string());
    assert!(!local_dir.exists());
}

#[tokio::test]
async fn listing_failures_are_retried() {
    let harness = harness();
    let shard = tempfile::tempdir().expect("tempdir");
    serve_snapshot(&harness, shard.path());
    harness
        .engine
        .with_state(|state| state.tablet_info = Some(local_info(6, 9)));
    harness
        .files
        .list_failures_remaining
        .store(2, Ordering::SeqCst);

    let supervisor = PoolSupervisor::new(harness.ctx.clone());
    supervisor.start();
    supervisor.submit(clone_task(3, &["src1"], None));
    wait_until(|| !harness.coordinator.finish_reports().is_empty()).await;

    assert_eq!(
        harness.coordinator.finish_reports()[0].status,
        FinishStatus::Ok
    );
}

#[tokio::test]
async fn falls_back_to_the_next_source_backend() {
    let harness = harness();
    let shard = tempfile::tempdir().expect("tempdir");
    serve_snapshot(&harness, shard.path());
    harness
        .engine
        .with_state(|state| state.tablet_info = Some(local_info(6, 9)));
    // src0 is not served by the peer fake, so its snapshot RPC fails.

    let supervisor = PoolSupervisor::new(harness.ctx.clone());
    supervisor.start();
    supervisor.submit(clone_task(4, &["src0", "src1"], None));
    wait_until(|| !harness.coordinator.finish_reports().is_empty()).await;

    let report = &harness.coordinator.finish_reports()[0];
    assert_eq!(report.status, FinishStatus::Ok);
    assert!(report
        .error_msgs
        .iter()
        .any(|message| message.contains("src0")));
}

#[tokio::test]
async fn existing_tablet_short_circuits_as_success() {
    let harness = harness();
    harness.engine.with_state(|state| {
        state.tablet_exists = true;
        state.tablet_info = Some(local_info(6, 9));
    });

    let supervisor = PoolSupervisor::new(harness.ctx.clone());
    supervisor.start();
    supervisor.submit(clone_task(5, &["src1"], None));
    wait_until(|| !harness.coordinator.finish_reports().is_empty()).await;

    let report = &harness.coordinator.finish_reports()[0];
    assert_eq!(report.status, FinishStatus::Ok);
    assert_eq!(
        report.finish_tablet_infos.as_deref(),
        Some(&[local_info(6, 9)][..])
    );
    // No copy was attempted.
    assert!(harness.files.downloaded_names().is_empty());
    assert!(harness.peer.released().is_empty());
}

#[tokio::test]
async fn stale_clone_is_dropped_and_reported_as_error() {
    let harness = harness();
    let shard = tempfile::tempdir().expect("tempdir");
    serve_snapshot(&harness, shard.path());
    // The copy lands at version 5 while the coordinator committed 6.
    harness
        .engine
        .with_state(|state| state.tablet_info = Some(local_info(5, 7)));

    let supervisor = PoolSupervisor::new(harness.ctx.clone());
    supervisor.start();
    supervisor.submit(clone_task(6, &["src1"], Some((6, 9))));
    wait_until(|| !harness.coordinator.finish_reports().is_empty()).await;

    let report = &harness.coordinator.finish_reports()[0];
    assert_eq!(report.status, FinishStatus::RuntimeError);
    assert_eq!(report.finish_tablet_infos, None);
    assert_eq!(
        harness.engine.with_state(|state| state.dropped.clone()),
        vec![(TABLET_ID, SCHEMA_HASH)]
    );
}
