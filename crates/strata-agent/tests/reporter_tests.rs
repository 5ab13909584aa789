//! Reporter loop tests: the in-flight task snapshot, the coordinator
//! heartbeat gate, and the disk-broken wakeup.

mod support;

use std::collections::BTreeMap;
use std::time::Duration;

use strata_agent::reporter::{run_disk_reporter, run_task_reporter, run_tablet_reporter};
use strata_core::protocol::{CoordinatorInfo, DiskStat, TabletInfo, TaskKind};

use support::{harness, harness_with, test_config, wait_until};

fn disk_stats() -> BTreeMap<String, DiskStat> {
    BTreeMap::from([(
        "/data1".to_string(),
        DiskStat {
            root_path: "/data1".to_string(),
            disk_total_capacity: 1_000_000,
            data_used_capacity: 250_000,
            disk_available_capacity: 750_000,
            is_used: true,
        },
    )])
}

#[tokio::test]
async fn task_reporter_sends_the_inflight_snapshot() {
    let harness = harness();
    harness.ctx.registry.try_register(TaskKind::Clone, 77, "");

    let reporter = tokio::spawn(run_task_reporter(harness.ctx.clone()));
    wait_until(|| {
        harness
            .coordinator
            .report_requests()
            .iter()
            .any(|request| {
                request
                    .tasks
                    .as_ref()
                    .is_some_and(|tasks| tasks.get(&TaskKind::Clone).is_some_and(|s| s.contains(&77)))
            })
    })
    .await;
    reporter.abort();
}

#[tokio::test]
async fn disk_reporter_waits_for_the_first_heartbeat() {
    let harness = harness();
    harness.engine.with_state(|state| state.disks = disk_stats());
    // No heartbeat yet.
    harness.ctx.coordinator_handle.update(CoordinatorInfo::default());

    let reporter = tokio::spawn(run_disk_reporter(harness.ctx.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness
        .coordinator
        .report_requests()
        .iter()
        .all(|request| request.disks.is_none()));

    // Heartbeat arrives; the next cycle reports.
    harness.ctx.coordinator_handle.update(CoordinatorInfo {
        host: "coordinator-1".to_string(),
        port: 9020,
        token: "cluster-token".to_string(),
    });
    wait_until(|| {
        harness
            .coordinator
            .report_requests()
            .iter()
            .any(|request| request.disks.as_ref().is_some_and(|disks| disks.contains_key("/data1")))
    })
    .await;
    reporter.abort();
}

#[tokio::test]
async fn disk_broken_signal_triggers_an_immediate_report() {
    // A long interval: only the broadcast can explain a second report.
    let mut config = test_config();
    config.report_disk_state_interval_seconds = 3600;
    let harness = harness_with(config);
    harness.engine.with_state(|state| state.disks = disk_stats());

    let reporter = tokio::spawn(run_disk_reporter(harness.ctx.clone()));
    wait_until(|| !harness.coordinator.report_requests().is_empty()).await;

    harness.ctx.disk_signal.notify();
    wait_until(|| {
        harness
            .coordinator
            .report_requests()
            .iter()
            .filter(|request| request.disks.is_some())
            .count()
            >= 2
    })
    .await;
    wait_until(|| harness.ctx.disk_signal.disk_report_already()).await;
    reporter.abort();
}

#[tokio::test]
async fn tablet_reporter_carries_the_report_version_and_skips_on_failure() {
    let harness = harness();
    harness.engine.with_state(|state| {
        state.fail_report_all = true;
        state.tablets = vec![TabletInfo {
            tablet_id: 1,
            schema_hash: 2,
            version: 3,
            version_hash: 4,
            row_count: 5,
            data_size: 6,
        }];
    });

    let reporter = tokio::spawn(run_tablet_reporter(harness.ctx.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness
        .coordinator
        .report_requests()
        .iter()
        .all(|request| request.tablets.is_none()));

    harness.engine.with_state(|state| state.fail_report_all = false);
    let version_floor = harness.ctx.report_version.current();
    wait_until(|| {
        harness.coordinator.report_requests().iter().any(|request| {
            request.tablets.as_ref().is_some_and(|tablets| !tablets.is_empty())
                && request.report_version.is_some_and(|version| version >= version_floor)
        })
    })
    .await;
    reporter.abort();
}
