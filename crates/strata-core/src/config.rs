//! Agent configuration.
//!
//! Worker counts, reporter intervals, and download tuning for the
//! dispatcher. Values come from compiled defaults overridden by
//! `STRATA_AGENT_*` environment variables with strict validation; the
//! env source is injectable for tests.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::observability::LogFormat;

const ENV_PREFIX: &str = "STRATA_AGENT_";

/// Dispatcher configuration knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Workers in the create-tablet pool.
    pub create_table_worker_count: usize,
    /// Workers in the drop-tablet pool.
    pub drop_table_worker_count: usize,
    /// Normal-lane workers in the push pool.
    pub push_worker_count_normal_priority: usize,
    /// High-lane workers in the push pool.
    pub push_worker_count_high_priority: usize,
    /// Workers in the delete pool.
    pub delete_worker_count: usize,
    /// Workers in the alter (schema change / rollup) pool.
    pub alter_table_worker_count: usize,
    /// Workers in the clone pool.
    pub clone_worker_count: usize,
    /// Workers in the storage-medium-migrate pool.
    pub storage_medium_migrate_count: usize,
    /// Workers in the cancel-delete pool.
    pub cancel_delete_data_worker_count: usize,
    /// Workers in the consistency-check pool.
    pub check_consistency_worker_count: usize,
    /// Workers in the upload pool.
    pub upload_worker_count: usize,
    /// Workers in the restore pool.
    pub restore_worker_count: usize,
    /// Workers in the make-snapshot pool.
    pub make_snapshot_worker_count: usize,
    /// Workers in the release-snapshot pool.
    pub release_snapshot_worker_count: usize,
    /// Seconds between in-flight task reports.
    pub report_task_interval_seconds: u64,
    /// Seconds between disk state reports.
    pub report_disk_state_interval_seconds: u64,
    /// Seconds between tablet list reports.
    pub report_olap_table_interval_seconds: u64,
    /// Minimum acceptable download speed, for timeout estimation.
    pub download_low_speed_limit_kbps: u64,
    /// Floor of the per-file download timeout, in seconds.
    pub download_low_speed_time: u64,
    /// Base sleep unit for retry backoff, in seconds.
    ///
    /// Kept at 1 in production; tests set 0 to avoid real sleeps.
    pub sleep_one_second: u64,
    /// Scratch directory for transfer-tool info files.
    pub agent_tmp_dir: PathBuf,
    /// Path of the external transfer tool script.
    pub trans_file_tool_path: PathBuf,
    /// This backend's RPC port.
    pub be_port: u16,
    /// This backend's HTTP file-service port.
    pub webserver_port: u16,
    /// Log output format for
    /// [`init_node_logging`](crate::observability::init_node_logging).
    pub log_format: LogFormat,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            create_table_worker_count: 3,
            drop_table_worker_count: 3,
            push_worker_count_normal_priority: 3,
            push_worker_count_high_priority: 3,
            delete_worker_count: 3,
            alter_table_worker_count: 3,
            clone_worker_count: 3,
            storage_medium_migrate_count: 1,
            cancel_delete_data_worker_count: 1,
            check_consistency_worker_count: 1,
            upload_worker_count: 1,
            restore_worker_count: 3,
            make_snapshot_worker_count: 5,
            release_snapshot_worker_count: 5,
            report_task_interval_seconds: 10,
            report_disk_state_interval_seconds: 60,
            report_olap_table_interval_seconds: 60,
            download_low_speed_limit_kbps: 50,
            download_low_speed_time: 300,
            sleep_one_second: 1,
            agent_tmp_dir: PathBuf::from("/tmp/strata/agent"),
            trans_file_tool_path: PathBuf::from("/opt/strata/tools/trans_file_tool.sh"),
            be_port: 9060,
            webserver_port: 8040,
            log_format: LogFormat::default(),
        }
    }
}

impl AgentConfig {
    /// Loads configuration from process environment with strict
    /// validation.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when an environment value does not
    /// parse or violates its range.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads configuration with a custom environment source.
    ///
    /// Test-friendly entry point taking a key lookup function. Keys are
    /// the field names upper-cased with the `STRATA_AGENT_` prefix.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when an environment value does not
    /// parse or violates its range.
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            create_table_worker_count: count_env(
                &get_env,
                "CREATE_TABLE_WORKER_COUNT",
                defaults.create_table_worker_count,
            )?,
            drop_table_worker_count: count_env(
                &get_env,
                "DROP_TABLE_WORKER_COUNT",
                defaults.drop_table_worker_count,
            )?,
            push_worker_count_normal_priority: count_env(
                &get_env,
                "PUSH_WORKER_COUNT_NORMAL_PRIORITY",
                defaults.push_worker_count_normal_priority,
            )?,
            push_worker_count_high_priority: count_env(
                &get_env,
                "PUSH_WORKER_COUNT_HIGH_PRIORITY",
                defaults.push_worker_count_high_priority,
            )?,
            delete_worker_count: count_env(
                &get_env,
                "DELETE_WORKER_COUNT",
                defaults.delete_worker_count,
            )?,
            alter_table_worker_count: count_env(
                &get_env,
                "ALTER_TABLE_WORKER_COUNT",
                defaults.alter_table_worker_count,
            )?,
            clone_worker_count: count_env(
                &get_env,
                "CLONE_WORKER_COUNT",
                defaults.clone_worker_count,
            )?,
            storage_medium_migrate_count: count_env(
                &get_env,
                "STORAGE_MEDIUM_MIGRATE_COUNT",
                defaults.storage_medium_migrate_count,
            )?,
            cancel_delete_data_worker_count: count_env(
                &get_env,
                "CANCEL_DELETE_DATA_WORKER_COUNT",
                defaults.cancel_delete_data_worker_count,
            )?,
            check_consistency_worker_count: count_env(
                &get_env,
                "CHECK_CONSISTENCY_WORKER_COUNT",
                defaults.check_consistency_worker_count,
            )?,
            upload_worker_count: count_env(
                &get_env,
                "UPLOAD_WORKER_COUNT",
                defaults.upload_worker_count,
            )?,
            restore_worker_count: count_env(
                &get_env,
                "RESTORE_WORKER_COUNT",
                defaults.restore_worker_count,
            )?,
            make_snapshot_worker_count: count_env(
                &get_env,
                "MAKE_SNAPSHOT_WORKER_COUNT",
                defaults.make_snapshot_worker_count,
            )?,
            release_snapshot_worker_count: count_env(
                &get_env,
                "RELEASE_SNAPSHOT_WORKER_COUNT",
                defaults.release_snapshot_worker_count,
            )?,
            report_task_interval_seconds: positive_env(
                &get_env,
                "REPORT_TASK_INTERVAL_SECONDS",
                defaults.report_task_interval_seconds,
            )?,
            report_disk_state_interval_seconds: positive_env(
                &get_env,
                "REPORT_DISK_STATE_INTERVAL_SECONDS",
                defaults.report_disk_state_interval_seconds,
            )?,
            report_olap_table_interval_seconds: positive_env(
                &get_env,
                "REPORT_OLAP_TABLE_INTERVAL_SECONDS",
                defaults.report_olap_table_interval_seconds,
            )?,
            download_low_speed_limit_kbps: positive_env(
                &get_env,
                "DOWNLOAD_LOW_SPEED_LIMIT_KBPS",
                defaults.download_low_speed_limit_kbps,
            )?,
            download_low_speed_time: positive_env(
                &get_env,
                "DOWNLOAD_LOW_SPEED_TIME",
                defaults.download_low_speed_time,
            )?,
            sleep_one_second: u64_env(&get_env, "SLEEP_ONE_SECOND", defaults.sleep_one_second)?,
            agent_tmp_dir: path_env(&get_env, "AGENT_TMP_DIR", defaults.agent_tmp_dir),
            trans_file_tool_path: path_env(
                &get_env,
                "TRANS_FILE_TOOL_PATH",
                defaults.trans_file_tool_path,
            ),
            be_port: port_env(&get_env, "BE_PORT", defaults.be_port)?,
            webserver_port: port_env(&get_env, "WEBSERVER_PORT", defaults.webserver_port)?,
            log_format: log_format_env(&get_env, "LOG_FORMAT", defaults.log_format)?,
        })
    }

    /// Total size of the push pool (both lanes).
    #[must_use]
    pub const fn push_worker_count(&self) -> usize {
        self.push_worker_count_normal_priority + self.push_worker_count_high_priority
    }

    /// The retry sleep unit as a duration.
    #[must_use]
    pub const fn retry_sleep(&self) -> Duration {
        Duration::from_secs(self.sleep_one_second)
    }
}

fn u64_env<F>(get_env: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let full_key = format!("{ENV_PREFIX}{key}");
    let Some(raw) = get_env(&full_key) else {
        return Ok(default);
    };
    raw.parse::<u64>().map_err(|_| {
        Error::configuration(format!("{full_key} must be a non-negative integer, got '{raw}'"))
    })
}

fn positive_env<F>(get_env: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let parsed = u64_env(get_env, key, default)?;
    if parsed == 0 {
        return Err(Error::configuration(format!(
            "{ENV_PREFIX}{key} must be greater than zero"
        )));
    }
    Ok(parsed)
}

fn count_env<F>(get_env: &F, key: &str, default: usize) -> Result<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let parsed = u64_env(get_env, key, default as u64)?;
    usize::try_from(parsed).map_err(|_| {
        Error::configuration(format!("{ENV_PREFIX}{key} value {parsed} exceeds supported range"))
    })
}

fn port_env<F>(get_env: &F, key: &str, default: u16) -> Result<u16>
where
    F: Fn(&str) -> Option<String>,
{
    let parsed = u64_env(get_env, key, u64::from(default))?;
    u16::try_from(parsed).map_err(|_| {
        Error::configuration(format!("{ENV_PREFIX}{key} value {parsed} is not a valid port"))
    })
}

fn path_env<F>(get_env: &F, key: &str, default: PathBuf) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    get_env(&format!("{ENV_PREFIX}{key}")).map_or(default, PathBuf::from)
}

fn log_format_env<F>(get_env: &F, key: &str, default: LogFormat) -> Result<LogFormat>
where
    F: Fn(&str) -> Option<String>,
{
    get_env(&format!("{ENV_PREFIX}{key}")).map_or(Ok(default), |raw| raw.parse())
}
