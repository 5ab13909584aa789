//! Process-wide signature registry and report version.
//!
//! The registry is the cross-pool accounting singleton: one in-flight
//! signature set per task kind for de-duplication, plus the per-user
//! admission and running counters that feed the push pool's fair-share
//! scheduler.
//!
//! ## Locking
//!
//! All admission state lives under one mutex. The running counters have
//! their own inner lock so the push selection scan can read shares while
//! holding the registry lock briefly and bump `running` without
//! re-acquiring it. Both locks nest inside the pool queue lock; the
//! reverse order never occurs.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use strata_core::protocol::TaskKind;

/// Push-pool share counters for one user, read by the fair-share scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushCounts {
    /// Tasks of this user currently executing.
    pub running: u32,
    /// Tasks of this user admitted and not yet finished.
    pub user_total: u32,
    /// All push tasks admitted and not yet finished.
    pub total: u32,
}

#[derive(Debug, Default)]
struct AdmissionState {
    /// In-flight signatures per kind; membership gates duplicate
    /// submissions.
    inflight: HashMap<TaskKind, HashSet<i64>>,
    /// Admitted-and-unfinished push tasks per user.
    push_total_by_user: HashMap<String, u32>,
    /// Admitted-and-unfinished push tasks overall.
    push_total: u32,
}

/// Process-wide set of in-flight task signatures plus push fair-share
/// counters.
///
/// Owned by the pool supervisor and shared by reference with every pool.
#[derive(Debug, Default)]
pub struct SignatureRegistry {
    admission: Mutex<AdmissionState>,
    /// Executing push tasks per user; separate lock, see module docs.
    push_running_by_user: Mutex<HashMap<String, u32>>,
}

impl SignatureRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task signature.
    ///
    /// Returns false (and changes nothing) when the signature is already
    /// in flight for this kind. For the push kind, admission also bumps
    /// the user's total and the overall total.
    pub fn try_register(&self, kind: TaskKind, signature: i64, user: &str) -> bool {
        let mut state = lock(&self.admission);
        let signatures = state.inflight.entry(kind).or_default();
        if !signatures.insert(signature) {
            info!(
                kind = kind.as_str(),
                signature,
                inflight = signatures.len(),
                "task signature already exists, dropping submission"
            );
            return false;
        }
        debug!(
            kind = kind.as_str(),
            signature,
            inflight = signatures.len(),
            "task signature registered"
        );

        if kind == TaskKind::Push {
            *state.push_total_by_user.entry(user.to_string()).or_default() += 1;
            state.push_total += 1;
        }
        true
    }

    /// Removes a task signature after its finish report was sent.
    ///
    /// For the push kind this also unwinds the user's total, the overall
    /// total, and the running count the scheduler bumped at selection
    /// time.
    pub fn deregister(&self, kind: TaskKind, signature: i64, user: &str) {
        let mut state = lock(&self.admission);
        if let Some(signatures) = state.inflight.get_mut(&kind) {
            signatures.remove(&signature);
            debug!(
                kind = kind.as_str(),
                signature,
                inflight = signatures.len(),
                "task signature erased"
            );
        }

        if kind == TaskKind::Push {
            decrement(&mut state.push_total_by_user, user);
            state.push_total = state.push_total.saturating_sub(1);
            drop(state);

            let mut running = lock(&self.push_running_by_user);
            decrement(&mut running, user);
        }
    }

    /// Marks one push task of `user` as executing.
    ///
    /// Called by the push scheduler at selection time, before the worker
    /// starts the task.
    pub fn mark_running(&self, user: &str) {
        let mut running = lock(&self.push_running_by_user);
        *running.entry(user.to_string()).or_default() += 1;
    }

    /// Reads the share counters the fair-share scan needs for one user.
    #[must_use]
    pub fn push_counts(&self, user: &str) -> PushCounts {
        let state = lock(&self.admission);
        let user_total = state.push_total_by_user.get(user).copied().unwrap_or(0);
        let total = state.push_total;
        drop(state);

        let running = lock(&self.push_running_by_user)
            .get(user)
            .copied()
            .unwrap_or(0);
        PushCounts {
            running,
            user_total,
            total,
        }
    }

    /// Whether a signature is currently in flight for a kind.
    #[must_use]
    pub fn contains(&self, kind: TaskKind, signature: i64) -> bool {
        lock(&self.admission)
            .inflight
            .get(&kind)
            .is_some_and(|signatures| signatures.contains(&signature))
    }

    /// Number of in-flight signatures for a kind.
    #[must_use]
    pub fn inflight_count(&self, kind: TaskKind) -> usize {
        lock(&self.admission)
            .inflight
            .get(&kind)
            .map_or(0, HashSet::len)
    }

    /// Deep copy of the in-flight map, for the task reporter.
    #[must_use]
    pub fn snapshot_inflight(&self) -> BTreeMap<TaskKind, BTreeSet<i64>> {
        lock(&self.admission)
            .inflight
            .iter()
            .map(|(kind, signatures)| (*kind, signatures.iter().copied().collect()))
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn decrement(counts: &mut HashMap<String, u32>, user: &str) {
    if let Some(count) = counts.get_mut(user) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            counts.remove(user);
        }
    }
}

/// Monotonically non-decreasing backend report version.
///
/// Seeded from wall-clock seconds so a restarted node keeps increasing
/// past the versions it reported before. Bumped on every successful
/// tablet-mutating task and piggy-backed on the periodic tablet report.
#[derive(Debug)]
pub struct ReportVersion(AtomicU64);

impl ReportVersion {
    /// Creates a version counter seeded from the wall clock.
    #[must_use]
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0)
            * 10_000;
        Self(AtomicU64::new(seed))
    }

    /// Creates a counter with an explicit seed, for tests.
    #[must_use]
    pub const fn with_seed(seed: u64) -> Self {
        Self(AtomicU64::new(seed))
    }

    /// Increments the version, returning the new value.
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Reads the current version.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for ReportVersion {
    fn default() -> Self {
        Self::new()
    }
}
