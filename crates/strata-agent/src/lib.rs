//! # strata-agent
//!
//! Task-dispatch core of the strata analytical storage backend node.
//!
//! A backend receives a stream of heterogeneous administrative tasks from
//! the cluster coordinator — create/drop/alter tablet, bulk push and
//! delete, clone, storage-medium migrate, snapshots, consistency checks,
//! upload and restore. This crate implements the dispatcher around them:
//!
//! - **Per-kind worker pools** with configurable sizes, draining FIFO
//!   queues ([`queue`], [`supervisor`], [`worker`])
//! - **Cross-pool accounting**: the signature registry de-duplicates
//!   submissions and tracks push fair-share counters ([`registry`])
//! - **Two-lane, user-fair push scheduling** ([`push`])
//! - **Clone and alter orchestration** over peer backends and the local
//!   engine ([`clone`], [`alter`])
//! - **Periodic reporters** for tasks, disks, and tablets, with an
//!   interruptible disk-broken wakeup ([`reporter`])
//! - **The finish protocol**: bounded-retry acknowledgement of every
//!   task's terminal result ([`finish`])
//!
//! ## Guarantees
//!
//! - Every accepted submission produces exactly one finish report and
//!   leaves the registry once acknowledged (at-least-once overall; the
//!   coordinator de-duplicates on `(kind, signature)`)
//! - Duplicate signatures are dropped at the submission gate
//! - The report version is monotone across the process lifetime
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use strata_agent::context::AgentContext;
//! use strata_agent::supervisor::PoolSupervisor;
//! use strata_core::config::AgentConfig;
//!
//! let ctx = Arc::new(AgentContext::new(
//!     backend_identity,
//!     Arc::new(AgentConfig::from_env()?),
//!     coordinator,
//!     coordinator_handle,
//!     engine,
//!     peers,
//!     ingest,
//!     files,
//!     transfer,
//! ));
//! let supervisor = PoolSupervisor::new(ctx);
//! supervisor.start();
//! // heartbeat handler feeds submissions:
//! // supervisor.submit(task);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod alter;
pub mod clone;
pub mod context;
pub mod download;
pub mod finish;
pub mod metrics;
pub mod push;
pub mod queue;
pub mod registry;
pub mod reporter;
pub mod supervisor;
pub mod transfer;
pub mod worker;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::context::AgentContext;
    pub use crate::download::HttpFileService;
    pub use crate::finish::FinishProtocol;
    pub use crate::push::PushLane;
    pub use crate::queue::TaskQueue;
    pub use crate::registry::{ReportVersion, SignatureRegistry};
    pub use crate::reporter::DiskBrokenSignal;
    pub use crate::supervisor::{PoolKind, PoolSupervisor, SubmitOutcome};
    pub use crate::transfer::ShellTransferTool;
}
