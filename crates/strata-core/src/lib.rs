//! # strata-core
//!
//! Shared contracts for the strata analytical storage backend node.
//!
//! This crate provides the foundational pieces used by every node
//! component:
//!
//! - **Protocol Types**: task requests, finish reports, and periodic
//!   report payloads exchanged with the coordinator
//! - **Collaborator Traits**: seams to the storage engine, coordinator
//!   RPC client, peer backends, ingest pipeline, file service, and the
//!   external transfer tool
//! - **Error Types**: infrastructure errors and per-task outcomes with
//!   their coordinator-visible status mapping
//! - **Configuration**: the dispatcher's tuning knobs with env overrides
//! - **Observability**: structured-logging initialization and span
//!   helpers
//!
//! ## Crate Boundary
//!
//! `strata-core` is the only crate allowed to define shared contracts.
//! The dispatcher (`strata-agent`) and the engine-side crates interact
//! exclusively through the types and traits defined here.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod traits;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use strata_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::AgentConfig;
    pub use crate::error::{Error, Result, TaskError, TaskResult};
    pub use crate::protocol::{
        BackendIdentity, CoordinatorHandle, FinishReport, FinishStatus, Priority, ReportRequest,
        TabletInfo, TaskKind, TaskPayload, TaskRequest,
    };
    pub use crate::traits::{
        Coordinator, IngestPipeline, PeerAgent, RemoteFileService, StorageEngine, TransferTool,
    };
}

pub use config::AgentConfig;
pub use error::{Error, Result, TaskError, TaskResult};
pub use observability::{init_node_logging, LogFormat};
pub use protocol::{
    BackendIdentity, CoordinatorHandle, CoordinatorInfo, FinishReport, FinishStatus, MasterResult,
    Priority, ReportRequest, TabletInfo, TaskKind, TaskPayload, TaskRequest,
};
