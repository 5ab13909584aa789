//! Logging setup and span helpers for a backend node.
//!
//! The dispatcher logs through `tracing` with structured fields (task
//! kind, signature, user). Subscriber installation is driven by the
//! node's [`AgentConfig`] so one knob switches a whole deployment
//! between human-readable and shipper-friendly output.

use std::str::FromStr;

use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::AgentConfig;
use crate::error::{Error, Result};

/// Log output format, selected by `STRATA_AGENT_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON lines, for log shippers.
    Json,
    /// Human-readable output, for a terminal.
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(Error::configuration(format!(
                "unknown log format '{other}', expected 'json' or 'pretty'"
            ))),
        }
    }
}

/// Installs the node's tracing subscriber according to the agent
/// configuration.
///
/// `RUST_LOG` overrides the filter when set; the default enables
/// info-level logging for the node crates. Call once at process startup.
///
/// # Errors
///
/// Returns a configuration error when a global subscriber is already
/// installed; embedding tests that share a process can ignore it.
pub fn init_node_logging(config: &AgentConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,strata_agent=info,strata_core=info"));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    };
    installed
        .map_err(|error| Error::configuration(format!("install tracing subscriber: {error}")))
}

/// Creates a span for one task execution with standard fields.
///
/// # Example
///
/// ```rust
/// use strata_core::observability::task_span;
///
/// let span = task_span("clone", 42);
/// let _guard = span.enter();
/// // ... execute the task
/// ```
#[must_use]
pub fn task_span(kind: &str, signature: i64) -> Span {
    tracing::info_span!("agent_task", kind = kind, signature = signature)
}

/// Creates a span for one reporter cycle.
#[must_use]
pub fn report_span(which: &str) -> Span {
    tracing::info_span!("agent_report", which = which)
}
