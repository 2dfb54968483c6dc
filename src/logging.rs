//! Process-wide `tracing` subscriber setup.

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::types::{GraphError, Result};

/// Directive used when neither the caller nor `RUST_LOG` supplies one:
/// this crate's events at `info`, everything else at `warn`.
pub const DEFAULT_FILTER: &str = "warn,bftgraph=info";

/// Resolves the subscriber filter.
///
/// An explicit `directive` wins. Otherwise `RUST_LOG` is used when set, and
/// [`DEFAULT_FILTER`] when it is not. A directive that does not parse is a
/// [`GraphError::Config`], including one read from the environment.
pub fn build_filter(directive: Option<&str>) -> Result<EnvFilter> {
    let from_env;
    let directive = match directive {
        Some(directive) => directive,
        None => match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(value) if !value.trim().is_empty() => {
                from_env = value;
                from_env.as_str()
            }
            _ => DEFAULT_FILTER,
        },
    };
    EnvFilter::try_new(directive)
        .map_err(|e| GraphError::Config(format!("invalid log filter {directive:?}: {e}")))
}

/// Installs a formatting subscriber filtered by [`build_filter`].
///
/// Events carry their target and thread name, so records from the
/// `reconfig-monitor` worker are distinguishable from commit-path events.
/// Fails when the directive does not parse or a global subscriber is
/// already installed.
pub fn init_logging(directive: Option<&str>) -> Result<()> {
    let filter = build_filter(directive)?;
    let rendered = filter.to_string();
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .map_err(|_| GraphError::Config("logging already initialized".into()))?;
    info!(filter = %rendered, "logging.initialized");
    Ok(())
}
