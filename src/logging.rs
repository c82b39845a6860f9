//! Tracing setup for the bridge binary.
//!
//! The subscriber is installed before configuration is read, so load errors
//! are never lost. The configured level is applied afterwards through a
//! reload handle.

use std::env;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

use crate::error::{IntegrationError, Result};

pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// `RUST_LOG` if set, otherwise `info`.
pub fn initial_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn rust_log_set() -> bool {
    env::var_os("RUST_LOG").is_some()
}

/// Plain-text subscriber writing to `writer`, with a reloadable filter.
pub fn subscriber<W>(
    writer: W,
    filter: EnvFilter,
) -> (impl Subscriber + Send + Sync + 'static, FilterHandle)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let (filter, handle) = reload::Layer::new(filter);
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(writer));
    (subscriber, handle)
}

/// Swap in the level from configuration.
pub fn set_level(handle: &FilterHandle, level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .map_err(|e| IntegrationError::Config(format!("Invalid log level '{level}': {e}")))?;
    handle
        .reload(filter)
        .map_err(|e| IntegrationError::Internal(format!("Failed to apply log level: {e}")))
}
