//! stderr-only structured logging, one rank-tagged span per peer thread.
//!
//! A distributed run has no in-process TUI to forward logs to, so every
//! peer writes directly to stderr and is told apart by the `rank` field on
//! its outermost span.

use std::sync::LazyLock;

use color_eyre::eyre::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::settings::PROJECT_NAME;

pub static LOG_ENV: LazyLock<String> = LazyLock::new(|| format!("{}_LOG_LEVEL", &*PROJECT_NAME));

pub fn init() -> Result<()> {
    let env_filter = EnvFilter::builder().with_default_directive(tracing::Level::INFO.into());
    let env_filter =
        env_filter.try_from_env().or_else(|_| env_filter.with_env_var(LOG_ENV.clone()).from_env())?;

    let stderr_subscriber = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(true)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_subscriber).try_init()?;
    Ok(())
}

/// Builds the `rank`-tagged span a peer's driver thread enters for the
/// duration of its `begin()` call.
pub fn peer_span(rank: usize) -> tracing::Span {
    tracing::info_span!("peer", rank)
}
