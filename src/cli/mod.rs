#![forbid(unsafe_code)]

//! Command-line support: config loading, tracing setup and the edge-list
//! loader that stands in for the relational layer.

use tracing_subscriber::EnvFilter;

/// Edge-list loading and concurrent CSR construction.
///
/// Reads CSV edge lists, aggregates degrees and feeds batches to the
/// builder from a pool of worker threads.
pub mod loader;

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_filter`; without either, only this crate's
/// `info` events are shown.
pub fn init_tracing(default_filter: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.unwrap_or("pgq_csr=info")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}
