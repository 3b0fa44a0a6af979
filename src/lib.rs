pub mod analysis;
pub mod cache;
pub mod config;
pub mod ensemble;
pub mod error;
pub mod generate;
pub mod impact;
pub mod interpolate;
pub mod measures;
pub mod provider;
pub mod solver;
pub mod sources;
pub mod types;
pub mod workbook;
pub mod yearset;

pub use error::{Error, Result};

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
