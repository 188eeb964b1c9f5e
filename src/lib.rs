//! # tilefetch
//!
//! Downloads raster map tiles from remote tile servers on behalf of a map
//! renderer.
//!
//! Requests are handed to a fixed pool of worker threads. Each worker checks
//! reachability, resolves the tile URL, fetches it, classifies the response,
//! normalizes the image encoding and then reports exactly one outcome to the
//! requesting [`TileSink`], saving good tiles to the [`TileStore`] and marking
//! tiles the server says do not exist as invalid.

pub mod core;
pub mod prelude;
pub mod tiles;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{config::DownloaderConfig, geo::TileCoord};

pub use tiles::{
    cache::MemoryTileStore,
    downloader::{TileDownloader, TileDownloaderBuilder},
    http::{FetchError, FetchResponse, HttpTileFetcher, MediaType, TileFetcher},
    network::{AlwaysOnline, NetworkFlag, NetworkStatus, TcpProbe},
    normalize::{Normalizer, Transcode},
    outcome::{FailureReason, FetchOutcome, PendingRequest, TileSink, TileStore},
    source::{StaticRegistry, TileSource, TileSourceRegistry},
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Callback error: {0}")]
    Callback(String),

    #[error("Queue error: {0}")]
    Queue(String),
}

/// Initialise `env_logger` for binaries and examples that embed the downloader.
/// Calling it more than once is harmless.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
