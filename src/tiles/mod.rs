pub mod cache;
pub mod classify;
pub mod downloader;
pub mod http;
pub mod network;
pub mod normalize;
pub mod outcome;
pub mod source;
pub mod worker;

// Re-exports for convenience
pub use downloader::{TileDownloader, TileDownloaderBuilder};
pub use outcome::{FailureReason, FetchOutcome, TileSink, TileStore};
pub use source::{TileSource, TileSourceRegistry};
