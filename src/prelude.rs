//! Prelude module for common tilefetch types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use tilefetch::prelude::*;`

pub use crate::core::{config::DownloaderConfig, geo::TileCoord};

pub use crate::tiles::{
    cache::MemoryTileStore,
    downloader::{TileDownloader, TileDownloaderBuilder},
    http::{FetchError, FetchResponse, HttpTileFetcher, MediaType, TileFetcher},
    network::{AlwaysOnline, NetworkFlag, NetworkStatus, TcpProbe},
    normalize::{Normalizer, Transcode},
    outcome::{FailureReason, FetchOutcome, PendingRequest, TileSink, TileStore},
    source::{StaticRegistry, TileSource, TileSourceRegistry},
};

pub use crate::{Error as TileError, Result};

pub use std::{
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
