//! The per-request download pipeline run by each pool worker

use super::classify::classify;
use super::http::TileFetcher;
use super::network::NetworkStatus;
use super::normalize::Normalizer;
use super::outcome::{Failure, FailureReason, FetchOutcome, PendingRequest, TileStore};
use super::source::{TileSource, TileSourceRegistry};
use crate::core::geo::TileCoord;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Everything a pipeline run needs, shared read-only between workers.
///
/// Cloning is cheap; a worker keeps no state from one tile to the next.
#[derive(Clone)]
pub struct TileWorker {
    fetcher: Arc<dyn TileFetcher>,
    registry: Arc<dyn TileSourceRegistry>,
    store: Arc<dyn TileStore>,
    network: Arc<dyn NetworkStatus>,
    normalizer: Normalizer,
}

impl TileWorker {
    pub fn new(
        fetcher: Arc<dyn TileFetcher>,
        registry: Arc<dyn TileSourceRegistry>,
        store: Arc<dyn TileStore>,
        network: Arc<dyn NetworkStatus>,
        normalizer: Normalizer,
    ) -> Self {
        Self {
            fetcher,
            registry,
            store,
            network,
            normalizer,
        }
    }

    /// Run `request` to completion and report its outcome.
    ///
    /// Requests for unknown servers, or servers whose metadata is not loaded
    /// yet, are dropped without a report.
    pub fn run(&self, request: PendingRequest) {
        match self.outcome_for(&request.tile) {
            Some(outcome) => request.report(outcome, self.store.as_ref()),
            None => log::debug!("no url for tile {}, dropping request", request.tile),
        }
    }

    /// Compute the outcome without touching the sink or the store.
    /// `None` means there is nothing to report.
    pub fn outcome_for(&self, tile: &TileCoord) -> Option<FetchOutcome> {
        if !self.network.is_connected() {
            log::error!("No network, failing tile {}", tile);
            return Some(FetchOutcome::Failure(FailureReason::NoNetwork));
        }
        if !tile.is_valid() {
            log::error!("Error downloading tile {}: not a valid tile address", tile);
            return Some(FetchOutcome::Failure(FailureReason::IoError));
        }

        let Some(source) = self.registry.get(&tile.server_id) else {
            log::warn!("unknown tile server '{}'", tile.server_id);
            return None;
        };
        let url = match catch_unwind(AssertUnwindSafe(|| source.tile_url(tile))) {
            Ok(url) => url?,
            Err(_) => {
                log::error!("Error downloading tile {}: building the url panicked", tile);
                return Some(FetchOutcome::Failure(FailureReason::IoError));
            }
        };

        let attempt = catch_unwind(AssertUnwindSafe(|| self.download(&source, tile, &url)));
        let outcome = match attempt {
            Ok(Ok(data)) => FetchOutcome::Success(data),
            Ok(Err(failure)) => {
                log_failure(&failure, tile, &url);
                FetchOutcome::Failure(failure.reason)
            }
            Err(_) => {
                log::error!("Error downloading tile {}: pipeline panicked, url {}", tile, url);
                FetchOutcome::Failure(FailureReason::IoError)
            }
        };
        Some(outcome)
    }

    fn download(&self, source: &TileSource, tile: &TileCoord, url: &str) -> Result<Vec<u8>, Failure> {
        log::debug!("Downloading tile {} from url: {}", tile, url);
        let payload = classify(self.fetcher.fetch(url), source)?;
        let data = self.normalizer.normalize(payload, source.overlay)?;
        log::debug!("downloaded tile {} ({} bytes)", tile, data.len());
        Ok(data)
    }
}

fn log_failure(failure: &Failure, tile: &TileCoord, url: &str) {
    match failure.reason {
        // expected, servers simply don't have every tile
        FailureReason::DoesNotExist => {
            log::debug!("tile {} not available ({}): {}", tile, failure.kind, url)
        }
        _ => log::error!(
            "Error downloading tile {}. Exception: {} {} {}",
            tile,
            failure.kind,
            url,
            failure.message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::http::{FetchError, FetchResponse};
    use crate::tiles::network::NetworkFlag;
    use crate::tiles::source::StaticRegistry;
    use crate::MemoryTileStore;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    impl TileFetcher for CountingFetcher {
        fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if url.contains("/panic/") {
                panic!("fetcher bug");
            }
            Ok(FetchResponse::new(
                200,
                vec![("Content-Type".to_string(), "image/jpeg".to_string())],
                Box::new(Cursor::new(vec![0xFF, 0xD8, 0xFF, 0xE0])),
            ))
        }
    }

    fn worker(fetcher: Arc<CountingFetcher>, online: bool) -> TileWorker {
        let registry = StaticRegistry::from_sources(vec![
            TileSource::new("osm", "https://t/{zoom}/{x}/{y}.jpg"),
            TileSource::new("broken", "https://t/panic/{zoom}/{x}/{y}.jpg"),
            TileSource::new("loading", "https://l/{zoom}/{x}/{y}").with_metadata_loaded(false),
        ]);
        TileWorker::new(
            fetcher,
            Arc::new(registry),
            Arc::new(MemoryTileStore::default()),
            Arc::new(NetworkFlag::new(online)),
            Normalizer::new(Some(300_000)),
        )
    }

    #[test]
    fn test_offline_fails_without_fetching() {
        let fetcher = Arc::new(CountingFetcher::default());
        let outcome = worker(fetcher.clone(), false).outcome_for(&TileCoord::new("osm", 1, 0, 0));
        assert_eq!(outcome, Some(FetchOutcome::Failure(FailureReason::NoNetwork)));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_or_loading_server_is_silent() {
        let fetcher = Arc::new(CountingFetcher::default());
        let worker = worker(fetcher.clone(), true);
        assert_eq!(worker.outcome_for(&TileCoord::new("nope", 1, 0, 0)), None);
        assert_eq!(worker.outcome_for(&TileCoord::new("loading", 1, 0, 0)), None);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_success_passes_bytes_through() {
        let fetcher = Arc::new(CountingFetcher::default());
        let outcome = worker(fetcher, true).outcome_for(&TileCoord::new("osm", 1, 0, 0));
        assert_eq!(outcome, Some(FetchOutcome::Success(vec![0xFF, 0xD8, 0xFF, 0xE0])));
    }

    #[test]
    fn test_invalid_tile_fails_without_fetching() {
        let fetcher = Arc::new(CountingFetcher::default());
        let worker = worker(fetcher.clone(), true);
        assert_eq!(
            worker.outcome_for(&TileCoord::new("osm", 33, 0, 0)),
            Some(FetchOutcome::Failure(FailureReason::IoError))
        );
        assert_eq!(
            worker.outcome_for(&TileCoord::new("osm", 2, 4, 0)),
            Some(FetchOutcome::Failure(FailureReason::IoError))
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_fetcher_becomes_io_error() {
        let fetcher = Arc::new(CountingFetcher::default());
        let outcome = worker(fetcher, true).outcome_for(&TileCoord::new("broken", 1, 0, 0));
        assert_eq!(outcome, Some(FetchOutcome::Failure(FailureReason::IoError)));
    }
}
