//! Fixed-size pool of download workers

use super::http::{HttpTileFetcher, TileFetcher};
use super::network::{AlwaysOnline, NetworkStatus};
use super::normalize::Normalizer;
use super::outcome::{PendingRequest, TileSink, TileStore};
use super::source::TileSourceRegistry;
use super::worker::TileWorker;
use crate::core::config::DownloaderConfig;
use crate::core::geo::TileCoord;
use crate::{Error, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Downloads tiles on a fixed number of worker threads.
///
/// [`request`](Self::request) never blocks: requests beyond the number of
/// workers wait in an unbounded queue. Every accepted request for a known,
/// ready server gets exactly one call on its sink. Requests are not
/// deduplicated and not retried.
pub struct TileDownloader {
    task_tx: Option<Sender<PendingRequest>>,
    workers: Vec<JoinHandle<()>>,
    running: Arc<AtomicUsize>,
    config: DownloaderConfig,
}

impl TileDownloader {
    pub fn builder(
        registry: Arc<dyn TileSourceRegistry>,
        store: Arc<dyn TileStore>,
    ) -> TileDownloaderBuilder {
        TileDownloaderBuilder::new(registry, store)
    }

    fn start(config: DownloaderConfig, worker: TileWorker) -> Result<Self> {
        config.validate()?;
        let (task_tx, task_rx) = unbounded();
        let running = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(config.max_workers);
        for id in 0..config.max_workers {
            let task_rx = task_rx.clone();
            let worker = worker.clone();
            let running = running.clone();
            let handle = thread::Builder::new()
                .name(format!("tile-download-{}", id))
                .spawn(move || worker_loop(task_rx, worker, running))?;
            workers.push(handle);
        }

        log::info!("tile downloader started with {} workers", config.max_workers);
        Ok(Self {
            task_tx: Some(task_tx),
            workers,
            running,
            config,
        })
    }

    /// Queue a download of `tile`; the outcome goes to `sink`
    pub fn request(&self, tile: TileCoord, sink: Arc<dyn TileSink>) -> Result<()> {
        let Some(task_tx) = &self.task_tx else {
            return Err(Error::Queue("tile downloader is shut down".to_string()));
        };
        task_tx
            .send(PendingRequest::new(tile, sink))
            .map_err(|e| Error::Queue(format!("failed to queue tile {}", e.0.tile)))
    }

    /// Requests waiting for a free worker
    pub fn queued(&self) -> usize {
        self.task_tx.as_ref().map(|tx| tx.len()).unwrap_or(0)
    }

    /// Requests currently being processed
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Stop accepting requests, let workers drain the queue and wait for them
    pub fn shutdown(&mut self) {
        let Some(task_tx) = self.task_tx.take() else {
            return;
        };
        drop(task_tx);
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::warn!("tile download worker panicked during shutdown");
            }
        }
        log::info!("tile downloader stopped");
    }
}

impl Drop for TileDownloader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(task_rx: Receiver<PendingRequest>, worker: TileWorker, running: Arc<AtomicUsize>) {
    while let Ok(request) = task_rx.recv() {
        running.fetch_add(1, Ordering::SeqCst);
        let tile = request.tile.clone();
        if catch_unwind(AssertUnwindSafe(|| worker.run(request))).is_err() {
            log::error!("worker panicked while handling tile {}", tile);
        }
        running.fetch_sub(1, Ordering::SeqCst);
    }
    log::debug!("{:?} exiting - queue closed", thread::current().name());
}

/// Wires the shared collaborators into a [`TileDownloader`]
pub struct TileDownloaderBuilder {
    registry: Arc<dyn TileSourceRegistry>,
    store: Arc<dyn TileStore>,
    network: Arc<dyn NetworkStatus>,
    fetcher: Option<Arc<dyn TileFetcher>>,
    config: DownloaderConfig,
}

impl TileDownloaderBuilder {
    pub fn new(registry: Arc<dyn TileSourceRegistry>, store: Arc<dyn TileStore>) -> Self {
        Self {
            registry,
            store,
            network: Arc::new(AlwaysOnline),
            fetcher: None,
            config: DownloaderConfig::default(),
        }
    }

    pub fn config(mut self, config: DownloaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.config.max_workers = max_workers;
        self
    }

    pub fn network(mut self, network: Arc<dyn NetworkStatus>) -> Self {
        self.network = network;
        self
    }

    /// Use `fetcher` instead of an HTTP client built from the config
    pub fn fetcher(mut self, fetcher: Arc<dyn TileFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn build(self) -> Result<TileDownloader> {
        self.config.validate()?;
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpTileFetcher::new(&self.config)?),
        };
        let worker = TileWorker::new(
            fetcher,
            self.registry,
            self.store,
            self.network,
            Normalizer::new(self.config.transfer_size_limit),
        );
        TileDownloader::start(self.config, worker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::source::StaticRegistry;
    use crate::MemoryTileStore;

    #[test]
    fn test_zero_workers_rejected() {
        let result = TileDownloader::builder(
            Arc::new(StaticRegistry::new()),
            Arc::new(MemoryTileStore::default()),
        )
        .max_workers(0)
        .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut downloader = TileDownloader::builder(
            Arc::new(StaticRegistry::new()),
            Arc::new(MemoryTileStore::default()),
        )
        .config(DownloaderConfig::for_testing())
        .build()
        .unwrap();

        assert_eq!(downloader.config().max_workers, 2);
        downloader.shutdown();
        downloader.shutdown();
        assert_eq!(downloader.queued(), 0);
        assert_eq!(downloader.running(), 0);
    }
}
