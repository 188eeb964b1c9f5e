use anyhow::{bail, Context};
use serde_json::Value;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tilefetch::prelude::*;

/// Fetch tiles from the command line.
///
/// Usage: `tilefetch-app <config.json> <server_id> <z>/<x>/<y>...`
///
/// The config file holds an optional `"downloader"` object (see
/// `DownloaderConfig`) and a `"sources"` array of tile server descriptors.
fn main() -> anyhow::Result<()> {
    tilefetch::init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 {
        bail!("usage: tilefetch-app <config.json> <server_id> <z>/<x>/<y>...");
    }

    let raw = std::fs::read_to_string(&args[0])
        .with_context(|| format!("reading config {}", args[0]))?;
    let config: Value = serde_json::from_str(&raw).context("parsing config")?;
    let downloader_config = match config.get("downloader") {
        Some(section) => DownloaderConfig::from_json_str(&section.to_string())?,
        None => DownloaderConfig::default(),
    };
    let sources = config
        .get("sources")
        .map(Value::to_string)
        .unwrap_or_else(|| "[]".to_string());
    let registry = Arc::new(StaticRegistry::from_json_str(&sources)?);
    log::info!("loaded {} tile sources", registry.len());

    let server_id = &args[1];
    let tiles = args[2..]
        .iter()
        .map(|arg| parse_tile(server_id, arg))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let store = Arc::new(MemoryTileStore::default());
    let mut downloader = TileDownloader::builder(registry, store.clone())
        .config(downloader_config)
        .build()?;

    let (tx, rx) = mpsc::channel();
    let sink = Arc::new(PrintingSink { tx: Mutex::new(tx) });
    for tile in &tiles {
        downloader.request(tile.clone(), sink.clone())?;
    }

    let mut reported = 0;
    while reported < tiles.len() {
        match rx.recv_timeout(Duration::from_secs(30)) {
            Ok(()) => reported += 1,
            Err(_) => {
                log::warn!("{} requests produced no outcome", tiles.len() - reported);
                break;
            }
        }
    }
    downloader.shutdown();

    println!(
        "stored {} tiles, {} marked as missing",
        store.len(),
        store.invalid_count()
    );
    Ok(())
}

fn parse_tile(server_id: &str, arg: &str) -> anyhow::Result<TileCoord> {
    let parts: Vec<&str> = arg.split('/').collect();
    let [z, x, y] = parts.as_slice() else {
        bail!("tile '{}' is not in z/x/y form", arg);
    };
    let tile = TileCoord::new(server_id, z.parse()?, x.parse()?, y.parse()?);
    if !tile.is_valid() {
        bail!("tile {} is out of range", tile);
    }
    Ok(tile)
}

struct PrintingSink {
    tx: Mutex<mpsc::Sender<()>>,
}

impl PrintingSink {
    fn done(&self) -> tilefetch::Result<()> {
        let tx = self
            .tx
            .lock()
            .map_err(|_| TileError::Callback("sink lock poisoned".to_string()))?;
        tx.send(())
            .map_err(|_| TileError::Callback("main thread is gone".to_string()))
    }
}

impl TileSink for PrintingSink {
    fn on_tile_loaded(&self, tile: &TileCoord, data: &[u8]) -> tilefetch::Result<()> {
        println!("{}: {} bytes", tile, data.len());
        self.done()
    }

    fn on_tile_failed(&self, tile: &TileCoord, reason: FailureReason) -> tilefetch::Result<()> {
        println!("{}: {}", tile, reason);
        self.done()
    }
}
