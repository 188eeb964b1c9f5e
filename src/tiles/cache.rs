use super::outcome::TileStore;
use crate::core::geo::TileCoord;
use crate::prelude::HashSet;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const DEFAULT_CAPACITY: usize = 1024;

/// In-memory tile store using LRU eviction.
///
/// Also remembers tiles the server reported as missing, so callers can skip
/// asking for them again.
#[derive(Debug)]
pub struct MemoryTileStore {
    cache: Arc<Mutex<LruCache<TileCoord, Arc<Vec<u8>>>>>,
    invalid: Arc<Mutex<HashSet<TileCoord>>>,
}

impl MemoryTileStore {
    /// Create a new tile store with the given capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
            invalid: Arc::new(Mutex::new(HashSet::default())),
        }
    }

    /// Create a new tile store with default capacity (1024 tiles)
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Get a tile from the store
    pub fn get(&self, coord: &TileCoord) -> Option<Arc<Vec<u8>>> {
        self.cache.lock().ok()?.get(coord).cloned()
    }

    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.cache
            .lock()
            .ok()
            .map(|cache| cache.contains(coord))
            .unwrap_or(false)
    }

    /// Whether the server said there is no tile at `coord`
    pub fn is_invalid(&self, coord: &TileCoord) -> bool {
        self.invalid
            .lock()
            .ok()
            .map(|invalid| invalid.contains(coord))
            .unwrap_or(false)
    }

    pub fn invalid_count(&self) -> usize {
        self.invalid.lock().map(|invalid| invalid.len()).unwrap_or(0)
    }

    /// Remove a tile from the store
    pub fn remove(&self, coord: &TileCoord) -> Option<Arc<Vec<u8>>> {
        self.cache.lock().ok()?.pop(coord)
    }

    /// Clear all tiles and invalid markers
    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
        if let Ok(mut invalid) = self.invalid.lock() {
            invalid.clear();
        }
    }

    /// Get the current number of stored tiles
    pub fn len(&self) -> usize {
        self.cache.lock().ok().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cache
            .lock()
            .ok()
            .map(|cache| cache.cap().get())
            .unwrap_or(0)
    }
}

impl TileStore for MemoryTileStore {
    fn save(&self, tile: &TileCoord, data: &[u8]) {
        if let Ok(mut invalid) = self.invalid.lock() {
            invalid.remove(tile);
        }
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(tile.clone(), Arc::new(data.to_vec()));
        }
    }

    fn mark_invalid(&self, tile: &TileCoord) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(tile);
        }
        if let Ok(mut invalid) = self.invalid.lock() {
            invalid.insert(tile.clone());
        }
    }
}

impl Clone for MemoryTileStore {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            invalid: Arc::clone(&self.invalid),
        }
    }
}

impl Default for MemoryTileStore {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
