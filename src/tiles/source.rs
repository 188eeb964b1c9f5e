use crate::core::geo::TileCoord;
use crate::prelude::HashMap;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Description of one tile server, as far as downloading is concerned.
///
/// Descriptors belong to a [`TileSourceRegistry`]; workers only ever read them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSource {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// URL template, e.g. `https://{switch:a,b,c}.tile.example.org/{zoom}/{x}/{y}.png`
    pub url_template: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub min_zoom: u8,
    #[serde(default = "default_max_zoom")]
    pub max_zoom: u8,
    /// Header the server sets instead of answering 404 when it has no tile
    #[serde(default)]
    pub no_tile_header: Option<String>,
    /// Values of `no_tile_header` meaning "no tile". `None` means any value does.
    #[serde(default)]
    pub no_tile_values: Option<Vec<String>>,
    /// Overlay tiles are drawn on top of a base layer and must stay lossless
    #[serde(default)]
    pub overlay: bool,
    #[serde(default = "default_true")]
    pub metadata_loaded: bool,
}

fn default_max_zoom() -> u8 {
    19
}

fn default_true() -> bool {
    true
}

impl TileSource {
    pub fn new(id: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            url_template: url_template.into(),
            api_key: None,
            min_zoom: 0,
            max_zoom: default_max_zoom(),
            no_tile_header: None,
            no_tile_values: None,
            overlay: false,
            metadata_loaded: true,
        }
    }

    pub fn with_no_tile_header(mut self, header: impl Into<String>, values: Option<Vec<String>>) -> Self {
        self.no_tile_header = Some(header.into());
        self.no_tile_values = values;
        self
    }

    pub fn with_overlay(mut self, overlay: bool) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn with_metadata_loaded(mut self, loaded: bool) -> Self {
        self.metadata_loaded = loaded;
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    /// Build the URL for `tile`.
    ///
    /// Returns `None` while the server metadata is still loading, or when the
    /// tile is outside the zoom range the server covers.
    pub fn tile_url(&self, tile: &TileCoord) -> Option<String> {
        if !self.metadata_loaded {
            return None;
        }
        if tile.z < self.min_zoom || tile.z > self.max_zoom {
            return None;
        }
        Some(self.expand_template(tile))
    }

    fn expand_template(&self, tile: &TileCoord) -> String {
        let template = self.url_template.as_str();
        let mut url = String::with_capacity(template.len() + 16);
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            url.push_str(&rest[..open]);
            let after = &rest[open..];
            let Some(close) = after.find('}') else {
                url.push_str(after);
                rest = "";
                break;
            };
            let token = &after[1..close];
            match self.placeholder(token, tile) {
                Some(value) => url.push_str(&value),
                None => url.push_str(&after[..=close]),
            }
            rest = &after[close + 1..];
        }
        url.push_str(rest);
        url
    }

    fn placeholder(&self, token: &str, tile: &TileCoord) -> Option<String> {
        match token {
            "zoom" | "z" => Some(tile.z.to_string()),
            "x" => Some(tile.x.to_string()),
            "y" => Some(tile.y.to_string()),
            "-y" => Some(tile.tms_y().to_string()),
            "quadkey" => Some(tile.quadkey()),
            "apikey" => self.api_key.clone(),
            _ => {
                let choices = token.strip_prefix("switch:")?;
                let choices: Vec<&str> = choices.split(',').map(str::trim).collect();
                let idx = ((tile.x as u64 + tile.y as u64) % choices.len() as u64) as usize;
                Some(choices[idx].to_string())
            }
        }
    }
}

/// Source of truth for tile server descriptors
pub trait TileSourceRegistry: Send + Sync {
    fn get(&self, id: &str) -> Option<Arc<TileSource>>;
}

/// Registry backed by an in-memory map, typically loaded from JSON
#[derive(Debug, Default)]
pub struct StaticRegistry {
    sources: RwLock<HashMap<String, Arc<TileSource>>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sources(sources: impl IntoIterator<Item = TileSource>) -> Self {
        let registry = Self::new();
        for source in sources {
            registry.insert(source);
        }
        registry
    }

    /// Parse a JSON array of descriptors
    pub fn from_json_str(json: &str) -> Result<Self> {
        let sources: Vec<TileSource> = serde_json::from_str(json)?;
        Ok(Self::from_sources(sources))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Add or replace a descriptor
    pub fn insert(&self, source: TileSource) {
        if let Ok(mut sources) = self.sources.write() {
            sources.insert(source.id.clone(), Arc::new(source));
        }
    }

    /// Flag the metadata of `id` as loaded. Returns false for unknown ids.
    ///
    /// Descriptors are swapped, not mutated, so requests already holding the
    /// old descriptor keep a consistent view.
    pub fn mark_metadata_loaded(&self, id: &str) -> bool {
        let Ok(mut sources) = self.sources.write() else {
            return false;
        };
        match sources.get_mut(id) {
            Some(source) => {
                let mut updated = TileSource::clone(source);
                updated.metadata_loaded = true;
                *source = Arc::new(updated);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sources.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TileSourceRegistry for StaticRegistry {
    fn get(&self, id: &str) -> Option<Arc<TileSource>> {
        self.sources.read().ok()?.get(id).cloned()
    }
}
