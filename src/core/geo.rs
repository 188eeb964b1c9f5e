use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest zoom level a slippy-map tile address can express with `u32` columns.
pub const MAX_ZOOM: u8 = 31;

/// Identity of one requested tile: the server it comes from plus its slippy map address.
///
/// Equality, ordering and hashing are exact over all four fields, so a `TileCoord`
/// doubles as the cache key and as the key outcomes are reported under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub server_id: String,
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(server_id: impl Into<String>, z: u8, x: u32, y: u32) -> Self {
        Self {
            server_id: server_id.into(),
            z,
            x,
            y,
        }
    }

    /// Checks if the tile is addressable at its zoom level
    pub fn is_valid(&self) -> bool {
        if self.z > MAX_ZOOM {
            return false;
        }
        let max_coord = 1_u64 << self.z;
        (self.x as u64) < max_coord && (self.y as u64) < max_coord
    }

    /// Row index counted from the bottom, as used by TMS servers
    pub fn tms_y(&self) -> u32 {
        let max_coord = 1_u64 << self.z.min(MAX_ZOOM);
        (max_coord - 1).saturating_sub(self.y as u64) as u32
    }

    /// Bing-style quadkey for this tile. Zoom levels past [`MAX_ZOOM`] are clamped.
    pub fn quadkey(&self) -> String {
        let z = self.z.min(MAX_ZOOM);
        let mut key = String::with_capacity(z as usize);
        for level in (1..=z).rev() {
            let mask = 1_u32 << (level - 1);
            let mut digit = b'0';
            if self.x & mask != 0 {
                digit += 1;
            }
            if self.y & mask != 0 {
                digit += 2;
            }
            key.push(digit as char);
        }
        key
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.server_id, self.z, self.x, self.y)
    }
}
