//! Payload normalization: keep tiles in an encoding and size the delivery
//! transport can carry.

use super::classify::TilePayload;
use super::http::MediaType;
use super::outcome::Failure;
use crate::core::constants::{LOSSY_QUALITY_STEP, LOSSY_REENCODE_QUALITY, MIN_LOSSY_QUALITY};
use image::{DynamicImage, ImageOutputFormat};
use std::io::Cursor;

/// What to do with a payload before delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transcode {
    PassThrough,
    /// Uncompressed bitmap, store it as PNG
    ToPng,
    /// Oversized lossless tile, shrink it as JPEG
    ToJpeg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalizer {
    transfer_size_limit: Option<usize>,
}

impl Normalizer {
    /// `transfer_size_limit` of `None` never shrinks lossless tiles
    pub fn new(transfer_size_limit: Option<usize>) -> Self {
        Self {
            transfer_size_limit,
        }
    }

    pub fn plan(&self, len: usize, media_type: Option<&MediaType>, overlay: bool) -> Transcode {
        let Some(media_type) = media_type else {
            return Transcode::PassThrough;
        };
        if media_type.is_bmp() {
            return Transcode::ToPng;
        }
        let oversized = self.transfer_size_limit.map_or(false, |limit| len > limit);
        if media_type.is_png() && oversized && !overlay {
            Transcode::ToJpeg
        } else {
            Transcode::PassThrough
        }
    }

    /// Apply [`plan`](Self::plan) to `payload`. Undecodable images fail as I/O errors.
    ///
    /// The lossy pass lowers the JPEG quality until the tile fits the transfer
    /// limit. It never hands back something larger than the payload it was given.
    pub fn normalize(&self, payload: TilePayload, overlay: bool) -> Result<Vec<u8>, Failure> {
        let plan = self.plan(payload.data.len(), payload.media_type.as_ref(), overlay);
        let data = match plan {
            Transcode::PassThrough => return Ok(payload.data),
            Transcode::ToPng => encode(&decode(&payload.data)?, ImageOutputFormat::Png)?,
            Transcode::ToJpeg => {
                let limit = self.transfer_size_limit.unwrap_or(usize::MAX);
                match shrink(&payload.data, limit)? {
                    Some(data) => data,
                    None => return Ok(payload.data),
                }
            }
        };
        log::debug!(
            "re-encoded tile {:?}: {} -> {} bytes",
            plan,
            payload.data.len(),
            data.len()
        );
        if data.is_empty() {
            return Err(Failure::io("Encode", "re-encoding produced no data"));
        }
        Ok(data)
    }
}

/// Smallest JPEG encoding of `data` that fits `limit`, trying qualities from
/// high to low. Falls back to the smallest attempt when none fits, and to
/// `None` when even that is no smaller than `data`.
fn shrink(data: &[u8], limit: usize) -> Result<Option<Vec<u8>>, Failure> {
    // JPEG has no alpha channel
    let image = DynamicImage::ImageRgb8(decode(data)?.to_rgb8());
    let mut smallest: Option<Vec<u8>> = None;
    let mut quality = LOSSY_REENCODE_QUALITY;
    loop {
        let jpeg = encode(&image, ImageOutputFormat::Jpeg(quality))?;
        if jpeg.len() <= limit {
            return Ok(Some(jpeg));
        }
        if smallest.as_ref().map_or(true, |s| jpeg.len() < s.len()) {
            smallest = Some(jpeg);
        }
        if quality <= MIN_LOSSY_QUALITY {
            break;
        }
        quality = quality.saturating_sub(LOSSY_QUALITY_STEP).max(MIN_LOSSY_QUALITY);
    }
    log::warn!(
        "could not shrink {} byte tile under {} bytes, even at jpeg quality {}",
        data.len(),
        limit,
        MIN_LOSSY_QUALITY
    );
    Ok(smallest.filter(|jpeg| jpeg.len() < data.len()))
}

fn decode(data: &[u8]) -> Result<DynamicImage, Failure> {
    image::load_from_memory(data).map_err(|e| Failure::io("Decode", e.to_string()))
}

fn encode(image: &DynamicImage, format: ImageOutputFormat) -> Result<Vec<u8>, Failure> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, format)
        .map_err(|e| Failure::io("Encode", e.to_string()))?;
    Ok(out.into_inner())
}
