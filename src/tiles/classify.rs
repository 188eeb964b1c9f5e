//! Turns one fetch attempt into either a tile payload or a typed failure

use super::http::{FetchError, FetchResponse, MediaType};
use super::outcome::Failure;
use super::source::TileSource;
use crate::core::constants::ERROR_BODY_SNIPPET_LEN;

/// Raw tile bytes plus the content type the server declared for them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePayload {
    /// Never empty
    pub data: Vec<u8>,
    pub media_type: Option<MediaType>,
}

const HTTP_NOT_FOUND: u16 = 404;

/// Classify a fetch attempt.
///
/// Takes ownership of the response so it is released before this returns,
/// whichever branch is taken.
pub fn classify(
    attempt: Result<FetchResponse, FetchError>,
    source: &TileSource,
) -> Result<TilePayload, Failure> {
    let mut response = attempt.map_err(transport_failure)?;

    if response.status() == HTTP_NOT_FOUND {
        return Err(Failure::does_not_exist("NotFound", "tile not available"));
    }
    if !response.is_success() {
        let status = response.status();
        let snippet = response.body_snippet(ERROR_BODY_SNIPPET_LEN);
        return Err(Failure::io(
            "HttpStatus",
            format!("Code: {} message: {}", status, snippet.trim()),
        ));
    }

    if has_no_tile_sentinel(&response, source) {
        return Err(Failure::does_not_exist(
            "NoTileHeader",
            "tile not available",
        ));
    }

    let data = response
        .read_body()
        .map_err(|e| transport_failure(e.into()))?;
    if data.is_empty() {
        return Err(Failure::io("EmptyBody", "no tile data"));
    }

    let media_type = response.content_type().cloned();
    if let Some(media_type) = media_type.as_ref().filter(|m| m.is_text()) {
        // can't be a tile, most likely an error page
        let text = String::from_utf8_lossy(&data);
        log::error!(
            "{} returned {} instead of a tile: {}",
            source.id,
            media_type,
            truncate(&text, ERROR_BODY_SNIPPET_LEN)
        );
        return Err(Failure::does_not_exist("TextPayload", "tile not available"));
    }

    Ok(TilePayload { data, media_type })
}

fn transport_failure(e: FetchError) -> Failure {
    Failure::io(e.kind(), e.to_string())
}

/// A configured sentinel header is present with a listed value, or with any
/// value when the server lists none. A present header with an unlisted value
/// is not a sentinel.
fn has_no_tile_sentinel(response: &FetchResponse, source: &TileSource) -> bool {
    let Some(header) = source.no_tile_header.as_deref() else {
        return false;
    };
    let Some(value) = response.header(header) else {
        return false;
    };
    match &source.no_tile_values {
        Some(values) => values.iter().any(|v| v == value),
        None => true,
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
