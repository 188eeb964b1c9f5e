//! Downloader-wide constants.
//! Keeping them in a single place makes it easier to tweak the magic numbers tile servers force on us.

/// Connect timeout applied by the shared HTTP client, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Read timeout applied by the shared HTTP client, in milliseconds.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5000;

/// Largest tile payload the delivery transport carries in a single call (determined experimentally).
pub const DEFAULT_TRANSFER_SIZE_LIMIT: usize = 300_000;

/// Number of download workers when no preference is supplied.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// First JPEG quality tried when shrinking oversized lossless tiles.
pub const LOSSY_REENCODE_QUALITY: u8 = 100;

/// Quality is lowered by this much while the JPEG is still over the transfer limit.
pub const LOSSY_QUALITY_STEP: u8 = 10;

/// Lowest JPEG quality the shrink pass goes down to.
pub const MIN_LOSSY_QUALITY: u8 = 10;

/// How much of an error body ends up in a diagnostic message.
pub const ERROR_BODY_SNIPPET_LEN: usize = 256;

/// User agent sent with every tile request.
pub const DEFAULT_USER_AGENT: &str = concat!("tilefetch/", env!("CARGO_PKG_VERSION"));
