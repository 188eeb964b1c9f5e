//! Terminal outcomes of a tile request and the collaborators they are reported to.

use crate::core::geo::TileCoord;
use crate::Result;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Why a tile could not be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// No usable network path, nothing was attempted
    NoNetwork,
    /// The server authoritatively says there is no tile here
    DoesNotExist,
    /// Transport, protocol or decode failure. The caller may retry later.
    IoError,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoNetwork => "no network",
            Self::DoesNotExist => "tile does not exist",
            Self::IoError => "i/o error",
        };
        f.write_str(name)
    }
}

/// Result of running one request through the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(Vec<u8>),
    Failure(FailureReason),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::Success(_) => None,
            Self::Failure(reason) => Some(*reason),
        }
    }
}

/// A failed pipeline step, with enough context for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub reason: FailureReason,
    /// Short name of what went wrong, e.g. `Timeout` or `HttpStatus`
    pub kind: &'static str,
    pub message: String,
}

impl Failure {
    pub fn new(reason: FailureReason, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            reason,
            kind,
            message: message.into(),
        }
    }

    pub fn does_not_exist(kind: &'static str, message: impl Into<String>) -> Self {
        Self::new(FailureReason::DoesNotExist, kind, message)
    }

    pub fn io(kind: &'static str, message: impl Into<String>) -> Self {
        Self::new(FailureReason::IoError, kind, message)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.reason, self.kind, self.message)
    }
}

/// Consumer waiting for a tile.
///
/// Called from whichever worker finished the request, possibly concurrently
/// with other calls. Implementations must not block for long. An `Err` means
/// the consumer could not take the result (e.g. it has gone away); it is
/// logged and otherwise ignored.
pub trait TileSink: Send + Sync {
    fn on_tile_loaded(&self, tile: &TileCoord, data: &[u8]) -> Result<()>;

    fn on_tile_failed(&self, tile: &TileCoord, reason: FailureReason) -> Result<()>;
}

/// Persistent tile cache. Fire-and-forget: persistence failures are the store's concern.
pub trait TileStore: Send + Sync {
    fn save(&self, tile: &TileCoord, data: &[u8]);

    /// Remember that the server has no tile at this address
    fn mark_invalid(&self, tile: &TileCoord);
}

/// A dispatched request waiting for a worker
pub struct PendingRequest {
    pub tile: TileCoord,
    pub sink: Arc<dyn TileSink>,
}

impl PendingRequest {
    pub fn new(tile: TileCoord, sink: Arc<dyn TileSink>) -> Self {
        Self { tile, sink }
    }

    /// Deliver `outcome` to the sink and the store, consuming the request.
    ///
    /// The sink is told first so the consumer never waits on disk I/O. A sink
    /// that errors or panics does not stop the store interaction, and a
    /// panicking store is logged rather than unwinding into the worker.
    pub fn report(self, outcome: FetchOutcome, store: &dyn TileStore) {
        let tile = &self.tile;
        match outcome {
            FetchOutcome::Success(data) if data.is_empty() => {
                log::error!("refusing to deliver empty payload for tile {}", tile);
                self.deliver_failure(FailureReason::IoError);
            }
            FetchOutcome::Success(data) => {
                let sink = &self.sink;
                guarded(tile, "on_tile_loaded", || sink.on_tile_loaded(tile, &data));
                guarded(tile, "save", || {
                    store.save(tile, &data);
                    Ok(())
                });
            }
            FetchOutcome::Failure(FailureReason::DoesNotExist) => {
                self.deliver_failure(FailureReason::DoesNotExist);
                guarded(tile, "mark_invalid", || {
                    store.mark_invalid(tile);
                    Ok(())
                });
            }
            FetchOutcome::Failure(reason) => self.deliver_failure(reason),
        }
    }

    fn deliver_failure(&self, reason: FailureReason) {
        let (tile, sink) = (&self.tile, &self.sink);
        guarded(tile, "on_tile_failed", || sink.on_tile_failed(tile, reason));
    }
}

fn guarded(tile: &TileCoord, call: &str, f: impl FnOnce() -> Result<()>) {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("{} failed for tile {}: {}", call, tile, e),
        Err(_) => log::warn!("{} panicked for tile {}", call, tile),
    }
}
