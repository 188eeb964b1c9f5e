//! Mock collaborators shared by the integration tests

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tilefetch::prelude::*;

pub const WAIT: Duration = Duration::from_secs(10);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Canned response for one URL
#[derive(Clone)]
pub enum Canned {
    Response {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
    Error(FetchError),
    /// The fetcher itself blows up
    Panic,
}

impl Canned {
    pub fn ok(content_type: &str, body: Vec<u8>) -> Self {
        Self::Response {
            status: 200,
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self::Response {
            status,
            headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn with_header(self, name: &str, value: &str) -> Self {
        match self {
            Self::Response {
                status,
                mut headers,
                body,
            } => {
                headers.push((name.to_string(), value.to_string()));
                Self::Response {
                    status,
                    headers,
                    body,
                }
            }
            other => other,
        }
    }
}

/// Fetcher serving canned responses and counting what happens to them
#[derive(Default)]
pub struct MockFetcher {
    responses: Mutex<HashMap<String, Canned>>,
    pub calls: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
    pub urls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, canned: Canned) {
        self.responses.lock().unwrap().insert(url.to_string(), canned);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl TileFetcher for MockFetcher {
    fn fetch(&self, url: &str) -> std::result::Result<FetchResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        let canned = self
            .responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Canned::status(404, "no such tile"));
        match canned {
            Canned::Response {
                status,
                headers,
                body,
            } => {
                let closed = self.closed.clone();
                Ok(FetchResponse::new(status, headers, Box::new(Cursor::new(body)))
                    .with_close_hook(move || {
                        closed.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }))
            }
            Canned::Error(e) => Err(e),
            Canned::Panic => panic!("fetcher failed on {}", url),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Loaded(TileCoord, Vec<u8>),
    Failed(TileCoord, FailureReason),
}

/// Sink forwarding every call to a channel
pub struct ChannelSink {
    tx: Sender<SinkEvent>,
    fail_deliveries: bool,
}

impl ChannelSink {
    pub fn new() -> (Arc<Self>, Receiver<SinkEvent>) {
        let (tx, rx) = unbounded();
        (
            Arc::new(Self {
                tx,
                fail_deliveries: false,
            }),
            rx,
        )
    }

    /// A sink whose consumer has gone away: it records the call, then errors
    pub fn failing() -> (Arc<Self>, Receiver<SinkEvent>) {
        let (tx, rx) = unbounded();
        (
            Arc::new(Self {
                tx,
                fail_deliveries: true,
            }),
            rx,
        )
    }

    fn result(&self) -> Result<()> {
        if self.fail_deliveries {
            Err(TileError::Callback("consumer went away".to_string()))
        } else {
            Ok(())
        }
    }
}

impl TileSink for ChannelSink {
    fn on_tile_loaded(&self, tile: &TileCoord, data: &[u8]) -> Result<()> {
        let _ = self.tx.send(SinkEvent::Loaded(tile.clone(), data.to_vec()));
        self.result()
    }

    fn on_tile_failed(&self, tile: &TileCoord, reason: FailureReason) -> Result<()> {
        let _ = self.tx.send(SinkEvent::Failed(tile.clone(), reason));
        self.result()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Saved(TileCoord, Vec<u8>),
    Invalid(TileCoord),
}

#[derive(Default)]
pub struct RecordingStore {
    events: Mutex<Vec<StoreEvent>>,
}

impl RecordingStore {
    pub fn events(&self) -> Vec<StoreEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl TileStore for RecordingStore {
    fn save(&self, tile: &TileCoord, data: &[u8]) {
        self.events
            .lock()
            .unwrap()
            .push(StoreEvent::Saved(tile.clone(), data.to_vec()));
    }

    fn mark_invalid(&self, tile: &TileCoord) {
        self.events
            .lock()
            .unwrap()
            .push(StoreEvent::Invalid(tile.clone()));
    }
}

/// Image whose PNG encoding does not compress, `size` pixels square
pub fn noisy_image(size: u32) -> DynamicImage {
    let mut state: u32 = 0x1234_5678;
    let img = RgbImage::from_fn(size, size, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        };
        Rgb([next(), next(), next()])
    });
    DynamicImage::ImageRgb8(img)
}

pub fn encode(image: &DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).unwrap();
    out.into_inner()
}
