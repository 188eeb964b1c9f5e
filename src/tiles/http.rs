//! HTTP fetch abstraction shared by all download workers

use crate::core::config::DownloaderConfig;
use crate::prelude::HashMap;
use crate::Result;
use std::fmt;
use std::io::{self, Read};

/// Parsed `Content-Type`, parameters dropped and lowercased
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType {
    pub top_level: String,
    pub subtype: String,
}

impl MediaType {
    pub fn new(top_level: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            top_level: top_level.into().to_ascii_lowercase(),
            subtype: subtype.into().to_ascii_lowercase(),
        }
    }

    /// Parse a header value such as `image/png; charset=binary`
    pub fn parse(value: &str) -> Option<Self> {
        let essence = value.split(';').next()?.trim();
        let (top_level, subtype) = essence.split_once('/')?;
        let (top_level, subtype) = (top_level.trim(), subtype.trim());
        if top_level.is_empty() || subtype.is_empty() {
            return None;
        }
        Some(Self::new(top_level, subtype))
    }

    pub fn is_text(&self) -> bool {
        self.top_level == "text"
    }

    pub fn is_png(&self) -> bool {
        self.subtype == "png"
    }

    pub fn is_bmp(&self) -> bool {
        matches!(self.subtype.as_str(), "bmp" | "x-ms-bmp" | "x-bmp")
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.top_level, self.subtype)
    }
}

/// Transport failure: no status code was seen, or the body could not be read
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("reading body failed: {0}")]
    Body(String),
}

impl FetchError {
    /// Short name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect(_) => "Connect",
            Self::Timeout(_) => "Timeout",
            Self::Request(_) => "Request",
            Self::Body(_) => "Body",
        }
    }
}

impl From<io::Error> for FetchError {
    fn from(e: io::Error) -> Self {
        Self::Body(e.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

type CloseHook = Box<dyn FnOnce() -> io::Result<()> + Send>;

/// An open HTTP response.
///
/// Owning the value owns the underlying connection: it is released exactly
/// once when the response is dropped, whether or not the body was drained.
pub struct FetchResponse {
    status: u16,
    headers: HashMap<String, String>,
    content_type: Option<MediaType>,
    body: Box<dyn Read + Send>,
    on_close: Option<CloseHook>,
}

impl FetchResponse {
    /// `headers` names are matched case-insensitively
    pub fn new(
        status: u16,
        headers: impl IntoIterator<Item = (String, String)>,
        body: Box<dyn Read + Send>,
    ) -> Self {
        let headers: HashMap<String, String> = headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        let content_type = headers.get("content-type").and_then(|v| MediaType::parse(v));
        Self {
            status,
            headers,
            content_type,
            body,
            on_close: None,
        }
    }

    /// Run `hook` when the response is released. A failing hook is logged.
    pub fn with_close_hook(
        mut self,
        hook: impl FnOnce() -> io::Result<()> + Send + 'static,
    ) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&MediaType> {
        self.content_type.as_ref()
    }

    /// Read the whole body into memory
    pub fn read_body(&mut self) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        self.body.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Read at most `limit` bytes of the body as (lossy) text, for diagnostics
    pub fn body_snippet(&mut self, limit: usize) -> String {
        let mut data = Vec::with_capacity(limit);
        match (&mut self.body).take(limit as u64).read_to_end(&mut data) {
            Ok(_) => String::from_utf8_lossy(&data).into_owned(),
            Err(e) => format!("<unreadable body: {}>", e),
        }
    }
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl Drop for FetchResponse {
    fn drop(&mut self) {
        if let Some(hook) = self.on_close.take() {
            if let Err(e) = hook() {
                log::warn!("failed to release tile response: {}", e);
            }
        }
    }
}

/// Anything able to perform a tile GET.
///
/// One instance is shared read-only by every worker.
pub trait TileFetcher: Send + Sync {
    /// `Err` only for connection-level failures; any HTTP status is an `Ok` response.
    fn fetch(&self, url: &str) -> std::result::Result<FetchResponse, FetchError>;
}

/// Blocking reqwest client configured once with the downloader timeouts
#[derive(Debug, Clone)]
pub struct HttpTileFetcher {
    client: reqwest::blocking::Client,
}

impl HttpTileFetcher {
    pub fn new(config: &DownloaderConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout())
            // blocking client: also bounds every read from the body
            .timeout(config.read_timeout())
            .pool_max_idle_per_host(config.max_workers)
            .build()?;
        Ok(Self { client })
    }
}

impl TileFetcher for HttpTileFetcher {
    fn fetch(&self, url: &str) -> std::result::Result<FetchResponse, FetchError> {
        let response = self.client.get(url).send()?;
        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        Ok(FetchResponse::new(status, headers, Box::new(response)))
    }
}
