//! HTTP tile backend for slippy-map (XYZ) tile servers.
//!
//! The backend downloads raw tile bytes through an [`HttpClient`] and hands
//! them to an injected decoder — byte decoding is the embedding
//! application's responsibility, so the decoder arrives as a closure rather
//! than a crate dependency here.

use std::sync::Arc;

use tracing::warn;

use crate::source::{SourceError, TileSource};
use crate::tile::{Tile, TileKey};

/// Trait for HTTP GET operations.
///
/// Abstracted for dependency injection: tests supply a mock, production
/// uses [`ReqwestClient`].
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request and returns the response body.
    fn get(&self, url: &str) -> Result<Vec<u8>, SourceError>;
}

/// Blocking HTTP client backed by reqwest.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a client with a 30 second timeout.
    pub fn new() -> Result<Self, SourceError> {
        Self::with_timeout(30)
    }

    /// Creates a client with a custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SourceError::Http(format!("failed to create http client: {}", e)))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| SourceError::Http(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SourceError::Http(format!(
                "http {} from {}",
                response.status(),
                url
            )));
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| SourceError::Http(format!("failed to read response: {}", e)))
    }
}

/// Decodes downloaded tile bytes into pixel data.
pub type TileDecoder = dyn Fn(&[u8]) -> Result<Tile, SourceError> + Send + Sync;

/// Tile backend for XYZ-style tile servers.
///
/// The URL template uses `{z}`, `{x}` and `{y}` placeholders, e.g.
/// `https://tile.example.org/{z}/{x}/{y}.png`.
pub struct XyzTileSource<C: HttpClient> {
    client: C,
    url_template: String,
    decoder: Box<TileDecoder>,
    min_zoom: f64,
    max_zoom: f64,
    tile_size: u32,
    default_tile: Arc<Tile>,
}

impl<C: HttpClient> XyzTileSource<C> {
    /// Creates a source for the given server.
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client used from worker threads
    /// * `url_template` - URL with `{z}`/`{x}`/`{y}` placeholders
    /// * `decoder` - converts fetched bytes into a decoded [`Tile`]
    /// * `max_zoom` - highest zoom level the server offers
    /// * `tile_size` - native tile edge length in pixels
    /// * `default_tile` - placeholder for unfetched cells
    pub fn new(
        client: C,
        url_template: impl Into<String>,
        decoder: Box<TileDecoder>,
        max_zoom: f64,
        tile_size: u32,
        default_tile: Tile,
    ) -> Self {
        Self {
            client,
            url_template: url_template.into(),
            decoder,
            min_zoom: 0.0,
            max_zoom,
            tile_size,
            default_tile: Arc::new(default_tile),
        }
    }

    fn build_url(&self, key: TileKey) -> String {
        self.url_template
            .replace("{z}", &key.zoom.to_string())
            .replace("{x}", &key.x.to_string())
            .replace("{y}", &key.y.to_string())
    }
}

impl<C: HttpClient> TileSource for XyzTileSource<C> {
    fn init(&self) -> Result<(), SourceError> {
        Ok(())
    }

    fn release(&self) {}

    fn fetch_tile(&self, key: TileKey) -> Result<Option<Tile>, SourceError> {
        if !key.is_valid() || f64::from(key.zoom) > self.max_zoom {
            warn!(tile = %key, "fetch for key outside the pyramid");
            return Ok(None);
        }
        let url = self.build_url(key);
        let bytes = self.client.get(&url)?;
        let tile = (self.decoder)(&bytes)?;
        Ok(Some(tile))
    }

    fn min_zoom_level(&self) -> f64 {
        self.min_zoom
    }

    fn max_zoom_level(&self) -> f64 {
        self.max_zoom
    }

    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn default_tile(&self) -> Arc<Tile> {
        Arc::clone(&self.default_tile)
    }
}
