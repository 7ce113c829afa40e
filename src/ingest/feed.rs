//! Public traffic-camera feed.
//!
//! The feed publishes a JSON array of cameras; each entry carries the URL of
//! its latest snapshot. Extra fields in the feed are ignored.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::Duration;

use url::Url;

use super::CapturedImageDir;
use crate::record::CameraRecord;

const MAX_LIST_BYTES: u64 = 16 * 1024 * 1024;
const MAX_SNAPSHOT_BYTES: u64 = 5 * 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PROGRESS_EVERY: usize = 100;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub saved: usize,
    pub failed: usize,
}

pub struct FeedClient {
    agent: ureq::Agent,
    feed_url: Url,
}

impl FeedClient {
    pub fn new(feed_url: &str) -> Result<Self> {
        let feed_url = parse_http_url(feed_url).context("parse feed url")?;
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Ok(Self { agent, feed_url })
    }

    /// Fetch the current camera list. Counts are always unset.
    pub fn fetch_cameras(&self) -> Result<Vec<CameraRecord>> {
        let body = self
            .get_bytes(self.feed_url.as_str(), MAX_LIST_BYTES)
            .context("fetch camera list")?;
        let mut cameras: Vec<CameraRecord> =
            serde_json::from_slice(&body).context("parse camera list")?;
        for camera in &mut cameras {
            camera.car_count = None;
        }
        log::info!("feed returned {} cameras", cameras.len());
        Ok(cameras)
    }

    /// Download every camera's snapshot into `dir`. A camera whose download
    /// fails is logged and its previous snapshot removed, so detection sees
    /// no data instead of a stale frame.
    pub fn capture_all(&self, cameras: &[CameraRecord], dir: &CapturedImageDir) -> CaptureStats {
        let mut stats = CaptureStats::default();
        for (i, camera) in cameras.iter().enumerate() {
            if i % PROGRESS_EVERY == 0 {
                log::info!("progress: {} images...", i);
            }
            let result = parse_http_url(&camera.image_url)
                .and_then(|url| self.get_bytes(url.as_str(), MAX_SNAPSHOT_BYTES))
                .and_then(|bytes| dir.store(&camera.id, &bytes));
            match result {
                Ok(()) => stats.saved += 1,
                Err(e) => {
                    stats.failed += 1;
                    log::warn!("camera {}: snapshot download failed: {:#}", camera.id, e);
                    if let Err(e) = dir.discard(&camera.id) {
                        log::warn!("camera {}: stale snapshot kept: {:#}", camera.id, e);
                    }
                }
            }
        }
        stats
    }

    fn get_bytes(&self, url: &str, limit: u64) -> Result<Vec<u8>> {
        let response = self
            .agent
            .get(url)
            .call()
            .with_context(|| format!("GET {}", url))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(limit + 1)
            .read_to_end(&mut bytes)
            .with_context(|| format!("read body of {}", url))?;
        if bytes.len() as u64 > limit {
            return Err(anyhow!("response from {} exceeds {} bytes", url, limit));
        }
        Ok(bytes)
    }
}

fn parse_http_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("invalid url '{}'", raw))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(anyhow!(
            "unsupported scheme '{}'; expected http(s)",
            other
        )),
    }
}
