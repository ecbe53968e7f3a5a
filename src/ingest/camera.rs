//! Conveyor camera source.
//!
//! `CameraSource` produces `Frame`s from either a synthetic generator
//! (`stub://` URLs, always available) or an HTTP MJPEG/JPEG-snapshot stream
//! (`http(s)://` URLs, feature `ingest-http`). The HTTP backend decimates to
//! the configured target frame rate.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-http")]
use anyhow::Context;
#[cfg(feature = "ingest-http")]
use std::io::Read;
#[cfg(feature = "ingest-http")]
use std::time::{Duration, Instant};

use super::FrameSource;
use crate::frame::Frame;

#[cfg(feature = "ingest-http")]
const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// Configuration for the conveyor camera.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Stream URL. `stub://<name>` selects the synthetic backend;
    /// `http(s)://` selects the MJPEG backend (feature `ingest-http`).
    pub url: String,
    /// Target frame rate (frames per second). The source decimates to this.
    pub target_fps: u32,
    /// Frame width (synthetic backend).
    pub width: u32,
    /// Frame height (synthetic backend).
    pub height: u32,
    /// Synthetic backend only: report exhaustion after this many frames.
    pub frame_limit: Option<u64>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://belt_camera".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
            frame_limit: None,
        }
    }
}

/// Conveyor camera frame source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-http")]
    Http(HttpCamera),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.url.starts_with("stub://") {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::new(config)),
            });
        }

        #[cfg(feature = "ingest-http")]
        {
            let url = url::Url::parse(&config.url)
                .map_err(|e| anyhow!("invalid camera url {:?}: {}", config.url, e))?;
            match url.scheme() {
                "http" | "https" => Ok(Self {
                    backend: CameraBackend::Http(HttpCamera::new(config)),
                }),
                other => Err(anyhow!(
                    "unsupported camera scheme '{}'; expected stub or http(s)",
                    other
                )),
            }
        }
        #[cfg(not(feature = "ingest-http"))]
        {
            Err(anyhow!(
                "camera url {:?} requires the ingest-http feature",
                config.url
            ))
        }
    }

    /// Connect to the camera stream.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.connect(),
            #[cfg(feature = "ingest-http")]
            CameraBackend::Http(camera) => camera.connect(),
        }
    }

    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.stats(),
            #[cfg(feature = "ingest-http")]
            CameraBackend::Http(camera) => camera.stats(),
        }
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.next_frame(),
            #[cfg(feature = "ingest-http")]
            CameraBackend::Http(camera) => camera.next_frame(),
        }
    }

    fn release(&mut self) {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.release(),
            #[cfg(feature = "ingest-http")]
            CameraBackend::Http(camera) => camera.release(),
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub url: String,
}

// ----------------------------------------------------------------------------
// Synthetic backend (stub://)
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    config: CameraConfig,
    frame_count: u64,
    /// Simulated belt state; changes occasionally so consecutive frames differ.
    scene_state: u8,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("camera: connected to {} (synthetic)", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(limit) = self.config.frame_limit {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }

        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Ok(Some(Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        )))
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.config.width * self.config.height * 3) as usize; // RGB

        if self.frame_count.is_multiple_of(50) {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }

    fn release(&mut self) {
        log::info!(
            "camera: released {} after {} frames",
            self.config.url,
            self.frame_count
        );
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// HTTP MJPEG / JPEG snapshot backend
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-http")]
struct HttpCamera {
    config: CameraConfig,
    stream: Option<HttpStream>,
    last_frame_at: Option<Instant>,
    frame_count: u64,
}

#[cfg(feature = "ingest-http")]
enum HttpStream {
    Mjpeg(MjpegStream),
    SingleJpeg,
}

#[cfg(feature = "ingest-http")]
impl HttpCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            stream: None,
            last_frame_at: None,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        let response = ureq::get(&self.config.url)
            .call()
            .context("connect to camera http stream")?;
        let content_type = response.header("Content-Type").unwrap_or("");
        if content_type.to_lowercase().contains("multipart") {
            let reader = response.into_reader();
            self.stream = Some(HttpStream::Mjpeg(MjpegStream::new(reader)));
        } else {
            self.stream = Some(HttpStream::SingleJpeg);
        }
        log::info!("camera: connected to {}", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("http camera not connected; call connect() first"))?;
        let min_interval = frame_interval(self.config.target_fps);

        loop {
            let jpeg_bytes = match stream {
                HttpStream::Mjpeg(stream) => match stream.read_next_jpeg()? {
                    Some(bytes) => bytes,
                    None => return Ok(None),
                },
                HttpStream::SingleJpeg => fetch_single_jpeg(&self.config.url)?,
            };

            let now = Instant::now();
            if let Some(last) = self.last_frame_at {
                if now.duration_since(last) < min_interval {
                    continue;
                }
            }

            let (pixels, width, height) = decode_jpeg(&jpeg_bytes)?;
            self.frame_count += 1;
            self.last_frame_at = Some(now);

            return Ok(Some(Frame::new(pixels, width, height, self.frame_count)));
        }
    }

    fn release(&mut self) {
        self.stream = None;
        log::info!(
            "camera: released {} after {} frames",
            self.config.url,
            self.frame_count
        );
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}

#[cfg(feature = "ingest-http")]
struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

#[cfg(feature = "ingest-http")]
impl MjpegStream {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    /// Read until the buffer holds one complete JPEG. `Ok(None)` on clean
    /// end of stream.
    fn read_next_jpeg(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(Some(frame));
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

#[cfg(feature = "ingest-http")]
fn fetch_single_jpeg(url: &str) -> Result<Vec<u8>> {
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("fetch jpeg snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut bytes)
        .context("read jpeg snapshot")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty jpeg snapshot"));
    }
    Ok(bytes)
}

#[cfg(feature = "ingest-http")]
fn decode_jpeg(bytes: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    use image::GenericImageView;

    let image = image::load_from_memory(bytes).context("decode jpeg")?;
    let (width, height) = image.dimensions();
    let rgb = image.into_rgb8();
    Ok((rgb.into_raw(), width, height))
}

#[cfg(feature = "ingest-http")]
fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let mut start = None;
    let mut i = 0;
    while i + 1 < buffer.len() {
        if buffer[i] == 0xFF && buffer[i + 1] == 0xD8 {
            start = Some(i);
            break;
        }
        i += 1;
    }
    let start = start?;
    let mut j = start + 2;
    while j + 1 < buffer.len() {
        if buffer[j] == 0xFF && buffer[j + 1] == 0xD9 {
            return Some((start, j + 2));
        }
        j += 1;
    }
    None
}

#[cfg(feature = "ingest-http")]
fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
