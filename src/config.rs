use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::mapping::SignalTable;

const DEFAULT_ACTUATOR_URL: &str = "http://192.168.4.1/sort";
const DEFAULT_TIMEOUT_MS: u64 = 1500;
const DEFAULT_MAX_RPS: f64 = 2.0;
const DEFAULT_CAMERA_URL: &str = "stub://belt_camera";
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_MIN_CONFIDENCE: f32 = 0.0;

#[derive(Debug, Deserialize, Default)]
struct SorterdConfigFile {
    actuator: Option<ActuatorConfigFile>,
    camera: Option<CameraConfigFile>,
    signals: Option<HashMap<String, String>>,
    min_confidence: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ActuatorConfigFile {
    url: Option<String>,
    request_id: Option<String>,
    timeout_ms: Option<u64>,
    max_rps: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct SorterdConfig {
    pub actuator: ActuatorSettings,
    pub camera: CameraSettings,
    pub signals: SignalTable,
    /// Detections below this confidence never actuate. 0.0 disables the
    /// filter and acts on everything the detector reports.
    pub min_confidence: f32,
}

#[derive(Debug, Clone)]
pub struct ActuatorSettings {
    pub url: String,
    /// Fixed X-Request-ID value; None generates a fresh ID per request.
    pub request_id: Option<String>,
    pub timeout: Duration,
    /// Outbound dispatch ceiling in requests per second.
    pub max_rps: f64,
}

impl ActuatorSettings {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.max_rps)
    }
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl SorterdConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SORTER_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SorterdConfigFile) -> Result<Self> {
        let actuator = ActuatorSettings {
            url: file
                .actuator
                .as_ref()
                .and_then(|actuator| actuator.url.clone())
                .unwrap_or_else(|| DEFAULT_ACTUATOR_URL.to_string()),
            request_id: file
                .actuator
                .as_ref()
                .and_then(|actuator| actuator.request_id.clone()),
            timeout: Duration::from_millis(
                file.actuator
                    .as_ref()
                    .and_then(|actuator| actuator.timeout_ms)
                    .unwrap_or(DEFAULT_TIMEOUT_MS),
            ),
            max_rps: file
                .actuator
                .and_then(|actuator| actuator.max_rps)
                .unwrap_or(DEFAULT_MAX_RPS),
        };
        let camera = CameraSettings {
            url: file
                .camera
                .as_ref()
                .and_then(|camera| camera.url.clone())
                .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            target_fps: file
                .camera
                .as_ref()
                .and_then(|camera| camera.target_fps)
                .unwrap_or(DEFAULT_CAMERA_FPS),
            width: file
                .camera
                .as_ref()
                .and_then(|camera| camera.width)
                .unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: file
                .camera
                .and_then(|camera| camera.height)
                .unwrap_or(DEFAULT_CAMERA_HEIGHT),
        };
        let signals = match file.signals {
            Some(entries) => SignalTable::new(entries)?,
            None => SignalTable::defaults(),
        };
        Ok(Self {
            actuator,
            camera,
            signals,
            min_confidence: file.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SORTER_ACTUATOR_URL") {
            if !url.trim().is_empty() {
                self.actuator.url = url;
            }
        }
        if let Ok(request_id) = std::env::var("SORTER_REQUEST_ID") {
            if !request_id.trim().is_empty() {
                self.actuator.request_id = Some(request_id);
            }
        }
        if let Ok(max_rps) = std::env::var("SORTER_MAX_RPS") {
            let parsed: f64 = max_rps
                .parse()
                .map_err(|_| anyhow!("SORTER_MAX_RPS must be a number of requests per second"))?;
            self.actuator.max_rps = parsed;
        }
        if let Ok(url) = std::env::var("SORTER_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(min_confidence) = std::env::var("SORTER_MIN_CONFIDENCE") {
            let parsed: f32 = min_confidence
                .parse()
                .map_err(|_| anyhow!("SORTER_MIN_CONFIDENCE must be a number in [0, 1]"))?;
            self.min_confidence = parsed;
        }
        if let Ok(signals) = std::env::var("SORTER_SIGNALS") {
            let entries = parse_signal_entries(&signals)?;
            if !entries.is_empty() {
                self.signals = SignalTable::new(entries)?;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let url = url::Url::parse(&self.actuator.url)
            .map_err(|e| anyhow!("invalid actuator url {:?}: {}", self.actuator.url, e))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "actuator url scheme must be http(s), got '{}'",
                    other
                ))
            }
        }
        if url.host_str().is_none() {
            return Err(anyhow!("actuator url {:?} has no host", self.actuator.url));
        }

        if self.actuator.timeout.is_zero() {
            return Err(anyhow!("actuator timeout must be greater than zero"));
        }
        if !self.actuator.max_rps.is_finite() || self.actuator.max_rps <= 0.0 {
            return Err(anyhow!("actuator max_rps must be a positive number"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(anyhow!("min_confidence must be within [0, 1]"));
        }
        if self.signals.is_empty() {
            return Err(anyhow!("signal table must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SorterdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

/// Parse `label=signal` pairs from a comma-separated list. An empty signal
/// ("other=") is a valid no-action entry.
fn parse_signal_entries(value: &str) -> Result<Vec<(String, String)>> {
    let mut entries = Vec::new();
    for pair in value.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let (label, signal) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("signal entry {:?} must be label=signal", pair))?;
        entries.push((label.trim().to_string(), signal.trim().to_string()));
    }
    Ok(entries)
}
