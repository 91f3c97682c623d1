use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::ingest::{CaptureSettings, SourceDescriptor};

const DEFAULT_LOCAL_INDEX: usize = 0;
const DEFAULT_TARGET_FPS: u32 = 10;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_READ_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SensorConfigFile {
    source: Option<SourceConfigFile>,
    capture: Option<CaptureConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    local_index: Option<usize>,
    url: Option<String>,
    login: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CaptureConfigFile {
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    connect_timeout_ms: Option<u64>,
    read_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SensorConfig {
    pub source: SourceDescriptor,
    pub capture: CaptureSettings,
}

impl SensorConfig {
    /// Load from the JSON file named by `SENSOR_CONFIG` (if set), then apply
    /// `SENSOR_*` environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENSOR_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut file = match path {
            Some(path) => read_config_file(path)?,
            None => SensorConfigFile::default(),
        };
        apply_env(&mut file)?;
        Self::from_file(file)
    }

    fn from_file(file: SensorConfigFile) -> Result<Self> {
        let source_cfg = file.source.unwrap_or_default();
        let source = match (source_cfg.local_index, source_cfg.url) {
            (Some(_), Some(url)) => {
                return Err(anyhow!(
                    "source: set either local_index or url, not both (url {})",
                    url
                ))
            }
            (_, Some(url)) => {
                if url.trim().is_empty() {
                    return Err(anyhow!("source.url must not be empty"));
                }
                SourceDescriptor::Remote {
                    url,
                    login: source_cfg.login.unwrap_or_default(),
                    password: source_cfg.password.unwrap_or_default(),
                }
            }
            (index, None) => SourceDescriptor::local(index.unwrap_or(DEFAULT_LOCAL_INDEX)),
        };

        let capture_cfg = file.capture.unwrap_or_default();
        let capture = CaptureSettings {
            target_fps: capture_cfg.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
            width: capture_cfg.width.unwrap_or(DEFAULT_WIDTH),
            height: capture_cfg.height.unwrap_or(DEFAULT_HEIGHT),
            connect_timeout: Duration::from_millis(
                capture_cfg
                    .connect_timeout_ms
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
            ),
            read_timeout: Duration::from_millis(
                capture_cfg
                    .read_timeout_ms
                    .unwrap_or(DEFAULT_READ_TIMEOUT_MS),
            ),
        };

        let cfg = Self { source, capture };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!("capture width and height must be greater than zero"));
        }
        if self.capture.connect_timeout.is_zero() {
            return Err(anyhow!("capture.connect_timeout_ms must be greater than zero"));
        }
        if self.capture.read_timeout.is_zero() {
            return Err(anyhow!("capture.read_timeout_ms must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            source: SourceDescriptor::default(),
            capture: CaptureSettings::default(),
        }
    }
}

/// Environment overrides win over the file. Setting `SENSOR_URL` selects the
/// remote source; setting `SENSOR_LOCAL_INDEX` selects the local one.
fn apply_env(file: &mut SensorConfigFile) -> Result<()> {
    let source = file.source.get_or_insert_with(SourceConfigFile::default);
    if let Some(url) = non_empty_env("SENSOR_URL") {
        source.url = Some(url);
        source.local_index = None;
    }
    if let Some(index) = non_empty_env("SENSOR_LOCAL_INDEX") {
        let index: usize = index
            .parse()
            .map_err(|_| anyhow!("SENSOR_LOCAL_INDEX must be a non-negative integer"))?;
        source.local_index = Some(index);
        source.url = None;
    }
    if let Some(login) = non_empty_env("SENSOR_LOGIN") {
        source.login = Some(login);
    }
    if let Some(password) = non_empty_env("SENSOR_PASSWORD") {
        source.password = Some(password);
    }

    let capture = file.capture.get_or_insert_with(CaptureConfigFile::default);
    if let Some(fps) = non_empty_env("SENSOR_TARGET_FPS") {
        capture.target_fps = Some(
            fps.parse()
                .map_err(|_| anyhow!("SENSOR_TARGET_FPS must be an integer frame rate"))?,
        );
    }
    if let Some(timeout) = non_empty_env("SENSOR_CONNECT_TIMEOUT_MS") {
        capture.connect_timeout_ms = Some(timeout.parse().map_err(|_| {
            anyhow!("SENSOR_CONNECT_TIMEOUT_MS must be an integer number of milliseconds")
        })?);
    }
    if let Some(timeout) = non_empty_env("SENSOR_READ_TIMEOUT_MS") {
        capture.read_timeout_ms = Some(timeout.parse().map_err(|_| {
            anyhow!("SENSOR_READ_TIMEOUT_MS must be an integer number of milliseconds")
        })?);
    }
    Ok(())
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<SensorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
