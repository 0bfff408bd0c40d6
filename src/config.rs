use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub relay: RelayConfig,
    pub ice: IceConfig,
    pub capture: CaptureConfig,
    pub recording: RecordingConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "mirror-session".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 5080,
        }
    }
}

/// Signaling relay settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// NATS server URL
    pub url: String,
    /// Subject prefix; each client listens on `<prefix>.<identity>`
    pub subject_prefix: String,
    /// How long to wait for the relay connection to open
    pub connect_timeout_secs: u64,
    /// How long to wait for the relay to assign an identity
    pub identity_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            subject_prefix: "mirror.signal".to_string(),
            connect_timeout_secs: 5,
            identity_timeout_secs: 5,
        }
    }
}

impl RelayConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn identity_timeout(&self) -> Duration {
        Duration::from_secs(self.identity_timeout_secs)
    }
}

/// Connectivity-assistance servers used while negotiating a peer link
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IceConfig {
    /// STUN urls; a bare `host:port` gets the `stun:` scheme
    pub servers: Vec<String>,
    /// Upper bound on candidate gathering before a descriptor is emitted
    pub gather_timeout_secs: u64,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            servers: vec!["stun:stun.l.google.com:19302".to_string()],
            gather_timeout_secs: 10,
        }
    }
}

impl IceConfig {
    pub fn gather_timeout(&self) -> Duration {
        Duration::from_secs(self.gather_timeout_secs)
    }
}

/// Local capture device settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub audio: bool,
    pub video: bool,
    /// Interval between frames produced by the capture device
    pub frame_interval_ms: u64,
    /// Frames buffered per subscriber before it starts lagging
    pub feed_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
            frame_interval_ms: 20, // 50 frames/sec
            feed_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Container mime type of the recording artifact
    pub mime_type: String,
    /// Where finalized artifacts are persisted (not persisted when unset)
    pub output_dir: Option<String>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            mime_type: "video/webm".to_string(),
            output_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Base URL of the analysis service (`/analyze` is appended)
    pub endpoint: String,
    /// Bounded wait before the fallback result is used
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000".to_string(),
            timeout_secs: 120,
        }
    }
}

impl AnalysisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from an optional file plus `MIRROR__*` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        Self::load_with_env(path, "MIRROR")
    }

    /// Same as `load` with a different environment prefix
    ///
    /// `<PREFIX>__ICE__SERVERS` takes a comma separated list.
    pub fn load_with_env(path: &str, env_prefix: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("ice.servers")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}
