//! Configuration system for meshfwd.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $MESHFWD_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/meshfwd/config.toml
//!   3. ~/.config/meshfwd/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::identity::PeerIdentity;
use crate::wire::BEACON_DELIMITER;

/// Radio frames carry at most this many bytes, header included.
pub const MAX_FRAME_BYTES: usize = 240;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshfwdConfig {
    pub identity: IdentityConfig,
    pub radio: RadioConfig,
    pub quota: QuotaConfig,
    pub dispatch: DispatchConfig,
    pub reassembly: ReassemblyConfig,
    pub bench: BenchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Radio GID of this node.
    pub gid: u64,
    /// Application-level user id.
    pub uid: String,
    pub callsign: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Mesh,
    Pro,
    V1,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub device_type: DeviceType,
    /// Payload bytes per chunk, not counting the header byte.
    pub chunk_len: usize,
    /// Current position, if known. Used to pick the frequency region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Position assumed when the current one is unknown.
    pub fallback_latitude: f64,
    pub fallback_longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Frames the radio accepts per window.
    pub messages_per_window: u32,
    pub window_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How long the dispatcher sleeps between queue polls.
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblyConfig {
    /// Drop partial messages older than this. 0 = keep forever.
    pub timeout_secs: u64,
    pub sweep_interval_secs: u64,
    /// A repeated final chunk heard within this many ms is a duplicate.
    /// Later repeats are new messages. Keep below `dispatch.poll_interval_ms`.
    pub dedup_ms: u64,
}

/// UDP link used to run several nodes on one host without radios.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub bind: String,
    /// Addresses of the other bench nodes.
    pub peers: Vec<String>,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            gid: 1,
            uid: "meshfwd-1".into(),
            callsign: "NODE1".into(),
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            device_type: DeviceType::Mesh,
            chunk_len: 200,
            latitude: None,
            longitude: None,
            // Geographic centre of the contiguous US
            fallback_latitude: 39.83,
            fallback_longitude: -98.58,
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            messages_per_window: 5,
            window_ms: 60_000,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
        }
    }
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 0,
            sweep_interval_secs: 30,
            dedup_ms: 50,
        }
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7420".into(),
            peers: Vec::new(),
        }
    }
}

impl RadioConfig {
    pub fn location(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    pub fn fallback_location(&self) -> (f64, f64) {
        (self.fallback_latitude, self.fallback_longitude)
    }
}

impl QuotaConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl DispatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ReassemblyConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_ms)
    }
}

impl IdentityConfig {
    pub fn to_identity(&self) -> PeerIdentity {
        PeerIdentity::new(self.gid, self.uid.clone(), self.callsign.clone())
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("meshfwd")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl MeshfwdConfig {
    /// Load config: env vars → file → defaults. The result is validated.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            MeshfwdConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("MESHFWD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&MeshfwdConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Reject values the radio or the wire formats cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.radio.chunk_len == 0 || self.radio.chunk_len >= MAX_FRAME_BYTES {
            return Err(ConfigError::Invalid(format!(
                "radio.chunk_len must be in 1..={}, got {}",
                MAX_FRAME_BYTES - 1,
                self.radio.chunk_len
            )));
        }
        if self.quota.messages_per_window == 0 || self.quota.window_ms == 0 {
            return Err(ConfigError::Invalid(
                "quota.messages_per_window and quota.window_ms must be non-zero".into(),
            ));
        }
        if self.dispatch.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.poll_interval_ms must be non-zero".into(),
            ));
        }
        if self.reassembly.dedup_ms >= self.dispatch.poll_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "reassembly.dedup_ms ({}) must be below dispatch.poll_interval_ms ({})",
                self.reassembly.dedup_ms, self.dispatch.poll_interval_ms
            )));
        }
        for (name, value) in [
            ("identity.uid", &self.identity.uid),
            ("identity.callsign", &self.identity.callsign),
        ] {
            if value.is_empty() || value.contains(BEACON_DELIMITER) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be non-empty and free of '{BEACON_DELIMITER}'"
                )));
            }
        }
        Ok(())
    }

    /// Apply MESHFWD_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MESHFWD_IDENTITY__GID") {
            if let Ok(gid) = v.parse() {
                self.identity.gid = gid;
            }
        }
        if let Ok(v) = std::env::var("MESHFWD_IDENTITY__UID") {
            self.identity.uid = v;
        }
        if let Ok(v) = std::env::var("MESHFWD_IDENTITY__CALLSIGN") {
            self.identity.callsign = v;
        }
        if let Ok(v) = std::env::var("MESHFWD_RADIO__CHUNK_LEN") {
            if let Ok(n) = v.parse() {
                self.radio.chunk_len = n;
            }
        }
        if let Ok(v) = std::env::var("MESHFWD_QUOTA__MESSAGES_PER_WINDOW") {
            if let Ok(n) = v.parse() {
                self.quota.messages_per_window = n;
            }
        }
        if let Ok(v) = std::env::var("MESHFWD_BENCH__BIND") {
            self.bench.bind = v;
        }
    }
}
