//! Application configuration
//!
//! Loaded from a TOML file; every section and field has a default so a
//! partial file (or none at all) is valid.

use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::pipeline::GapPolicy;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub pipeline: PipelineConfig,
    pub transform: TransformConfig,
    pub output: OutputConfig,
}

/// Socket and framing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the server listens on
    pub bind_address: String,
    /// Port the server listens on
    pub port: u16,
    /// Server the client connects to
    pub server_address: String,
    pub connect_timeout_ms: u64,
    pub tcp_nodelay: bool,
    /// SO_SNDBUF override
    pub send_buffer_size: Option<usize>,
    /// SO_RCVBUF override
    pub recv_buffer_size: Option<usize>,
    /// Largest frame accepted from a peer
    pub max_frame_len: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            server_address: format!("127.0.0.1:{}", DEFAULT_PORT),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            tcp_nodelay: true,
            send_buffer_size: None,
            recv_buffer_size: None,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl NetworkConfig {
    pub fn bind_socket_addr(&self) -> Result<SocketAddr> {
        resolve(&format!("{}:{}", self.bind_address, self.port))
    }

    pub fn server_socket_addr(&self) -> Result<SocketAddr> {
        resolve(&self.server_address)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Chunking and parallelism.
///
/// A pool of one worker serializes every chunk; very small chunks spend
/// most of their time in framing and transform setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frames per chunk
    pub chunk_frames: usize,
    /// Transform worker threads
    pub workers: usize,
    /// Depth of the pool's input and output queues (default: 2 per worker)
    pub queue_capacity: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_frames: DEFAULT_CHUNK_FRAMES,
            workers: DEFAULT_WORKERS,
            queue_capacity: None,
        }
    }
}

impl PipelineConfig {
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
            .unwrap_or(self.workers * QUEUE_DEPTH_PER_WORKER)
            .max(1)
    }
}

/// Transform applied by the server
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformConfig {
    #[default]
    Identity,
    Gain {
        db: f64,
    },
    LowPass {
        #[serde(default = "default_keep_fraction")]
        keep_fraction: f64,
    },
}

fn default_keep_fraction() -> f64 {
    DEFAULT_LOW_PASS_KEEP
}

/// Output file settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// How missing chunks are rendered when a transfer is incomplete
    pub gap_policy: GapPolicy,
}

impl AppConfig {
    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, else the per-user config file if present, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => {
                tracing::debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Per-user configuration file location
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "pcm-relay", "pcm-relay")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.workers == 0 {
            return Err(Error::Config("pipeline.workers must be at least 1".into()));
        }
        if self.pipeline.chunk_frames == 0 {
            return Err(Error::Config("pipeline.chunk_frames must be at least 1".into()));
        }
        if self.pipeline.queue_capacity == Some(0) {
            return Err(Error::Config("pipeline.queue_capacity must be at least 1".into()));
        }
        if self.network.max_frame_len == 0 {
            return Err(Error::Config("network.max_frame_len must be at least 1".into()));
        }
        Ok(())
    }
}

fn resolve(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()?
        .next()
        .ok_or_else(|| Error::Config(format!("address {} did not resolve", addr)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.pipeline.chunk_frames, DEFAULT_CHUNK_FRAMES);
        assert_eq!(config.pipeline.queue_capacity(), DEFAULT_WORKERS * 2);
        assert_eq!(config.transform, TransformConfig::Identity);
        assert_eq!(config.output.gap_policy, GapPolicy::Skip);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [pipeline]
            workers = 2

            [transform]
            type = "gain"
            db = -6.0

            [output]
            gap_policy = "silence"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.workers, 2);
        assert_eq!(config.pipeline.chunk_frames, DEFAULT_CHUNK_FRAMES);
        assert_eq!(config.transform, TransformConfig::Gain { db: -6.0 });
        assert_eq!(config.output.gap_policy, GapPolicy::Silence);
        assert_eq!(config.network.port, DEFAULT_PORT);
    }

    #[test]
    fn test_low_pass_default_fraction() {
        let config: AppConfig = toml::from_str("[transform]\ntype = \"low_pass\"\n").unwrap();
        assert_eq!(
            config.transform,
            TransformConfig::LowPass { keep_fraction: DEFAULT_LOW_PASS_KEEP }
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.pipeline.workers = 3;
        config.transform = TransformConfig::LowPass { keep_fraction: 0.5 };
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.pipeline.workers, 3);
        assert_eq!(loaded.transform, config.transform);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = AppConfig::default();
        config.pipeline.workers = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
