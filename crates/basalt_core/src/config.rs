//! # Server Configuration
//!
//! Process-wide settings, deserialized from a TOML file once at startup.
//! Every field has the documented default, so an absent file or a partial
//! file both yield a runnable server.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Configuration loading failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The file exists but is not valid TOML for this schema.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Process-wide server settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// TCP bind port for the chunk pipeline.
    pub tcp_port: u16,
    /// UDP bind port for the entity bus. `None` means `tcp_port + 1`.
    pub udp_port: Option<u16>,
    /// Deterministic seed feeding all noise channels.
    pub world_seed: u64,
    /// Chunk X/Z dimension in voxels.
    pub chunk_size: usize,
    /// Chunk Y dimension in voxels.
    pub chunk_size_y: usize,
    /// Server loop cadence in ticks per second.
    pub tick_rate: u32,
    /// Mesh cache capacity in entries.
    pub max_cached_meshes: usize,
    /// Column cache capacity in entries.
    pub max_cached_columns: usize,
    /// TCP send/receive timeout in seconds.
    pub io_timeout_secs: u64,
    /// Directory receiving the startup-dated log file.
    pub log_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tcp_port: 42069,
            udp_port: None,
            world_seed: 69420,
            chunk_size: 32,
            chunk_size_y: 96,
            tick_rate: 60,
            max_cached_meshes: 20_000,
            max_cached_columns: 20_000,
            io_timeout_secs: 5,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from `path`.
    ///
    /// A missing file yields the defaults; a present but malformed file is
    /// an error so a typo never silently boots a default server.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// The effective UDP port (defaults to `tcp_port + 1`).
    #[inline]
    #[must_use]
    pub fn effective_udp_port(&self) -> u16 {
        self.udp_port.unwrap_or_else(|| self.tcp_port.wrapping_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let config = ServerConfig::default();
        assert_eq!(config.tcp_port, 42069);
        assert_eq!(config.effective_udp_port(), 42070);
        assert_eq!(config.world_seed, 69420);
        assert_eq!(config.chunk_size, 32);
        assert_eq!(config.chunk_size_y, 96);
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.max_cached_meshes, 20_000);
        assert_eq!(config.max_cached_columns, 20_000);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: ServerConfig = toml::from_str("tcp_port = 9000").unwrap();
        assert_eq!(config.tcp_port, 9000);
        assert_eq!(config.effective_udp_port(), 9001);
        assert_eq!(config.world_seed, 69420);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<ServerConfig, _> = toml::from_str("tpc_port = 9000");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = ServerConfig::load(Path::new("/nonexistent/basalt.toml")).unwrap();
        assert_eq!(config.tcp_port, 42069);
    }

    #[test]
    fn test_explicit_udp_port() {
        let config: ServerConfig = toml::from_str("udp_port = 5555").unwrap();
        assert_eq!(config.effective_udp_port(), 5555);
    }
}
