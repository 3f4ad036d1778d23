//! src/config.rs
//! ============================================================================
//! # Config: Viewer Configuration Loader and Saver
//!
//! Manages the tunables of the texture cache, the background indexer and the
//! decoders. Loads and saves settings as TOML from the proper cross-platform
//! config path using the [`directories`](https://docs.rs/directories) crate.
//!
//! ## Features
//! - XDG-compliant config discovery and writing (Linux, macOS, Windows)
//! - Defaults written out on first run
//! - Async load/save for smooth integration with Tokio
//! - `validate()` rejects combinations the cache cannot honour
//!
//! ## Example
//! ```rust,ignore
//! let config = Config::load().await?;
//! config.save().await?;
//! ```

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use tokio::fs as TokioFs;

use crate::error::{CoreError, CoreResult};
use crate::logging::LoggerConfig;

/// Texture cache sizing and layout policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of resident decode tasks
    pub capacity: usize,

    /// Number of indices requested ahead of the current one while navigating
    pub prefetch: usize,

    /// Float sources up to this many bits per pixel use half-float storage
    pub half_float_max_bits: u16,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 16,
            prefetch: 4,
            half_float_max_bits: 64,
        }
    }
}

/// Background indexer behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Nesting budget for container (archive) directories
    pub max_container_depth: u32,

    /// Sleep between polls while waiting for the first indexed entry
    #[serde(with = "humantime_serde")]
    pub first_entry_poll: Duration,

    /// Sleep between polls while searching for a named entry
    #[serde(with = "humantime_serde")]
    pub name_poll: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            max_container_depth: 2,
            first_entry_poll: Duration::from_millis(50),
            name_poll: Duration::from_millis(5),
        }
    }
}

/// Decoder publication granularity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Rows published per region by the standard codec
    pub band_rows: u32,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self { band_rows: 64 }
    }
}

/// Main configuration struct for the viewer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub indexer: IndexerConfig,

    #[serde(default)]
    pub decode: DecodeConfig,

    #[serde(default)]
    pub logging: LoggerConfig,
}

impl Config {
    /// Loads config from TOML file at the XDG-compliant app config dir, or returns defaults.
    ///
    /// The config is expected at `$XDG_CONFIG_HOME/fsv/config.toml`
    /// (Linux), or equivalent on Windows/macOS.
    pub async fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            info!("Loading config from {}", path.display());
            let text = TokioFs::read_to_string(&path).await?;
            let cfg = Self::from_toml_str(&text)?;

            Ok(cfg)
        } else {
            info!(
                "No config file found at {}, using default configuration. Creating it now.",
                path.display()
            );

            let default_config = Self::default();
            default_config.save().await?;

            Ok(default_config)
        }
    }

    /// Saves config to TOML file at the XDG-compliant app config dir.
    pub async fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path()?;

        info!("Saving config to {}", path.display());

        if let Some(parent) = path.parent() {
            TokioFs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        TokioFs::write(&path, toml_str).await?;

        Ok(())
    }

    /// Parses and validates a TOML document; missing sections fall back to defaults.
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;

        Ok(cfg)
    }

    /// Rejects settings the cache or indexer cannot honour.
    pub fn validate(&self) -> CoreResult<()> {
        if self.cache.capacity == 0 {
            return Err(CoreError::invalid_config(
                "cache.capacity",
                "must be greater than 0",
            ));
        }

        // prefetching a full cache would evict the image being shown
        if self.cache.prefetch >= self.cache.capacity {
            return Err(CoreError::invalid_config(
                "cache.prefetch",
                "must be smaller than cache.capacity",
            ));
        }

        if self.indexer.name_poll >= self.indexer.first_entry_poll {
            return Err(CoreError::invalid_config(
                "indexer.name_poll",
                "must be shorter than indexer.first_entry_poll",
            ));
        }

        if self.decode.band_rows == 0 {
            return Err(CoreError::invalid_config(
                "decode.band_rows",
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Returns the canonical config file path using `directories::ProjectDirs`.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Returns the config directory (without filename).
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "fsv", "fsv")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory."))?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.cache.capacity, 16);
        assert_eq!(config.cache.prefetch, 4);
        assert_eq!(config.indexer.max_container_depth, 2);
        assert!(config.indexer.name_poll < config.indexer.first_entry_poll);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = Config::from_toml_str(
            r#"
            [cache]
            capacity = 8

            [indexer]
            name_poll = "2ms"
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.capacity, 8);
        assert_eq!(config.cache.prefetch, 4);
        assert_eq!(config.indexer.name_poll, Duration::from_millis(2));
        assert_eq!(config.indexer.first_entry_poll, Duration::from_millis(50));
        assert_eq!(config.decode.band_rows, 64);
    }

    #[test]
    fn test_prefetch_must_fit_in_cache() {
        let err = Config::from_toml_str(
            r#"
            [cache]
            capacity = 4
            prefetch = 4
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("cache.prefetch"));
    }

    #[test]
    fn test_name_poll_must_be_shorter() {
        let mut config = Config::default();
        config.indexer.name_poll = Duration::from_millis(100);

        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed = Config::from_toml_str(&text).unwrap();

        assert_eq!(parsed.cache.capacity, 16);
        assert_eq!(parsed.indexer.first_entry_poll, Duration::from_millis(50));
    }
}
