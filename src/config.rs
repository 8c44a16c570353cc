// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_API_URL: &str = "http://api.pluto.tv/v2/channels";
pub const DEFAULT_GUIDE_HOURS: u32 = 8;
pub const MAX_GUIDE_HOURS: u32 = 48;
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 1800;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub paths: PathsConfig,
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: String,
    /// Length of the guide window requested from the API.
    pub guide_hours: u32,
    pub cache_ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub cache: PathBuf,
    pub favorites: PathBuf,
    pub playlist: PathBuf,
    pub guide: PathBuf,
}

/// Location reported to the stream server in every playlist URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_API_URL.to_string(),
            guide_hours: DEFAULT_GUIDE_HOURS,
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache: PathBuf::from("cache.json"),
            favorites: PathBuf::from("favorites.txt"),
            playlist: PathBuf::from("playlist.m3u8"),
            guide: PathBuf::from("epg.xml"),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        Ok(config)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Config {
        if !path.as_ref().exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            warn!("Could not load config file, using defaults: {:#}", e);
            Self::default()
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// `~/.config/pluto-iptv/config.toml`, or `config.toml` in the working
    /// directory when the platform has no config dir.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("pluto-iptv").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Checks the guide window. Oversized windows are clamped to
    /// [`MAX_GUIDE_HOURS`], an empty window is an error.
    pub fn validate(&mut self) -> Result<()> {
        if self.api.guide_hours == 0 {
            anyhow::bail!("Guide hours must be at least 1");
        }
        if self.api.guide_hours > MAX_GUIDE_HOURS {
            warn!(
                "Guide hours cannot be longer than {}. Using max value.",
                MAX_GUIDE_HOURS
            );
            self.api.guide_hours = MAX_GUIDE_HOURS;
        }
        Ok(())
    }
}
