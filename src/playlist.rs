// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::config::DeviceConfig;
use crate::pluto_api::Channel;
use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

pub const M3U_HEADER: &str = "#EXTM3U";

/// Builds the M3U8 playlist. Every entry gets its own device and session id.
#[derive(Debug, Clone, Default)]
pub struct PlaylistBuilder {
    device: DeviceConfig,
}

impl PlaylistBuilder {
    pub fn new(device: DeviceConfig) -> Self {
        Self { device }
    }

    /// Rewrite a stitcher URL with the client parameters the stream server
    /// expects. Any existing query and fragment are dropped.
    pub fn stream_url(&self, base: &str) -> Result<Url> {
        let mut url = Url::parse(base).with_context(|| format!("Invalid stream URL: {}", base))?;
        url.set_fragment(None);
        url.set_query(None);

        let device_id = Uuid::new_v4().to_string();
        let session_id = Uuid::new_v4().to_string();
        let latitude = format!("{:.4}", self.device.latitude);
        let longitude = format!("{:.4}", self.device.longitude);

        url.query_pairs_mut()
            .append_pair("advertisingId", "")
            .append_pair("appName", "web")
            .append_pair("appVersion", "unknown")
            .append_pair("appStoreUrl", "")
            .append_pair("architecture", "")
            .append_pair("buildVersion", "")
            .append_pair("clientTime", "0")
            .append_pair("deviceDNT", "0")
            .append_pair("deviceId", &device_id)
            .append_pair("deviceLat", &latitude)
            .append_pair("deviceLon", &longitude)
            .append_pair("deviceMake", "Chrome")
            .append_pair("deviceModel", "web")
            .append_pair("deviceType", "web")
            .append_pair("deviceVersion", "unknown")
            .append_pair("includeExtendedEvents", "false")
            .append_pair("sid", &session_id)
            .append_pair("userId", "")
            .append_pair("serverSideAds", "true");

        Ok(url)
    }

    /// The `#EXTINF` line and URL for one channel, or `None` when the channel
    /// is a placeholder or has no usable stream.
    pub fn entry(&self, channel: &Channel) -> Option<String> {
        if !channel.is_stitched {
            debug!("Skipping 'fake' channel {}.", channel.name);
            return None;
        }

        let Some(base) = channel.stream_url() else {
            warn!("Skipping {}, it has no stream URL.", channel.name);
            return None;
        };

        let url = match self.stream_url(base) {
            Ok(url) => url,
            Err(e) => {
                warn!("Skipping {}: {:#}", channel.name, e);
                return None;
            }
        };

        info!("Adding {} channel.", channel.name);

        Some(format!(
            "#EXTINF:0 channel-id=\"{}\" tvg-logo=\"{}\" group-title=\"{}\", {}\n{}\n\n",
            channel.slug,
            channel.logo().unwrap_or_default(),
            channel.category.as_deref().unwrap_or_default(),
            channel.name,
            url
        ))
    }

    pub fn build(&self, channels: &[Channel]) -> String {
        let mut m3u8 = format!("{}\n\n", M3U_HEADER);
        for channel in channels {
            if let Some(entry) = self.entry(channel) {
                m3u8.push_str(&entry);
            }
        }
        m3u8
    }
}
