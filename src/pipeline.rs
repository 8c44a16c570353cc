// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::config::Config;
use crate::favourites::{FavouritesFilter, FilterSummary};
use crate::playlist::PlaylistBuilder;
use crate::pluto_api::{Channel, PlutoApi};
use crate::xmltv::GuideBuilder;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs as async_fs;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Channels left after favourites filtering.
    pub channels: usize,
    pub playlist_entries: usize,
    pub guide_channels: usize,
    pub programmes: usize,
    /// `None` when no favourites were configured.
    pub filter: Option<FilterSummary>,
}

/// Fetch the guide (or reuse the cache) and write the playlist and XMLTV
/// files named in `config`.
pub async fn run(config: &Config, force_refresh: bool) -> Result<RunReport> {
    let mut favourites = FavouritesFilter::from_file(&config.paths.favorites)?;
    let api = PlutoApi::from_config(config)?;
    let channels = api.grab_channels(force_refresh).await?;

    generate(config, &mut favourites, channels).await
}

/// Everything after the fetch: filter, build and write both outputs.
pub async fn generate(
    config: &Config,
    favourites: &mut FavouritesFilter,
    mut channels: Vec<Channel>,
) -> Result<RunReport> {
    let filtered = !favourites.is_empty();
    if filtered {
        channels.retain(|c| favourites.test(c));
    }

    let playlist = PlaylistBuilder::new(config.device.clone()).build(&channels);
    let tv = GuideBuilder::local().build(&channels);
    let epg = tv.to_xml()?;

    write_output(&config.paths.guide, &epg).await?;
    info!("Wrote the EPG to {}!", config.paths.guide.display());

    write_output(&config.paths.playlist, &playlist).await?;
    info!("Wrote the M3U8 tuner to {}!", config.paths.playlist.display());

    if filtered {
        favourites.print_summary();
    }

    Ok(RunReport {
        channels: channels.len(),
        playlist_entries: playlist
            .lines()
            .filter(|l| l.starts_with("#EXTINF"))
            .count(),
        guide_channels: tv.children_named("channel").count(),
        programmes: tv.children_named("programme").count(),
        filter: filtered.then(|| favourites.summary()),
    })
}

async fn write_output(path: &Path, content: &str) -> Result<()> {
    async_fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
