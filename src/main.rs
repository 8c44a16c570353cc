// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use anyhow::{Context, Result};
use clap::Parser;
use clap::builder::styling::{AnsiColor, Effects, Styles};
use std::fs::{self, File};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use pluto_iptv::Config;
use pluto_iptv::pipeline;

fn cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Green.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
}

#[derive(Parser)]
#[command(name = "pluto-iptv")]
#[command(about = "Generate an M3U8 playlist and XMLTV guide from Pluto TV")]
#[command(version)]
#[command(styles = cargo_style())]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging to file (pluto_iptv_debug.log)
    #[arg(long)]
    debug_log: bool,

    /// Config file (defaults to ~/.config/pluto-iptv/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Favourite channel slugs, one per line
    #[arg(short, long)]
    favorites: Option<PathBuf>,

    /// Guide cache file
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Playlist output file
    #[arg(short = 'm', long)]
    playlist: Option<PathBuf>,

    /// XMLTV output file
    #[arg(short, long)]
    epg: Option<PathBuf>,

    /// Hours of guide data to request
    #[arg(short = 't', long)]
    hours: Option<u32>,

    /// Device latitude sent with stream URLs
    #[arg(short = 'y', long, allow_negative_numbers = true)]
    latitude: Option<f64>,

    /// Device longitude sent with stream URLs
    #[arg(short = 'x', long, allow_negative_numbers = true)]
    longitude: Option<f64>,

    /// Ignore the cache and fetch a new guide
    #[arg(short, long)]
    refresh: bool,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    save_config: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.favorites {
            config.paths.favorites = path.clone();
        }
        if let Some(path) = &self.cache {
            config.paths.cache = path.clone();
        }
        if let Some(path) = &self.playlist {
            config.paths.playlist = path.clone();
        }
        if let Some(path) = &self.epg {
            config.paths.guide = path.clone();
        }
        if let Some(hours) = self.hours {
            config.api.guide_hours = hours;
        }
        if let Some(latitude) = self.latitude {
            config.device.latitude = latitude;
        }
        if let Some(longitude) = self.longitude {
            config.device.longitude = longitude;
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    if cli.debug_log {
        let file = File::create("pluto_iptv_debug.log")?;
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_level(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(
                EnvFilter::from_default_env()
                    .add_directive("pluto_iptv=debug".parse()?)
                    .add_directive("hyper_util=error".parse()?),
            )
            .init();
    } else if cli.verbose {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(tracing::Level::DEBUG.into())
                    .add_directive("hyper_util=error".parse()?),
            )
            .init();
    } else {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new("pluto_iptv=info")
        };
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_env_filter(filter.add_directive("hyper_util=error".parse()?))
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    let mut config = if cli.config.is_some() {
        Config::load(&config_path)?
    } else {
        Config::load_or_default(&config_path)
    };
    cli.apply(&mut config);
    config.validate()?;

    if cli.save_config {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }
        }
        config.save(&config_path)?;
        println!("Configuration saved to {}", config_path.display());
        return Ok(());
    }

    let report = pipeline::run(&config, cli.refresh).await?;
    tracing::debug!("{:?}", report);

    Ok(())
}
