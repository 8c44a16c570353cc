// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::cache::GuideCache;
use crate::config::Config;
use crate::favourites::HasSlug;
use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

fn deserialize_optional_number_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value: Value = Deserialize::deserialize(deserializer)?;

    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => Err(D::Error::custom("Expected string, number, or null")),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_optional_number_as_string")]
    pub number: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Placeholder channels in the feed have this unset.
    #[serde(default)]
    pub is_stitched: bool,
    #[serde(rename = "solidLogoPNG", default)]
    pub solid_logo_png: Option<Logo>,
    #[serde(default)]
    pub stitched: Option<Stitched>,
    #[serde(default)]
    pub timelines: Option<Vec<Timeline>>,
}

impl Channel {
    pub fn logo(&self) -> Option<&str> {
        self.solid_logo_png.as_ref().map(|l| l.path.as_str())
    }

    pub fn stream_url(&self) -> Option<&str> {
        self.stitched
            .as_ref()
            .and_then(|s| s.urls.first())
            .map(|u| u.url.as_str())
    }
}

impl HasSlug for Channel {
    fn slug(&self) -> &str {
        &self.slug
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Logo {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stitched {
    #[serde(default)]
    pub urls: Vec<StitchedUrl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StitchedUrl {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub episode: Option<Episode>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub sub_genre: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_number_as_string")]
    pub number: Option<String>,
    // Kept as text, the feed's date formats are not consistent.
    #[serde(default)]
    pub first_aired: Option<String>,
    /// Milliseconds.
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub series: Option<Series>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Series {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Parse a raw guide body into channels, reporting where the JSON broke.
pub fn parse_channels(raw: impl AsRef<[u8]>) -> Result<Vec<Channel>> {
    let raw = raw.as_ref();
    serde_json::from_slice(raw).map_err(|e| {
        let text = String::from_utf8_lossy(raw);
        let line = text.lines().nth(e.line().saturating_sub(1)).unwrap_or("");
        let context: String = line
            .chars()
            .skip(e.column().saturating_sub(60))
            .take(120)
            .collect();
        let error_msg = format!(
            "JSON parsing failed at line {}, column {}:\nContext: ...{}...\nError: {}",
            e.line(),
            e.column(),
            context,
            e
        );
        warn!("JSON parsing error: {}", error_msg);
        anyhow::anyhow!(error_msg)
    })
}

/// `YYYY-MM-DD HH:00:00.000±ZZZZ`, percent-encoded for the query string.
fn format_window_bound<Tz>(time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let formatted = time.format("%Y-%m-%d %H:00:00.000%z").to_string();
    urlencoding::encode(&formatted).into_owned()
}

#[derive(Debug)]
pub struct PlutoApi {
    client: Client,
    api_url: String,
    guide_hours: u32,
    cache: GuideCache,
}

impl PlutoApi {
    pub fn new(api_url: String, guide_hours: u32, cache: GuideCache) -> Result<Self> {
        reqwest::Url::parse(&api_url).with_context(|| format!("Invalid API URL: {}", api_url))?;

        Ok(Self {
            client: Client::builder()
                .user_agent("Mozilla/5.0")
                .build()?,
            api_url,
            guide_hours,
            cache,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let cache = GuideCache::new(
            config.paths.cache.clone(),
            Duration::from_secs(config.api.cache_ttl_seconds),
        );
        Self::new(config.api.url.clone(), config.api.guide_hours, cache)
    }

    pub fn cache(&self) -> &GuideCache {
        &self.cache
    }

    /// Guide request covering the current hour through `guide_hours` ahead.
    pub fn guide_url<Tz>(&self, now: &DateTime<Tz>) -> String
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let stop = now.clone() + TimeDelta::hours(i64::from(self.guide_hours));
        format!(
            "{}?start={}&stop={}",
            self.api_url,
            format_window_bound(now),
            format_window_bound(&stop)
        )
    }

    /// Download the guide body as-is. Non-success statuses are only logged,
    /// the body still goes to the cache and the parser.
    pub async fn fetch_raw(&self, url: &str) -> Result<Vec<u8>> {
        info!("Requesting {}", url);

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} [{elapsed_precise}] {bytes}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Sending request...");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if !response.status().is_success() {
            warn!("Guide request returned status {}", response.status());
        }

        pb.set_message("Downloading...");

        let mut response_bytes = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = futures_util::StreamExt::next(&mut stream).await {
            let chunk = chunk_result.with_context(|| "Failed to read response chunk")?;
            response_bytes.extend_from_slice(&chunk);
            pb.set_position(response_bytes.len() as u64);
        }

        pb.finish_and_clear();
        debug!("Response size: {} bytes", response_bytes.len());

        Ok(response_bytes)
    }

    pub async fn grab_channels(&self, force_refresh: bool) -> Result<Vec<Channel>> {
        self.grab_channels_with(SystemTime::now(), force_refresh, |url| async move {
            self.fetch_raw(&url).await
        })
        .await
    }

    /// Cache-or-fetch with the clock and the network call supplied by the
    /// caller. `fetch` receives the guide URL for `now`.
    pub async fn grab_channels_with<F, Fut>(
        &self,
        now: SystemTime,
        force_refresh: bool,
        fetch: F,
    ) -> Result<Vec<Channel>>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Vec<u8>>>,
    {
        info!("Grabbing EPG...");

        if !force_refresh && self.cache.is_fresh_at(now) {
            let cached = self
                .cache
                .read()
                .await
                .and_then(|raw| parse_channels(&raw));
            match cached {
                Ok(channels) => {
                    info!(
                        "Using {}, it's under {} minutes old.",
                        self.cache.path().display(),
                        self.cache.ttl().as_secs() / 60
                    );
                    return Ok(channels);
                }
                Err(e) => {
                    warn!(
                        "Ignoring unusable cache {}: {:#}",
                        self.cache.path().display(),
                        e
                    );
                }
            }
        }

        let url = self.guide_url(&DateTime::<Local>::from(now));
        let raw = fetch(url).await?;

        debug!("Writing {}", self.cache.path().display());
        self.cache.store(&raw).await?;

        parse_channels(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const FIXTURE: &str = include_str!("../tests/fixtures/channels.json");

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "pluto_iptv_api_{}_{}",
            name,
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn api_with_cache(dir: &Path) -> PlutoApi {
        let cache = GuideCache::new(dir.join("cache.json"), Duration::from_secs(1800));
        PlutoApi::new(crate::config::DEFAULT_API_URL.to_string(), 8, cache).unwrap()
    }

    #[test]
    fn guide_url_spans_window_from_start_of_hour() {
        let cache = GuideCache::new("unused.json", Duration::from_secs(1800));
        let api = PlutoApi::new(crate::config::DEFAULT_API_URL.to_string(), 8, cache).unwrap();
        let now = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2020, 3, 24, 21, 37, 12)
            .unwrap();

        assert_eq!(
            api.guide_url(&now),
            "http://api.pluto.tv/v2/channels\
             ?start=2020-03-24%2021%3A00%3A00.000%2B0000\
             &stop=2020-03-25%2005%3A00%3A00.000%2B0000"
        );
    }

    #[test]
    fn guide_url_keeps_negative_offset() {
        let cache = GuideCache::new("unused.json", Duration::from_secs(1800));
        let api = PlutoApi::new(crate::config::DEFAULT_API_URL.to_string(), 48, cache).unwrap();
        let now = FixedOffset::west_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2020, 3, 24, 9, 5, 0)
            .unwrap();

        let url = api.guide_url(&now);
        assert!(url.contains("start=2020-03-24%2009%3A00%3A00.000-0500"));
        assert!(url.contains("stop=2020-03-26%2009%3A00%3A00.000-0500"));
    }

    #[test]
    fn rejects_invalid_api_url() {
        let cache = GuideCache::new("unused.json", Duration::from_secs(1800));
        assert!(PlutoApi::new("not a url".to_string(), 8, cache).is_err());
    }

    #[test]
    fn parses_fixture_feed() {
        let channels = parse_channels(FIXTURE).unwrap();
        assert_eq!(channels.len(), 4);

        let news = &channels[0];
        assert_eq!(news.slug, "pluto-tv-news");
        assert_eq!(news.number.as_deref(), Some("101"));
        assert!(news.is_stitched);
        assert!(news.stream_url().unwrap().contains("master.m3u8"));
        assert_eq!(
            news.logo(),
            Some("https://images.pluto.tv/channels/news/solidLogoPNG.png")
        );

        let timelines = news.timelines.as_ref().unwrap();
        assert_eq!(timelines.len(), 2);
        let episode = timelines[1].episode.as_ref().unwrap();
        assert_eq!(episode.number.as_deref(), Some("12"));
        assert_eq!(episode.sub_genre.as_deref(), Some("Politics"));
        assert_eq!(episode.series.as_ref().unwrap().kind.as_deref(), Some("tv"));

        assert!(!channels[2].is_stitched);
        assert!(channels[2].timelines.is_none());
        assert_eq!(channels[3].number, None);
        assert_eq!(channels[3].logo(), None);
    }

    #[test]
    fn parse_error_reports_position() {
        let err = parse_channels("[{\"slug\": }]").unwrap_err();
        assert!(err.to_string().contains("line 1"));
        assert!(parse_channels("{\"error\": \"rate limited\"}").is_err());
    }

    #[tokio::test]
    async fn fresh_cache_skips_network() {
        let dir = scratch_dir("fresh");
        let api = api_with_cache(&dir);
        api.cache().store(FIXTURE).await.unwrap();
        let t = api.cache().modified().unwrap();

        let calls = AtomicUsize::new(0);
        let channels = api
            .grab_channels_with(t + Duration::from_secs(1799), false, |_url| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, anyhow::Error>(b"[]".to_vec()) }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(channels.len(), 4);
        assert_eq!(api.cache().read().await.unwrap(), FIXTURE.as_bytes());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn stale_cache_fetches_and_overwrites() {
        let dir = scratch_dir("stale");
        let api = api_with_cache(&dir);
        api.cache().store(FIXTURE).await.unwrap();
        let t = api.cache().modified().unwrap();

        let calls = AtomicUsize::new(0);
        let fresh_body = r#"[{"slug": "only-one", "name": "Only One", "isStitched": false}]"#;
        let channels = api
            .grab_channels_with(t + Duration::from_secs(1801), false, |url| {
                calls.fetch_add(1, Ordering::SeqCst);
                assert!(url.starts_with("http://api.pluto.tv/v2/channels?start="));
                async move { Ok::<_, anyhow::Error>(fresh_body.as_bytes().to_vec()) }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].slug, "only-one");
        assert_eq!(api.cache().read().await.unwrap(), fresh_body.as_bytes());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn missing_cache_fetches() {
        let dir = scratch_dir("missing");
        let api = api_with_cache(&dir);

        let channels = api
            .grab_channels_with(SystemTime::now(), false, |_url| async {
                Ok::<_, anyhow::Error>(FIXTURE.as_bytes().to_vec())
            })
            .await
            .unwrap();

        assert_eq!(channels.len(), 4);
        assert!(api.cache().path().exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn force_refresh_ignores_fresh_cache() {
        let dir = scratch_dir("forced");
        let api = api_with_cache(&dir);
        api.cache().store(FIXTURE).await.unwrap();

        let calls = AtomicUsize::new(0);
        let channels = api
            .grab_channels_with(SystemTime::now(), true, |_url| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, anyhow::Error>(b"[]".to_vec()) }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(channels.is_empty());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn transport_error_propagates_and_keeps_cache() {
        let dir = scratch_dir("transport");
        let api = api_with_cache(&dir);
        api.cache().store(FIXTURE).await.unwrap();
        let t = api.cache().modified().unwrap();

        let result = api
            .grab_channels_with(t + Duration::from_secs(3600), false, |_url| async {
                Err::<Vec<u8>, _>(anyhow::anyhow!("connection refused"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(api.cache().read().await.unwrap(), FIXTURE.as_bytes());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn error_body_is_cached_then_fails_to_parse() {
        let dir = scratch_dir("errbody");
        let api = api_with_cache(&dir);
        let body = "<html>502 Bad Gateway</html>";

        let result = api
            .grab_channels_with(SystemTime::now(), false, |_url| async move {
                Ok::<_, anyhow::Error>(body.as_bytes().to_vec())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(api.cache().read().await.unwrap(), body.as_bytes());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn non_utf8_body_is_cached_then_fails_to_parse() {
        let dir = scratch_dir("binary");
        let api = api_with_cache(&dir);
        api.cache().store(FIXTURE).await.unwrap();
        let t = api.cache().modified().unwrap();

        let result = api
            .grab_channels_with(t + Duration::from_secs(3600), false, |_url| async {
                Ok::<_, anyhow::Error>(vec![0xff, 0xfe])
            })
            .await;

        assert!(result.is_err());
        assert_eq!(api.cache().read().await.unwrap(), vec![0xff, 0xfe]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn unparsable_fresh_cache_is_refetched() {
        let dir = scratch_dir("corrupt");
        let api = api_with_cache(&dir);
        api.cache().store("not json").await.unwrap();

        let calls = AtomicUsize::new(0);
        let channels = api
            .grab_channels_with(SystemTime::now(), false, |_url| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, anyhow::Error>(FIXTURE.as_bytes().to_vec()) }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(channels.len(), 4);
        assert_eq!(api.cache().read().await.unwrap(), FIXTURE.as_bytes());

        fs::remove_dir_all(&dir).unwrap();
    }

    /// One-shot HTTP server that sends `head` of the body, waits `pause`,
    /// then sends `tail`.
    async fn serve_once(head: &'static [u8], pause: Duration, tail: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4096];
            let _ = socket.read(&mut request).await.unwrap();

            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                head.len() + tail.len()
            );
            socket.write_all(header.as_bytes()).await.unwrap();
            socket.write_all(head).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(pause).await;
            socket.write_all(tail).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{}/v2/channels", addr)
    }

    #[tokio::test]
    async fn fetch_waits_for_a_stalled_body() {
        let url = serve_once(b"[", Duration::from_secs(2), b"]").await;
        let cache = GuideCache::new("unused.json", Duration::from_secs(1800));
        let api = PlutoApi::new(url.clone(), 8, cache).unwrap();

        let body = api.fetch_raw(&url).await.unwrap();
        assert_eq!(body, b"[]");
    }

    #[tokio::test]
    async fn served_non_utf8_body_reaches_the_cache() {
        let url = serve_once(&[0xff, 0xfe], Duration::ZERO, b"x").await;
        let dir = scratch_dir("served_binary");
        let cache = GuideCache::new(dir.join("cache.json"), Duration::from_secs(1800));
        let api = PlutoApi::new(url, 8, cache).unwrap();

        let result = api.grab_channels(false).await;
        assert!(result.is_err());
        assert_eq!(api.cache().read().await.unwrap(), vec![0xff, 0xfe, b'x']);

        fs::remove_dir_all(&dir).unwrap();
    }
}
