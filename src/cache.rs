// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs as async_fs;

/// Single-file cache of the raw guide response. The file's modification
/// time is the freshness clock.
#[derive(Debug, Clone)]
pub struct GuideCache {
    path: PathBuf,
    ttl: Duration,
}

impl GuideCache {
    pub fn new<P: Into<PathBuf>>(path: P, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    /// Age of the cache file at `now`, `None` when there is no file. A
    /// modification time ahead of `now` counts as zero age.
    pub fn age_at(&self, now: SystemTime) -> Option<Duration> {
        let modified = self.modified()?;
        Some(now.duration_since(modified).unwrap_or(Duration::ZERO))
    }

    pub fn is_fresh_at(&self, now: SystemTime) -> bool {
        self.age_at(now).is_some_and(|age| age <= self.ttl)
    }

    pub fn time_until_expiry(&self, now: SystemTime) -> Duration {
        match self.age_at(now) {
            Some(age) => self.ttl.saturating_sub(age),
            None => Duration::ZERO,
        }
    }

    pub async fn read(&self) -> Result<Vec<u8>> {
        async_fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read cache file: {}", self.path.display()))
    }

    /// Overwrite the cache with `raw`, whatever it contains.
    pub async fn store(&self, raw: impl AsRef<[u8]>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                async_fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create cache directory: {}", parent.display())
                })?;
            }
        }

        async_fs::write(&self.path, raw.as_ref())
            .await
            .with_context(|| format!("Failed to write cache file: {}", self.path.display()))?;

        Ok(())
    }
}
