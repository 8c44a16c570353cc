// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, warn};

/// Anything the favourites filter can match on.
pub trait HasSlug {
    fn slug(&self) -> &str;
}

impl HasSlug for str {
    fn slug(&self) -> &str {
        self
    }
}

impl HasSlug for String {
    fn slug(&self) -> &str {
        self
    }
}

/// Read a favourites file: one slug per line, blank lines and `#` comments
/// skipped. A missing file yields an empty list.
pub fn load_slugs<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| {
                format!("Failed to read favourites file: {}", path.display())
            });
        }
    };

    Ok(content
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSummary {
    /// Distinct favourite slugs that matched at least one channel.
    pub used: usize,
    pub evaluated: usize,
    pub unused: Vec<String>,
}

/// Restricts a channel list to the favourite slugs while counting how often
/// each favourite matched, so stale or mistyped entries can be reported.
#[derive(Debug, Default)]
pub struct FavouritesFilter {
    slugs: Vec<String>,
    tracker: HashMap<String, usize>,
    evaluated: usize,
}

impl FavouritesFilter {
    pub fn new(slugs: Vec<String>) -> Self {
        let mut tracker = HashMap::with_capacity(slugs.len());
        for slug in &slugs {
            tracker.entry(slug.clone()).or_insert(0);
        }

        Self {
            slugs,
            tracker,
            evaluated: 0,
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(load_slugs(path)?))
    }

    /// An empty filter means "keep everything", callers should skip it.
    pub fn is_empty(&self) -> bool {
        self.slugs.is_empty()
    }

    pub fn test<C: HasSlug + ?Sized>(&mut self, channel: &C) -> bool {
        self.evaluated += 1;
        match self.tracker.get_mut(channel.slug()) {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        }
    }

    pub fn evaluated(&self) -> usize {
        self.evaluated
    }

    pub fn count_for(&self, slug: &str) -> Option<usize> {
        self.tracker.get(slug).copied()
    }

    pub fn unused_favourite_slugs(&self) -> Vec<String> {
        self.slugs
            .iter()
            .filter(|s| self.tracker.get(s.as_str()) == Some(&0))
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> FilterSummary {
        FilterSummary {
            used: self.tracker.values().filter(|&&count| count > 0).count(),
            evaluated: self.evaluated,
            unused: self.unused_favourite_slugs(),
        }
    }

    pub fn print_summary(&self) {
        let summary = self.summary();
        info!(
            "Filter returned {}/{} channels",
            summary.used, summary.evaluated
        );
        if !summary.unused.is_empty() {
            warn!("Unknown favourite slugs: {}", summary.unused.join(", "));
        }
    }
}
