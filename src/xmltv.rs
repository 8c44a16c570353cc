// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::pluto_api::{Channel, Episode, Timeline};
use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::fmt::Display;
use std::io::Write;
use tracing::debug;

pub const GENERATOR_NAME: &str = "pluto-iptv";

/// A node of the guide document before it is serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attrs.push((key.to_string(), value.into()));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    pub fn get_attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn write<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attrs {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.text.is_none() && self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        if let Some(text) = &self.text {
            writer.write_event(Event::Text(BytesText::new(text)))?;
        }
        for child in &self.children {
            child.write(writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }

    /// Serialize as a standalone XMLTV document.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::DocType(BytesText::from_escaped(
            "tv SYSTEM \"xmltv.dtd\"",
        )))?;
        self.write(&mut writer)?;

        let mut xml = String::from_utf8(writer.into_inner())
            .with_context(|| "Generated guide is not valid UTF-8")?;
        xml.push('\n');
        Ok(xml)
    }
}

/// Maps channels and their timelines to XMLTV elements, with programme times
/// rendered in `tz`.
#[derive(Debug, Clone)]
pub struct GuideBuilder<Tz: TimeZone = Local> {
    tz: Tz,
}

impl GuideBuilder<Local> {
    pub fn local() -> Self {
        Self { tz: Local }
    }
}

impl<Tz> GuideBuilder<Tz>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    fn format_time(&self, time: &DateTime<Utc>) -> String {
        time.with_timezone(&self.tz)
            .format("%Y%m%d%H%M%S %z")
            .to_string()
    }

    pub fn channel_element(&self, channel: &Channel) -> Element {
        let mut element = Element::new("channel")
            .attr("id", &channel.slug)
            .child(Element::new("display-name").text(&channel.name));

        if let Some(number) = &channel.number {
            element.push(Element::new("display-name").text(number));
        }
        if let Some(summary) = non_empty(channel.summary.as_deref()) {
            element.push(Element::new("desc").text(summary));
        }
        if let Some(logo) = non_empty(channel.logo()) {
            element.push(Element::new("icon").attr("src", logo));
        }
        element
    }

    pub fn programme_element(&self, channel: &Channel, timeline: &Timeline) -> Element {
        let mut programme = Element::new("programme")
            .attr("start", self.format_time(&timeline.start))
            .attr("stop", self.format_time(&timeline.stop))
            .attr("channel", &channel.slug)
            .child(Element::new("title").attr("lang", "en").text(&timeline.title));

        let Some(episode) = &timeline.episode else {
            return programme;
        };

        if let Some(name) = non_empty(episode.name.as_deref()) {
            if name != timeline.title {
                programme.push(Element::new("sub-title").attr("lang", "en").text(name));
            }
        }
        if let Some(description) = non_empty(episode.description.as_deref()) {
            programme.push(Element::new("desc").attr("lang", "en").text(description));
        }
        if let Some(date) = episode.first_aired.as_deref().and_then(premiere_date) {
            programme.push(Element::new("date").text(date));
        }
        for category in categories(episode) {
            programme.push(Element::new("category").attr("lang", "en").text(category));
        }
        if let Some(duration) = episode.duration {
            programme.push(
                Element::new("length")
                    .attr("units", "minutes")
                    .text((duration / 60_000).to_string()),
            );
        }
        if let Some(number) = non_empty(episode.number.as_deref()) {
            programme.push(
                Element::new("episode-num")
                    .attr("system", "onscreen")
                    .text(number),
            );
        }
        if let Some(rating) = non_empty(episode.rating.as_deref()) {
            programme.push(
                Element::new("rating")
                    .attr("system", "US")
                    .child(Element::new("value").text(rating)),
            );
        }
        programme
    }

    /// The `<tv>` root for all stitched channels.
    pub fn build(&self, channels: &[Channel]) -> Element {
        let mut tv = Element::new("tv").attr("generator-info-name", GENERATOR_NAME);

        for channel in channels.iter().filter(|c| c.is_stitched) {
            tv.push(self.channel_element(channel));

            let Some(timelines) = &channel.timelines else {
                continue;
            };
            for timeline in timelines {
                debug!(
                    "Adding instance of {} to channel {}.",
                    timeline.title, channel.name
                );
                tv.push(self.programme_element(channel, timeline));
            }
        }
        tv
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Genre, sub-genre, then a coarse category from the series type.
fn categories(episode: &Episode) -> Vec<String> {
    let mut categories = Vec::new();
    if let Some(genre) = non_empty(episode.genre.as_deref()) {
        categories.push(genre.to_string());
    }
    if let Some(sub_genre) = non_empty(episode.sub_genre.as_deref()) {
        categories.push(sub_genre.to_string());
    }
    let kind = episode.series.as_ref().and_then(|s| s.kind.as_deref());
    categories.push(
        match kind {
            Some("film") => "movie",
            Some("live") => "news",
            _ => "series",
        }
        .to_string(),
    );
    categories
}

/// `YYYYMMDD` from an RFC 3339 timestamp or a bare `YYYY-MM-DD` prefix.
fn premiere_date(raw: &str) -> Option<String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.format("%Y%m%d").to_string());
    }
    let prefix = raw.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y%m%d").to_string())
}
