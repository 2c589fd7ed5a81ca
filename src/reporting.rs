// 📣 Diagnostic Channels - every classification lands in a named channel
//
// A channel is a text file under the reports directory. Channels can also
// mirror the offending node into an .osm file for a map editor, and split
// themselves into <province>/<county>/<municipality>/ sub-directories.
// Loud channels additionally go to log.txt and the tracing output.

use crate::entities::admin::AdminRegistry;
use crate::entities::place::{Hierarchy, MapPlace};
use crate::osm::{write_node, OsmNode};
use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Deepest region split: province / county / municipality
pub const MAX_SPLIT_DEPTH: usize = 3;

/// Sub-directory for records without a unit at the split level
pub const NO_REGION: &str = "_none";

const LOUD_WARNING_CHANNELS: &[&str] = &["errors", "warnings", "critical"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelOptions {
    /// Keep out of log.txt and the console
    pub quiet: bool,
    /// Mirror located messages into <channel>.osm
    pub map: bool,
    /// Region levels to split into (0..=3)
    pub split: usize,
}

impl ChannelOptions {
    pub fn new(quiet: bool, map: bool, split: usize) -> Self {
        ChannelOptions { quiet, map, split }
    }
}

// ============================================================================
// LOCATION
// ============================================================================

/// What a message is about: the node to mirror and its region names
#[derive(Debug, Clone, Copy, Default)]
pub struct Location<'a> {
    pub node: Option<&'a OsmNode>,
    pub regions: [Option<&'a str>; MAX_SPLIT_DEPTH],
}

impl<'a> Location<'a> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(node: &'a OsmNode, hierarchy: &Hierarchy, registry: &'a AdminRegistry) -> Self {
        Location {
            node: Some(node),
            ..Self::in_hierarchy(hierarchy, registry)
        }
    }

    pub fn of(place: &'a MapPlace, registry: &'a AdminRegistry) -> Self {
        Self::new(&place.node, place.hierarchy(), registry)
    }

    /// Region names only, for messages without a map node
    pub fn in_hierarchy(hierarchy: &Hierarchy, registry: &'a AdminRegistry) -> Self {
        Location {
            node: None,
            regions: [
                hierarchy
                    .province
                    .map(|id| registry.province(id).name.as_str()),
                hierarchy.county.map(|id| registry.county(id).name.as_str()),
                hierarchy
                    .municipality
                    .map(|id| registry.municipality(id).name.as_str()),
            ],
        }
    }
}

/// Make a region or channel name safe as a single path component
fn path_component(name: &str) -> String {
    match name {
        "" | "." | ".." => "_".to_string(),
        _ => name.replace(['/', '\\'], "_"),
    }
}

// ============================================================================
// CHANNEL
// ============================================================================

struct Channel {
    name: String,
    /// None for in-memory channels
    directory: Option<PathBuf>,
    level: usize,
    options: ChannelOptions,
    count: usize,
    recorded: Vec<String>,
    file: Option<BufWriter<File>>,
    map: Option<Writer<BufWriter<File>>>,
    subchannels: BTreeMap<String, Channel>,
}

impl Channel {
    fn open(
        name: &str,
        directory: Option<PathBuf>,
        level: usize,
        options: ChannelOptions,
    ) -> Result<Self> {
        let file = match &directory {
            Some(dir) => {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
                let path = dir.join(format!("{}.txt", path_component(name)));
                let file = File::create(&path)
                    .with_context(|| format!("Failed to create channel file {}", path.display()))?;
                Some(BufWriter::new(file))
            }
            None => None,
        };

        let mut channel = Channel {
            name: name.to_string(),
            directory,
            level,
            options: ChannelOptions::default(),
            count: 0,
            recorded: Vec::new(),
            file,
            map: None,
            subchannels: BTreeMap::new(),
        };
        channel.set_options(options)?;
        Ok(channel)
    }

    fn set_options(&mut self, options: ChannelOptions) -> Result<()> {
        if options.map && self.map.is_none() {
            if let Some(dir) = &self.directory {
                let path = dir.join(format!("{}.osm", path_component(&self.name)));
                let file = File::create(&path)
                    .with_context(|| format!("Failed to create map file {}", path.display()))?;
                let mut writer = Writer::new_with_indent(BufWriter::new(file), b' ', 2);
                writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
                let mut root = BytesStart::new("osm");
                root.push_attribute(("version", "0.6"));
                root.push_attribute(("generator", crate::GENERATOR_NAME));
                writer.write_event(Event::Start(root))?;
                self.map = Some(writer);
            }
        } else if !options.map {
            self.close_map()?;
        }
        self.options = ChannelOptions {
            split: options.split.min(MAX_SPLIT_DEPTH - self.level.min(MAX_SPLIT_DEPTH)),
            ..options
        };
        for sub in self.subchannels.values_mut() {
            let split = sub.options.split;
            sub.set_options(ChannelOptions { split, ..options })?;
        }
        Ok(())
    }

    fn emit(&mut self, msg: &str, location: &Location<'_>) -> Result<()> {
        self.count += 1;
        match self.file.as_mut() {
            Some(file) => writeln!(file, "{}", msg)?,
            None => self.recorded.push(msg.to_string()),
        }
        if let (Some(map), Some(node)) = (self.map.as_mut(), location.node) {
            write_node(map, node, &[])?;
        }

        if self.options.split == 0 || self.level >= MAX_SPLIT_DEPTH {
            return Ok(());
        }
        let (region, split) = match location.regions[self.level] {
            Some(name) => (path_component(name), self.options.split - 1),
            None => (NO_REGION.to_string(), 0),
        };

        if !self.subchannels.contains_key(&region) {
            let directory = self.directory.as_ref().map(|dir| dir.join(&region));
            let sub = Channel::open(
                &self.name,
                directory,
                self.level + 1,
                ChannelOptions { split, ..self.options },
            )?;
            self.subchannels.insert(region.clone(), sub);
        }
        if let Some(sub) = self.subchannels.get_mut(&region) {
            sub.options.split = split;
            sub.emit(msg, location)?;
        }
        Ok(())
    }

    fn close_map(&mut self) -> Result<()> {
        if let Some(mut map) = self.map.take() {
            map.write_event(Event::End(BytesEnd::new("osm")))?;
            map.get_mut().flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        for sub in self.subchannels.values_mut() {
            sub.close()?;
        }
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        self.close_map()
    }
}

// ============================================================================
// REPORTER
// ============================================================================

pub struct Reporter {
    root: Option<PathBuf>,
    defaults: BTreeMap<String, ChannelOptions>,
    channels: BTreeMap<String, Channel>,
    log: Option<BufWriter<File>>,
    first_error: Option<anyhow::Error>,
    show_progress: bool,
}

impl Reporter {
    /// Channels as files under `root`, which is created if needed
    pub fn to_directory(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("Failed to create reports directory {}", root.display()))?;
        let log_path = root.join("log.txt");
        let log = File::create(&log_path)
            .with_context(|| format!("Failed to create {}", log_path.display()))?;

        Ok(Reporter {
            root: Some(root.to_path_buf()),
            defaults: BTreeMap::new(),
            channels: BTreeMap::new(),
            log: Some(BufWriter::new(log)),
            first_error: None,
            show_progress: true,
        })
    }

    /// Counting-only reporter that keeps messages in memory
    pub fn in_memory() -> Self {
        Reporter {
            root: None,
            defaults: BTreeMap::new(),
            channels: BTreeMap::new(),
            log: None,
            first_error: None,
            show_progress: false,
        }
    }

    pub fn configure(&mut self, name: &str, options: ChannelOptions) {
        self.defaults.insert(name.to_string(), options);
        if let Some(channel) = self.channels.get_mut(name) {
            let result = channel.set_options(options);
            self.keep_error(result);
        }
    }

    pub fn configure_all(&mut self, table: &BTreeMap<String, ChannelOptions>) {
        for (name, options) in table {
            self.configure(name, *options);
        }
    }

    /// Emit one message on a channel
    ///
    /// I/O failures do not stop the caller; the first one is returned by
    /// `close`.
    pub fn output(&mut self, channel: &str, msg: impl Display, location: Location<'_>) {
        let msg = msg.to_string();

        if !self.channels.contains_key(channel) {
            let options = self.defaults.get(channel).copied().unwrap_or_default();
            let opened = Channel::open(channel, self.root.clone(), 0, options).or_else(|err| {
                self.keep_error(Err(err));
                Channel::open(channel, None, 0, options)
            });
            match opened {
                Ok(opened) => {
                    self.channels.insert(channel.to_string(), opened);
                }
                Err(err) => {
                    self.keep_error(Err(err));
                    return;
                }
            }
        }

        let Some(target) = self.channels.get_mut(channel) else {
            return;
        };
        let loud = !target.options.quiet;
        let emitted = target.emit(&msg, &location);
        self.keep_error(emitted);

        if loud {
            if LOUD_WARNING_CHANNELS.contains(&channel) {
                tracing::warn!(channel, "{}", msg);
            } else {
                tracing::info!(channel, "{}", msg);
            }
            if let Some(log) = self.log.as_mut() {
                let written = writeln!(log, "{}", msg).context("Failed to write log.txt");
                self.keep_error(written);
            }
        }
    }

    /// Messages emitted on a channel so far
    pub fn count(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, |c| c.count)
    }

    /// Message count per channel
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.channels
            .iter()
            .map(|(name, channel)| (name.clone(), channel.count))
            .collect()
    }

    /// Recorded messages of an in-memory channel
    pub fn messages(&self, channel: &str) -> &[String] {
        self.channels
            .get(channel)
            .map(|c| c.recorded.as_slice())
            .unwrap_or(&[])
    }

    pub fn progress(&self, label: &str, total: usize) -> Progress {
        Progress::start(label, total, self.show_progress)
    }

    /// Flush and close every channel
    pub fn close(&mut self) -> Result<()> {
        for channel in self.channels.values_mut() {
            if let Err(err) = channel.close() {
                if self.first_error.is_none() {
                    self.first_error = Some(err);
                }
            }
        }
        if let Some(mut log) = self.log.take() {
            let flushed = log.flush().context("Failed to flush log.txt");
            self.keep_error(flushed);
        }
        match self.first_error.take() {
            Some(err) => Err(err.context("Failed to write diagnostic reports")),
            None => Ok(()),
        }
    }

    fn keep_error(&mut self, result: Result<()>) {
        if let Err(err) = result {
            if self.first_error.is_none() {
                tracing::error!("reporting failed: {:#}", err);
                self.first_error = Some(err);
            }
        }
    }
}

// ============================================================================
// PROGRESS
// ============================================================================

/// Percentage ticker on stderr
pub struct Progress {
    label: String,
    total: usize,
    step: usize,
    value: usize,
    enabled: bool,
}

impl Progress {
    fn start(label: &str, total: usize, enabled: bool) -> Self {
        tracing::debug!(total, "{} started", label);
        if enabled {
            eprint!("\r{}…  ", label);
        }
        Progress {
            label: label.to_string(),
            total,
            step: (total / 100).max(1),
            value: 0,
            enabled,
        }
    }

    pub fn tick(&mut self) {
        self.value += 1;
        if self.enabled && self.value % self.step == 0 && self.total > 0 {
            eprint!("\r{}… {:>3}%  ", self.label, self.value * 100 / self.total);
        }
    }

    pub fn finish(self) {
        if self.enabled {
            eprintln!("\r{}… 100%  ", self.label);
        }
        tracing::debug!(done = self.value, "{} finished", self.label);
    }
}

// ============================================================================
// TESTS
// ============================================================================
