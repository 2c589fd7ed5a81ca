// 🗺️ OSM Nodes - read OSM 0.6 XML exports, write nodes back out
//
// Only nodes matter here; ways and relations (and their tags) are skipped.

use anyhow::{Context, Result};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// A point feature as found in the map export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsmNode {
    pub id: String,
    pub version: Option<String>,
    pub changeset: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub tags: BTreeMap<String, String>,
}

impl OsmNode {
    pub fn new(id: impl Into<String>, lat: f64, lon: f64) -> Self {
        OsmNode {
            id: id.into(),
            version: None,
            changeset: None,
            lat,
            lon,
            tags: BTreeMap::new(),
        }
    }

    /// Builder pattern: add a tag
    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.tag("name")
    }
}

// ============================================================================
// READING
// ============================================================================

fn attr_value(event: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in event.attributes().with_checks(false) {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.to_string()));
        }
    }
    Ok(None)
}

fn node_from_start(event: &BytesStart<'_>) -> Result<Option<OsmNode>> {
    let id = attr_value(event, b"id")?;
    let lat = attr_value(event, b"lat")?.and_then(|v| v.parse::<f64>().ok());
    let lon = attr_value(event, b"lon")?.and_then(|v| v.parse::<f64>().ok());

    match (id, lat, lon) {
        (Some(id), Some(lat), Some(lon)) => {
            let mut node = OsmNode::new(id, lat, lon);
            node.version = attr_value(event, b"version")?;
            node.changeset = attr_value(event, b"changeset")?;
            Ok(Some(node))
        }
        (id, _, _) => {
            tracing::warn!(id = ?id, "skipping node without id or coordinates");
            Ok(None)
        }
    }
}

/// Read all nodes of an OSM XML document
pub fn read_nodes<R: BufRead>(input: R) -> Result<Vec<OsmNode>> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);

    let mut nodes = Vec::new();
    let mut current: Option<OsmNode> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => {
                if e.name().as_ref() == b"node" {
                    current = node_from_start(&e)?;
                }
            }
            Event::Empty(e) => match e.name().as_ref() {
                b"node" => {
                    if let Some(node) = node_from_start(&e)? {
                        nodes.push(node);
                    }
                }
                b"tag" => {
                    if let Some(node) = current.as_mut() {
                        let key = attr_value(&e, b"k")?;
                        let value = attr_value(&e, b"v")?;
                        if let (Some(key), Some(value)) = (key, value) {
                            node.tags.insert(key, value);
                        }
                    }
                }
                _ => {}
            },
            Event::End(e) => {
                if e.name().as_ref() == b"node" {
                    if let Some(node) = current.take() {
                        nodes.push(node);
                    }
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(nodes)
}

pub fn load_nodes(path: &Path) -> Result<Vec<OsmNode>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open map export: {}", path.display()))?;
    read_nodes(BufReader::new(file))
        .with_context(|| format!("Failed to parse map export: {}", path.display()))
}

// ============================================================================
// WRITING
// ============================================================================

/// Write one node element
///
/// `extra` tags are appended after the node's own tags and replace any own
/// tag with the same key.
pub fn write_node<W: Write>(
    writer: &mut Writer<W>,
    node: &OsmNode,
    extra: &[(&str, &str)],
) -> Result<()> {
    let mut start = BytesStart::new("node");
    start.push_attribute(("id", node.id.as_str()));
    if let Some(version) = &node.version {
        start.push_attribute(("version", version.as_str()));
    }
    if let Some(changeset) = &node.changeset {
        start.push_attribute(("changeset", changeset.as_str()));
    }
    let lat = node.lat.to_string();
    let lon = node.lon.to_string();
    start.push_attribute(("lat", lat.as_str()));
    start.push_attribute(("lon", lon.as_str()));

    let own_tags: Vec<(&str, &str)> = node
        .tags
        .iter()
        .filter(|(k, _)| !extra.iter().any(|(extra_key, _)| extra_key == k))
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    if own_tags.is_empty() && extra.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for (key, value) in own_tags.iter().chain(extra.iter()) {
        let mut tag = BytesStart::new("tag");
        tag.push_attribute(("k", *key));
        tag.push_attribute(("v", *value));
        writer.write_event(Event::Empty(tag))?;
    }
    writer.write_event(Event::End(BytesEnd::new("node")))?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
