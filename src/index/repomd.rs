// src/index/repomd.rs

//! repomd `primary.xml` reader
//!
//! Reads the package list of an RPM repository's primary metadata, either
//! plain or gzip-compressed. `rpmlib(...)` capabilities and file
//! dependencies are dropped: the former are satisfied by rpm itself and the
//! latter need file lists this reader does not load.

use super::{RawDependency, RawProvide, RawTarget, RawVersionRecord};
use crate::cache::DepType;
use crate::error::{Error, Result};
use crate::version::CompareOp;
use flate2::read::GzDecoder;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::io::Read;
use std::path::Path;
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub(super) fn parse_primary_file(path: &Path) -> Result<Vec<RawVersionRecord>> {
    let bytes = std::fs::read(path)?;
    let xml = if bytes.starts_with(&GZIP_MAGIC) {
        debug!("Decompressing gzip-compressed {}", path.display());
        let mut gz = GzDecoder::new(bytes.as_slice());
        let mut decompressed = String::new();
        gz.read_to_string(&mut decompressed).map_err(|e| {
            Error::ParseError(format!("Failed to decompress {}: {}", path.display(), e))
        })?;
        decompressed
    } else {
        String::from_utf8(bytes)
            .map_err(|e| Error::ParseError(format!("Invalid UTF-8 in {}: {}", path.display(), e)))?
    };
    parse_primary_xml(&xml)
}

/// Section of `<format>` the reader is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Provides,
    Requires,
    Conflicts,
    Obsoletes,
}

/// Parse the text of a primary.xml document
pub(super) fn parse_primary_xml(xml: &str) -> Result<Vec<RawVersionRecord>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut records = Vec::new();
    let mut buf = Vec::new();
    let mut current: Option<RecordBuilder> = None;
    let mut current_tag = String::new();
    let mut section = Section::None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = local_name(&e);
                match tag.as_str() {
                    "package" => current = Some(RecordBuilder::default()),
                    "provides" => section = Section::Provides,
                    "requires" => section = Section::Requires,
                    "conflicts" => section = Section::Conflicts,
                    "obsoletes" => section = Section::Obsoletes,
                    _ => {
                        if let Some(ref mut pkg) = current {
                            pkg.element(&tag, &e, section)?;
                        }
                    }
                }
                current_tag = tag;
            }
            Ok(Event::Empty(e)) => {
                if let Some(ref mut pkg) = current {
                    pkg.element(&local_name(&e), &e, section)?;
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(ref mut pkg) = current {
                    let text = e.unescape()?.to_string();
                    match current_tag.as_str() {
                        "name" => pkg.name = Some(text),
                        "arch" => pkg.arch = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match tag.as_str() {
                    "package" => {
                        if let Some(builder) = current.take() {
                            records.push(builder.build()?);
                        }
                    }
                    "provides" | "requires" | "conflicts" | "obsoletes" => {
                        section = Section::None;
                    }
                    _ => {}
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ParseError(format!(
                    "Failed to parse primary.xml at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_string()
}

/// Collect the attributes of an element as (key, value) pairs
fn attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
        let value = attr.unescape_value()?.to_string();
        out.push((key, value));
    }
    Ok(out)
}

fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// `[epoch:]ver[-rel]` from separate attributes, omitting a zero epoch
fn evr(epoch: Option<&str>, ver: Option<&str>, rel: Option<&str>) -> Option<String> {
    let ver = ver?;
    let mut out = String::new();
    if let Some(epoch) = epoch.filter(|e| !e.is_empty() && *e != "0") {
        out.push_str(epoch);
        out.push(':');
    }
    out.push_str(ver);
    if let Some(rel) = rel.filter(|r| !r.is_empty()) {
        out.push('-');
        out.push_str(rel);
    }
    Some(out)
}

#[derive(Default)]
struct RecordBuilder {
    name: Option<String>,
    arch: Option<String>,
    version: Option<String>,
    size: u64,
    installed_size: u64,
    location: Option<String>,
    provides: Vec<RawProvide>,
    depends: Vec<RawDependency>,
}

impl RecordBuilder {
    fn element(&mut self, tag: &str, e: &BytesStart<'_>, section: Section) -> Result<()> {
        match tag {
            "version" => {
                let attrs = attributes(e)?;
                self.version = evr(
                    attr(&attrs, "epoch"),
                    attr(&attrs, "ver"),
                    attr(&attrs, "rel"),
                );
            }
            "size" => {
                let attrs = attributes(e)?;
                self.size = parse_size(attr(&attrs, "package"))?;
                self.installed_size = parse_size(attr(&attrs, "installed"))?;
            }
            "location" => {
                let attrs = attributes(e)?;
                self.location = attr(&attrs, "href").map(str::to_string);
            }
            "entry" => self.entry(e, section)?,
            _ => {}
        }
        Ok(())
    }

    fn entry(&mut self, e: &BytesStart<'_>, section: Section) -> Result<()> {
        let attrs = attributes(e)?;
        let Some(name) = attr(&attrs, "name") else {
            return Ok(());
        };
        let version = evr(attr(&attrs, "epoch"), attr(&attrs, "ver"), attr(&attrs, "rel"));
        let op = match attr(&attrs, "flags") {
            Some(flags) => CompareOp::parse(flags)?,
            None => CompareOp::Any,
        };

        let dep_type = match section {
            Section::None => return Ok(()),
            Section::Provides => {
                if self.name.as_deref() != Some(name) {
                    self.provides.push(RawProvide {
                        name: name.to_string(),
                        version,
                    });
                }
                return Ok(());
            }
            Section::Requires => {
                if name.starts_with("rpmlib(") || name.starts_with('/') {
                    return Ok(());
                }
                if attr(&attrs, "pre").is_some_and(|p| p == "1") {
                    DepType::PreDepends
                } else {
                    DepType::Depends
                }
            }
            Section::Conflicts => DepType::Conflicts,
            Section::Obsoletes => DepType::Obsoletes,
        };

        self.depends.push(RawDependency {
            dep_type,
            targets: vec![RawTarget {
                name: name.to_string(),
                op,
                version: version.unwrap_or_default(),
            }],
        });
        Ok(())
    }

    fn build(self) -> Result<RawVersionRecord> {
        let name = self
            .name
            .ok_or_else(|| Error::ParseError("Missing package name".to_string()))?;
        let version = self
            .version
            .ok_or_else(|| Error::ParseError(format!("Missing version for {}", name)))?;
        Ok(RawVersionRecord {
            name,
            version,
            arch: self.arch.unwrap_or_else(|| "noarch".to_string()),
            size: self.size,
            installed_size: self.installed_size,
            location: self.location,
            provides: self.provides,
            depends: self.depends,
            hash: None,
        })
    }
}

fn parse_size(value: Option<&str>) -> Result<u64> {
    match value {
        Some(v) => v
            .parse()
            .map_err(|e| Error::ParseError(format!("Invalid size '{}': {}", v, e))),
        None => Ok(0),
    }
}
