//! Acquisition start/stop times from product metadata.
//!
//! Times are looked up in the GDAL metadata of the product first; when absent
//! there, an XML metadata document next to the product is searched for
//! `Product_Info/PRODUCT_START_TIME` and `PRODUCT_STOP_TIME`. Every lookup
//! failure is recovered with a warning and `None`.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Serialize;
use tracing::{debug, warn};

const START_KEYS: [&str; 2] = ["PRODUCT_START_TIME", "ACQUISITION_START"];
const STOP_KEYS: [&str; 2] = ["PRODUCT_STOP_TIME", "ACQUISITION_STOP"];

/// Product acquisition interval; either end may be unknown.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AcquisitionTimes {
    pub start: Option<DateTime<Utc>>,
    pub stop: Option<DateTime<Utc>>,
}

impl AcquisitionTimes {
    pub fn is_complete(&self) -> bool {
        self.start.is_some() && self.stop.is_some()
    }

    /// Fill the unknown ends from `other`.
    pub fn or(self, other: AcquisitionTimes) -> Self {
        Self {
            start: self.start.or(other.start),
            stop: self.stop.or(other.stop),
        }
    }
}

/// Parse a UTC timestamp as written by the common product formats:
/// RFC 3339, ISO 8601 without zone, or `01-JUN-2020 10:00:00.000000`.
pub fn parse_utc(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    let trimmed = text.trim_end_matches('Z');
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%d-%b-%Y %H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(t.and_utc());
        }
    }
    None
}

fn lookup(metadata: &HashMap<String, String>, keys: &[&str]) -> Option<DateTime<Utc>> {
    let (key, raw) = keys
        .iter()
        .find_map(|k| metadata.get(*k).map(|v| (*k, v)))?;
    match parse_utc(raw) {
        Some(t) => Some(t),
        None => {
            warn!("Could not parse {}='{}' as a UTC time", key, raw);
            None
        }
    }
}

/// Times from a GDAL metadata map.
pub fn times_from_metadata(metadata: &HashMap<String, String>) -> AcquisitionTimes {
    AcquisitionTimes {
        start: lookup(metadata, &START_KEYS),
        stop: lookup(metadata, &STOP_KEYS),
    }
}

/// Times from an XML metadata document held in memory.
pub fn times_from_xml_str(xml: &str) -> AcquisitionTimes {
    let mut reader = Reader::from_str(xml);
    match scan_product_info(&mut reader, &mut Vec::new()) {
        Ok(times) => times,
        Err(e) => {
            warn!("Failed to parse XML metadata: {}", e);
            AcquisitionTimes::default()
        }
    }
}

/// Times from an XML metadata file.
pub fn times_from_xml_file(path: &Path) -> AcquisitionTimes {
    let mut reader = match Reader::from_file(path) {
        Ok(r) => r,
        Err(e) => {
            warn!("Cannot open XML metadata {:?}: {}", path, e);
            return AcquisitionTimes::default();
        }
    };
    match scan_product_info(&mut reader, &mut Vec::new()) {
        Ok(times) => times,
        Err(e) => {
            warn!("Failed to parse XML metadata {:?}: {}", path, e);
            AcquisitionTimes::default()
        }
    }
}

fn scan_product_info<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
) -> Result<AcquisitionTimes, quick_xml::Error> {
    reader.trim_text(true);
    let mut times = AcquisitionTimes::default();
    let mut curr = String::new();
    let mut in_product_info = false;

    loop {
        match reader.read_event_into(buf)? {
            Event::Start(ref e) => {
                let tag = local_name(e.name().as_ref());
                if tag == "Product_Info" {
                    in_product_info = true;
                }
                curr = tag;
            }
            Event::End(ref e) => {
                if local_name(e.name().as_ref()) == "Product_Info" {
                    in_product_info = false;
                }
                curr.clear();
            }
            Event::Text(e) if in_product_info => {
                let txt = e.unescape()?;
                match curr.as_str() {
                    "PRODUCT_START_TIME" => times.start = parse_or_warn(&curr, &txt),
                    "PRODUCT_STOP_TIME" => times.stop = parse_or_warn(&curr, &txt),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(times)
}

fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.to_string(),
    }
}

fn parse_or_warn(tag: &str, text: &str) -> Option<DateTime<Utc>> {
    let parsed = parse_utc(text);
    if parsed.is_none() {
        warn!("Could not parse {}='{}' as a UTC time", tag, text);
    }
    parsed
}

/// XML documents that may accompany a raster: `<stem>.xml`, `<file>.xml`
/// and `MTD*.xml` files in the same directory.
pub fn candidate_xml_files(raster: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![raster.with_extension("xml")];
    let mut sidecar = raster.as_os_str().to_owned();
    sidecar.push(".xml");
    candidates.push(PathBuf::from(sidecar));
    if let Some(dir) = raster.parent().and_then(|d| std::fs::read_dir(d).ok()) {
        let mut mtd: Vec<PathBuf> = dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("MTD") && n.ends_with(".xml"))
            })
            .collect();
        mtd.sort();
        candidates.extend(mtd);
    }
    candidates.into_iter().filter(|p| p.is_file()).collect()
}

/// Resolve acquisition times for a raster from its metadata map, falling back
/// to accompanying XML documents.
pub fn acquisition_times(raster: &Path, metadata: &HashMap<String, String>) -> AcquisitionTimes {
    let mut times = times_from_metadata(metadata);
    if times.is_complete() {
        return times;
    }
    for xml in candidate_xml_files(raster) {
        debug!("Looking up acquisition times in {:?}", xml);
        times = times.or(times_from_xml_file(&xml));
        if times.is_complete() {
            break;
        }
    }
    if times.start.is_none() {
        warn!("No acquisition start time found for {:?}", raster);
    }
    times
}
