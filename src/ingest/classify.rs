/// Pass format classification
///
/// Each supported downlink format leaves a different marker in the pass
/// directory. `classify` checks them in a fixed order and returns the
/// format together with whatever descriptor it had to read to decide.
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CatalogError, Result};

/// Dataset descriptor written for NOAA and METEOR passes
pub const DATASET_FILE: &str = "dataset.json";

/// Composite cache descriptor written for Elektro passes
pub const COMPOSITE_CACHE_FILE: &str = ".composite_cache_do_not_delete.json";

/// Image root of FengYun (S-VISSR) passes
pub const FENGYUN_IMAGE_DIR: &str = "IMAGE";

/// `dataset.json` contents
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub satellite: Option<String>,
    /// Epoch seconds, may be fractional
    #[serde(default)]
    pub timestamp: Option<f64>,
}

impl Dataset {
    /// Satellite name, "Unknown" when missing or empty
    pub fn satellite_name(&self) -> &str {
        self.satellite
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown")
    }

    /// Timestamp truncated to whole seconds
    pub fn timestamp_secs(&self) -> Option<i64> {
        self.timestamp.and_then(whole_seconds)
    }
}

#[derive(Debug, Deserialize)]
struct CacheEntry {
    #[serde(default)]
    time: Option<f64>,
}

/// Composite cache contents: relative subpath -> capture time, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeCache {
    entries: Vec<(String, Option<i64>)>,
}

impl CompositeCache {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)?;
        let mut entries = Vec::with_capacity(map.len());
        for (subpath, value) in map {
            let entry: CacheEntry = serde_json::from_value(value)?;
            entries.push((subpath, entry.time.and_then(whole_seconds)));
        }
        Ok(Self { entries })
    }

    /// Time of the first entry, used as the pass timestamp
    pub fn first_time(&self) -> Option<i64> {
        self.entries.first().and_then(|(_, time)| *time)
    }

    /// Time recorded for a relative subpath such as `IMAGES/ELEKTRO-L3/<subfolder>`
    pub fn time_for(&self, subpath: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|(key, _)| key == subpath)
            .and_then(|(_, time)| *time)
    }
}

/// Supported pass formats
#[derive(Debug, Clone, PartialEq)]
pub enum PassFormat {
    Noaa(Dataset),
    Meteor(Dataset),
    Elektro(CompositeCache),
    FengYun,
    /// No recognized marker. A dataset naming some other satellite is kept
    /// so the pass still records its name and timestamp.
    Unknown(Option<Dataset>),
}

impl PassFormat {
    pub fn name(&self) -> &'static str {
        match self {
            PassFormat::Noaa(_) => "NOAA",
            PassFormat::Meteor(_) => "METEOR",
            PassFormat::Elektro(_) => "ELEKTRO",
            PassFormat::FengYun => "FENGYUN",
            PassFormat::Unknown(_) => "UNKNOWN",
        }
    }
}

/// Decide which parser handles `pass_dir`.
///
/// Order: dataset descriptor ("noaa" before "meteor", case-insensitive),
/// composite cache descriptor, `IMAGE` directory. A descriptor that exists
/// but does not parse is an error for this pass only.
pub fn classify(pass_dir: &Path) -> Result<PassFormat> {
    let dataset_path = pass_dir.join(DATASET_FILE);
    if dataset_path.is_file() {
        let dataset: Dataset = serde_json::from_str(&read_descriptor(&dataset_path)?)
            .map_err(|e| CatalogError::descriptor(&dataset_path, e))?;

        let satellite = dataset.satellite_name().to_lowercase();
        return Ok(if satellite.contains("noaa") {
            PassFormat::Noaa(dataset)
        } else if satellite.contains("meteor") {
            PassFormat::Meteor(dataset)
        } else {
            PassFormat::Unknown(Some(dataset))
        });
    }

    if let Some(cache_path) = find_composite_cache(pass_dir)? {
        let cache = CompositeCache::from_json(&read_descriptor(&cache_path)?)
            .map_err(|e| CatalogError::descriptor(&cache_path, e))?;
        return Ok(PassFormat::Elektro(cache));
    }

    if pass_dir.join(FENGYUN_IMAGE_DIR).is_dir() {
        return Ok(PassFormat::FengYun);
    }

    Ok(PassFormat::Unknown(None))
}

/// The well-known cache name, else any `*.composite_cache*.json`
fn find_composite_cache(pass_dir: &Path) -> Result<Option<PathBuf>> {
    let exact = pass_dir.join(COMPOSITE_CACHE_FILE);
    if exact.is_file() {
        return Ok(Some(exact));
    }

    let entries = fs::read_dir(pass_dir).map_err(|e| CatalogError::io(pass_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| CatalogError::io(pass_dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.contains(".composite_cache") && name.ends_with(".json") && entry.path().is_file() {
            return Ok(Some(entry.path()));
        }
    }

    Ok(None)
}

fn read_descriptor(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))
}

fn whole_seconds(secs: f64) -> Option<i64> {
    secs.is_finite().then(|| secs.floor() as i64)
}
