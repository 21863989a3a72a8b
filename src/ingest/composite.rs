/// Composite catalog
///
/// Maps filename substrings to human readable composite labels.
/// Several keys are substrings of others ("AVHRR-2" and a generic "AVHRR",
/// "MSU-MR-" and the false color keys), so lookups pick the longest key.
use serde::Serialize;

/// Built-in composite keys and their display labels, in table order
pub const COMPOSITE_TYPES: &[(&str, &str)] = &[
    ("AVHRR_221", "AVHRR 221"),
    ("AVHRR_3a21", "AVHRR 3a21"),
    ("Cloud_Convection", "Cloud Convection"),
    ("avhrr_3_rgb_MCIR_Rain_", "MCIR Rain"),
    ("projected", "Projection"),
    ("MSU-MR-", "LRPT Channel"),
    ("L3_1", "L3 Channel 1"),
    ("L3_2", "L3 Channel 2"),
    ("L3_3", "L3 Channel 3"),
    ("L3_4", "L3 Channel 4"),
    ("L3_9", "L3 Channel 9"),
    ("10.8um", "10.8um IR"),
    ("GS_321_", "321 False Color"),
    ("Natural_Color", "Natural Color"),
    ("APT-A", "APT Channel A"),
    ("APT-B", "APT Channel B"),
    ("raw_", "Raw APT"),
    ("AVHRR-2", "AVHRR Channel 2"),
    ("AVHRR-4", "AVHRR Channel 4"),
];

/// One catalog row, in the shape filter UIs consume
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositeEntry {
    pub value: &'static str,
    pub label: &'static str,
}

/// Lookup table over composite keys
#[derive(Debug, Clone, Copy)]
pub struct CompositeCatalog {
    entries: &'static [(&'static str, &'static str)],
}

impl Default for CompositeCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CompositeCatalog {
    /// The catalog used for all ingested imagery
    pub const fn builtin() -> Self {
        Self {
            entries: COMPOSITE_TYPES,
        }
    }

    pub const fn new(entries: &'static [(&'static str, &'static str)]) -> Self {
        Self { entries }
    }

    /// The `{value, label}` table in table order
    pub fn entries(&self) -> Vec<CompositeEntry> {
        self.entries
            .iter()
            .map(|&(value, label)| CompositeEntry { value, label })
            .collect()
    }

    /// Whether `key` is a registered composite key (exact match)
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    /// Display label for a composite value.
    ///
    /// Picks the longest registered key contained in the value (case-insensitive),
    /// first in table order on ties. Falls back to the raw value, then "Unknown".
    pub fn display_label(&self, composite: Option<&str>) -> String {
        let Some(composite) = composite.filter(|c| !c.is_empty()) else {
            return "Unknown".to_string();
        };
        let haystack = composite.to_lowercase();

        let mut best: Option<(&str, &str)> = None;
        for &(key, label) in self.entries {
            if !haystack.contains(&key.to_lowercase()) {
                continue;
            }
            if best.map_or(true, |(b, _)| key.len() > b.len()) {
                best = Some((key, label));
            }
        }

        match best {
            Some((_, label)) => label.to_string(),
            None => composite.to_string(),
        }
    }
}

/// Display label using the built-in catalog
pub fn display_label(composite: &str) -> String {
    CompositeCatalog::builtin().display_label(Some(composite))
}
