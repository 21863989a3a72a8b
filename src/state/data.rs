/// Shared data structures for the catalog
///
/// These structs represent the data model that flows between
/// the ingestion layer, the database layer and query consumers.
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Represents a single ingested pass directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pass {
    /// Unique database ID
    pub id: i64,
    /// Source directory name, unique across the catalog
    pub name: String,
    /// Satellite name as reported by the pass (e.g. "NOAA 19", "Elektro-L3")
    pub satellite: String,
    /// Epoch seconds, None when the pass metadata had no timestamp
    pub timestamp: Option<i64>,
    /// Raw downlink capture relative to the ingestion root (e.g. "PASS/data.cadu")
    pub raw_data_path: Option<String>,
}

/// Represents a single output image owned by a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    /// Unique database ID
    pub id: i64,
    /// Path relative to the ingestion root, `/` separated
    pub path: String,
    /// Lower-cased filename stem
    pub composite: String,
    pub map_overlay: bool,
    pub corrected: bool,
    pub filled: bool,
    /// Per-image capture time, only known for some formats
    pub timestamp: Option<i64>,
    /// Owning pass
    pub pass_id: i64,
}

/// Pass metadata produced by a parser, before it has a database ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassMeta {
    pub name: String,
    pub satellite: String,
    pub timestamp: Option<i64>,
    pub raw_data_path: Option<String>,
}

/// Image metadata produced by a parser, before it has a database ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub path: String,
    pub composite: String,
    pub map_overlay: bool,
    pub corrected: bool,
    pub filled: bool,
    pub timestamp: Option<i64>,
}

/// Everything one pass directory contributes to the catalog.
/// Persisted as a unit: the pass row and all of its image rows together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPass {
    pub meta: PassMeta,
    pub images: Vec<ImageRecord>,
}

/// An image joined with its pass, as returned to query consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageView {
    pub id: i64,
    pub path: String,
    pub composite: String,
    /// Human readable label from the composite catalog
    pub composite_display: String,
    pub map_overlay: bool,
    pub corrected: bool,
    pub filled: bool,
    pub pass_id: i64,
    pub satellite: String,
    pub timestamp: Option<i64>,
    /// `timestamp` rendered as UTC, for display
    pub captured_at: Option<DateTime<Utc>>,
    pub raw_data_path: Option<String>,
}
