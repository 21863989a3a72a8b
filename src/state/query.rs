/// Read-only query surface over passes and images
///
/// Builds the SQL for image listings: filter by satellite, composite keys,
/// map overlay and path text, sorted by pass time or path.
use std::str::FromStr;

use rusqlite::types::Value;

use crate::ingest::composite::CompositeCatalog;

/// Map overlay filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapFilter {
    #[default]
    Any,
    /// Only images with a map overlay
    Only,
    /// Only images without a map overlay
    None,
}

impl FromStr for MapFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any" | "all" => Ok(Self::Any),
            "only" => Ok(Self::Only),
            "none" => Ok(Self::None),
            other => Err(format!("unknown map filter '{}'", other)),
        }
    }
}

/// Result ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Pass timestamp, newest first
    Newest,
    /// Pass timestamp, oldest first
    Oldest,
    /// Image path ascending
    PathAsc,
    /// Image path descending
    PathDesc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            "asc" => Ok(Self::PathAsc),
            "desc" => Ok(Self::PathDesc),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

/// Image listing filter
#[derive(Debug, Clone, Default)]
pub struct ImageQuery {
    /// Case-insensitive satellite name
    pub satellite: Option<String>,
    /// Composite catalog keys; unregistered keys are ignored
    pub composites: Vec<String>,
    pub map: MapFilter,
    /// Case-insensitive substring of the image path
    pub search: Option<String>,
    pub sort: Option<SortOrder>,
}

impl ImageQuery {
    /// Render to SQL plus positional parameters
    pub(crate) fn to_sql(&self, catalog: &CompositeCatalog) -> (String, Vec<Value>) {
        let mut sql = String::from(
            "SELECT images.id, images.path, images.composite, images.map_overlay,
                    images.corrected, images.filled, images.pass_id,
                    passes.satellite, passes.timestamp, passes.raw_data_path
             FROM images
             JOIN passes ON images.pass_id = passes.id
             WHERE 1=1",
        );
        let mut params: Vec<Value> = Vec::new();

        if let Some(satellite) = &self.satellite {
            sql.push_str(" AND LOWER(passes.satellite) = LOWER(?)");
            params.push(Value::Text(satellite.clone()));
        }

        if !self.composites.is_empty() {
            let keys: Vec<&String> = self
                .composites
                .iter()
                .filter(|key| catalog.contains_key(key))
                .collect();

            if keys.is_empty() {
                // Only unknown keys requested: nothing can match
                sql.push_str(" AND 0");
            } else {
                let conditions = vec!["LOWER(images.composite) LIKE ?"; keys.len()];
                sql.push_str(&format!(" AND ({})", conditions.join(" OR ")));
                params.extend(
                    keys.iter()
                        .map(|key| Value::Text(format!("%{}%", key.to_lowercase()))),
                );
            }
        }

        match self.map {
            MapFilter::Any => {}
            MapFilter::Only => sql.push_str(" AND images.map_overlay = 1"),
            MapFilter::None => sql.push_str(" AND images.map_overlay = 0"),
        }

        if let Some(search) = &self.search {
            sql.push_str(" AND LOWER(images.path) LIKE ?");
            params.push(Value::Text(format!("%{}%", search.to_lowercase())));
        }

        match self.sort {
            Some(SortOrder::Newest) => sql.push_str(" ORDER BY passes.timestamp DESC"),
            Some(SortOrder::Oldest) => sql.push_str(" ORDER BY passes.timestamp ASC"),
            Some(SortOrder::PathAsc) => sql.push_str(" ORDER BY images.path ASC"),
            Some(SortOrder::PathDesc) => sql.push_str(" ORDER BY images.path DESC"),
            None => sql.push_str(" ORDER BY images.id ASC"),
        }

        (sql, params)
    }
}
