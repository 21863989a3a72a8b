use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::data::{Image, ImageView, ParsedPass, Pass};
use super::query::ImageQuery;
use crate::error::{CatalogError, Result};
use crate::ingest::composite::CompositeCatalog;

/// The Library manages the SQLite catalog database.
/// It stores one row per ingested pass and one row per image the pass produced.
///
/// Only the sync engine writes to it; everything else reads.
pub struct Library {
    /// None after a failed reset left no usable store behind
    conn: Option<Connection>,
    /// None for in-memory catalogs
    db_path: Option<PathBuf>,
}

impl Library {
    /// Open (or create) the catalog at `path`.
    ///
    /// Tables are not created here: a fresh file has no schema until a
    /// repopulate or rebuild runs. A legacy `passes` table without a
    /// `satellite` column is dropped and recreated immediately.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
        }

        let conn = Connection::open(&db_path)?;
        debug!("Catalog opened at: {}", db_path.display());

        let library = Library {
            conn: Some(conn),
            db_path: Some(db_path),
        };
        library.configure()?;
        library.migrate_legacy_schema()?;

        Ok(library)
    }

    /// Open a throwaway catalog that lives only as long as this value
    pub fn open_in_memory() -> Result<Self> {
        let library = Library {
            conn: Some(Connection::open_in_memory()?),
            db_path: None,
        };
        library.configure()?;
        Ok(library)
    }

    /// Get the default path where the catalog should be stored
    ///
    /// - Linux: ~/.local/share/pass-catalog/image_metadata.db
    /// - macOS: ~/Library/Application Support/pass-catalog/image_metadata.db
    /// - Windows: %APPDATA%\pass-catalog\image_metadata.db
    pub fn default_db_path() -> Option<PathBuf> {
        let mut path = dirs::data_dir().or_else(dirs::home_dir)?;
        path.push("pass-catalog");
        path.push("image_metadata.db");
        Some(path)
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or_else(|| self.unavailable())
    }

    fn conn_mut(&mut self) -> Result<&mut Connection> {
        let unavailable = self.unavailable();
        self.conn.as_mut().ok_or(unavailable)
    }

    fn unavailable(&self) -> CatalogError {
        CatalogError::StoreUnavailable(self.db_path.clone().unwrap_or_default())
    }

    fn configure(&self) -> Result<()> {
        self.conn()?.pragma_update(None, "foreign_keys", true)?;
        Ok(())
    }

    /// Drop a `passes` table that predates the `satellite` column.
    /// Images go with it so no image outlives its pass.
    fn migrate_legacy_schema(&self) -> Result<bool> {
        if !self.has_pass_table()? {
            return Ok(false);
        }

        let columns: Vec<String> = {
            let mut stmt = self.conn()?.prepare("PRAGMA table_info(passes)")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(1))?
                .collect::<rusqlite::Result<_>>()?;
            rows
        };

        if columns.iter().any(|c| c == "satellite") {
            return Ok(false);
        }

        warn!("Legacy passes table without a satellite column, recreating schema");
        self.conn()?
            .execute_batch("DROP TABLE IF EXISTS images; DROP TABLE IF EXISTS passes;")?;
        self.init_schema()?;
        Ok(true)
    }

    /// Whether the `passes` table exists
    pub fn has_pass_table(&self) -> Result<bool> {
        let found = self
            .conn()?
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'passes'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Initialize the database schema.
    /// Creates all necessary tables and indexes if they don't exist.
    pub fn init_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS passes (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL UNIQUE,
                satellite       TEXT NOT NULL,
                timestamp       INTEGER,
                raw_data_path   TEXT
            );

            CREATE TABLE IF NOT EXISTS images (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                path            TEXT NOT NULL,
                composite       TEXT NOT NULL,
                map_overlay     INTEGER NOT NULL,
                corrected       INTEGER NOT NULL,
                filled          INTEGER NOT NULL,
                timestamp       INTEGER,
                pass_id         INTEGER NOT NULL,
                FOREIGN KEY(pass_id) REFERENCES passes(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_images_pass_id ON images(pass_id);
            CREATE INDEX IF NOT EXISTS idx_passes_timestamp ON passes(timestamp DESC);",
        )?;

        debug!("Catalog schema initialized");
        Ok(())
    }

    /// Delete every pass and image row, keeping the schema
    pub fn clear(&self) -> Result<()> {
        self.conn()?
            .execute_batch("DELETE FROM images; DELETE FROM passes;")?;
        Ok(())
    }

    /// Delete the whole store artifact and start over with an empty schema.
    ///
    /// Failing to remove the file is fatal and reported as `StoreRemoval`.
    /// Until a later reset succeeds, every other call then fails with
    /// `StoreUnavailable` instead of touching a different database.
    pub fn reset(&mut self) -> Result<()> {
        let Some(path) = self.db_path.clone() else {
            self.conn()?
                .execute_batch("DROP TABLE IF EXISTS images; DROP TABLE IF EXISTS passes;")?;
            return self.init_schema();
        };

        // Close our handle before unlinking the file
        if let Some(old) = self.conn.take() {
            if let Err((conn, e)) = old.close() {
                self.conn = Some(conn);
                return Err(e.into());
            }
        }

        match fs::remove_file(&path) {
            Ok(()) => info!("Deleted existing catalog: {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(CatalogError::StoreRemoval { path, source }),
        }

        self.conn = Some(Connection::open(&path)?);
        self.configure()?;
        self.init_schema()
    }

    /// Get the path to the database file
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Whether a pass with this directory name is already cataloged
    pub fn pass_exists(&self, name: &str) -> Result<bool> {
        let found = self
            .conn()?
            .query_row("SELECT 1 FROM passes WHERE name = ?1", [name], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert a pass and all of its images in a single transaction.
    /// Returns the new pass ID.
    pub fn insert_pass(&mut self, parsed: &ParsedPass) -> Result<i64> {
        let tx = self.conn_mut()?.transaction()?;

        tx.execute(
            "INSERT INTO passes (name, satellite, timestamp, raw_data_path) VALUES (?1, ?2, ?3, ?4)",
            params![
                parsed.meta.name,
                parsed.meta.satellite,
                parsed.meta.timestamp,
                parsed.meta.raw_data_path,
            ],
        )?;
        let pass_id = tx.last_insert_rowid();

        {
            let mut insert_image = tx.prepare(
                "INSERT INTO images (path, composite, map_overlay, corrected, filled, timestamp, pass_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for image in &parsed.images {
                insert_image.execute(params![
                    image.path,
                    image.composite,
                    image.map_overlay,
                    image.corrected,
                    image.filled,
                    image.timestamp,
                    pass_id,
                ])?;
            }
        }

        tx.commit()?;
        Ok(pass_id)
    }

    /// Get a count of passes in the catalog
    pub fn pass_count(&self) -> Result<i64> {
        let count = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM passes", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Get a count of images in the catalog
    pub fn image_count(&self) -> Result<i64> {
        let count = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Look up a pass by its directory name
    pub fn pass_by_name(&self, name: &str) -> Result<Option<Pass>> {
        let pass = self
            .conn()?
            .query_row(
                "SELECT id, name, satellite, timestamp, raw_data_path FROM passes WHERE name = ?1",
                [name],
                |row| {
                    Ok(Pass {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        satellite: row.get(2)?,
                        timestamp: row.get(3)?,
                        raw_data_path: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(pass)
    }

    /// Get all images of one pass, in insertion order
    pub fn images_for_pass(&self, pass_id: i64) -> Result<Vec<Image>> {
        let mut stmt = self.conn()?.prepare(
            "SELECT id, path, composite, map_overlay, corrected, filled, timestamp, pass_id
             FROM images WHERE pass_id = ?1 ORDER BY id",
        )?;

        let images = stmt
            .query_map([pass_id], |row| {
                Ok(Image {
                    id: row.get(0)?,
                    path: row.get(1)?,
                    composite: row.get(2)?,
                    map_overlay: row.get(3)?,
                    corrected: row.get(4)?,
                    filled: row.get(5)?,
                    timestamp: row.get(6)?,
                    pass_id: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(images)
    }

    /// List images joined with their pass, filtered and sorted by `query`
    pub fn query_images(
        &self,
        query: &ImageQuery,
        catalog: &CompositeCatalog,
    ) -> Result<Vec<ImageView>> {
        let (sql, values) = query.to_sql(catalog);
        let mut stmt = self.conn()?.prepare(&sql)?;

        let images = stmt
            .query_map(params_from_iter(values), |row| {
                let composite: String = row.get(2)?;
                let timestamp: Option<i64> = row.get(8)?;
                Ok(ImageView {
                    id: row.get(0)?,
                    path: row.get(1)?,
                    composite_display: catalog.display_label(Some(composite.as_str())),
                    composite,
                    map_overlay: row.get(3)?,
                    corrected: row.get(4)?,
                    filled: row.get(5)?,
                    pass_id: row.get(6)?,
                    satellite: row.get(7)?,
                    timestamp,
                    captured_at: timestamp
                        .and_then(|t| chrono::DateTime::from_timestamp(t, 0)),
                    raw_data_path: row.get(9)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(images)
    }

    /// Distinct satellites that own at least one image
    pub fn satellites(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn()?.prepare(
            "SELECT DISTINCT passes.satellite
             FROM images
             JOIN passes ON images.pass_id = passes.id
             WHERE passes.satellite IS NOT NULL
             ORDER BY passes.satellite",
        )?;

        let satellites = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(satellites)
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::{ImageRecord, PassMeta};
    use crate::state::query::{MapFilter, SortOrder};
    use tempfile::TempDir;

    fn parsed(name: &str, satellite: &str, timestamp: Option<i64>, files: &[&str]) -> ParsedPass {
        ParsedPass {
            meta: PassMeta {
                name: name.to_string(),
                satellite: satellite.to_string(),
                timestamp,
                raw_data_path: None,
            },
            images: files
                .iter()
                .map(|f| ImageRecord {
                    path: format!("{}/{}", name, f),
                    composite: f.rsplit_once('.').map_or(*f, |(stem, _)| stem).to_lowercase(),
                    map_overlay: f.to_lowercase().contains("map"),
                    corrected: true,
                    filled: false,
                    timestamp: None,
                })
                .collect(),
        }
    }

    fn seeded() -> Library {
        let mut library = Library::open_in_memory().unwrap();
        library.init_schema().unwrap();
        library
            .insert_pass(&parsed("n19", "NOAA 19", Some(100), &["APT-A.png", "APT-B_map.png"]))
            .unwrap();
        library
            .insert_pass(&parsed("m2", "METEOR-M2", Some(200), &["MSU-MR-1.png", "Natural_Color_map.png"]))
            .unwrap();
        library
    }

    #[test]
    fn test_insert_pass_with_images() {
        let library = seeded();
        assert_eq!(library.pass_count().unwrap(), 2);
        assert_eq!(library.image_count().unwrap(), 4);
        assert!(library.pass_exists("n19").unwrap());
        assert!(!library.pass_exists("nope").unwrap());

        let pass = library.pass_by_name("n19").unwrap().unwrap();
        assert_eq!(pass.satellite, "NOAA 19");
        assert_eq!(pass.raw_data_path, None);
        let images = library.images_for_pass(pass.id).unwrap();
        assert_eq!(images.len(), 2);
        assert!(images[1].map_overlay);
    }

    #[test]
    fn test_duplicate_pass_leaves_no_partial_rows() {
        let mut library = seeded();
        let err = library
            .insert_pass(&parsed("n19", "NOAA 19", None, &["x.png"]))
            .unwrap_err();
        assert!(matches!(err, CatalogError::Database(_)));
        assert_eq!(library.pass_count().unwrap(), 2);
        assert_eq!(library.image_count().unwrap(), 4);
    }

    #[test]
    fn test_clear() {
        let library = seeded();
        library.clear().unwrap();
        assert_eq!(library.pass_count().unwrap(), 0);
        assert_eq!(library.image_count().unwrap(), 0);
    }

    #[test]
    fn test_query_filters_and_labels() {
        let library = seeded();
        let catalog = CompositeCatalog::builtin();

        let noaa = library
            .query_images(
                &ImageQuery {
                    satellite: Some("noaa 19".to_string()),
                    ..Default::default()
                },
                &catalog,
            )
            .unwrap();
        assert_eq!(noaa.len(), 2);
        assert_eq!(noaa[0].composite_display, "APT Channel A");

        let maps = library
            .query_images(
                &ImageQuery {
                    map: MapFilter::Only,
                    sort: Some(SortOrder::Newest),
                    ..Default::default()
                },
                &catalog,
            )
            .unwrap();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0].satellite, "METEOR-M2");
        assert_eq!(maps[0].captured_at.map(|t| t.timestamp()), Some(200));

        let lrpt = library
            .query_images(
                &ImageQuery {
                    composites: vec!["MSU-MR-".to_string()],
                    ..Default::default()
                },
                &catalog,
            )
            .unwrap();
        assert_eq!(lrpt.len(), 1);
        assert_eq!(lrpt[0].path, "m2/MSU-MR-1.png");

        let searched = library
            .query_images(
                &ImageQuery {
                    search: Some("APT-B".to_string()),
                    ..Default::default()
                },
                &catalog,
            )
            .unwrap();
        assert_eq!(searched.len(), 1);
    }

    #[test]
    fn test_satellites_distinct() {
        let mut library = seeded();
        library.insert_pass(&parsed("empty", "Unknown", None, &[])).unwrap();
        assert_eq!(
            library.satellites().unwrap(),
            vec!["METEOR-M2".to_string(), "NOAA 19".to_string()]
        );
    }

    #[test]
    fn test_legacy_schema_is_recreated() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("catalog.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE passes (id INTEGER PRIMARY KEY, name TEXT UNIQUE, timestamp INTEGER);
                 INSERT INTO passes (name, timestamp) VALUES ('old', 1);",
            )
            .unwrap();
        }

        let library = Library::open(&path).unwrap();
        assert!(library.has_pass_table().unwrap());
        assert_eq!(library.pass_count().unwrap(), 0);
        assert_eq!(library.image_count().unwrap(), 0);
    }

    #[test]
    fn test_fresh_file_has_no_schema_until_initialized() {
        let temp = TempDir::new().unwrap();
        let library = Library::open(temp.path().join("nested/catalog.db")).unwrap();
        assert!(!library.has_pass_table().unwrap());
        library.init_schema().unwrap();
        assert!(library.has_pass_table().unwrap());
    }

    #[test]
    fn test_reset_deletes_store_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("catalog.db");
        let mut library = Library::open(&path).unwrap();
        library.init_schema().unwrap();
        library.insert_pass(&parsed("a", "NOAA 15", None, &["a.png"])).unwrap();

        library.reset().unwrap();
        assert!(path.exists());
        assert_eq!(library.pass_count().unwrap(), 0);
        assert_eq!(library.image_count().unwrap(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_reset_leaves_library_unavailable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("catalog.db");
        let mut library = Library::open(&path).unwrap();
        library.init_schema().unwrap();

        // A non-empty directory where the store file was cannot be unlinked
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();

        let err = library.reset().unwrap_err();
        assert!(matches!(err, CatalogError::StoreRemoval { .. }));
        assert_eq!(library.path(), Some(path.as_path()));
        assert!(matches!(
            library.has_pass_table().unwrap_err(),
            CatalogError::StoreUnavailable(_)
        ));
        assert!(matches!(
            library.insert_pass(&parsed("a", "NOAA 15", None, &[])).unwrap_err(),
            CatalogError::StoreUnavailable(_)
        ));

        // Once the obstacle is gone a reset recovers
        fs::remove_dir_all(&path).unwrap();
        library.reset().unwrap();
        assert_eq!(library.pass_count().unwrap(), 0);
    }
}
