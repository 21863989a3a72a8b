/// Synchronization between the ingestion root and the catalog.
///
/// Three modes:
/// - `update`: add stable passes the catalog does not know yet
/// - `repopulate`: clear all rows and ingest every pass directory
/// - `rebuild`: delete the store file, recreate the schema, then repopulate
///
/// Passes are processed one at a time in directory-listing order. Each pass
/// is fully parsed before anything is written, then stored in one transaction.
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::error::{CatalogError, Result};
use crate::ingest::parsers::read_pass;
use crate::ingest::stability::StabilityPolicy;
use crate::state::library::Library;

/// Synchronization mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Update,
    Repopulate,
    Rebuild,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncMode::Update => "update",
            SyncMode::Repopulate => "repopulate",
            SyncMode::Rebuild => "rebuild",
        };
        f.write_str(name)
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim_start_matches("--").to_ascii_lowercase().as_str() {
            "update" => Ok(SyncMode::Update),
            "repopulate" => Ok(SyncMode::Repopulate),
            "rebuild" => Ok(SyncMode::Rebuild),
            other => Err(format!("unknown sync mode '{}'", other)),
        }
    }
}

/// A pass that could not be parsed and was left out of this run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassFailure {
    pub name: String,
    pub error: String,
}

/// Outcome of one sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// The mode that actually ran (update may fall back to repopulate)
    pub mode: SyncMode,
    /// Passes added to the catalog
    pub added: usize,
    /// Passes still being written, deferred to a later run
    pub skipped_unstable: usize,
    /// Passes already in the catalog
    pub skipped_known: usize,
    /// Passes with a malformed descriptor or unreadable layout
    pub failed: Vec<PassFailure>,
}

impl SyncReport {
    fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            added: 0,
            skipped_unstable: 0,
            skipped_known: 0,
            failed: Vec::new(),
        }
    }
}

/// Owns the catalog for the duration of a sync and is its only writer.
///
/// No internal locking: callers that may trigger runs concurrently must
/// serialize them (see [`UpdateGate`](super::gate::UpdateGate)).
pub struct SyncEngine {
    root: PathBuf,
    library: Library,
    stability: StabilityPolicy,
}

impl SyncEngine {
    pub fn new(root: impl Into<PathBuf>, library: Library) -> Self {
        Self {
            root: root.into(),
            library,
            stability: StabilityPolicy::default(),
        }
    }

    pub fn with_stability(mut self, stability: StabilityPolicy) -> Self {
        self.stability = stability;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn into_library(self) -> Library {
        self.library
    }

    pub fn run(&mut self, mode: SyncMode) -> Result<SyncReport> {
        match mode {
            SyncMode::Update => self.run_update(),
            SyncMode::Repopulate => self.run_repopulate(),
            SyncMode::Rebuild => self.run_rebuild(),
        }
    }

    /// Add every stable pass directory the catalog does not know yet.
    ///
    /// Falls back to repopulate when the catalog has no schema.
    pub fn run_update(&mut self) -> Result<SyncReport> {
        if !self.library.has_pass_table()? {
            info!("Table \"passes\" does not exist, falling back to repopulate");
            return self.run_repopulate();
        }

        let mut report = SyncReport::new(SyncMode::Update);
        for dir in self.pass_dirs()? {
            let Some(name) = pass_name(&dir, &mut report) else {
                continue;
            };

            if !self.stability.is_stable(&dir) {
                info!(pass = %name, "Pass may still be updating, skipping");
                report.skipped_unstable += 1;
                continue;
            }

            if self.library.pass_exists(&name)? {
                debug!(pass = %name, "Pass already cataloged");
                report.skipped_known += 1;
                continue;
            }

            self.ingest(&dir, name, &mut report)
                .inspect_err(|e| error!(added = report.added, "Update aborted: {}", e))?;
        }

        info!(
            added = report.added,
            unstable = report.skipped_unstable,
            failed = report.failed.len(),
            "Catalog updated"
        );
        Ok(report)
    }

    /// Clear all rows and ingest every pass directory, stable or not
    pub fn run_repopulate(&mut self) -> Result<SyncReport> {
        self.library.init_schema()?;
        self.library.clear()?;
        self.ingest_all(SyncMode::Repopulate)
    }

    /// Delete the store file, recreate the schema and ingest everything
    pub fn run_rebuild(&mut self) -> Result<SyncReport> {
        self.library.reset()?;
        info!("Catalog initialized");
        self.ingest_all(SyncMode::Rebuild)
    }

    fn ingest_all(&mut self, mode: SyncMode) -> Result<SyncReport> {
        let mut report = SyncReport::new(mode);
        for dir in self.pass_dirs()? {
            let Some(name) = pass_name(&dir, &mut report) else {
                continue;
            };
            self.ingest(&dir, name, &mut report)
                .inspect_err(|e| error!(added = report.added, "{} aborted: {}", mode, e))?;
        }

        info!(
            passes = report.added,
            failed = report.failed.len(),
            "Catalog {} complete",
            mode
        );
        Ok(report)
    }

    /// Parse one pass and store it. Per-pass faults are recorded and skipped;
    /// database faults abort the run.
    fn ingest(&mut self, dir: &Path, name: String, report: &mut SyncReport) -> Result<()> {
        let parsed = match read_pass(dir) {
            Ok(parsed) => parsed,
            Err(e) if e.is_pass_local() => {
                warn!(pass = %name, "Skipping pass: {}", e);
                report.failed.push(PassFailure {
                    name,
                    error: e.to_string(),
                });
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.library.insert_pass(&parsed)?;
        debug!(
            pass = %name,
            satellite = %parsed.meta.satellite,
            images = parsed.images.len(),
            "Pass ingested"
        );
        report.added += 1;
        Ok(())
    }

    /// Immediate subdirectories of the root, in listing order
    fn pass_dirs(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(CatalogError::MissingRoot(self.root.clone()));
        }

        let mut dirs = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| CatalogError::io(&self.root, e.into()))?;
            // Follows symlinks, like a plain stat would
            if entry.path().is_dir() {
                dirs.push(entry.into_path());
            }
        }
        Ok(dirs)
    }
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("root", &self.root)
            .field("library", &self.library)
            .field("stability", &self.stability)
            .finish()
    }
}

/// Pass names are stored as text, so a non-UTF-8 directory name is a
/// per-pass failure rather than a lossy name that may collide with another.
fn pass_name(dir: &Path, report: &mut SyncReport) -> Option<String> {
    let file_name = dir.file_name().unwrap_or(dir.as_os_str());
    match file_name.to_str() {
        Some(name) => Some(name.to_string()),
        None => {
            let name = file_name.to_string_lossy().into_owned();
            warn!(pass = %name, "Skipping pass with a non-UTF-8 directory name");
            report.failed.push(PassFailure {
                name,
                error: "directory name is not valid UTF-8".to_string(),
            });
            None
        }
    }
}
