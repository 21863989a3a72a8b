/// Directory stability detection
///
/// The external decoder writes a pass directory over several minutes.
/// A pass is only ingested once nothing in its tree has been touched recently.
/// Any I/O failure while checking counts as "not stable".
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, warn};
use walkdir::WalkDir;

/// A top-level directory untouched for this long is assumed finished
pub const DIR_AGE_THRESHOLD: Duration = Duration::from_secs(15 * 60);

/// Any entry modified more recently than this marks the pass as still being written
pub const RECENT_ACTIVITY_THRESHOLD: Duration = Duration::from_secs(4 * 60);

/// Thresholds for the stability heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityPolicy {
    pub dir_age: Duration,
    pub recent_activity: Duration,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            dir_age: DIR_AGE_THRESHOLD,
            recent_activity: RECENT_ACTIVITY_THRESHOLD,
        }
    }
}

impl StabilityPolicy {
    /// Whether the decoder has finished writing `dir`
    pub fn is_stable(&self, dir: &Path) -> bool {
        self.is_stable_at(dir, SystemTime::now())
    }

    /// Same as [`is_stable`](Self::is_stable) with an explicit clock
    pub fn is_stable_at(&self, dir: &Path, now: SystemTime) -> bool {
        let modified = match std::fs::metadata(dir).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Directory does not exist yet: {}", dir.display());
                return false;
            }
            Err(e) => {
                error!("Failed to stat directory {}: {}", dir.display(), e);
                return false;
            }
        };

        if age(now, modified) > self.dir_age {
            return true;
        }

        self.subtree_is_quiet(dir, now)
    }

    /// Walk the whole tree, stopping at the first recent entry
    fn subtree_is_quiet(&self, dir: &Path, now: SystemTime) -> bool {
        let mtimes = WalkDir::new(dir).min_depth(1).into_iter().map(
            |entry| -> io::Result<(PathBuf, SystemTime)> {
                let entry = entry?;
                let modified = entry.metadata()?.modified()?;
                Ok((entry.into_path(), modified))
            },
        );
        self.all_quiet(dir, mtimes, now)
    }

    /// False at the first entry that is recent or could not be read
    fn all_quiet(
        &self,
        dir: &Path,
        mtimes: impl IntoIterator<Item = io::Result<(PathBuf, SystemTime)>>,
        now: SystemTime,
    ) -> bool {
        for item in mtimes {
            let (path, modified) = match item {
                Ok(item) => item,
                Err(e) => {
                    warn!("Unable to read under {}: {}", dir.display(), e);
                    return false;
                }
            };

            if age(now, modified) < self.recent_activity {
                debug!("Recent activity at {}", path.display());
                return false;
            }
        }

        true
    }
}

/// Check with the default thresholds
pub fn is_stable(dir: &Path) -> bool {
    StabilityPolicy::default().is_stable(dir)
}

/// Elapsed time since `modified`; timestamps in the future count as brand new
fn age(now: SystemTime, modified: SystemTime) -> Duration {
    now.duration_since(modified).unwrap_or_default()
}
