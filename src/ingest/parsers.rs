/// Per-format pass parsers
///
/// Each parser turns a classified pass directory into pass metadata plus one
/// record per output image. Parsers only read the filesystem; persisting the
/// result is the sync engine's job.
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

use super::classify::{classify, CompositeCache, Dataset, PassFormat, FENGYUN_IMAGE_DIR};
use crate::error::{CatalogError, Result};
use crate::state::data::{ImageRecord, ParsedPass, PassMeta};

/// Extensions treated as output images (case-insensitive)
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// METEOR image subdirectories; the second one holds gap-filled variants
pub const METEOR_SUBDIRS: [&str; 2] = ["MSU-MR", "MSU-MR (Filled)"];
const METEOR_FILLED_SUBDIR: &str = "MSU-MR (Filled)";

/// Extension of raw downlink captures
pub const RAW_CAPTURE_EXTENSION: &str = "cadu";

/// Elektro images live under `IMAGES/ELEKTRO-L3/<subfolder>/`
pub const ELEKTRO_IMAGE_ROOT: &str = "IMAGES/ELEKTRO-L3";

/// Classify and parse a pass directory in one go
pub fn read_pass(pass_dir: &Path) -> Result<ParsedPass> {
    let format = classify(pass_dir)?;
    parse_pass(pass_dir, &format)
}

/// Parse a pass directory with the parser for `format`
pub fn parse_pass(pass_dir: &Path, format: &PassFormat) -> Result<ParsedPass> {
    let name = pass_name(pass_dir)?;
    match format {
        PassFormat::Noaa(dataset) => parse_noaa(pass_dir, name, dataset),
        PassFormat::Meteor(dataset) => parse_meteor(pass_dir, name, dataset),
        PassFormat::Elektro(cache) => parse_elektro(pass_dir, name, cache),
        PassFormat::FengYun => parse_fengyun(pass_dir, name),
        PassFormat::Unknown(dataset) => Ok(ParsedPass {
            meta: PassMeta {
                name,
                satellite: dataset
                    .as_ref()
                    .map_or("Unknown", Dataset::satellite_name)
                    .to_string(),
                timestamp: dataset.as_ref().and_then(Dataset::timestamp_secs),
                raw_data_path: None,
            },
            images: Vec::new(),
        }),
    }
}

/// Every image directly under the pass directory; always corrected
fn parse_noaa(pass_dir: &Path, name: String, dataset: &Dataset) -> Result<ParsedPass> {
    let images = image_files(pass_dir)?
        .into_iter()
        .map(|file| image_record(format!("{}/{}", name, file), &file, true, false, None))
        .collect();

    Ok(ParsedPass {
        meta: PassMeta {
            satellite: dataset.satellite_name().to_string(),
            timestamp: dataset.timestamp_secs(),
            raw_data_path: None,
            name,
        },
        images,
    })
}

/// `MSU-MR` and `MSU-MR (Filled)` images, plus the first `.cadu` capture
fn parse_meteor(pass_dir: &Path, name: String, dataset: &Dataset) -> Result<ParsedPass> {
    let mut images = Vec::new();
    for subdir in METEOR_SUBDIRS {
        let dir = pass_dir.join(subdir);
        if !dir.is_dir() {
            continue;
        }

        let filled = subdir == METEOR_FILLED_SUBDIR;
        for file in image_files(&dir)? {
            let corrected = file.to_lowercase().contains("corrected");
            images.push(image_record(
                format!("{}/{}/{}", name, subdir, file),
                &file,
                corrected,
                filled,
                None,
            ));
        }
    }

    let raw_data_path = list_dir(pass_dir)?
        .into_iter()
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .find(|file| has_extension(file, &[RAW_CAPTURE_EXTENSION]))
        .map(|file| format!("{}/{}", name, file));

    Ok(ParsedPass {
        meta: PassMeta {
            satellite: dataset.satellite_name().to_string(),
            timestamp: dataset.timestamp_secs(),
            raw_data_path,
            name,
        },
        images,
    })
}

/// Images per subfolder, each stamped with its subfolder's cache time
fn parse_elektro(pass_dir: &Path, name: String, cache: &CompositeCache) -> Result<ParsedPass> {
    let root = pass_dir.join(ELEKTRO_IMAGE_ROOT);
    let mut images = Vec::new();

    if root.is_dir() {
        for subfolder in subdirectories(&root)? {
            let subpath = format!("{}/{}", ELEKTRO_IMAGE_ROOT, subfolder);
            let timestamp = cache.time_for(&subpath);
            for file in image_files(&root.join(&subfolder))? {
                images.push(image_record(
                    format!("{}/{}/{}", name, subpath, file),
                    &file,
                    true,
                    false,
                    timestamp,
                ));
            }
        }
    }

    Ok(ParsedPass {
        meta: PassMeta {
            name,
            satellite: "Elektro-L3".to_string(),
            timestamp: cache.first_time(),
            raw_data_path: None,
        },
        images,
    })
}

/// S-VISSR images under `IMAGE/<subfolder>/`
fn parse_fengyun(pass_dir: &Path, name: String) -> Result<ParsedPass> {
    let root = pass_dir.join(FENGYUN_IMAGE_DIR);
    let mut images = Vec::new();

    if root.is_dir() {
        for subfolder in subdirectories(&root)? {
            for file in image_files(&root.join(&subfolder))? {
                images.push(image_record(
                    format!("{}/{}/{}/{}", name, FENGYUN_IMAGE_DIR, subfolder, file),
                    &file,
                    true,
                    false,
                    None,
                ));
            }
        }
    }

    Ok(ParsedPass {
        meta: PassMeta {
            name,
            satellite: "FengYun".to_string(),
            timestamp: None,
            raw_data_path: None,
        },
        images,
    })
}

fn image_record(
    path: String,
    file: &str,
    corrected: bool,
    filled: bool,
    timestamp: Option<i64>,
) -> ImageRecord {
    ImageRecord {
        path,
        composite: composite_of(file),
        map_overlay: is_map_overlay(file),
        corrected,
        filled,
        timestamp,
    }
}

/// Lower-cased filename stem
pub fn composite_of(file: &str) -> String {
    Path::new(file)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Shared by every format: "map" anywhere in the filename
pub fn is_map_overlay(file: &str) -> bool {
    file.to_lowercase().contains("map")
}

pub fn is_image_file(file: &str) -> bool {
    has_extension(file, &IMAGE_EXTENSIONS)
}

fn has_extension(file: &str, extensions: &[&str]) -> bool {
    Path::new(file)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| extensions.contains(&ext.as_str()))
}

fn pass_name(pass_dir: &Path) -> Result<String> {
    let file_name = pass_dir.file_name().unwrap_or(pass_dir.as_os_str());
    file_name.to_str().map(str::to_string).ok_or_else(|| {
        CatalogError::io(
            pass_dir,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "directory name is not valid UTF-8",
            ),
        )
    })
}

/// Immediate children of `dir`, sorted by name
fn list_dir(dir: &Path) -> Result<Vec<DirEntry>> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| entry.map_err(|e| CatalogError::io(dir, e.into())))
        .collect()
}

/// Names of image files directly in `dir`, symlinks followed
fn image_files(dir: &Path) -> Result<Vec<String>> {
    Ok(list_dir(dir)?
        .into_iter()
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|file| is_image_file(file))
        .collect())
}

/// Names of subdirectories directly in `dir`; plain files are ignored
fn subdirectories(dir: &Path) -> Result<Vec<String>> {
    Ok(list_dir(dir)?
        .into_iter()
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::classify::{COMPOSITE_CACHE_FILE, DATASET_FILE};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn touch(path: PathBuf) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_noaa_pass() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("NOAA19_20240101");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join(DATASET_FILE), r#"{"satellite": "NOAA 19", "timestamp": 1704067200.25}"#)
            .unwrap();
        touch(dir.join("apt-a.png"));
        touch(dir.join("apt-b_map.png"));
        touch(dir.join("notes.txt"));
        touch(dir.join("nested/ignored.png"));

        let parsed = read_pass(&dir).unwrap();
        assert_eq!(parsed.meta.name, "NOAA19_20240101");
        assert_eq!(parsed.meta.satellite, "NOAA 19");
        assert_eq!(parsed.meta.timestamp, Some(1704067200));
        assert_eq!(parsed.meta.raw_data_path, None);

        assert_eq!(parsed.images.len(), 2);
        assert_eq!(parsed.images[0].path, "NOAA19_20240101/apt-a.png");
        assert_eq!(parsed.images[0].composite, "apt-a");
        assert!(!parsed.images[0].map_overlay);
        assert!(parsed.images[1].map_overlay);
        assert!(parsed.images.iter().all(|i| i.corrected && !i.filled));
    }

    #[test]
    fn test_meteor_pass() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("METEOR_20240101");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join(DATASET_FILE), r#"{"satellite": "METEOR-M2"}"#).unwrap();
        touch(dir.join("MSU-MR (Filled)/ch1_corrected.png"));
        touch(dir.join("MSU-MR/MSU-MR-1.PNG"));
        touch(dir.join("data.cadu"));

        let parsed = read_pass(&dir).unwrap();
        assert_eq!(parsed.meta.satellite, "METEOR-M2");
        assert_eq!(parsed.meta.timestamp, None);
        assert_eq!(parsed.meta.raw_data_path.as_deref(), Some("METEOR_20240101/data.cadu"));

        assert_eq!(parsed.images.len(), 2);
        let plain = &parsed.images[0];
        assert_eq!(plain.path, "METEOR_20240101/MSU-MR/MSU-MR-1.PNG");
        assert_eq!(plain.composite, "msu-mr-1");
        assert!(!plain.filled && !plain.corrected);

        let filled = &parsed.images[1];
        assert_eq!(filled.path, "METEOR_20240101/MSU-MR (Filled)/ch1_corrected.png");
        assert!(filled.filled && filled.corrected);
    }

    #[test]
    fn test_meteor_without_capture() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("m");
        fs::create_dir(&dir).unwrap();
        let parsed = parse_pass(&dir, &PassFormat::Meteor(Dataset::default())).unwrap();
        assert_eq!(parsed.meta.raw_data_path, None);
        assert!(parsed.images.is_empty());
    }

    #[test]
    fn test_elektro_pass() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("elektro");
        fs::create_dir(&dir).unwrap();
        fs::write(
            dir.join(COMPOSITE_CACHE_FILE),
            r#"{"IMAGES/ELEKTRO-L3/2024-01-01_10-00": {"time": 1704103200.7},
                "IMAGES/ELEKTRO-L3/2024-01-01_10-30": {"time": 1704105000}}"#,
        )
        .unwrap();
        touch(dir.join("IMAGES/ELEKTRO-L3/2024-01-01_10-00/Natural_Color_map.png"));
        touch(dir.join("IMAGES/ELEKTRO-L3/2024-01-01_10-30/10.8um.jpg"));
        touch(dir.join("IMAGES/ELEKTRO-L3/stray.png"));

        let parsed = read_pass(&dir).unwrap();
        assert_eq!(parsed.meta.satellite, "Elektro-L3");
        assert_eq!(parsed.meta.timestamp, Some(1704103200));
        assert_eq!(parsed.images.len(), 2);
        assert_eq!(
            parsed.images[0].path,
            "elektro/IMAGES/ELEKTRO-L3/2024-01-01_10-00/Natural_Color_map.png"
        );
        assert!(parsed.images[0].map_overlay);
        assert_eq!(parsed.images[0].timestamp, Some(1704103200));
        assert_eq!(parsed.images[1].composite, "10.8um");
        assert_eq!(parsed.images[1].timestamp, Some(1704105000));
        assert!(parsed.images.iter().all(|i| i.corrected));
    }

    #[test]
    fn test_fengyun_pass() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("fy2h");
        touch(dir.join("IMAGE/2024-01-01/IR1.png"));
        touch(dir.join("IMAGE/2024-01-01/IR1_map.webp"));

        let parsed = read_pass(&dir).unwrap();
        assert_eq!(parsed.meta.satellite, "FengYun");
        assert_eq!(parsed.meta.timestamp, None);
        assert_eq!(parsed.images.len(), 2);
        assert_eq!(parsed.images[0].path, "fy2h/IMAGE/2024-01-01/IR1.png");
        assert!(parsed.images[1].map_overlay);
        assert!(parsed.images.iter().all(|i| i.corrected && !i.filled));
    }

    #[test]
    fn test_unknown_pass_has_no_images() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("mystery");
        touch(dir.join("picture.png"));

        let parsed = read_pass(&dir).unwrap();
        assert_eq!(parsed.meta.satellite, "Unknown");
        assert_eq!(parsed.meta.timestamp, None);
        assert!(parsed.images.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_images_and_subfolders_are_followed() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        touch(temp.path().join("store/IR2.png"));
        touch(temp.path().join("store/day/IR1.png"));

        let dir = temp.path().join("fy2h");
        fs::create_dir_all(dir.join("IMAGE/2024-01-01")).unwrap();
        symlink(temp.path().join("store/IR2.png"), dir.join("IMAGE/2024-01-01/IR2.png")).unwrap();
        symlink(temp.path().join("store/day"), dir.join("IMAGE/2024-01-02")).unwrap();

        let parsed = read_pass(&dir).unwrap();
        let paths: Vec<&str> = parsed.images.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["fy2h/IMAGE/2024-01-01/IR2.png", "fy2h/IMAGE/2024-01-02/IR1.png"]
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_pass_name_is_a_pass_error() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(OsStr::from_bytes(b"pass\xff"));
        fs::create_dir(&dir).unwrap();

        let err = read_pass(&dir).unwrap_err();
        assert!(err.is_pass_local());
    }

    #[test]
    fn test_filename_rules() {
        assert_eq!(composite_of("AVHRR_221_Map.PNG"), "avhrr_221_map");
        assert!(is_map_overlay("AVHRR_221_MAP.png"));
        assert!(!is_map_overlay("avhrr.png"));
        assert!(is_image_file("a.JPEG"));
        assert!(!is_image_file("a.cadu"));
        assert!(!is_image_file("png"));
    }
}
