//! Locating band and quality files inside a Sentinel-2 L2A SAFE directory.
//!
//! Layout: `<SAFE>/GRANULE/<granule>/IMG_DATA/R<res>/*_<band>_<res>.jp2` for
//! bands and `<SAFE>/GRANULE/<granule>/QI_DATA/*CLD*_20m.jp2` for the cloud
//! confidence layer.
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Bands stacked into the 10 m product, in output band order
pub const BANDS_10M: [&str; 4] = ["B02", "B03", "B04", "B08"];

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        entries.push(entry?.path());
    }
    entries.sort();
    Ok(entries)
}

fn granule_dirs(safe: &Path) -> Result<Vec<PathBuf>> {
    let granule_root = safe.join("GRANULE");
    if !granule_root.is_dir() {
        return Err(Error::incomplete("GRANULE directory", safe.display()));
    }
    Ok(sorted_entries(&granule_root)?
        .into_iter()
        .filter(|p| p.is_dir())
        .collect())
}

fn find_file(dirs: &[PathBuf], matches: impl Fn(&str) -> bool) -> Result<Option<PathBuf>> {
    for dir in dirs.iter().filter(|d| d.is_dir()) {
        for path in sorted_entries(dir)? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if matches(&name) {
                return Ok(Some(path));
            }
        }
    }
    Ok(None)
}

/// Path of one band image at `resolution` (e.g. `"10m"`)
pub fn band_path(safe: &Path, band: &str, resolution: &str) -> Result<PathBuf> {
    let dirs: Vec<PathBuf> = granule_dirs(safe)?
        .into_iter()
        .map(|g| g.join("IMG_DATA").join(format!("R{}", resolution)))
        .collect();
    let suffix = format!("_{}_{}.jp2", band, resolution);
    find_file(&dirs, |name| name.ends_with(&suffix))?
        .ok_or_else(|| {
            Error::incomplete(format!("band {} at {}", band, resolution), safe.display())
        })
}

/// The four 10 m bands in [`BANDS_10M`] order
pub fn band_paths(safe: &Path, resolution: &str) -> Result<Vec<PathBuf>> {
    let paths = BANDS_10M
        .iter()
        .map(|band| band_path(safe, band, resolution))
        .collect::<Result<Vec<_>>>()?;
    debug!("Bands of {:?}: {:?}", safe, paths);
    Ok(paths)
}

/// The 20 m cloud confidence layer
pub fn cloud_confidence_path(safe: &Path) -> Result<PathBuf> {
    let dirs: Vec<PathBuf> = granule_dirs(safe)?
        .into_iter()
        .map(|g| g.join("QI_DATA"))
        .collect();
    find_file(&dirs, |name| name.contains("CLD") && name.ends_with("_20m.jp2"))?
        .ok_or_else(|| Error::incomplete("cloud confidence layer", safe.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn fake_safe(bands: &[&str], with_cloud: bool) -> tempfile::TempDir {
        let dir = tempfile::TempDir::new().unwrap();
        let granule = dir.path().join("GRANULE").join("L2A_T15PXT_A013954_20180301T163146");
        let img = granule.join("IMG_DATA").join("R10m");
        fs::create_dir_all(&img).unwrap();
        for band in bands {
            fs::write(img.join(format!("T15PXT_20180301T162211_{}_10m.jp2", band)), b"").unwrap();
        }
        let qi = granule.join("QI_DATA");
        fs::create_dir_all(&qi).unwrap();
        if with_cloud {
            fs::write(qi.join("MSK_CLDPRB_20m.jp2"), b"").unwrap();
        }
        dir
    }

    #[test]
    fn test_finds_bands_in_order() {
        let safe = fake_safe(&["B08", "B04", "B03", "B02", "TCI"], true);
        let paths = band_paths(safe.path(), "10m").unwrap();
        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names[0].ends_with("_B02_10m.jp2"));
        assert!(names[3].ends_with("_B08_10m.jp2"));
        assert!(cloud_confidence_path(safe.path()).is_ok());
    }

    #[test]
    fn test_missing_band_is_incomplete_data() {
        let safe = fake_safe(&["B02", "B03", "B04"], false);
        let err = band_paths(safe.path(), "10m").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompleteData);
        let err = cloud_confidence_path(safe.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompleteData);
    }

    #[test]
    fn test_missing_granule_is_incomplete_data() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(
            band_paths(dir.path(), "10m").unwrap_err().kind(),
            ErrorKind::IncompleteData
        );
    }
}
