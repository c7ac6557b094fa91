//! File naming conventions: co-located masks and Sentinel-2 product names.
//!
//! A Sentinel-2 product name such as
//! `S2A_MSIL2A_20180301T162211_N0206_R040_T15PXT_20180301T194348` splits on
//! `_` into mission, level, sensing time, baseline, relative orbit, tile and
//! processing time.
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::error::{Error, Result};

/// Extension of the mask stored beside every image
pub const MASK_EXTENSION: &str = "msk";

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";
const TIMESTAMP_LEN: usize = 15;

/// Path of the mask co-located with `image`: same directory, the base name
/// up to its first `.`, and the `.msk` extension.
pub fn mask_path(image: &Path) -> PathBuf {
    let name = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = name.split('.').next().unwrap_or_default();
    image.with_file_name(format!("{}.{}", base, MASK_EXTENSION))
}

fn file_stem(name: &str) -> &str {
    let file = name.rsplit('/').next().unwrap_or(name);
    file.split('.').next().unwrap_or(file)
}

fn name_component<'a>(name: &'a str, index: usize, what: &str) -> Result<&'a str> {
    file_stem(name)
        .split('_')
        .nth(index)
        .ok_or_else(|| Error::config("image_name", format!("{} has no {} field", name, what)))
}

fn is_timestamp(candidate: &[u8]) -> bool {
    candidate.len() == TIMESTAMP_LEN
        && candidate[8] == b'T'
        && candidate[..8].iter().all(u8::is_ascii_digit)
        && candidate[9..].iter().all(u8::is_ascii_digit)
}

/// First `YYYYMMDDTHHMMSS` run in `name`
pub fn s2_timestamp(name: &str) -> Result<&str> {
    let bytes = name.as_bytes();
    (0..bytes.len().saturating_sub(TIMESTAMP_LEN - 1))
        .find(|&i| is_timestamp(&bytes[i..i + TIMESTAMP_LEN]))
        .map(|i| &name[i..i + TIMESTAMP_LEN])
        .ok_or_else(|| Error::config("image_name", format!("{} carries no timestamp", name)))
}

/// Relative orbit field, e.g. `R040`
pub fn s2_orbit(name: &str) -> Result<&str> {
    name_component(name, 4, "orbit")
}

/// Tile field, e.g. `T15PXT`
pub fn s2_tile(name: &str) -> Result<&str> {
    name_component(name, 5, "tile")
}

/// Granule identifier of a SAFE directory: its name without `.SAFE`
pub fn granule_id(safe_dir: &Path) -> String {
    let name = safe_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    file_stem(&name).to_string()
}

pub fn acquisition_time(name: &str) -> Result<NaiveDateTime> {
    let ts = s2_timestamp(name)?;
    NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT)
        .map_err(|e| Error::config("image_name", format!("{}: {}", ts, e)))
}

/// Sort by acquisition time; `recent_first` puts the newest first.
/// Names without a timestamp are an error.
pub fn sort_by_timestamp<S: AsRef<str>>(names: &mut [S], recent_first: bool) -> Result<()> {
    for name in names.iter() {
        acquisition_time(name.as_ref())?;
    }
    names.sort_by_cached_key(|n| acquisition_time(n.as_ref()).ok());
    if recent_first {
        names.reverse();
    }
    Ok(())
}
