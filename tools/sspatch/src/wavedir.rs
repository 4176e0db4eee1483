//! Wavetable directory convention
//!
//! Extraction writes one file per slot named `NNN_<name>.raw`: the 3-digit
//! slot index, an underscore, and the decoded name with spaces turned into
//! `-`. `-` can never appear in a decoded name, so the mapping back is exact.
//!
//! A name field with undisplayable bytes decodes with `_` placeholders
//! (`003_W_.raw`). Such a file still patches its slot by index, but its name
//! cannot be encoded again: `hex` and `patch --rename` reject it with
//! `InvalidNameCharacter` until the file is renamed.
//!
//! Reading a directory back maps files to slots with these rules:
//! 1. regular files not starting with `.` are candidates, subdirectories are
//!    ignored
//! 2. a stem like `<digits>_<rest>` is *indexed* and patches slot `<digits>`
//! 3. if no candidate is indexed, the directory is *positional*: exactly 128
//!    files, sorted by trimmed stem, file `i` patches slot `i`
//! 4. anything else (mixed naming, duplicate indices, duplicate stems) is
//!    rejected as ambiguous

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::layout::{DATA_LENGTH, DATA_LENGTHS, SLOT_COUNT};

pub const RAW_EXTENSION: &str = "raw";
pub const PREVIEW_DIR: &str = "previews";

/// `NNN_<name>` for a slot, without extension
pub fn file_stem_for(index: usize, name: &str) -> String {
    format!("{:03}_{}", index, name.replace(' ', "-"))
}

pub fn file_name_for(index: usize, name: &str) -> String {
    format!("{}.{}", file_stem_for(index, name), RAW_EXTENSION)
}

/// Reverse the filename normalization: `-` back to space
pub fn name_from_stem(stem: &str) -> String {
    stem.replace('-', " ")
}

/// Split `<digits>_<rest>` into the index and the rest
pub fn parse_indexed_stem(stem: &str) -> Option<(usize, &str)> {
    let (digits, rest) = stem.split_once('_')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // absurdly long digit strings overflow; saturate so they land out of range
    let index = digits.parse().unwrap_or(usize::MAX);
    Some((index, rest))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapping {
    Indexed,
    Positional,
}

/// A wavetable file matched to its slot, contents already loaded and size-checked
#[derive(Debug, Clone)]
pub struct WavetableFile {
    pub slot: usize,
    pub path: PathBuf,
    /// Name derived from the filename (without index prefix, `-` mapped to space)
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct WavetableDir {
    pub mapping: Mapping,
    /// Sorted by slot
    pub files: Vec<WavetableFile>,
}

impl WavetableDir {
    /// Map every candidate file in `dir` to a slot and load it.
    ///
    /// All files are read and validated before returning, so callers can
    /// treat a successful result as safe to apply in one go.
    pub fn read(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::NotADirectory(dir.to_path_buf()));
        }

        let candidates = candidates(dir)?;
        let indexed = candidates
            .iter()
            .filter(|(_, stem)| parse_indexed_stem(stem).is_some())
            .count();

        let (mapping, assigned) = if indexed == candidates.len() && indexed > 0 {
            (Mapping::Indexed, assign_indexed(candidates)?)
        } else if indexed == 0 {
            (Mapping::Positional, assign_positional(candidates)?)
        } else {
            return Err(Error::AmbiguousSlotMapping(format!(
                "{} of {} files in {} have an index prefix; use it for all files or none",
                indexed,
                candidates.len(),
                dir.display()
            )));
        };

        let mut files = Vec::with_capacity(assigned.len());
        for (slot, path, name) in assigned {
            let data = fs::read(&path).map_err(Error::io(&path))?;
            if data.len() != DATA_LENGTH {
                return Err(Error::SizeMismatch {
                    what: format!("Wavetable {}", path.display()),
                    expected: DATA_LENGTHS,
                    actual: data.len(),
                });
            }
            trace!("slot {:3} <- {}", slot, path.display());
            files.push(WavetableFile { slot, path, name, data });
        }

        debug!("mapped {} files in {} ({:?})", files.len(), dir.display(), mapping);
        Ok(Self { mapping, files })
    }

    pub fn get(&self, slot: usize) -> Option<&WavetableFile> {
        self.files
            .binary_search_by_key(&slot, |f| f.slot)
            .ok()
            .map(|i| &self.files[i])
    }

    /// First slot with no file, if any
    pub fn first_missing_slot(&self) -> Option<usize> {
        (0..SLOT_COUNT).find(|&slot| self.get(slot).is_none())
    }
}

/// Candidate files as (path, stem), sorted by file name
fn candidates(dir: &Path) -> Result<Vec<(PathBuf, String)>> {
    let mut found = Vec::new();

    for entry in fs::read_dir(dir).map_err(Error::io(dir))? {
        let entry = entry.map_err(Error::io(dir))?;
        let path = entry.path();

        let file_name = entry.file_name().to_string_lossy().to_string();
        if file_name.starts_with('.') {
            continue;
        }
        if !path.is_file() {
            continue;
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        found.push((path, stem));
    }

    found.sort();
    Ok(found)
}

fn assign_indexed(candidates: Vec<(PathBuf, String)>) -> Result<Vec<(usize, PathBuf, String)>> {
    let mut by_slot: BTreeMap<usize, (PathBuf, String)> = BTreeMap::new();

    for (path, stem) in candidates {
        let Some((index, rest)) = parse_indexed_stem(&stem) else {
            continue;
        };
        if index >= SLOT_COUNT {
            return Err(Error::IndexOutOfRange(index));
        }

        let name = name_from_stem(rest);
        if let Some((other, _)) = by_slot.insert(index, (path.clone(), name)) {
            return Err(Error::AmbiguousSlotMapping(format!(
                "{} and {} both claim slot {}",
                other.display(),
                path.display(),
                index
            )));
        }
    }

    Ok(by_slot
        .into_iter()
        .map(|(slot, (path, name))| (slot, path, name))
        .collect())
}

fn assign_positional(candidates: Vec<(PathBuf, String)>) -> Result<Vec<(usize, PathBuf, String)>> {
    if candidates.len() != SLOT_COUNT {
        return Err(Error::AmbiguousSlotMapping(format!(
            "found wrong number of wavetables without index prefix (expected {}, got {})",
            SLOT_COUNT,
            candidates.len()
        )));
    }

    // names can be padded with spaces on the left, so order by the trimmed stem
    let mut by_name: BTreeMap<String, PathBuf> = BTreeMap::new();
    for (path, stem) in candidates {
        let key = stem.trim().to_string();
        if let Some(other) = by_name.insert(key.clone(), path.clone()) {
            return Err(Error::AmbiguousSlotMapping(format!(
                "duplicate name \"{}\" in wavetable names ({} and {})",
                key,
                other.display(),
                path.display()
            )));
        }
    }

    Ok(by_name
        .into_iter()
        .enumerate()
        .map(|(slot, (stem, path))| (slot, path, name_from_stem(&stem)))
        .collect())
}
