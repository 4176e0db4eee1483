//! Extract every wavetable slot of an image into a directory

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::layout::{Image, SLOT_COUNT, check_audio_runs};
use crate::name::PLACEHOLDER;
use crate::preview::write_preview;
use crate::wavedir::{PREVIEW_DIR, RAW_EXTENSION, file_name_for, file_stem_for, parse_indexed_stem};

const PREVIEW_EXTENSION: &str = "wav";

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Refuse images whose slots contain long runs of identical bytes
    pub check_runs: bool,
    /// Also render `previews/NNN_<name>.wav` for each slot
    pub wav_previews: bool,
}

/// A slot file written by [`extract`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub slot: usize,
    pub name: String,
    pub path: PathBuf,
}

/// Write one raw file per slot into `out_dir`, creating it if needed.
///
/// Files are staged in a temporary directory next to `out_dir` and only
/// moved into place once every slot has been written; on failure `out_dir`
/// is left as it was.
pub fn extract(image: &Image, out_dir: &Path, options: &ExtractOptions) -> Result<Vec<WrittenFile>> {
    if out_dir.exists() && !out_dir.is_dir() {
        return Err(Error::NotADirectory(out_dir.to_path_buf()));
    }

    if options.check_runs {
        check_audio_runs(image.data_area())?;
    }

    let parent = match out_dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(Error::io(parent))?;

    let staging = tempfile::Builder::new()
        .prefix(".sspatch-extract-")
        .tempdir_in(parent)
        .map_err(Error::io(parent))?;

    if options.wav_previews {
        let previews = staging.path().join(PREVIEW_DIR);
        fs::create_dir(&previews).map_err(Error::io(&previews))?;
    }

    let mut staged = Vec::new();
    for slot in image.slots() {
        if !slot.has_name_prefix() {
            warn!("slot {} name field {:02X?} lacks the two-space prefix", slot.index, slot.raw_name);
        }

        let name = slot.name();
        if name.contains(PLACEHOLDER) {
            warn!(
                "slot {} name {:02X?} has undisplayable bytes, written as {:?}; hex and patch --rename will reject it",
                slot.index, slot.raw_name, name
            );
        }
        let file_name = file_name_for(slot.index, &name);
        let path = staging.path().join(&file_name);
        fs::write(&path, slot.data).map_err(Error::io(&path))?;

        if options.wav_previews {
            let wav = staging
                .path()
                .join(PREVIEW_DIR)
                .join(format!("{}.{}", file_stem_for(slot.index, &name), PREVIEW_EXTENSION));
            write_preview(&wav, slot.data)?;
        }

        debug!("slot {:3} -> {}", slot.index, file_name);
        staged.push((slot.index, name, file_name));
    }

    commit(staging, out_dir, parent)?;

    let written: Vec<WrittenFile> = staged
        .into_iter()
        .map(|(slot, name, file_name)| WrittenFile {
            slot,
            name,
            path: out_dir.join(file_name),
        })
        .collect();

    info!("extracted {} wavetables to {}", written.len(), out_dir.display());
    Ok(written)
}

/// Move a fully written staging directory into place.
///
/// An existing `out_dir` is swapped aside whole, so old and new slot files
/// never mix. Anything in it that is not a slot file (or a slot preview) is
/// carried over into the new directory.
fn commit(staging: tempfile::TempDir, out_dir: &Path, parent: &Path) -> Result<()> {
    if !out_dir.exists() {
        let staged = staging.keep();
        return fs::rename(&staged, out_dir).map_err(|e| {
            let _ = fs::remove_dir_all(&staged);
            Error::io(out_dir)(e)
        });
    }

    let backup = tempfile::Builder::new()
        .prefix(".sspatch-old-")
        .tempdir_in(parent)
        .map_err(Error::io(parent))?;
    let old = backup.path().join("old");
    fs::rename(out_dir, &old).map_err(Error::io(out_dir))?;

    let staged = staging.keep();
    if let Err(e) = fs::rename(&staged, out_dir) {
        let _ = fs::rename(&old, out_dir);
        let _ = fs::remove_dir_all(&staged);
        return Err(Error::io(out_dir)(e));
    }

    if let Err(e) = carry_over(&old, out_dir, RAW_EXTENSION, true) {
        let kept = backup.keep();
        warn!("previous contents of {} left in {}", out_dir.display(), kept.display());
        return Err(e);
    }

    // backup only holds stale slot files now; dropping it removes them
    Ok(())
}

/// `NNN_<name>.<extension>` with `NNN` a valid slot
fn is_slot_file(path: &Path, extension: &str) -> bool {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    path.extension().is_some_and(|e| e == extension)
        && parse_indexed_stem(stem).is_some_and(|(index, _)| index < SLOT_COUNT)
}

fn carry_over(from: &Path, to: &Path, extension: &str, with_previews: bool) -> Result<()> {
    for entry in fs::read_dir(from).map_err(Error::io(from))? {
        let entry = entry.map_err(Error::io(from))?;
        let path = entry.path();
        let target = to.join(entry.file_name());

        if with_previews && path.is_dir() && entry.file_name() == PREVIEW_DIR {
            carry_over(&path, &target, PREVIEW_EXTENSION, false)?;
            continue;
        }
        if path.is_file() && is_slot_file(&path, extension) {
            debug!("dropping stale {}", path.display());
            continue;
        }

        fs::create_dir_all(to).map_err(Error::io(to))?;
        fs::rename(&path, &target).map_err(Error::io(&target))?;
    }

    Ok(())
}
