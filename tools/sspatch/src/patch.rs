//! Patch a directory of wavetables into a copy of an image

use std::path::Path;

use tracing::{debug, info};

use crate::error::Result;
use crate::layout::{Image, NAME_LENGTH, SLOT_COUNT};
use crate::name::{encode_name, sanitize_name};
use crate::wavedir::WavetableDir;

#[derive(Debug, Clone, Default)]
pub struct PatchOptions {
    /// Rewrite slot names from the source filenames. Without this, the name
    /// table of the image is left untouched.
    pub rename: bool,
    /// When renaming, shorten over-long names instead of failing
    pub truncate_names: bool,
}

/// Return a copy of `image` with every slot found in `in_dir` replaced.
///
/// See [`crate::wavedir`] for how files are matched to slots. Slots without
/// a file are copied through. Every file is read and checked before the copy
/// is touched, so an error never yields a half-patched image.
pub fn patch(image: &Image, in_dir: &Path, options: &PatchOptions) -> Result<Image> {
    let wavedir = WavetableDir::read(in_dir)?;

    let names: Vec<(usize, [u8; NAME_LENGTH])> = if options.rename {
        wavedir
            .files
            .iter()
            .map(|file| -> Result<(usize, [u8; NAME_LENGTH])> {
                let raw = if options.truncate_names {
                    sanitize_name(&file.name)?
                } else {
                    encode_name(&file.name)?
                };
                Ok((file.slot, raw))
            })
            .collect::<Result<_>>()?
    } else {
        Vec::new()
    };

    let mut patched = image.clone();
    for file in &wavedir.files {
        patched.write_slot_data(file.slot, &file.data)?;
        debug!("patched slot {:3} from {}", file.slot, file.path.display());
    }
    for (slot, raw) in &names {
        patched.write_slot_name(*slot, raw)?;
    }

    info!(
        "patched {} of {} slots from {} ({:?} mapping{})",
        wavedir.files.len(),
        SLOT_COUNT,
        in_dir.display(),
        wavedir.mapping,
        if options.rename { ", renamed" } else { "" }
    );
    Ok(patched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::layout::{DATA_LENGTH, IMAGE_SIZE_SHORT};
    use std::fs;
    use tempfile::tempdir;

    fn named_image() -> Image {
        let mut image = Image::validate(vec![0x11; IMAGE_SIZE_SHORT]).unwrap();
        for i in 0..SLOT_COUNT {
            image.write_slot_name(i, &encode_name(&format!("Old{}", i)).unwrap()).unwrap();
        }
        image
    }

    #[test]
    fn replaces_only_matched_slots() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("003_Saw.raw"), vec![0x33; DATA_LENGTH]).unwrap();
        let image = named_image();

        let patched = patch(&image, dir.path(), &PatchOptions::default()).unwrap();

        assert_eq!(patched.slot_data(3).unwrap(), &[0x33; DATA_LENGTH][..]);
        assert_eq!(patched.slot_data(2).unwrap(), image.slot_data(2).unwrap());
        // names untouched without rename
        assert_eq!(patched.slot_name(3).unwrap(), "Old3");
        // the caller's image is untouched
        assert_eq!(image.slot_data(3).unwrap(), &[0x11; DATA_LENGTH][..]);
    }

    #[test]
    fn rename_takes_names_from_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("003_Raw--1.raw"), vec![0x33; DATA_LENGTH]).unwrap();

        let options = PatchOptions {
            rename: true,
            ..Default::default()
        };
        let patched = patch(&named_image(), dir.path(), &options).unwrap();

        assert_eq!(patched.slot_name(3).unwrap(), "Raw  1");
        assert_eq!(patched.slot_name(4).unwrap(), "Old4");
    }

    #[test]
    fn rename_rejects_long_names_unless_truncating() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("000_verylongname.raw"), vec![0x33; DATA_LENGTH]).unwrap();
        let image = named_image();

        let options = PatchOptions {
            rename: true,
            truncate_names: false,
        };
        assert!(matches!(
            patch(&image, dir.path(), &options),
            Err(Error::NameTooLong { .. })
        ));

        let options = PatchOptions {
            rename: true,
            truncate_names: true,
        };
        let patched = patch(&image, dir.path(), &options).unwrap();
        assert_eq!(patched.slot_name(0).unwrap(), "ngname");
    }

    #[test]
    fn short_file_fails_without_result() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("000_Good.raw"), vec![0x22; DATA_LENGTH]).unwrap();
        fs::write(dir.path().join("001_Short.raw"), vec![0x22; DATA_LENGTH - 1]).unwrap();

        assert!(matches!(
            patch(&named_image(), dir.path(), &PatchOptions::default()),
            Err(Error::SizeMismatch { actual, .. }) if actual == DATA_LENGTH - 1
        ));
    }
}
