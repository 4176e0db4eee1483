//! Legacy EEPROM image layout
//!
//! The wavetable bank lives at fixed offsets in the image: a table of 128
//! 8-byte names at `NAME_TABLE_OFFSET`, followed (after a gap) by 128 8KiB
//! wavetables at `DATA_OFFSET`. Everything else in the image is firmware we
//! never touch.

use std::fmt;
use std::io::Write;
use std::ops::Range;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result};
use crate::name::{NAME_PREFIX, decode_name};

/// 2MB EEPROM
pub const IMAGE_SIZE_SHORT: usize = 0x20_0000;
/// 8MB EEPROM
pub const IMAGE_SIZE_LONG: usize = 0x80_0000;
pub const IMAGE_SIZES: &[usize] = &[IMAGE_SIZE_SHORT, IMAGE_SIZE_LONG];

pub const SLOT_COUNT: usize = 128;

pub const NAME_TABLE_OFFSET: usize = 0x0F_0000;
pub const NAME_LENGTH: usize = 8;

pub const DATA_OFFSET: usize = 0x10_0000;
/// 8 waves per table, 512 16-bit samples per wave
pub const DATA_LENGTH: usize = 1024 * 8;
pub const DATA_LENGTHS: &[usize] = &[DATA_LENGTH];
/// All 128 wavetables back to back
pub const DATA_AREA_LENGTH: usize = SLOT_COUNT * DATA_LENGTH;

/// Longest run of identical bytes accepted by [`check_audio_runs`]. A couple
/// of silent waves in a row is plausible, unused EEPROM space is not.
pub const RUN_LIMIT: usize = DATA_LENGTH / 4;

/// Byte ranges of one slot within the image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotBounds {
    pub index: usize,
    pub name: Range<usize>,
    pub data: Range<usize>,
}

/// Calculate the name and data ranges for a slot
pub fn slot_bounds(index: usize) -> Result<SlotBounds> {
    if index >= SLOT_COUNT {
        return Err(Error::IndexOutOfRange(index));
    }
    Ok(bounds_unchecked(index))
}

fn bounds_unchecked(index: usize) -> SlotBounds {
    let name_start = NAME_TABLE_OFFSET + index * NAME_LENGTH;
    let data_start = DATA_OFFSET + index * DATA_LENGTH;

    SlotBounds {
        index,
        name: name_start..name_start + NAME_LENGTH,
        data: data_start..data_start + DATA_LENGTH,
    }
}

/// A borrowed view of one slot
#[derive(Debug, Clone, Copy)]
pub struct Slot<'a> {
    pub index: usize,
    pub raw_name: &'a [u8],
    pub data: &'a [u8],
}

impl Slot<'_> {
    pub fn name(&self) -> String {
        let mut raw = [0u8; NAME_LENGTH];
        raw.copy_from_slice(self.raw_name);
        decode_name(&raw)
    }

    pub fn has_name_prefix(&self) -> bool {
        self.raw_name.starts_with(NAME_PREFIX)
    }
}

/// A size-validated EEPROM image.
///
/// Slot accessors index straight into the buffer with the layout constants,
/// so the constructor rejects buffers of any other size.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    bytes: Vec<u8>,
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("len", &format_args!("0x{:X}", self.bytes.len()))
            .finish()
    }
}

impl Image {
    pub fn validate(bytes: Vec<u8>) -> Result<Self> {
        Self::validate_named(bytes, "EEPROM image")
    }

    fn validate_named(bytes: Vec<u8>, what: &str) -> Result<Self> {
        if !IMAGE_SIZES.contains(&bytes.len()) {
            return Err(Error::SizeMismatch {
                what: what.to_string(),
                expected: IMAGE_SIZES,
                actual: bytes.len(),
            });
        }
        Ok(Self { bytes })
    }

    /// Read and validate an image file
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(Error::io(path))?;
        debug!("read {} bytes from {}", bytes.len(), path.display());
        Self::validate_named(bytes, &format!("Shapeshifter ROM image ({})", path.display()))
    }

    /// Write the image atomically via a temp file in the same directory
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(Error::io(dir))?;
        tmp.write_all(&self.bytes).map_err(Error::io(tmp.path()))?;
        tmp.as_file().sync_all().map_err(Error::io(tmp.path()))?;
        tmp.persist(path).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e.error,
        })?;

        debug!("wrote {} bytes to {}", self.bytes.len(), path.display());
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// The wavetable data of every slot, contiguous
    pub fn data_area(&self) -> &[u8] {
        &self.bytes[DATA_OFFSET..DATA_OFFSET + DATA_AREA_LENGTH]
    }

    pub fn slot(&self, index: usize) -> Result<Slot<'_>> {
        let bounds = slot_bounds(index)?;
        Ok(Slot {
            index,
            raw_name: &self.bytes[bounds.name],
            data: &self.bytes[bounds.data],
        })
    }

    /// All slots in index order
    pub fn slots(&self) -> impl Iterator<Item = Slot<'_>> + '_ {
        (0..SLOT_COUNT).map(move |index| {
            let bounds = bounds_unchecked(index);
            Slot {
                index,
                raw_name: &self.bytes[bounds.name],
                data: &self.bytes[bounds.data],
            }
        })
    }

    pub fn raw_name(&self, index: usize) -> Result<[u8; NAME_LENGTH]> {
        let bounds = slot_bounds(index)?;
        let mut raw = [0u8; NAME_LENGTH];
        raw.copy_from_slice(&self.bytes[bounds.name]);
        Ok(raw)
    }

    pub fn slot_name(&self, index: usize) -> Result<String> {
        Ok(decode_name(&self.raw_name(index)?))
    }

    pub fn slot_data(&self, index: usize) -> Result<&[u8]> {
        Ok(self.slot(index)?.data)
    }

    pub(crate) fn write_slot_data(&mut self, index: usize, data: &[u8]) -> Result<()> {
        let bounds = slot_bounds(index)?;
        if data.len() != DATA_LENGTH {
            return Err(Error::SizeMismatch {
                what: format!("wavetable for slot {}", index),
                expected: DATA_LENGTHS,
                actual: data.len(),
            });
        }
        self.bytes[bounds.data].copy_from_slice(data);
        Ok(())
    }

    pub(crate) fn write_slot_name(&mut self, index: usize, raw: &[u8; NAME_LENGTH]) -> Result<()> {
        let bounds = slot_bounds(index)?;
        self.bytes[bounds.name].copy_from_slice(raw);
        Ok(())
    }
}

impl TryFrom<Vec<u8>> for Image {
    type Error = Error;

    fn try_from(bytes: Vec<u8>) -> Result<Self> {
        Self::validate(bytes)
    }
}

/// Sanity check that the data area holds something that looks like audio.
///
/// Unused EEPROM space is full of long runs of identical values (0xFF or
/// 0x00), real wavetables are effectively random. Runs are counted across
/// slot boundaries; the reported slot is the one the run starts in.
pub fn check_audio_runs(data: &[u8]) -> Result<()> {
    let mut start = 0;

    for (i, &byte) in data.iter().enumerate() {
        if byte != data[start] {
            start = i;
        }

        let run = i + 1 - start;
        if run > RUN_LIMIT {
            return Err(Error::ImplausibleAudio {
                slot: start / DATA_LENGTH,
                byte,
                run,
            });
        }
    }

    Ok(())
}
