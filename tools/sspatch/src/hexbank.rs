//! Encode a wavetable directory as Intel HEX for flashing the EEPROM directly
//!
//! The single-stream form covers 0x0F0000 onwards, slot by slot: the 8-byte
//! name field followed by the 8192 data bytes. The split form writes the
//! name table and the data area as two streams at their real offsets.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::intelhex::{HexRecordStream, HexWriter};
use crate::layout::{DATA_LENGTH, DATA_OFFSET, NAME_LENGTH, NAME_TABLE_OFFSET, SLOT_COUNT};
use crate::name::encode_name;
use crate::wavedir::WavetableDir;

pub const BANK_BASE_ADDRESS: u32 = NAME_TABLE_OFFSET as u32;

/// A full bank: every slot present, names encoded strictly
struct Bank {
    names: Vec<[u8; NAME_LENGTH]>,
    waves: Vec<Vec<u8>>,
}

fn read_bank(in_dir: &Path) -> Result<Bank> {
    let dir = WavetableDir::read(in_dir)?;
    if let Some(slot) = dir.first_missing_slot() {
        return Err(Error::MissingSlot(slot));
    }

    let names = dir
        .files
        .iter()
        .map(|file| encode_name(&file.name))
        .collect::<Result<Vec<_>>>()?;
    let waves = dir.files.into_iter().map(|file| file.data).collect();

    Ok(Bank { names, waves })
}

/// One stream holding name then data for every slot, from [`BANK_BASE_ADDRESS`]
pub fn encode(in_dir: &Path) -> Result<HexRecordStream> {
    let bank = read_bank(in_dir)?;

    let mut writer = HexWriter::new();
    let mut address = BANK_BASE_ADDRESS;
    for (name, data) in bank.names.iter().zip(&bank.waves) {
        writer.write(address, name);
        address += NAME_LENGTH as u32;
        writer.write(address, data);
        address += DATA_LENGTH as u32;
    }

    info!(
        "encoded {} slots from {} as hex, 0x{:06X}..0x{:06X}",
        SLOT_COUNT,
        in_dir.display(),
        BANK_BASE_ADDRESS,
        address
    );
    checked(writer.finish())
}

fn checked(stream: HexRecordStream) -> Result<HexRecordStream> {
    let segments = stream.verify()?;
    debug!("hex stream verified: {} records, {} segments", stream.records().len(), segments.len());
    Ok(stream)
}

/// Name table and data area as separate streams
#[derive(Debug, Clone)]
pub struct RegionStreams {
    pub names: HexRecordStream,
    pub waves: HexRecordStream,
}

pub fn encode_regions(in_dir: &Path) -> Result<RegionStreams> {
    let bank = read_bank(in_dir)?;

    let mut names = HexWriter::new();
    names.write(NAME_TABLE_OFFSET as u32, &bank.names.concat());

    let mut waves = HexWriter::new();
    waves.write(DATA_OFFSET as u32, &bank.waves.concat());

    info!("encoded name table and data area from {} as hex", in_dir.display());
    Ok(RegionStreams {
        names: checked(names.finish())?,
        waves: checked(waves.finish())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intelhex::{Segment, decode};
    use crate::wavedir::file_name_for;
    use std::fs;
    use tempfile::tempdir;

    fn full_dir() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        for i in 0..SLOT_COUNT {
            fs::write(dir.path().join(file_name_for(i, &format!("T{}", i))), vec![i as u8; DATA_LENGTH])
                .unwrap();
        }
        dir
    }

    #[test]
    fn single_stream_interleaves_names_and_data() {
        let dir = full_dir();
        let stream = encode(dir.path()).unwrap();

        let segments = decode(&stream.to_string()).unwrap();
        assert_eq!(segments.len(), 1);
        let Segment { address, data } = &segments[0];
        assert_eq!(*address, BANK_BASE_ADDRESS);
        assert_eq!(data.len(), SLOT_COUNT * (NAME_LENGTH + DATA_LENGTH));

        let stride = NAME_LENGTH + DATA_LENGTH;
        let slot9 = &data[9 * stride..10 * stride];
        assert_eq!(&slot9[..NAME_LENGTH], b"      T9");
        assert!(slot9[NAME_LENGTH..].iter().all(|&b| b == 9));
    }

    #[test]
    fn regions_land_at_their_offsets() {
        let dir = full_dir();
        let regions = encode_regions(dir.path()).unwrap();

        let names = decode(&regions.names.to_string()).unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].address, NAME_TABLE_OFFSET as u32);
        assert_eq!(names[0].data.len(), SLOT_COUNT * NAME_LENGTH);
        assert_eq!(&names[0].data[..NAME_LENGTH], b"      T0");

        let waves = decode(&regions.waves.to_string()).unwrap();
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0].address, DATA_OFFSET as u32);
        assert_eq!(waves[0].data[DATA_LENGTH * 127], 127);
    }

    #[test]
    fn gaps_are_refused() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("000_A.raw"), vec![0; DATA_LENGTH]).unwrap();
        fs::write(dir.path().join("002_C.raw"), vec![0; DATA_LENGTH]).unwrap();

        assert!(matches!(encode(dir.path()), Err(Error::MissingSlot(1))));
        assert!(matches!(encode_regions(dir.path()), Err(Error::MissingSlot(1))));
    }

    #[test]
    fn names_must_be_encodable() {
        let dir = full_dir();
        fs::remove_file(dir.path().join(file_name_for(4, "T4"))).unwrap();
        fs::write(dir.path().join("004_toolong.raw"), vec![0; DATA_LENGTH]).unwrap();

        assert!(matches!(encode(dir.path()), Err(Error::NameTooLong { .. })));
    }
}
