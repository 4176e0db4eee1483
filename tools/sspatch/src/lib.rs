//! sspatch - Shapeshifter wavetable bank tool
//!
//! Works on the legacy (unencrypted) Shapeshifter EEPROM image:
//! - extract: dump all 128 wavetable slots to a directory
//! - patch: write a directory of wavetables back into a copy of an image
//! - hex: synthesize the wavetable bank as Intel HEX for firmware merge tools

pub mod error;
pub mod extract;
pub mod hexbank;
pub mod intelhex;
pub mod layout;
pub mod name;
pub mod patch;
pub mod preview;
pub mod wavedir;

pub use error::{Error, Result};
pub use extract::{ExtractOptions, WrittenFile, extract};
pub use hexbank::{RegionStreams, encode, encode_regions};
pub use intelhex::{HexRecordStream, Payload, Record};
pub use layout::{Image, SlotBounds, slot_bounds};
pub use name::{decode_name, encode_name, sanitize_name};
pub use patch::{PatchOptions, patch};
