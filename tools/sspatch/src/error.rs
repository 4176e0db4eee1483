use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::intelhex::HexError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{what} had unexpected size (got {actual}, expected {})", list_sizes(.expected))]
    SizeMismatch {
        what: String,
        expected: &'static [usize],
        actual: usize,
    },

    #[error("slot index {0} is out of range (expected 0..=127)")]
    IndexOutOfRange(usize),

    #[error("wavetable name \"{name}\" is too long ({max} characters at most)")]
    NameTooLong { name: String, max: usize },

    #[error("wavetable name \"{name}\" contains invalid character {ch:?}")]
    InvalidNameCharacter { name: String, ch: char },

    #[error("cannot map wavetable files to slots: {0}")]
    AmbiguousSlotMapping(String),

    #[error("no wavetable file for slot {0}")]
    MissingSlot(usize),

    #[error("found a run of {run} bytes (0x{byte:02X}) in slot {slot}; wavetable data looks invalid")]
    ImplausibleAudio { slot: usize, byte: u8, run: usize },

    #[error("{} doesn't exist or isn't a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write wav preview: {0}")]
    Wav(#[from] hound::Error),

    #[error("malformed hex record: {0}")]
    Hex(#[from] HexError),
}

impl Error {
    /// Adapter for `map_err` that attaches the path being worked on
    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn list_sizes(sizes: &[usize]) -> String {
    sizes
        .iter()
        .map(|s| format!("0x{:X}", s))
        .collect::<Vec<_>>()
        .join(" or ")
}
