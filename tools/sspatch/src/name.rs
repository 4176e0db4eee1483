//! Wavetable name field codec
//!
//! Each name is 8 bytes: a two-space prefix followed by a 6 character user
//! name, right-justified with spaces. Only ASCII letters, digits and space
//! are displayable on the module.
//!
//! Decoding is total and lossy: the prefix and the left padding are dropped,
//! and any byte outside the allowed set becomes [`PLACEHOLDER`].

use tracing::warn;

use crate::error::{Error, Result};
use crate::layout::NAME_LENGTH;

pub const NAME_PREFIX: &[u8; 2] = b"  ";
pub const USER_NAME_LENGTH: usize = NAME_LENGTH - NAME_PREFIX.len();
pub const PLACEHOLDER: char = '_';

pub fn is_allowed(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == ' '
}

/// Decode a raw name field into a display name
pub fn decode_name(raw: &[u8; NAME_LENGTH]) -> String {
    let user: String = raw[NAME_PREFIX.len()..]
        .iter()
        .map(|&b| {
            let ch = b as char;
            if is_allowed(ch) { ch } else { PLACEHOLDER }
        })
        .collect();

    user.trim_start_matches(' ').to_string()
}

/// Encode a name into a raw name field.
///
/// The name must be at most [`USER_NAME_LENGTH`] allowed characters. Names
/// without leading spaces survive `decode_name(encode_name(name))` unchanged.
pub fn encode_name(name: &str) -> Result<[u8; NAME_LENGTH]> {
    if name.chars().count() > USER_NAME_LENGTH {
        return Err(Error::NameTooLong {
            name: name.to_string(),
            max: USER_NAME_LENGTH,
        });
    }

    if let Some(ch) = name.chars().find(|&ch| !is_allowed(ch)) {
        return Err(Error::InvalidNameCharacter {
            name: name.to_string(),
            ch,
        });
    }

    // all ASCII from here, so bytes == chars
    let mut raw = [b' '; NAME_LENGTH];
    raw[NAME_LENGTH - name.len()..].copy_from_slice(name.as_bytes());
    Ok(raw)
}

/// Lenient [`encode_name`] for names derived from arbitrary filenames.
///
/// Over-long names keep their last 6 characters (after trimming whitespace),
/// which collide less often than the first 6. Invalid characters still fail.
pub fn sanitize_name(name: &str) -> Result<[u8; NAME_LENGTH]> {
    if name.chars().count() <= USER_NAME_LENGTH {
        return encode_name(name);
    }

    let trimmed = name.trim();
    let skip = trimmed.chars().count().saturating_sub(USER_NAME_LENGTH);
    let shortened: String = trimmed.chars().skip(skip).collect();
    warn!("Name \"{}\" was too long. Renamed to \"{}\".", name, shortened);

    encode_name(&shortened)
}
