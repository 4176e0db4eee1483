#![allow(dead_code)]

use sspatch::encode_name;
use sspatch::layout::{DATA_LENGTH, DATA_OFFSET, IMAGE_SIZE_SHORT, NAME_LENGTH, NAME_TABLE_OFFSET, SLOT_COUNT};
use sspatch::Image;

/// Deterministic noise, so slots never trip the run check
pub fn noise(seed: u32, len: usize) -> Vec<u8> {
    let mut x = seed | 1;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            (x >> 8) as u8
        })
        .collect()
}

/// A short image with noisy data, slot `i` named `name(i)`
pub fn image_with(name: impl Fn(usize) -> String) -> Image {
    let mut bytes = noise(0xC0FF_EE00, IMAGE_SIZE_SHORT);
    for i in 0..SLOT_COUNT {
        let at = NAME_TABLE_OFFSET + i * NAME_LENGTH;
        bytes[at..at + NAME_LENGTH].copy_from_slice(&encode_name(&name(i)).unwrap());
    }
    Image::validate(bytes).unwrap()
}

pub fn synthetic_image() -> Image {
    image_with(|i| format!("Wav{}", i))
}

/// Overwrite a slot's data in a raw image buffer
pub fn set_slot_data(bytes: &mut [u8], slot: usize, data: &[u8]) {
    let at = DATA_OFFSET + slot * DATA_LENGTH;
    bytes[at..at + DATA_LENGTH].copy_from_slice(data);
}
