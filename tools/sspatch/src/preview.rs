//! WAV previews of wavetable slots, for auditioning extracted banks

use std::path::Path;

use crate::error::Result;

pub const PREVIEW_SAMPLE_RATE: u32 = 44_100;

/// Render a slot's raw data as 16-bit mono WAV. Samples are taken verbatim
/// as little-endian pairs, no conversion.
pub fn write_preview(path: &Path, data: &[u8]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: PREVIEW_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;

    for pair in data.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
    }
    writer.finalize()?;

    Ok(())
}
