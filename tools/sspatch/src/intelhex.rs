//! Intel HEX records
//!
//! Output has to be accepted by third-party merge tools that run their own
//! validation, so the writer is strict about the canonical form: uppercase
//! digits, at most 16 data bytes per record, records never straddle a 64KiB
//! boundary, and an Extended Linear Address record whenever the upper 16
//! address bits change. The parser is equally strict and exists to check
//! what we produce.

use std::fmt;
use std::ops::Deref;
use std::path::Path;

use thiserror::Error;

use crate::error::{Error, Result};

pub const MAX_DATA_LEN: usize = 16;

pub const TYPE_DATA: u8 = 0x00;
pub const TYPE_END_OF_FILE: u8 = 0x01;
pub const TYPE_EXTENDED_SEGMENT_ADDRESS: u8 = 0x02;
pub const TYPE_START_SEGMENT_ADDRESS: u8 = 0x03;
pub const TYPE_EXTENDED_LINEAR_ADDRESS: u8 = 0x04;
pub const TYPE_START_LINEAR_ADDRESS: u8 = 0x05;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HexError {
    #[error("record does not start with ':'")]
    MissingStartCode,

    #[error("invalid hex digit {0:?} (uppercase only)")]
    InvalidDigit(char),

    #[error("record has {0} hex digits, expected an even number of at least 10")]
    BadRecordLength(usize),

    #[error("byte count says {declared} data bytes but record holds {actual}")]
    CountMismatch { declared: usize, actual: usize },

    #[error("checksum is 0x{found:02X}, expected 0x{expected:02X}")]
    Checksum { expected: u8, found: u8 },

    #[error("unsupported record type 0x{0:02X}")]
    UnsupportedType(u8),

    #[error("record type 0x{record_type:02X} cannot carry {len} data bytes")]
    BadPayload { record_type: u8, len: usize },

    #[error("data record payload of {0} bytes exceeds 255")]
    PayloadTooLong(usize),

    #[error("missing end-of-file record")]
    MissingEndOfFile,

    #[error("records after the end-of-file record")]
    DataAfterEndOfFile,

    #[error("line {line}: {kind}")]
    Line { line: usize, kind: Box<HexError> },
}

/// Data record payload; the length must fit the one-byte count field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub const MAX_LEN: usize = u8::MAX as usize;

    pub fn new(bytes: impl Into<Vec<u8>>) -> std::result::Result<Self, HexError> {
        let bytes = bytes.into();
        if bytes.len() > Self::MAX_LEN {
            return Err(HexError::PayloadTooLong(bytes.len()));
        }
        Ok(Self(bytes))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Payload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<Vec<u8>> for Payload {
    type Error = HexError;

    fn try_from(bytes: Vec<u8>) -> std::result::Result<Self, HexError> {
        Self::new(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Data at a 16-bit offset from the current base address
    Data { offset: u16, data: Payload },
    EndOfFile,
    /// Base address = value * 16
    ExtendedSegmentAddress(u16),
    StartSegmentAddress { cs: u16, ip: u16 },
    /// Base address = value << 16
    ExtendedLinearAddress(u16),
    StartLinearAddress(u32),
}

impl Record {
    pub fn record_type(&self) -> u8 {
        match self {
            Record::Data { .. } => TYPE_DATA,
            Record::EndOfFile => TYPE_END_OF_FILE,
            Record::ExtendedSegmentAddress(_) => TYPE_EXTENDED_SEGMENT_ADDRESS,
            Record::StartSegmentAddress { .. } => TYPE_START_SEGMENT_ADDRESS,
            Record::ExtendedLinearAddress(_) => TYPE_EXTENDED_LINEAR_ADDRESS,
            Record::StartLinearAddress(_) => TYPE_START_LINEAR_ADDRESS,
        }
    }

    fn address_field(&self) -> u16 {
        match self {
            Record::Data { offset, .. } => *offset,
            _ => 0,
        }
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            Record::Data { data, .. } => data.to_vec(),
            Record::EndOfFile => Vec::new(),
            Record::ExtendedSegmentAddress(v) | Record::ExtendedLinearAddress(v) => {
                v.to_be_bytes().to_vec()
            }
            Record::StartSegmentAddress { cs, ip } => {
                let mut p = cs.to_be_bytes().to_vec();
                p.extend_from_slice(&ip.to_be_bytes());
                p
            }
            Record::StartLinearAddress(v) => v.to_be_bytes().to_vec(),
        }
    }

    /// Record bytes: count, address (big-endian), type, payload, checksum
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload = self.payload();
        let address = self.address_field().to_be_bytes();

        let mut bytes = Vec::with_capacity(payload.len() + 5);
        bytes.push(payload.len() as u8);
        bytes.extend_from_slice(&address);
        bytes.push(self.record_type());
        bytes.extend_from_slice(&payload);
        bytes.push(checksum(&bytes));
        bytes
    }

    /// `:LLAAAATT...CC`, uppercase, no line terminator
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parse one record line (without the line terminator)
    pub fn parse(line: &str) -> std::result::Result<Self, HexError> {
        let digits = line.strip_prefix(':').ok_or(HexError::MissingStartCode)?;
        if digits.len() < 10 || digits.len() % 2 != 0 {
            return Err(HexError::BadRecordLength(digits.len()));
        }

        let bytes = decode_digits(digits)?;

        let declared = bytes[0] as usize;
        let payload = &bytes[4..bytes.len() - 1];
        if declared != payload.len() {
            return Err(HexError::CountMismatch {
                declared,
                actual: payload.len(),
            });
        }

        let body = &bytes[..bytes.len() - 1];
        let found = bytes[bytes.len() - 1];
        let expected = checksum(body);
        if found != expected {
            return Err(HexError::Checksum { expected, found });
        }

        let offset = u16::from_be_bytes([bytes[1], bytes[2]]);
        let record_type = bytes[3];
        let bad_payload = || HexError::BadPayload {
            record_type,
            len: payload.len(),
        };

        match (record_type, payload) {
            (TYPE_DATA, data) => Ok(Record::Data {
                offset,
                data: Payload(data.to_vec()),
            }),
            (TYPE_END_OF_FILE, []) => Ok(Record::EndOfFile),
            (TYPE_EXTENDED_SEGMENT_ADDRESS, [hi, lo]) => {
                Ok(Record::ExtendedSegmentAddress(u16::from_be_bytes([*hi, *lo])))
            }
            (TYPE_START_SEGMENT_ADDRESS, [a, b, c, d]) => Ok(Record::StartSegmentAddress {
                cs: u16::from_be_bytes([*a, *b]),
                ip: u16::from_be_bytes([*c, *d]),
            }),
            (TYPE_EXTENDED_LINEAR_ADDRESS, [hi, lo]) => {
                Ok(Record::ExtendedLinearAddress(u16::from_be_bytes([*hi, *lo])))
            }
            (TYPE_START_LINEAR_ADDRESS, [a, b, c, d]) => {
                Ok(Record::StartLinearAddress(u32::from_be_bytes([*a, *b, *c, *d])))
            }
            (TYPE_END_OF_FILE..=TYPE_START_LINEAR_ADDRESS, _) => Err(bad_payload()),
            (other, _) => Err(HexError::UnsupportedType(other)),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(":")?;
        for b in self.to_bytes() {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

/// Two's complement of the byte sum, so a whole record sums to 0 mod 256
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
        .wrapping_neg()
}

fn decode_digits(digits: &str) -> std::result::Result<Vec<u8>, HexError> {
    fn nibble(c: u8) -> std::result::Result<u8, HexError> {
        match c {
            b'0'..=b'9' => Ok(c - b'0'),
            b'A'..=b'F' => Ok(c - b'A' + 10),
            _ => Err(HexError::InvalidDigit(c as char)),
        }
    }

    digits
        .as_bytes()
        .chunks_exact(2)
        .map(|pair| -> std::result::Result<u8, HexError> {
            Ok((nibble(pair[0])? << 4) | nibble(pair[1])?)
        })
        .collect()
}

/// Builds a record stream from absolute addresses
#[derive(Debug, Default)]
pub struct HexWriter {
    records: Vec<Record>,
    upper: u16,
}

impl HexWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `data` at the 32-bit address `address`
    pub fn write(&mut self, address: u32, data: &[u8]) {
        let mut address = address;
        let mut rest = data;

        while !rest.is_empty() {
            let upper = (address >> 16) as u16;
            if upper != self.upper {
                self.records.push(Record::ExtendedLinearAddress(upper));
                self.upper = upper;
            }

            let offset = address as u16;
            let room = 0x1_0000 - offset as usize;
            let len = rest.len().min(MAX_DATA_LEN).min(room);

            self.records.push(Record::Data {
                offset,
                data: Payload(rest[..len].to_vec()),
            });

            address = address.wrapping_add(len as u32);
            rest = &rest[len..];
        }
    }

    pub fn finish(mut self) -> HexRecordStream {
        self.records.push(Record::EndOfFile);
        HexRecordStream {
            records: self.records,
        }
    }
}

/// A complete record stream, terminated by the end-of-file record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecordStream {
    records: Vec<Record>,
}

impl HexRecordStream {
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Data records with their full 32-bit address
    pub fn data_records(&self) -> Vec<(u32, &[u8])> {
        let mut base = 0u32;
        let mut out = Vec::new();
        for record in &self.records {
            match record {
                Record::ExtendedLinearAddress(upper) => base = (*upper as u32) << 16,
                Record::ExtendedSegmentAddress(segment) => base = (*segment as u32) << 4,
                Record::Data { offset, data } => out.push((base + *offset as u32, data.as_slice())),
                _ => {}
            }
        }
        out
    }

    /// Re-parse the rendered text, as a merge tool would
    pub fn verify(&self) -> std::result::Result<Vec<Segment>, HexError> {
        decode(&self.to_string())
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_string()).map_err(Error::io(path))
    }
}

impl fmt::Display for HexRecordStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in &self.records {
            writeln!(f, "{}", record)?;
        }
        Ok(())
    }
}

/// A run of contiguous bytes recovered from a record stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub address: u32,
    pub data: Vec<u8>,
}

/// Parse a whole hex file and merge its data records into contiguous segments
pub fn decode(text: &str) -> std::result::Result<Vec<Segment>, HexError> {
    let mut base = 0u32;
    let mut segments: Vec<Segment> = Vec::new();
    let mut seen_eof = false;

    for (i, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if seen_eof {
            return Err(HexError::DataAfterEndOfFile);
        }

        let record = Record::parse(line).map_err(|kind| HexError::Line {
            line: i + 1,
            kind: Box::new(kind),
        })?;

        match record {
            Record::Data { offset, data } => {
                let address = base.wrapping_add(offset as u32);
                match segments.last_mut() {
                    Some(seg) if seg.address.wrapping_add(seg.data.len() as u32) == address => {
                        seg.data.extend_from_slice(&data);
                    }
                    _ => segments.push(Segment {
                        address,
                        data: data.into_vec(),
                    }),
                }
            }
            Record::EndOfFile => seen_eof = true,
            Record::ExtendedLinearAddress(upper) => base = (upper as u32) << 16,
            Record::ExtendedSegmentAddress(segment) => base = (segment as u32) << 4,
            Record::StartSegmentAddress { .. } | Record::StartLinearAddress(_) => {}
        }
    }

    if !seen_eof {
        return Err(HexError::MissingEndOfFile);
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(offset: u16, bytes: Vec<u8>) -> Record {
        Record::Data {
            offset,
            data: Payload::new(bytes).unwrap(),
        }
    }

    #[test]
    fn known_records() {
        assert_eq!(Record::EndOfFile.to_string(), ":00000001FF");
        assert_eq!(
            Record::ExtendedLinearAddress(0x000F).to_string(),
            ":02000004000FEB"
        );

        let record = data(
            0x0100,
            vec![
                0x21, 0x46, 0x01, 0x36, 0x01, 0x21, 0x47, 0x01, 0x36, 0x00, 0x7E, 0xFE, 0x09,
                0xD2, 0x19, 0x01,
            ],
        );
        assert_eq!(record.to_string(), ":10010000214601360121470136007EFE09D2190140");
        assert_eq!(Record::parse(&record.to_string()).unwrap(), record);
    }

    #[test]
    fn records_sum_to_zero() {
        let record = data(0xFFF0, (0..16).map(|i| i * 17).collect());
        let sum = record.to_bytes().iter().fold(0u8, |a, &b| a.wrapping_add(b));
        assert_eq!(sum, 0);
    }

    #[test]
    fn payload_length_fits_the_count_byte() {
        assert_eq!(Payload::new(vec![0u8; 256]), Err(HexError::PayloadTooLong(256)));

        let record = data(0, vec![0x5A; Payload::MAX_LEN]);
        let text = record.to_string();
        assert!(text.starts_with(":FF000000"));
        assert_eq!(Record::parse(&text).unwrap(), record);
    }

    #[test]
    fn writer_splits_at_64k_boundaries() {
        let mut writer = HexWriter::new();
        writer.write(0xFFF8, &[0xAA; 20]);
        let stream = writer.finish();

        assert_eq!(
            stream.records(),
            &[
                data(0xFFF8, vec![0xAA; 8]),
                Record::ExtendedLinearAddress(1),
                data(0x0000, vec![0xAA; 12]),
                Record::EndOfFile,
            ]
        );
        assert_eq!(
            stream.data_records().iter().map(|(a, d)| (*a, d.len())).collect::<Vec<_>>(),
            vec![(0xFFF8, 8), (0x1_0000, 12)]
        );
    }

    #[test]
    fn writer_output_is_uppercase_with_newlines() {
        let mut writer = HexWriter::new();
        writer.write(0x0F_0000, &[0xab, 0xcd, 0xef]);
        let text = writer.finish().to_string();

        assert_eq!(text, ":02000004000FEB\n:03000000ABCDEF96\n:00000001FF\n");
        assert!(!text.chars().any(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn parse_rejects_malformed_records() {
        assert_eq!(Record::parse("00000001FF"), Err(HexError::MissingStartCode));
        assert_eq!(Record::parse(":00000001F"), Err(HexError::BadRecordLength(9)));
        assert_eq!(Record::parse(":00000001ff"), Err(HexError::InvalidDigit('f')));
        assert_eq!(
            Record::parse(":00000001FE"),
            Err(HexError::Checksum { expected: 0xFF, found: 0xFE })
        );
        assert_eq!(
            Record::parse(":02000000AAFF"),
            Err(HexError::CountMismatch { declared: 2, actual: 1 })
        );
        assert!(matches!(
            Record::parse(":01000001AA54"),
            Err(HexError::BadPayload { record_type: TYPE_END_OF_FILE, len: 1 })
        ));
        assert_eq!(Record::parse(":00000007F9"), Err(HexError::UnsupportedType(7)));
    }

    #[test]
    fn decode_merges_contiguous_data() {
        let mut writer = HexWriter::new();
        let data: Vec<u8> = (0..100u8).collect();
        writer.write(0x0F_FFC0, &data);
        writer.write(0x20_0000, &[1, 2, 3]);
        let text = writer.finish().to_string();

        let segments = decode(&text).unwrap();
        assert_eq!(
            segments,
            vec![
                Segment { address: 0x0F_FFC0, data },
                Segment { address: 0x20_0000, data: vec![1, 2, 3] },
            ]
        );
    }

    #[test]
    fn decode_requires_a_single_trailing_eof() {
        assert_eq!(decode(":0100000000FF\n"), Err(HexError::MissingEndOfFile));
        assert_eq!(
            decode(":00000001FF\n:0100000000FF\n"),
            Err(HexError::DataAfterEndOfFile)
        );
        assert!(matches!(
            decode(":0100000000FF\n:0100000000FE\n:00000001FF\n"),
            Err(HexError::Line { line: 2, .. })
        ));
    }
}
