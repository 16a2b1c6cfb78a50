//! Reader for the self-describing tagged-binary format (NBT) used by
//! per-player save files.
//!
//! Only what the save decoder needs lives here: a tag tree, a reader for
//! big-endian uncompressed payloads, and transparent gzip detection.

mod reader;
#[cfg(any(test, feature = "test-support"))]
pub mod writer;

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read};

use flate2::bufread::MultiGzDecoder;

pub use reader::{read_root, MAX_DEPTH};

/// First two bytes of every gzip member.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub type Compound = HashMap<String, Tag>;

/// Numeric tag type ids as they appear on the wire.
pub mod id {
    pub const END: u8 = 0;
    pub const BYTE: u8 = 1;
    pub const SHORT: u8 = 2;
    pub const INT: u8 = 3;
    pub const LONG: u8 = 4;
    pub const FLOAT: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const BYTE_ARRAY: u8 = 7;
    pub const STRING: u8 = 8;
    pub const LIST: u8 = 9;
    pub const COMPOUND: u8 = 10;
    pub const INT_ARRAY: u8 = 11;
    pub const LONG_ARRAY: u8 = 12;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(String),
    List(List),
    Compound(Compound),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

/// A homogeneous list. `element` is kept even for empty lists so the
/// declared element type can be inspected.
#[derive(Debug, Clone, PartialEq)]
pub struct List {
    pub element: u8,
    pub items: Vec<Tag>,
}

impl Tag {
    pub fn id(&self) -> u8 {
        match self {
            Tag::Byte(_) => id::BYTE,
            Tag::Short(_) => id::SHORT,
            Tag::Int(_) => id::INT,
            Tag::Long(_) => id::LONG,
            Tag::Float(_) => id::FLOAT,
            Tag::Double(_) => id::DOUBLE,
            Tag::ByteArray(_) => id::BYTE_ARRAY,
            Tag::String(_) => id::STRING,
            Tag::List(_) => id::LIST,
            Tag::Compound(_) => id::COMPOUND,
            Tag::IntArray(_) => id::INT_ARRAY,
            Tag::LongArray(_) => id::LONG_ARRAY,
        }
    }

    pub fn type_name(&self) -> &'static str {
        type_name(self.id())
    }

    /// Any integral tag widened to `i64`.
    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            Tag::Byte(v) => Some(v.into()),
            Tag::Short(v) => Some(v.into()),
            Tag::Int(v) => Some(v.into()),
            Tag::Long(v) => Some(v),
            _ => None,
        }
    }

    /// Any numeric tag widened to `f64`.
    pub fn as_number(&self) -> Option<f64> {
        match *self {
            Tag::Float(v) => Some(v.into()),
            Tag::Double(v) => Some(v),
            _ => self.as_integer().map(|v| v as f64),
        }
    }
}

pub fn type_name(id: u8) -> &'static str {
    match id {
        id::END => "END",
        id::BYTE => "BYTE",
        id::SHORT => "SHORT",
        id::INT => "INT",
        id::LONG => "LONG",
        id::FLOAT => "FLOAT",
        id::DOUBLE => "DOUBLE",
        id::BYTE_ARRAY => "BYTE_ARRAY",
        id::STRING => "STRING",
        id::LIST => "LIST",
        id::COMPOUND => "COMPOUND",
        id::INT_ARRAY => "INT_ARRAY",
        id::LONG_ARRAY => "LONG_ARRAY",
        _ => "UNKNOWN",
    }
}

/// Read a whole stream, inflating it first if it starts with the gzip magic.
///
/// The first two bytes are only peeked through the buffer, so a raw stream
/// reaches the tag reader untouched.
pub fn read_maybe_compressed<R: Read>(input: R) -> io::Result<Vec<u8>> {
    let mut reader = BufReader::new(input);
    let is_gzip = reader.fill_buf()?.starts_with(&GZIP_MAGIC);

    let mut bytes = Vec::new();
    if is_gzip {
        MultiGzDecoder::new(reader).read_to_end(&mut bytes)?;
    } else {
        reader.read_to_end(&mut bytes)?;
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_raw_stream_passes_through() {
        let raw = vec![id::COMPOUND, 0, 0, id::END];
        let out = read_maybe_compressed(raw.as_slice()).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn test_gzip_stream_is_inflated() {
        let raw = vec![id::COMPOUND, 0, 0, id::END];
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&raw).unwrap();
        let gz = enc.finish().unwrap();
        assert_eq!(&gz[..2], &GZIP_MAGIC);

        let out = read_maybe_compressed(gz.as_slice()).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn test_single_byte_stream_is_not_gzip() {
        let out = read_maybe_compressed([0x1fu8].as_slice()).unwrap();
        assert_eq!(out, vec![0x1f]);
    }

    #[test]
    fn test_truncated_gzip_is_an_io_error() {
        let bytes = [0x1f, 0x8b, 0x08];
        assert!(read_maybe_compressed(bytes.as_slice()).is_err());
    }

    #[test]
    fn test_numeric_widening() {
        assert_eq!(Tag::Short(-3).as_integer(), Some(-3));
        assert_eq!(Tag::Float(1.5).as_number(), Some(1.5));
        assert_eq!(Tag::String("x".into()).as_number(), None);
        assert_eq!(Tag::Double(2.0).as_integer(), None);
    }
}
