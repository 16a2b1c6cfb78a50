use bytes::Buf;

use super::{id, type_name, Compound, List, Tag};
use crate::error::TagError;

/// Compounds and lists nested deeper than this are rejected.
pub const MAX_DEPTH: usize = 512;

/// Parse an uncompressed stream whose root is a named compound.
///
/// Returns the root name and its entries. Trailing bytes after the root are
/// ignored.
pub fn read_root(input: &[u8]) -> Result<(String, Compound), TagError> {
    let mut reader = TagReader {
        buf: input,
        depth: 0,
    };

    let root_type = reader.u8("root tag type")?;
    if root_type != id::COMPOUND {
        return Err(TagError::RootNotCompound {
            found: type_name(root_type),
        });
    }
    let name = reader.string()?;
    let root = reader.compound()?;
    Ok((name, root))
}

struct TagReader<'a> {
    buf: &'a [u8],
    depth: usize,
}

impl TagReader<'_> {
    fn need(&self, len: usize, context: &'static str) -> Result<(), TagError> {
        if self.buf.remaining() < len {
            return Err(TagError::UnexpectedEof { context });
        }
        Ok(())
    }

    fn u8(&mut self, context: &'static str) -> Result<u8, TagError> {
        self.need(1, context)?;
        Ok(self.buf.get_u8())
    }

    fn length(&mut self, context: &'static str) -> Result<usize, TagError> {
        self.need(4, context)?;
        let length = self.buf.get_i32();
        usize::try_from(length).map_err(|_| TagError::NegativeLength { length, context })
    }

    fn string(&mut self) -> Result<String, TagError> {
        self.need(2, "string length")?;
        let len = usize::from(self.buf.get_u16());
        self.need(len, "string")?;
        // Save files use Java's modified UTF-8; the few code points where it
        // differs from UTF-8 are replaced rather than rejected.
        let s = String::from_utf8_lossy(&self.buf[..len]).into_owned();
        self.buf.advance(len);
        Ok(s)
    }

    fn array<T>(
        &mut self,
        width: usize,
        context: &'static str,
        mut get: impl FnMut(&mut &[u8]) -> T,
    ) -> Result<Vec<T>, TagError> {
        let len = self.length(context)?;
        let bytes = len
            .checked_mul(width)
            .ok_or(TagError::UnexpectedEof { context })?;
        self.need(bytes, context)?;
        Ok((0..len).map(|_| get(&mut self.buf)).collect())
    }

    fn enter(&mut self) -> Result<(), TagError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(TagError::TooDeep { limit: MAX_DEPTH });
        }
        Ok(())
    }

    fn compound(&mut self) -> Result<Compound, TagError> {
        self.enter()?;
        let mut entries = Compound::new();
        loop {
            let tag_type = self.u8("compound entry type")?;
            if tag_type == id::END {
                break;
            }
            let name = self.string()?;
            let value = self.payload(tag_type)?;
            entries.insert(name, value);
        }
        self.depth -= 1;
        Ok(entries)
    }

    fn list(&mut self) -> Result<List, TagError> {
        self.enter()?;
        let element = self.u8("list element type")?;
        let len = self.length("list length")?;
        if element == id::END && len > 0 {
            return Err(TagError::UnknownTagType { id: id::END });
        }
        // Every element takes at least one byte except END, so this caps the
        // allocation by the input size.
        let mut items = Vec::with_capacity(len.min(self.buf.remaining()));
        for _ in 0..len {
            items.push(self.payload(element)?);
        }
        self.depth -= 1;
        Ok(List { element, items })
    }

    fn payload(&mut self, tag_type: u8) -> Result<Tag, TagError> {
        let tag = match tag_type {
            id::BYTE => {
                self.need(1, "byte")?;
                Tag::Byte(self.buf.get_i8())
            }
            id::SHORT => {
                self.need(2, "short")?;
                Tag::Short(self.buf.get_i16())
            }
            id::INT => {
                self.need(4, "int")?;
                Tag::Int(self.buf.get_i32())
            }
            id::LONG => {
                self.need(8, "long")?;
                Tag::Long(self.buf.get_i64())
            }
            id::FLOAT => {
                self.need(4, "float")?;
                Tag::Float(self.buf.get_f32())
            }
            id::DOUBLE => {
                self.need(8, "double")?;
                Tag::Double(self.buf.get_f64())
            }
            id::BYTE_ARRAY => Tag::ByteArray(self.array(1, "byte array", |b| b.get_i8())?),
            id::STRING => Tag::String(self.string()?),
            id::LIST => Tag::List(self.list()?),
            id::COMPOUND => Tag::Compound(self.compound()?),
            id::INT_ARRAY => Tag::IntArray(self.array(4, "int array", |b| b.get_i32())?),
            id::LONG_ARRAY => Tag::LongArray(self.array(8, "long array", |b| b.get_i64())?),
            other => return Err(TagError::UnknownTagType { id: other }),
        };
        Ok(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nbt::writer;

    fn root_with(entries: Vec<(&str, Tag)>) -> Vec<u8> {
        let compound: Compound = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        writer::to_bytes("", &compound)
    }

    #[test]
    fn test_reads_scalars_and_arrays() {
        let bytes = root_with(vec![
            ("b", Tag::Byte(-1)),
            ("s", Tag::Short(300)),
            ("l", Tag::Long(i64::MIN)),
            ("d", Tag::Double(0.25)),
            ("name", Tag::String("Steve".into())),
            ("ints", Tag::IntArray(vec![1, -2, 3])),
            ("longs", Tag::LongArray(vec![7, 8])),
            ("raw", Tag::ByteArray(vec![1, 2])),
        ]);
        let (name, root) = read_root(&bytes).unwrap();
        assert_eq!(name, "");
        assert_eq!(root["b"], Tag::Byte(-1));
        assert_eq!(root["s"], Tag::Short(300));
        assert_eq!(root["l"], Tag::Long(i64::MIN));
        assert_eq!(root["d"], Tag::Double(0.25));
        assert_eq!(root["name"], Tag::String("Steve".into()));
        assert_eq!(root["ints"], Tag::IntArray(vec![1, -2, 3]));
        assert_eq!(root["longs"], Tag::LongArray(vec![7, 8]));
        assert_eq!(root["raw"], Tag::ByteArray(vec![1, 2]));
    }

    #[test]
    fn test_reads_nested_lists_and_compounds() {
        let inner: Compound = [("x".to_string(), Tag::Int(5))].into_iter().collect();
        let bytes = root_with(vec![(
            "list",
            Tag::List(List {
                element: id::COMPOUND,
                items: vec![Tag::Compound(inner.clone()), Tag::Compound(inner)],
            }),
        )]);
        let (_, root) = read_root(&bytes).unwrap();
        let Tag::List(list) = &root["list"] else {
            panic!("expected list");
        };
        assert_eq!(list.element, id::COMPOUND);
        assert_eq!(list.items.len(), 2);
    }

    #[test]
    fn test_empty_input_is_eof() {
        assert_eq!(
            read_root(&[]),
            Err(TagError::UnexpectedEof {
                context: "root tag type"
            })
        );
    }

    #[test]
    fn test_root_must_be_compound() {
        let err = read_root(&[id::INT, 0, 0, 0, 0, 0, 1]).unwrap_err();
        assert_eq!(err, TagError::RootNotCompound { found: "INT" });
    }

    #[test]
    fn test_truncated_payload_is_eof() {
        let mut bytes = root_with(vec![("l", Tag::Long(1))]);
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(
            read_root(&bytes),
            Err(TagError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_unknown_tag_type() {
        // root compound, entry of type 99 named "a"
        let bytes = [id::COMPOUND, 0, 0, 99, 0, 1, b'a'];
        assert_eq!(read_root(&bytes), Err(TagError::UnknownTagType { id: 99 }));
    }

    #[test]
    fn test_negative_array_length() {
        let bytes = [
            id::COMPOUND, 0, 0, id::INT_ARRAY, 0, 1, b'a', 0xff, 0xff, 0xff, 0xff,
        ];
        assert!(matches!(
            read_root(&bytes),
            Err(TagError::NegativeLength { length: -1, .. })
        ));
    }

    #[test]
    fn test_huge_declared_length_does_not_allocate() {
        let bytes = [
            id::COMPOUND, 0, 0, id::LONG_ARRAY, 0, 1, b'a', 0x7f, 0xff, 0xff, 0xff,
        ];
        assert!(matches!(
            read_root(&bytes),
            Err(TagError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_nesting_limit() {
        // a list named "a" whose payload is a chain of single-element lists
        let mut bytes = vec![id::COMPOUND, 0, 0, id::LIST, 0, 1, b'a'];
        for _ in 0..MAX_DEPTH {
            bytes.push(id::LIST);
            bytes.extend_from_slice(&1i32.to_be_bytes());
        }
        assert_eq!(
            read_root(&bytes),
            Err(TagError::TooDeep { limit: MAX_DEPTH })
        );
    }
}
