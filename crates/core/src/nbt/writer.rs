//! Minimal encoder used to build save-file fixtures in tests.

use bytes::BufMut;

use super::{id, Compound, Tag};

/// Encode `root` as an uncompressed named root compound.
pub fn to_bytes(name: &str, root: &Compound) -> Vec<u8> {
    let mut out = Vec::new();
    out.put_u8(id::COMPOUND);
    put_string(&mut out, name);
    put_compound(&mut out, root);
    out
}

fn put_string(out: &mut Vec<u8>, s: &str) {
    let len = u16::try_from(s.len()).unwrap_or(u16::MAX);
    out.put_u16(len);
    out.put_slice(&s.as_bytes()[..usize::from(len)]);
}

fn put_len(out: &mut Vec<u8>, len: usize) {
    out.put_i32(i32::try_from(len).unwrap_or(i32::MAX));
}

fn put_compound(out: &mut Vec<u8>, compound: &Compound) {
    // sorted so fixtures are byte-for-byte reproducible
    let mut entries: Vec<_> = compound.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    for (name, tag) in entries {
        out.put_u8(tag.id());
        put_string(out, name);
        put_payload(out, tag);
    }
    out.put_u8(id::END);
}

fn put_payload(out: &mut Vec<u8>, tag: &Tag) {
    match tag {
        Tag::Byte(v) => out.put_i8(*v),
        Tag::Short(v) => out.put_i16(*v),
        Tag::Int(v) => out.put_i32(*v),
        Tag::Long(v) => out.put_i64(*v),
        Tag::Float(v) => out.put_f32(*v),
        Tag::Double(v) => out.put_f64(*v),
        Tag::ByteArray(values) => {
            put_len(out, values.len());
            values.iter().for_each(|v| out.put_i8(*v));
        }
        Tag::String(s) => put_string(out, s),
        Tag::List(list) => {
            out.put_u8(list.element);
            put_len(out, list.items.len());
            list.items.iter().for_each(|item| put_payload(out, item));
        }
        Tag::Compound(compound) => put_compound(out, compound),
        Tag::IntArray(values) => {
            put_len(out, values.len());
            values.iter().for_each(|v| out.put_i32(*v));
        }
        Tag::LongArray(values) => {
            put_len(out, values.len());
            values.iter().for_each(|v| out.put_i64(*v));
        }
    }
}
