// crates/core/src/testing.rs
//! Fixture builder for player save files.

use std::io::{self, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use uuid::Uuid;

use crate::nbt::{id, writer, Compound, List, Tag};
use crate::player_data::field;

/// Builds a valid save tree; defaults to an overworld survival player at
/// `(0, 64, 0)` with no effects.
#[derive(Debug, Clone)]
pub struct SaveBuilder {
    root: Compound,
    effects: Vec<Tag>,
}

impl SaveBuilder {
    pub fn new(uuid: Uuid) -> Self {
        let mut root = Compound::new();
        root.insert(field::UUID.into(), uuid_int_array(uuid));
        root.insert(field::DIMENSION.into(), Tag::String("minecraft:overworld".into()));
        root.insert(field::GAME_MODE.into(), Tag::Int(0));
        Self { root, effects: Vec::new() }
            .position(0.0, 64.0, 0.0)
            .rotation(0.0, 0.0)
    }

    pub fn dimension(self, dimension: &str) -> Self {
        self.tag(field::DIMENSION, Tag::String(dimension.into()))
    }

    pub fn game_mode(self, ordinal: i32) -> Self {
        self.tag(field::GAME_MODE, Tag::Int(ordinal))
    }

    pub fn position(self, x: f64, y: f64, z: f64) -> Self {
        self.tag(
            field::POSITION,
            Tag::List(List {
                element: id::DOUBLE,
                items: vec![Tag::Double(x), Tag::Double(y), Tag::Double(z)],
            }),
        )
    }

    pub fn rotation(self, yaw: f32, pitch: f32) -> Self {
        self.tag(
            field::ROTATION,
            Tag::List(List {
                element: id::FLOAT,
                items: vec![Tag::Float(yaw), Tag::Float(pitch)],
            }),
        )
    }

    pub fn effect(mut self, effect_id: &str, duration: i32) -> Self {
        let mut effect = Compound::new();
        effect.insert("id".into(), Tag::String(effect_id.into()));
        effect.insert("duration".into(), Tag::Int(duration));
        effect.insert("amplifier".into(), Tag::Byte(0));
        effect.insert("ambient".into(), Tag::Byte(0));
        effect.insert("show_icon".into(), Tag::Byte(1));
        effect.insert("show_particles".into(), Tag::Byte(1));
        self.effects.push(Tag::Compound(effect));
        self
    }

    /// Set or replace any top-level tag.
    pub fn tag(mut self, name: &str, tag: Tag) -> Self {
        self.root.insert(name.into(), tag);
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.root.remove(name);
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut root = self.root.clone();
        if !self.effects.is_empty() {
            root.insert(
                field::ACTIVE_EFFECTS.into(),
                Tag::List(List {
                    element: id::COMPOUND,
                    items: self.effects.clone(),
                }),
            );
        }
        writer::to_bytes("", &root)
    }

    pub fn to_gzip(&self) -> io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.to_bytes())?;
        encoder.finish()
    }

    /// Write gzip-compressed, like the game does.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.to_gzip()?)
    }
}

/// The modern on-disk shape: four big-endian ints.
pub fn uuid_int_array(uuid: Uuid) -> Tag {
    let (hi, lo) = uuid.as_u64_pair();
    Tag::IntArray(vec![
        (hi >> 32) as i32,
        hi as i32,
        (lo >> 32) as i32,
        lo as i32,
    ])
}
