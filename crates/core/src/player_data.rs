// crates/core/src/player_data.rs
//! Decoder for per-player save files (`<world>/playerdata/<uuid>.dat`).
//!
//! A save file is a gzip-wrapped (or raw) tag tree. Only the handful of
//! fields needed for presence are extracted; everything else in the tree is
//! ignored. Each target type has its own decode rule ([`FromTag`]), which is
//! where the ambiguous wire shapes (UUIDs, vectors, game modes) are resolved.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::{PlayerDataError, TagError};
use crate::nbt::{self, id, type_name, Compound, Tag};
use crate::types::{dimension, GameMode, Key, Vec2f, Vec3d};

/// Effect duration meaning "never runs out".
pub const INFINITE_DURATION: i32 = -1;

/// Length of one game tick.
pub const MILLIS_PER_TICK: i64 = 50;

/// Tag names in the save file.
pub mod field {
    pub const UUID: &str = "UUID";
    pub const DIMENSION: &str = "Dimension";
    pub const GAME_MODE: &str = "playerGameType";
    pub const POSITION: &str = "Pos";
    pub const ROTATION: &str = "Rotation";
    pub const ACTIVE_EFFECTS: &str = "active_effects";
    pub const EFFECT_ID: &str = "active_effects.id";
}

/// A timed status effect as stored in the save file.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEffect {
    pub id: Key,
    /// Remaining ticks, or [`INFINITE_DURATION`].
    pub duration: i32,
    pub ambient: bool,
    pub amplifier: i8,
    pub show_icon: bool,
    pub show_particles: bool,
}

impl ActiveEffect {
    pub fn is_infinite(&self) -> bool {
        self.duration == INFINITE_DURATION
    }

    /// When the effect runs out, counted from the moment the file was saved.
    pub fn expires_at(&self, captured_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_infinite() {
            return None;
        }
        captured_at.checked_add_signed(Duration::milliseconds(
            i64::from(self.duration) * MILLIS_PER_TICK,
        ))
    }

    pub fn is_live(&self, captured_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.expires_at(captured_at) {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }
}

/// Immutable decode result of one save file.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerData {
    uuid: Uuid,
    dimension: Key,
    game_mode: GameMode,
    position: Vec3d,
    rotation: Vec2f,
    active_effects: Vec<ActiveEffect>,
    last_modified: DateTime<Utc>,
}

impl PlayerData {
    /// Read and decode a save file. The file's modification time becomes the
    /// snapshot's capture time.
    pub fn read(path: &Path) -> Result<Self, PlayerDataError> {
        let file = File::open(path).map_err(|e| PlayerDataError::io(path, e))?;
        let modified = file
            .metadata()
            .and_then(|m| m.modified())
            .map_err(|e| PlayerDataError::io(path, e))?;
        Self::from_reader(path, file, modified.into())
    }

    /// Decode a possibly gzip-compressed stream. `origin` only names the
    /// source in errors.
    pub fn from_reader(
        origin: &Path,
        input: impl Read,
        last_modified: DateTime<Utc>,
    ) -> Result<Self, PlayerDataError> {
        let bytes = nbt::read_maybe_compressed(input).map_err(|e| PlayerDataError::io(origin, e))?;
        Self::decode(origin, &bytes, last_modified)
    }

    /// Decode an uncompressed tag tree.
    ///
    /// Type and shape errors abort immediately; absent required fields are
    /// collected and reported together once the whole tree has been walked.
    pub fn decode(
        origin: &Path,
        bytes: &[u8],
        last_modified: DateTime<Utc>,
    ) -> Result<Self, PlayerDataError> {
        let (_, root) = nbt::read_root(bytes).map_err(format_error(origin, "<root>"))?;

        let uuid = lookup::<Uuid>(&root, field::UUID).map_err(format_error(origin, field::UUID))?;
        let dimension = lookup::<Dimension>(&root, field::DIMENSION)
            .map_err(format_error(origin, field::DIMENSION))?;
        let game_mode = lookup::<GameMode>(&root, field::GAME_MODE)
            .map_err(format_error(origin, field::GAME_MODE))?;
        let position = lookup::<Vec3d>(&root, field::POSITION)
            .map_err(format_error(origin, field::POSITION))?;
        let rotation = lookup::<Vec2f>(&root, field::ROTATION)
            .map_err(format_error(origin, field::ROTATION))?;
        let (active_effects, effect_without_id) = decode_effects(origin, &root)?;

        match (uuid, dimension, game_mode, position, rotation) {
            (
                Some(uuid),
                Some(Dimension(dimension)),
                Some(game_mode),
                Some(position),
                Some(rotation),
            ) if !effect_without_id => Ok(Self {
                uuid,
                dimension,
                game_mode,
                position,
                rotation,
                active_effects,
                last_modified,
            }),
            (uuid, dimension, game_mode, position, rotation) => {
                let mut fields = Vec::new();
                if uuid.is_none() {
                    fields.push(field::UUID);
                }
                if dimension.is_none() {
                    fields.push(field::DIMENSION);
                }
                if game_mode.is_none() {
                    fields.push(field::GAME_MODE);
                }
                if position.is_none() {
                    fields.push(field::POSITION);
                }
                if rotation.is_none() {
                    fields.push(field::ROTATION);
                }
                if effect_without_id {
                    fields.push(field::EFFECT_ID);
                }
                Err(PlayerDataError::MissingFields {
                    path: origin.to_path_buf(),
                    fields,
                })
            }
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn dimension(&self) -> &Key {
        &self.dimension
    }

    pub fn game_mode(&self) -> GameMode {
        self.game_mode
    }

    pub fn position(&self) -> Vec3d {
        self.position
    }

    /// Stored order: `x` = yaw, `y` = pitch.
    pub fn rotation(&self) -> Vec2f {
        self.rotation
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Every effect in the file, including ones that have already run out.
    pub fn all_effects(&self) -> &[ActiveEffect] {
        &self.active_effects
    }

    /// Effects still running at `now`.
    pub fn active_effects(&self, now: DateTime<Utc>) -> impl Iterator<Item = &ActiveEffect> {
        self.active_effects
            .iter()
            .filter(move |effect| effect.is_live(self.last_modified, now))
    }

    pub fn is_invisible(&self, now: DateTime<Utc>) -> bool {
        self.active_effects(now)
            .any(|effect| effect.id.value() == "invisibility")
    }
}

fn format_error(origin: &Path, field: impl Into<String>) -> impl FnOnce(TagError) -> PlayerDataError + '_ {
    let field = field.into();
    move |source| PlayerDataError::Format {
        path: origin.to_path_buf(),
        field,
        source,
    }
}

fn decode_effects(
    origin: &Path,
    root: &Compound,
) -> Result<(Vec<ActiveEffect>, bool), PlayerDataError> {
    let list = match root.get(field::ACTIVE_EFFECTS) {
        None => return Ok((Vec::new(), false)),
        Some(Tag::List(list)) => list,
        Some(other) => {
            return Err(format_error(origin, field::ACTIVE_EFFECTS)(wrong_type("LIST", other)))
        }
    };
    if !list.items.is_empty() && list.element != id::COMPOUND {
        return Err(format_error(origin, field::ACTIVE_EFFECTS)(TagError::WrongType {
            expected: "LIST of COMPOUND",
            found: type_name(list.element),
        }));
    }

    let mut effects = Vec::with_capacity(list.items.len());
    let mut effect_without_id = false;
    for (i, item) in list.items.iter().enumerate() {
        let Tag::Compound(effect) = item else {
            continue;
        };
        let at = |name: &str| format!("{}[{i}].{name}", field::ACTIVE_EFFECTS);

        let id = lookup::<Key>(effect, "id").map_err(format_error(origin, at("id")))?;
        let duration = lookup::<i32>(effect, "duration").map_err(format_error(origin, at("duration")))?;
        let ambient = lookup::<bool>(effect, "ambient").map_err(format_error(origin, at("ambient")))?;
        let amplifier = lookup::<i8>(effect, "amplifier").map_err(format_error(origin, at("amplifier")))?;
        let show_icon = lookup::<bool>(effect, "show_icon").map_err(format_error(origin, at("show_icon")))?;
        let show_particles = lookup::<bool>(effect, "show_particles")
            .map_err(format_error(origin, at("show_particles")))?;

        match id {
            Some(id) => effects.push(ActiveEffect {
                id,
                duration: duration.unwrap_or_default(),
                ambient: ambient.unwrap_or_default(),
                amplifier: amplifier.unwrap_or_default(),
                show_icon: show_icon.unwrap_or_default(),
                show_particles: show_particles.unwrap_or_default(),
            }),
            None => effect_without_id = true,
        }
    }
    Ok((effects, effect_without_id))
}

fn lookup<T: FromTag>(compound: &Compound, name: &str) -> Result<Option<T>, TagError> {
    compound.get(name).map(T::from_tag).transpose()
}

fn wrong_type(expected: &'static str, found: &Tag) -> TagError {
    TagError::WrongType {
        expected,
        found: found.type_name(),
    }
}

/// Per-type decode rule from a single tag.
trait FromTag: Sized {
    fn from_tag(tag: &Tag) -> Result<Self, TagError>;
}

impl FromTag for Uuid {
    fn from_tag(tag: &Tag) -> Result<Self, TagError> {
        match tag {
            Tag::IntArray(ints) => uuid_from_ints(ints).ok_or(TagError::UnsupportedUuid {
                tag: "INT_ARRAY",
                length: ints.len(),
            }),
            Tag::LongArray(longs) => uuid_from_longs(longs).ok_or(TagError::UnsupportedUuid {
                tag: "LONG_ARRAY",
                length: longs.len(),
            }),
            Tag::List(list) => {
                let unsupported = TagError::UnsupportedUuid {
                    tag: type_name(list.element),
                    length: list.items.len(),
                };
                match (list.element, list.items.len()) {
                    (id::INT, 4) => {
                        let ints: Vec<i32> = list
                            .items
                            .iter()
                            .filter_map(|t| match t {
                                Tag::Int(v) => Some(*v),
                                _ => None,
                            })
                            .collect();
                        uuid_from_ints(&ints).ok_or(unsupported)
                    }
                    (id::LONG, 2) => {
                        let longs: Vec<i64> = list
                            .items
                            .iter()
                            .filter_map(|t| match t {
                                Tag::Long(v) => Some(*v),
                                _ => None,
                            })
                            .collect();
                        uuid_from_longs(&longs).ok_or(unsupported)
                    }
                    _ => Err(unsupported),
                }
            }
            Tag::String(s) => Uuid::parse_str(s).map_err(|_| TagError::InvalidUuid { value: s.clone() }),
            other => Err(wrong_type("INT_ARRAY, LONG_ARRAY, LIST or STRING", other)),
        }
    }
}

/// Four big-endian ints: the first two form the most significant half.
fn uuid_from_ints(ints: &[i32]) -> Option<Uuid> {
    let [a, b, c, d] = <[i32; 4]>::try_from(ints).ok()?;
    let half = |hi: i32, lo: i32| (u64::from(hi as u32) << 32) | u64::from(lo as u32);
    Some(Uuid::from_u64_pair(half(a, b), half(c, d)))
}

fn uuid_from_longs(longs: &[i64]) -> Option<Uuid> {
    let [hi, lo] = <[i64; 2]>::try_from(longs).ok()?;
    Some(Uuid::from_u64_pair(hi as u64, lo as u64))
}

/// Numeric elements of a list of exactly `arity` entries.
fn numeric_list(tag: &Tag, arity: usize) -> Result<Vec<f64>, TagError> {
    let Tag::List(list) = tag else {
        return Err(wrong_type("LIST", tag));
    };
    if list.items.len() != arity {
        return Err(TagError::WrongLength {
            expected: arity,
            found: list.items.len(),
        });
    }
    list.items
        .iter()
        .map(|item| item.as_number().ok_or_else(|| wrong_type("numeric list element", item)))
        .collect()
}

impl FromTag for Vec3d {
    fn from_tag(tag: &Tag) -> Result<Self, TagError> {
        match numeric_list(tag, 3)?.as_slice() {
            &[x, y, z] => Ok(Vec3d::new(x, y, z)),
            other => Err(TagError::WrongLength {
                expected: 3,
                found: other.len(),
            }),
        }
    }
}

impl FromTag for Vec2f {
    fn from_tag(tag: &Tag) -> Result<Self, TagError> {
        match numeric_list(tag, 2)?.as_slice() {
            &[x, y] => Ok(Vec2f::new(x as f32, y as f32)),
            other => Err(TagError::WrongLength {
                expected: 2,
                found: other.len(),
            }),
        }
    }
}

impl FromTag for GameMode {
    fn from_tag(tag: &Tag) -> Result<Self, TagError> {
        match tag {
            Tag::String(s) => {
                GameMode::from_id(s).ok_or_else(|| TagError::UnknownGameMode { value: s.clone() })
            }
            Tag::Byte(_) | Tag::Short(_) | Tag::Int(_) => {
                let ordinal = tag.as_integer().unwrap_or(-1);
                GameMode::from_ordinal(ordinal).ok_or_else(|| TagError::UnknownGameMode {
                    value: ordinal.to_string(),
                })
            }
            other => Err(wrong_type("STRING, BYTE, SHORT or INT", other)),
        }
    }
}

impl FromTag for Key {
    fn from_tag(tag: &Tag) -> Result<Self, TagError> {
        match tag {
            Tag::String(s) => s.parse(),
            other => Err(wrong_type("STRING", other)),
        }
    }
}

/// Dimension keys, which older worlds stored as numeric ids.
struct Dimension(Key);

impl FromTag for Dimension {
    fn from_tag(tag: &Tag) -> Result<Self, TagError> {
        match tag {
            Tag::String(s) => s.parse().map(Dimension),
            Tag::Byte(_) | Tag::Short(_) | Tag::Int(_) | Tag::Long(_) => {
                let id = tag.as_integer().unwrap_or_default();
                dimension::from_legacy_id(id)
                    .map(Dimension)
                    .ok_or(TagError::UnknownDimension { id })
            }
            other => Err(wrong_type("STRING or legacy dimension id", other)),
        }
    }
}

impl FromTag for i32 {
    fn from_tag(tag: &Tag) -> Result<Self, TagError> {
        match *tag {
            Tag::Byte(v) => Ok(v.into()),
            Tag::Short(v) => Ok(v.into()),
            Tag::Int(v) => Ok(v),
            ref other => Err(wrong_type("INT", other)),
        }
    }
}

impl FromTag for i8 {
    fn from_tag(tag: &Tag) -> Result<Self, TagError> {
        match *tag {
            Tag::Byte(v) => Ok(v),
            ref other => Err(wrong_type("BYTE", other)),
        }
    }
}

impl FromTag for bool {
    fn from_tag(tag: &Tag) -> Result<Self, TagError> {
        match tag {
            Tag::Byte(_) | Tag::Short(_) | Tag::Int(_) => Ok(tag.as_integer() != Some(0)),
            other => Err(wrong_type("BYTE", other)),
        }
    }
}
