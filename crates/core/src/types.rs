// crates/core/src/types.rs
//! Shared domain types used by the save decoder and the presence layer.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::TagError;

/// Namespace implied by a bare key such as `"invisibility"`.
pub const DEFAULT_NAMESPACE: &str = "minecraft";

/// A namespaced identifier (`namespace:value`), e.g. `minecraft:the_nether`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    namespace: String,
    value: String,
}

impl Key {
    pub fn new(namespace: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            value: value.into(),
        }
    }

    pub fn minecraft(value: impl Into<String>) -> Self {
        Self::new(DEFAULT_NAMESPACE, value)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl FromStr for Key {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, value) = match s.split_once(':') {
            Some((ns, value)) => (ns, value),
            None => (DEFAULT_NAMESPACE, s),
        };
        if namespace.is_empty() || value.is_empty() || value.contains(':') {
            return Err(TagError::InvalidKey {
                value: s.to_string(),
            });
        }
        Ok(Self::new(namespace, value))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.value)
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Well-known dimension keys of a vanilla world.
pub mod dimension {
    use super::Key;

    pub fn overworld() -> Key {
        Key::minecraft("overworld")
    }

    pub fn the_nether() -> Key {
        Key::minecraft("the_nether")
    }

    pub fn the_end() -> Key {
        Key::minecraft("the_end")
    }

    /// Map a pre-1.16 numeric dimension id onto its key.
    pub fn from_legacy_id(id: i64) -> Option<Key> {
        match id {
            0 => Some(overworld()),
            -1 => Some(the_nether()),
            1 => Some(the_end()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Survival,
    Creative,
    Adventure,
    Spectator,
}

impl GameMode {
    const ALL: [GameMode; 4] = [
        GameMode::Survival,
        GameMode::Creative,
        GameMode::Adventure,
        GameMode::Spectator,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            GameMode::Survival => "survival",
            GameMode::Creative => "creative",
            GameMode::Adventure => "adventure",
            GameMode::Spectator => "spectator",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.id() == id)
    }

    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Vec3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3d {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Stored rotation of a player: `x` is yaw, `y` is pitch.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Vec2f {
    pub x: f32,
    pub y: f32,
}

impl Vec2f {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_parse_with_namespace() {
        let key: Key = "minecraft:the_nether".parse().unwrap();
        assert_eq!(key.namespace(), "minecraft");
        assert_eq!(key.value(), "the_nether");
        assert_eq!(key.to_string(), "minecraft:the_nether");
    }

    #[test]
    fn test_key_parse_defaults_namespace() {
        let key: Key = "invisibility".parse().unwrap();
        assert_eq!(key, Key::minecraft("invisibility"));
    }

    #[test]
    fn test_key_parse_rejects_garbage() {
        assert!("".parse::<Key>().is_err());
        assert!(":value".parse::<Key>().is_err());
        assert!("a:b:c".parse::<Key>().is_err());
    }

    #[test]
    fn test_game_mode_ids_and_ordinals() {
        assert_eq!(GameMode::from_id("creative"), Some(GameMode::Creative));
        assert_eq!(GameMode::from_id("hardcore"), None);
        assert_eq!(GameMode::from_ordinal(3), Some(GameMode::Spectator));
        assert_eq!(GameMode::from_ordinal(4), None);
        assert_eq!(GameMode::from_ordinal(-1), None);
    }

    #[test]
    fn test_legacy_dimension_ids() {
        assert_eq!(dimension::from_legacy_id(-1), Some(dimension::the_nether()));
        assert_eq!(dimension::from_legacy_id(7), None);
    }
}
