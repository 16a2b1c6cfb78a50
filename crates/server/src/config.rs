// crates/server/src/config.rs
//! Paths and timings for the presence layer, plus discovery of the world
//! folder from a server root's `server.properties`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PresenceError;

pub const SERVER_PROPERTIES: &str = "server.properties";
pub const USER_CACHE_FILE: &str = "usercache.json";
pub const PLAYER_DATA_DIR: &str = "playerdata";

/// Delay before the first full reload after start.
pub const DEFAULT_INITIAL_RELOAD_DELAY: Duration = Duration::from_secs(5);
/// Interval between full reloads.
pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_USER_CACHE_DEBOUNCE: Duration = Duration::from_secs(10);
pub const DEFAULT_PLAYER_DATA_DEBOUNCE: Duration = Duration::from_secs(30);
/// Snapshots older than this are never reported as active.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct PresenceConfig {
    pub user_cache_file: PathBuf,
    pub player_data_dir: PathBuf,
    pub initial_reload_delay: Duration,
    pub reload_interval: Duration,
    pub user_cache_debounce: Duration,
    pub player_data_debounce: Duration,
    pub max_age: Duration,
}

impl PresenceConfig {
    pub fn new(user_cache_file: impl Into<PathBuf>, player_data_dir: impl Into<PathBuf>) -> Self {
        Self {
            user_cache_file: user_cache_file.into(),
            player_data_dir: player_data_dir.into(),
            initial_reload_delay: DEFAULT_INITIAL_RELOAD_DELAY,
            reload_interval: DEFAULT_RELOAD_INTERVAL,
            user_cache_debounce: DEFAULT_USER_CACHE_DEBOUNCE,
            player_data_debounce: DEFAULT_PLAYER_DATA_DEBOUNCE,
            max_age: DEFAULT_MAX_AGE,
        }
    }

    /// Standard layout: `<root>/usercache.json` and `<world>/playerdata`.
    pub fn for_world(server_root: &Path, world_folder: &Path) -> Self {
        Self::new(
            server_root.join(USER_CACHE_FILE),
            world_folder.join(PLAYER_DATA_DIR),
        )
    }

    /// Resolve the world from `server.properties` and apply the standard layout.
    pub fn for_server_root(server_root: &Path) -> Result<Self, PresenceError> {
        let world = world_folder(server_root)?;
        Ok(Self::for_world(server_root, &world))
    }

    /// Check that both targets exist and are readable.
    pub fn validate(&self) -> Result<(), PresenceError> {
        if !self.user_cache_file.is_file() {
            return Err(PresenceError::config(&self.user_cache_file, "not a file"));
        }
        std::fs::File::open(&self.user_cache_file)
            .map_err(|e| PresenceError::config(&self.user_cache_file, format!("not readable: {e}")))?;

        if !self.player_data_dir.is_dir() {
            return Err(PresenceError::config(&self.player_data_dir, "not a directory"));
        }
        std::fs::read_dir(&self.player_data_dir)
            .map_err(|e| PresenceError::config(&self.player_data_dir, format!("not readable: {e}")))?;
        Ok(())
    }
}

/// Resolve the world folder of a server root from its `level-name` property.
pub fn world_folder(server_root: &Path) -> Result<PathBuf, PresenceError> {
    let path = server_root.join(SERVER_PROPERTIES);
    let text = std::fs::read_to_string(&path)
        .map_err(|e| PresenceError::config(&path, format!("cannot read: {e}")))?;
    let properties = parse_properties(&text);
    let level_name = properties
        .get("level-name")
        .filter(|name| !name.is_empty())
        .ok_or_else(|| PresenceError::config(&path, "missing level-name"))?;
    Ok(server_root.join(level_name))
}

/// Parse Java-style `key=value` / `key: value` lines. Escapes and line
/// continuations are not interpreted.
pub fn parse_properties(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim_start)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .map(|line| match line.find(['=', ':']) {
            Some(i) => (line[..i].trim(), line[i + 1..].trim()),
            None => (line.trim(), ""),
        })
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
