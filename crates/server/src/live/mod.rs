//! Live presence: file watching, the player cache, and join notifications.

pub mod feed;
pub mod manager;
pub mod state;
pub mod watcher;

pub use feed::{ListenerId, PresenceFeed, PresenceListener};
pub use manager::{player_data_key, PlayerProvider};
pub use state::{PlayerHandle, PlayerRecord};
pub use watcher::{DebouncedWatcher, Debouncer};
