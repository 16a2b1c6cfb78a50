// crates/server/src/lib.rs
//! Player presence for a standalone vanilla server directory.
//!
//! Infers who is online, and where, from `usercache.json` and the per-player
//! save files, kept current by debounced file watchers.

pub mod config;
pub mod error;
pub mod live;
pub mod server;
pub mod world;

pub use config::PresenceConfig;
pub use error::*;
pub use live::{ListenerId, PlayerHandle, PlayerProvider, PresenceFeed, PresenceListener};
pub use server::VanillaServer;
pub use world::{ServerWorld, WorldRegistry};
