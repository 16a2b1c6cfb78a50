// crates/server/src/server.rs
//! Aggregate presence system for one server root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;
use vanilla_presence_core::Key;

use crate::config::{self, PresenceConfig};
use crate::error::PresenceError;
use crate::live::feed::{ListenerId, PresenceFeed, PresenceListener};
use crate::live::manager::PlayerProvider;
use crate::live::state::PlayerHandle;
use crate::world::{ServerWorld, WorldRegistry};

/// A vanilla server seen only through its files: worlds from
/// `server.properties`, players from the user cache and save files.
pub struct VanillaServer {
    server_root: PathBuf,
    worlds: WorldRegistry,
    feed: Arc<PresenceFeed>,
    players: PlayerProvider,
}

impl VanillaServer {
    /// Resolve the world from `server.properties` and use default timings.
    pub fn open(server_root: &Path) -> Result<Self, PresenceError> {
        let world_folder = config::world_folder(server_root)?;
        let presence = PresenceConfig::for_world(server_root, &world_folder);
        Self::with_config(server_root, &world_folder, presence)
    }

    pub fn with_config(
        server_root: &Path,
        world_folder: &Path,
        presence: PresenceConfig,
    ) -> Result<Self, PresenceError> {
        let worlds = WorldRegistry::vanilla(world_folder);
        let feed = Arc::new(PresenceFeed::new());
        let players = PlayerProvider::new(presence, worlds.clone(), feed.clone())?;
        Ok(Self {
            server_root: server_root.to_path_buf(),
            worlds,
            feed,
            players,
        })
    }

    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), PresenceError> {
        self.players.start()?;
        info!(root = %self.server_root.display(), worlds = self.worlds.len(), "Presence feed started");
        Ok(())
    }

    /// Stop all watchers and timers. Safe to call repeatedly.
    pub fn close(&self) {
        self.players.close();
    }

    pub fn server_root(&self) -> &Path {
        &self.server_root
    }

    pub fn worlds(&self) -> &WorldRegistry {
        &self.worlds
    }

    pub fn world(&self, dimension: &Key) -> Option<Arc<ServerWorld>> {
        self.worlds.get(dimension)
    }

    pub fn players(&self) -> &PlayerProvider {
        &self.players
    }

    pub fn online_players(&self) -> Vec<PlayerHandle> {
        self.players.active_players()
    }

    pub fn register_listener(&self, listener: impl PresenceListener + 'static) -> ListenerId {
        self.feed.register(listener)
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.feed.unregister(id)
    }

    pub fn unregister_all_listeners(&self) {
        self.feed.unregister_all();
    }
}
