// crates/server/src/world.rs
//! Worlds known to the host, one per dimension.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use vanilla_presence_core::{dimension, Key};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerWorld {
    pub world_folder: PathBuf,
    pub dimension: Key,
}

/// Lookup of worlds by dimension key. Built once at startup and handed to
/// the presence layer.
#[derive(Debug, Clone, Default)]
pub struct WorldRegistry {
    worlds: Vec<Arc<ServerWorld>>,
}

impl WorldRegistry {
    pub fn new(worlds: impl IntoIterator<Item = ServerWorld>) -> Self {
        Self {
            worlds: worlds.into_iter().map(Arc::new).collect(),
        }
    }

    /// The three vanilla dimensions, all stored under one world folder.
    pub fn vanilla(world_folder: &Path) -> Self {
        Self::new(
            [dimension::overworld(), dimension::the_nether(), dimension::the_end()]
                .into_iter()
                .map(|dimension| ServerWorld {
                    world_folder: world_folder.to_path_buf(),
                    dimension,
                }),
        )
    }

    pub fn get(&self, dimension: &Key) -> Option<Arc<ServerWorld>> {
        self.worlds.iter().find(|w| &w.dimension == dimension).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ServerWorld>> {
        self.worlds.iter()
    }

    pub fn len(&self) -> usize {
        self.worlds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }
}
