// crates/server/src/error.rs
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the presence layer.
#[derive(Debug, Error)]
pub enum PresenceError {
    /// A configured path is missing, of the wrong kind, or unreadable.
    /// Raised at construction; nothing is started.
    #[error("Invalid configuration for {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    /// A new half of a player record belongs to a different player.
    #[error("UUID mismatch: record {expected}, got {actual}")]
    UuidMismatch { expected: Uuid, actual: Uuid },

    #[error("Could not watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

impl PresenceError {
    pub fn config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
