// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Violations found while reading a tagged-binary (NBT) stream or while
/// mapping one of its tags onto a typed value.
#[derive(Debug, Error, PartialEq)]
pub enum TagError {
    #[error("Unexpected end of input while reading {context}")]
    UnexpectedEof { context: &'static str },

    #[error("Unknown tag type id {id}")]
    UnknownTagType { id: u8 },

    #[error("Root tag must be a compound, found {found}")]
    RootNotCompound { found: &'static str },

    #[error("Tags nested deeper than {limit} levels")]
    TooDeep { limit: usize },

    #[error("Negative length {length} for {context}")]
    NegativeLength { length: i32, context: &'static str },

    #[error("Expected {expected}, found {found}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Expected a list of {expected} elements, found {found}")]
    WrongLength { expected: usize, found: usize },

    #[error("UUID doesn't support {tag} of length {length}")]
    UnsupportedUuid { tag: &'static str, length: usize },

    #[error("Invalid UUID string '{value}'")]
    InvalidUuid { value: String },

    #[error("Unknown game mode {value}")]
    UnknownGameMode { value: String },

    #[error("Unknown legacy dimension id {id}")]
    UnknownDimension { id: i64 },

    #[error("Invalid key '{value}'")]
    InvalidKey { value: String },
}

/// Errors that can occur when reading a per-player save file.
#[derive(Debug, Error)]
pub enum PlayerDataError {
    #[error("Player data file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Permission denied reading player data: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed player data in {path} at '{field}': {source}")]
    Format {
        path: PathBuf,
        field: String,
        #[source]
        source: TagError,
    },

    #[error("Player data {path} is missing required fields: {}", fields.join(", "))]
    MissingFields {
        path: PathBuf,
        fields: Vec<&'static str>,
    },
}

/// Errors that can occur when reading the identity list (`usercache.json`).
#[derive(Debug, Error)]
pub enum UserCacheError {
    #[error("User cache file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Permission denied reading user cache: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error reading user cache {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in user cache {path}: {message}")]
    MalformedJson { path: PathBuf, message: String },
}

impl PlayerDataError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }

    /// Path of the save file the error refers to.
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::NotFound { path }
            | Self::PermissionDenied { path }
            | Self::Io { path, .. }
            | Self::Format { path, .. }
            | Self::MissingFields { path, .. } => path,
        }
    }
}

impl UserCacheError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}
