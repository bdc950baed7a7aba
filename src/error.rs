use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("NBT error: {0}")]
    Nbt(#[from] fastnbt::error::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Raised by a land-protection integration that could not answer.
#[derive(Debug, Error)]
#[error("protection check failed: {0}")]
pub struct ProtectionError(pub String);
