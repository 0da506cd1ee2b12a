use std::fmt;
use std::io;

use thiserror::Error;

/// Entity kinds that can be reported as missing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entity {
    Circuit,
    Version,
    Proof,
    EncryptedData,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Entity::Circuit => "Circuit",
            Entity::Version => "Version",
            Entity::Proof => "Proof",
            Entity::EncryptedData => "Encrypted data",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{message}")]
    Validation {
        message: String,
        details: Vec<String>,
    },
    #[error("{0} not found")]
    NotFound(Entity),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(
        "storage schema is outdated (found version {found}, requires {required}); recreate the data directory"
    )]
    MigrationRequired { found: u32, required: u32 },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl ComputeError {
    pub fn validation(message: impl Into<String>, details: Vec<String>) -> Self {
        ComputeError::Validation {
            message: message.into(),
            details,
        }
    }
}

pub type ComputeResult<T> = Result<T, ComputeError>;
