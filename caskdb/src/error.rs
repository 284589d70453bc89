//! Store Error Module.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Glob(#[from] glob::GlobError),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    /// Custom error definitions.
    #[error("key cannot be empty")]
    EmptyKey,

    #[error("key is too large")]
    KeyIsTooLarge,

    #[error("value is too large")]
    ValueIsTooLarge,

    #[error("key '{}' not found", String::from_utf8_lossy(.0))]
    KeyNotFound(Vec<u8>),

    #[error("crc check failed, data entry (key='{}', offset={}) was corrupted", String::from_utf8_lossy(.key), .offset)]
    DataEntryCorrupted { key: Vec<u8>, offset: u64 },

    #[error("hint file truncated at offset {}", .0)]
    HintFileTruncated(u64),

    #[error("file '{}' is not writeable", .0.display())]
    FileNotWriteable(std::path::PathBuf),

    #[error("db is already locked")]
    AlreadyLocked,
}
