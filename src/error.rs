use std::io;

use thiserror::Error;

pub type CiResult<T> = Result<T, CiError>;

#[derive(Error, Debug)]
pub enum CiError {
    #[error("IO error occurred")]
    IoError(#[from] io::Error),

    #[error("Toml deserialize error occurred")]
    TomlDeserializeError(#[from] toml::de::Error),

    #[error("Serde json error")]
    SerdeJsonError(#[from] serde_json::error::Error),

    #[error("Invalid regular expression")]
    RegexError(#[from] regex::Error),

    #[error("Invalid glob pattern")]
    GlobPatternError(#[from] glob::PatternError),

    #[error("CtrlC Error occurred")]
    CtrlCError(#[from] ctrlc::Error),

    #[error("Failed to spawn command: {command}")]
    CommandSpawnError {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Insufficient Parameter: {0}")]
    MissingParameterError(String),

    #[error("ocRegistry {0} should not start with http:// or https:// and not end on a slash /")]
    InvalidRegistryError(String),

    #[error("Unknown mode: {0}")]
    UnknownModeError(String),

    #[error("Config file not found: {0}")]
    ConfigNotFoundError(String),

    #[error("{0} failed")]
    TestFailedError(String),
}
