//! Error types for keypiano

use thiserror::Error;

/// Result type alias for keypiano operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in keypiano
#[derive(Debug, Error)]
pub enum Error {
    /// The platform offers no usable audio output
    #[error("Audio output not supported: {0}")]
    AudioUnsupported(String),

    /// The audio stream could not be built or started
    #[error("Audio error: {0}")]
    Audio(String),

    /// A note token outside the known note universe
    #[error("Unknown note: {0:?}")]
    UnknownNote(String),

    /// The OS keyboard listener thread exited
    #[error("OS keyboard listener stopped")]
    KeyListenerStopped,

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}
