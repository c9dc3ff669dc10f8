//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid image reference '{reference}'")]
    InvalidImageReference { reference: String },

    #[error("unable to parse the port string '{input}': {reason}")]
    InvalidPort { input: String, reason: String },

    #[error("invalid environment variable '{input}': {reason}")]
    InvalidEnvVar { input: String, reason: String },

    #[error("unknown scripts url '{url}'")]
    UnknownScriptsProtocol { url: String },

    #[error("Invalid glob expression '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to parse configuration: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
