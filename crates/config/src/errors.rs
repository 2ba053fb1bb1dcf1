//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid KDL: {0}")]
    Syntax(String),

    #[error("{0}")]
    Parse(String),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Shorthand for a [`ConfigError::Parse`] with a formatted message
macro_rules! parse_err {
    ($($arg:tt)*) => {
        $crate::errors::ConfigError::Parse(format!($($arg)*))
    };
}

pub(crate) use parse_err;
