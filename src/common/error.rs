//! Error types for the resolver

use std::io;
use thiserror::Error;

/// Resolver error type
///
/// Only configuration and input problems surface as errors. Network failures
/// are absorbed into [`ResolvedRecord`](crate::dns::ResolvedRecord).
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid hostname: {0}")]
    InvalidHostname(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Platform resolver unavailable: {0}")]
    PlatformUnavailable(String),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn invalid_hostname<S: Into<String>>(msg: S) -> Self {
        Error::InvalidHostname(msg.into())
    }

    pub fn invalid_endpoint<S: Into<String>>(msg: S) -> Self {
        Error::InvalidEndpoint(msg.into())
    }

    pub fn platform_unavailable<S: Into<String>>(msg: S) -> Self {
        Error::PlatformUnavailable(msg.into())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;
