use thiserror::Error;
use tokio::task::JoinError;

/// Errors returned by the brick store, transports, archives and seeds.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// A file path or brick digest that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Fetched content failed digest verification.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// A malformed seed.
    #[error("unable to decode seed: {0}")]
    Decode(String),

    /// A network or storage failure inside a transport strategy.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Errors from the [crate::transport::TransportRegistry].
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("no transport strategy named {0}")]
    NotFound(String),

    #[error("transport strategy {0} is already registered")]
    AlreadyRegistered(String),

    #[error("unable to instantiate transport strategy {0}: {1}")]
    Factory(String, String),
}

impl From<JoinError> for Error {
    fn from(value: JoinError) -> Self {
        Error::Transport(value.to_string())
    }
}

impl From<crate::digests::Error> for Error {
    fn from(value: crate::digests::Error) -> Self {
        Error::InvalidRequest(value.to_string())
    }
}

impl From<object_store::Error> for Error {
    fn from(value: object_store::Error) -> Self {
        match value {
            object_store::Error::NotFound { path, .. } => Error::NotFound(path),
            e => Error::Transport(e.to_string()),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Transport(value.without_url().to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        match value.kind() {
            std::io::ErrorKind::InvalidInput => Error::InvalidRequest(value.to_string()),
            std::io::ErrorKind::NotFound => Error::NotFound(value.to_string()),
            _ => Error::Transport(value.to_string()),
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::NotFound(msg) => Self::new(std::io::ErrorKind::NotFound, msg),
            Error::InvalidRequest(msg) | Error::Decode(msg) => {
                Self::new(std::io::ErrorKind::InvalidInput, msg)
            }
            Error::Corrupt(msg) => Self::new(std::io::ErrorKind::InvalidData, msg),
            e => Self::other(e.to_string()),
        }
    }
}
