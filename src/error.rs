use std::path::PathBuf;

use thiserror::Error;

/// Failures the CLI distinguishes between when talking to the config file or the remote model.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not set. Please use the setkey command to set your API key.")]
    MissingApiKey,

    #[error("config file {} is corrupt: {source}", .path.display())]
    ConfigCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unable to access config file {}: {source}", .path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Transport failures, non-success statuses and malformed replies all land here.
    #[error("{0}")]
    RemoteService(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::RemoteService(e.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown command '{0}'. Available commands: setkey, ask, resetkey, help")]
pub struct UnknownCommand(pub String);
