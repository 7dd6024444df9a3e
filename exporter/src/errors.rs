use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to decode config {path:?}: {source}")]
    Config {
        path: PathBuf,
        source: config::ConfigError,
    },

    #[error("Netatmo authentication failed: {0}")]
    Auth(String),

    #[error("Netatmo read error: {0}")]
    Fetch(String),

    #[error("failed to rewrite config {path:?}: {reason}")]
    ConfigRewrite { path: PathBuf, reason: String },

    #[error("invalid InfluxDB url {url}: {reason}")]
    InfluxUrl { url: String, reason: String },

    #[error("InfluxDB write rejected with status {status}: {body}")]
    Write { status: StatusCode, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// HTTP status of a rejected InfluxDB write, if that is what failed.
    pub fn write_status(&self) -> Option<StatusCode> {
        match self {
            Error::Write { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
