use super::enums::Service;
use std::path::PathBuf;
use std::result;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered with HTTP {status}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Could not decode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Secret store error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Credential file {} is corrupted: {reason}", path.display())]
    CredentialFile { path: PathBuf, reason: String },

    #[error("No {service} credentials available, set {env_var}")]
    MissingCredentials { service: Service, env_var: String },

    #[error("Configuration error: {0}")]
    Config(#[from] confy::ConfyError),

    #[error("Malformed {kind}: {value:?}")]
    Malformed { kind: &'static str, value: String },

    #[error("{0} has no detections")]
    EmptyPhotometry(String),

    #[error("Field {field} missing from the {service} response")]
    MissingField {
        service: &'static str,
        field: &'static str,
    },

    #[error("Unknown observing site {0:?}")]
    UnknownSite(String),

    #[error("Could not parse spectrum {} line {line}: {reason}", path.display())]
    Spectrum {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Could not draw chart: {0}")]
    Plot(String),

    #[error("WISeREP rejected the request: {0}")]
    Wiserep(String),
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    pub fn malformed(kind: &'static str, value: impl Into<String>) -> Self {
        Error::Malformed {
            kind,
            value: value.into(),
        }
    }

    pub fn plot(e: impl std::fmt::Display) -> Self {
        Error::Plot(e.to_string())
    }
}
