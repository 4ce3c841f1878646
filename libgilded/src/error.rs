use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort processing of a whole input or output file.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed table at byte {offset}: {reason}")]
    MalformedTable { offset: usize, reason: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error on {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("chart error: {0}")]
    Chart(String),
}

impl Error {
    pub fn malformed<S: Into<String>>(offset: usize, reason: S) -> Error {
        Error::MalformedTable {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Error {
        let path = path.into();
        move |source| Error::Io { path, source }
    }

    pub(crate) fn json(path: impl Into<PathBuf>) -> impl FnOnce(serde_json::Error) -> Error {
        let path = path.into();
        move |source| Error::Json { path, source }
    }
}

/// Per-record problems. These never abort a run; they are collected into
/// the run report and logged.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Anomaly {
    #[error("inconsistent history for {actor}: minute {minute} follows minute {previous}, excluded from {excluded_from}")]
    InconsistentHistory {
        actor: String,
        minute: i64,
        previous: i64,
        excluded_from: NaiveDate,
    },

    #[error("ambiguous transaction on {day}: markers present {markers:?}")]
    AmbiguousTransaction { day: NaiveDate, markers: Vec<String> },

    #[error("requester {requester} has no server, using crafter server {server}")]
    MissingServer { requester: String, server: String },

    #[error("malformed crafting order #{index}: {reason}")]
    MalformedOrder { index: usize, reason: String },
}

impl Anomaly {
    /// Log the anomaly at the level its kind warrants.
    pub fn log(&self) {
        match self {
            Anomaly::MissingServer { .. } => tracing::info!("{}", self),
            _ => tracing::warn!("{}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
