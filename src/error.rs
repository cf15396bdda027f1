//! Error taxonomy of the crawl-and-extract pipeline.
//!
//! Page-level failures ([`FetchError`]) are absorbed by the crawler. Everything
//! else is place-level and ends up in a [`PlaceError`], which aborts only the
//! place being processed.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

use crate::pipeline::PlaceStage;

/// A single page could not be retrieved.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unsuccessful status {0}")]
    Status(StatusCode),
}

/// The extraction payload does not conform to the output schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("extraction payload failed schema validation: {detail}")]
pub struct SchemaValidationError {
    pub detail: String,
}

impl SchemaValidationError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// The extraction service could not be reached or answered with nothing usable.
#[derive(Debug, Error)]
#[error("extraction service error: {0}")]
pub struct ServiceError(pub String);

#[derive(Debug, Error)]
pub enum OutputWriteError {
    #[error("output file {} already exists", path.display())]
    Conflict { path: PathBuf },
    #[error("unable to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to serialize output record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("overwrite confirmation failed: {0}")]
    Prompt(String),
}

/// Why a place ended in the `FAILED` state.
#[derive(Debug, Error)]
pub enum PlaceError {
    #[error("invalid website {website}: {reason}")]
    InvalidWebsite { website: String, reason: String },
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    SchemaValidation(#[from] SchemaValidationError),
    #[error(transparent)]
    OutputWrite(#[from] OutputWriteError),
}

impl PlaceError {
    /// The stage the place was in when processing stopped.
    pub fn stage(&self) -> PlaceStage {
        match self {
            Self::InvalidWebsite { .. } => PlaceStage::Crawling,
            Self::Service(_) | Self::SchemaValidation(_) => PlaceStage::Extracting,
            Self::OutputWrite(_) => PlaceStage::Written,
        }
    }
}
