//! Viewport error types

use crate::types::{RequestId, ViewKey};
use thiserror::Error;

/// Failure reported by the transport collaborator for one request
///
/// The engine never retries; it hands this to the caller's failure hook.
#[derive(Debug, Clone, Error)]
#[error("request {request_id} for view {view} failed: {message}")]
pub struct TransportError {
    pub view: ViewKey,
    pub request_id: RequestId,
    pub message: String,
}

impl TransportError {
    pub fn new(view: ViewKey, request_id: RequestId, message: impl Into<String>) -> Self {
        Self {
            view,
            request_id,
            message: message.into(),
        }
    }
}

/// Errors surfaced by the viewport library
#[derive(Debug, Error)]
pub enum ViewportError {
    #[error("invalid viewport configuration: {0}")]
    Config(String),
    #[error("unknown view: {0}")]
    UnknownView(ViewKey),
    #[error("view {0} is active and cannot be deleted")]
    ActiveView(ViewKey),
    #[error("invalid search query: {0}")]
    InvalidSearch(String),
    #[error("invalid regex for field {field}: {source}")]
    InvalidRegex {
        field: String,
        #[source]
        source: regex::Error,
    },
    #[error("malformed viewport response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, ViewportError>;
