//! Azure provider error types

use cosmosflow_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("az CLI not found. Please install: https://aka.ms/azure-cli")]
    AzCliNotFound,

    #[error("Missing credential setting: {0}")]
    MissingCredential(String),

    #[error("Token request failed: {0}")]
    TokenRequest(String),

    #[error("az command failed: {0}")]
    CommandFailed(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Access denied ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("ARM API error {status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Invalid master key: {0}")]
    InvalidKey(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cloud error: {0}")]
    CloudError(#[from] CloudError),
}

impl From<AzureError> for CloudError {
    fn from(err: AzureError) -> Self {
        match err {
            AzureError::NotFound(what) => CloudError::ResourceNotFound(what),
            AzureError::Conflict(what) => CloudError::ResourceAlreadyExists(what),
            AzureError::AzCliNotFound
            | AzureError::MissingCredential(_)
            | AzureError::TokenRequest(_)
            | AzureError::Unauthorized { .. } => CloudError::AuthenticationFailed(err.to_string()),
            AzureError::CloudError(inner) => inner,
            AzureError::IoError(e) => CloudError::Io(e),
            AzureError::JsonError(e) => CloudError::Json(e),
            other => CloudError::ApiError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AzureError>;
