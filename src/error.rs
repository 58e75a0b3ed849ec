use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::pricing::provider::ProviderError;
use crate::pricing::repository::RepositoryError;

/// Errors reported by the pricing service
#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    /// Malformed input: empty model names, negative usage counts or prices
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// No provider (or row) exists for the requested model
    #[error("Not found: {0}")]
    NotFound(String),
    /// The pricing store failed
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    /// An upstream catalog failed where the failure is not tolerated
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
    /// The caller's deadline elapsed before the call completed
    #[error("Deadline exceeded")]
    DeadlineExceeded,
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PricingError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<tokio::time::error::Elapsed> for PricingError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::DeadlineExceeded
    }
}

impl IntoResponse for PricingError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type_name(&self),
            }
        }));

        (status, body).into_response()
    }
}

fn error_type_name(error: &PricingError) -> &'static str {
    match error {
        PricingError::InvalidArgument(_) => "invalid_argument",
        PricingError::NotFound(_) => "not_found",
        PricingError::Repository(_) => "dependency_error",
        PricingError::Provider(_) => "provider_error",
        PricingError::DeadlineExceeded => "deadline_exceeded",
        PricingError::Config(_) => "config_error",
    }
}
