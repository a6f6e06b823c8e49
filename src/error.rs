use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Config(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failure categories of the Meta OAuth callback. These only ever reach the
/// browser as the `meta_error` query parameter of the redirect to `/`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthFailure {
    #[error("permissions_missing")]
    PermissionsMissing,

    #[error("missing_code_or_state")]
    MissingCodeOrState,

    #[error("invalid_state")]
    InvalidState,

    #[error("not_admin_page")]
    NotAdminPage,

    #[error("oauth_failed")]
    OAuthFailed,
}

/// A single Graph API call that did not produce the expected payload.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Graph request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Graph request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Graph response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<GraphError> for OAuthFailure {
    fn from(_: GraphError) -> Self {
        OAuthFailure::OAuthFailed
    }
}
