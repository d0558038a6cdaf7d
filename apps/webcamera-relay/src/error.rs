use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::metrics;
use crate::registry::RegistryError;

/// Request-level failures. None of these are retried by the relay.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// A freshly minted identifier collided with a live entry; callers may retry.
    #[error("identifier in use: {0}")]
    IdentifierInUse(String),
}

impl RelayError {
    pub fn missing(field: &str) -> Self {
        RelayError::BadRequest(format!("missing `{field}`"))
    }

    pub fn code(&self) -> &'static str {
        match self {
            RelayError::BadRequest(_) => "bad_request",
            RelayError::NotFound(_) => "not_found",
            RelayError::IdentifierInUse(_) => "identifier_in_use",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::BadRequest(_) | RelayError::IdentifierInUse(_) => StatusCode::BAD_REQUEST,
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl From<RegistryError> for RelayError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => RelayError::NotFound(id),
            RegistryError::IdentifierInUse(id) => RelayError::IdentifierInUse(id),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        metrics::REQUEST_ERRORS.with_label_values(&[self.code()]).inc();
        let message = match &self {
            RelayError::BadRequest(msg) => msg.clone(),
            RelayError::NotFound(id) => format!("no open stream for `{id}`"),
            RelayError::IdentifierInUse(id) => format!("`{id}` is in use, try again"),
        };
        (
            self.status(),
            Json(ErrorBody {
                error: self.code(),
                message,
            }),
        )
            .into_response()
    }
}
