use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Errors handed back to callers of the weather service.
///
/// Every internal failure collapses into one of these three kinds; transport
/// and storage details are logged where they happen and never carried here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("City not found")]
    CityNotFound,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal server error")]
    InternalServerError,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// HTTP-style numeric code for the error kind.
    pub fn code(&self) -> u16 {
        match self {
            AppError::CityNotFound => 404,
            AppError::InvalidRequest(_) => 400,
            AppError::InternalServerError => 500,
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}
