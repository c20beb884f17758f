//! The API's error response type — one status code plus a message,
//! matching the teacher's `ApiError` shape without the OpenAPI generation
//! this project has no use for.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "missing or invalid bearer token")
    }
}

#[derive(Serialize)]
struct Body {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, axum::Json(Body { error: self.message })).into_response()
    }
}

impl From<rapo_control::ControlError> for ApiError {
    fn from(err: rapo_control::ControlError) -> Self {
        match &err {
            rapo_control::ControlError::UnknownControl(_) => {
                ApiError::new(StatusCode::NOT_FOUND, err.to_string())
            }
            _ => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        }
    }
}

impl From<rapo_db::GatewayError> for ApiError {
    fn from(err: rapo_db::GatewayError) -> Self {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_is_401() {
        assert_eq!(ApiError::unauthorized().status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn unknown_control_maps_to_404() {
        let err = rapo_control::ControlError::UnknownControl("nope".into());
        let api: ApiError = err.into();
        assert_eq!(api.status, StatusCode::NOT_FOUND);
    }
}
