use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

pub(crate) const INTERNAL_SERVER_ERROR_MESSAGE: &str = "Internal server error";

/// Any possible request errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),

    #[error(transparent)]
    JsonRejection(#[from] JsonRejection),

    #[error(transparent)]
    PathRejection(#[from] PathRejection),

    #[error("User id must be a positive integer, got {0}")]
    InvalidId(i64),

    #[error(transparent)]
    StoreError(#[from] StoreError),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ServiceError::ValidationError(_) => {
                let message = format!("Input validation error: [{}]", self).replace('\n', ", ");
                (StatusCode::BAD_REQUEST, message)
            }
            ServiceError::JsonRejection(_)
            | ServiceError::PathRejection(_)
            | ServiceError::InvalidId(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServiceError::StoreError(StoreError::Conflict(_)) => {
                (StatusCode::CONFLICT, self.to_string())
            }
            ServiceError::StoreError(StoreError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            ServiceError::StoreError(StoreError::Storage(e)) => {
                tracing::error!("Storage error occurred: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    INTERNAL_SERVER_ERROR_MESSAGE.to_owned(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Anything that keeps the server from starting.
#[derive(Debug, Error)]
pub enum BootError {
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Database connection failed: {0}")]
    Connectivity(#[source] sea_orm::DbErr),

    #[error("Could not ensure the users table: {0}")]
    Schema(#[source] sea_orm::DbErr),

    #[error("Could not bind or serve: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn render(err: ServiceError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn store_outcomes_map_to_status_codes() {
        let (status, body) = render(StoreError::Conflict("a@x.com".into()).into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "User a@x.com already exists.");

        let (status, body) = render(StoreError::NotFound(3).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "User not found.");

        let (status, _) = render(ServiceError::InvalidId(0)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn storage_detail_is_not_leaked() {
        let err = StoreError::Storage(sea_orm::DbErr::Custom("relation users is gone".into()));
        let (status, body) = render(err.into()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], INTERNAL_SERVER_ERROR_MESSAGE);
    }
}
