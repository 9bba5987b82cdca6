use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::{Validate, ValidationError};

use crate::error::ServiceError;
use crate::handlers::{PathId, UserId, ValidatedJson};
use crate::server::State;
use crate::store;

/// The JSON input for `POST /users`
#[derive(Debug, Validate, Deserialize)]
pub(crate) struct NewUserInput {
    /// The provided name.
    #[serde(default)]
    #[validate(length(
        min = 1,
        max = 32,
        message = "Name is required and at most 32 characters"
    ))]
    pub(crate) name: String,
    /// The provided email.
    #[serde(default)]
    #[validate(length(
        min = 1,
        max = 64,
        message = "Email is required and at most 64 characters"
    ))]
    pub(crate) email: String,
}

/// The JSON input for `PUT /users/:id`. Absent and empty fields are left alone.
#[derive(Debug, Validate, Deserialize)]
#[validate(schema(function = "validate_update_user"))]
pub(crate) struct UpdateUserInput {
    #[validate(length(max = 32, message = "Name is at most 32 characters"))]
    pub(crate) name: Option<String>,
    #[validate(length(max = 64, message = "Email is at most 64 characters"))]
    pub(crate) email: Option<String>,
}

fn validate_update_user(input: &UpdateUserInput) -> Result<(), ValidationError> {
    let supplied = |field: &Option<String>| field.as_deref().map_or(false, |v| !v.is_empty());
    if supplied(&input.name) || supplied(&input.email) {
        Ok(())
    } else {
        let mut err = ValidationError::new("missing_fields");
        err.message = Some("Either 'name' or 'email' must be provided for update".into());
        Err(err)
    }
}

/// The response output for `GET /users` and `GET /users/:id`
#[derive(Debug, Serialize)]
pub(crate) struct UserResponse {
    pub(crate) id: i32,
    pub(crate) name: String,
    pub(crate) email: String,
}

impl From<entity::user::Model> for UserResponse {
    fn from(user: entity::user::Model) -> Self {
        UserResponse {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

/// Confirmation of a mutation.
#[derive(Debug, Serialize)]
pub(crate) struct MessageResponse {
    pub(crate) message: String,
}

fn message(status: StatusCode, message: String) -> Response {
    (status, Json(MessageResponse { message })).into_response()
}

/// Handler for `POST /users`
pub(crate) async fn create_user(
    state: Extension<Arc<State>>,
    ValidatedJson(input): ValidatedJson<NewUserInput>,
) -> Result<Response, ServiceError> {
    let user = store::create_user(&state.db, input.name, input.email).await?;

    Ok(message(
        StatusCode::CREATED,
        format!("User {} added.", user.name),
    ))
}

/// Handler for `GET /users`
pub(crate) async fn list_users(state: Extension<Arc<State>>) -> Result<Response, ServiceError> {
    let users: Vec<UserResponse> = store::read_users(&state.db)
        .await?
        .into_iter()
        .map(UserResponse::from)
        .collect();

    Ok(Json(users).into_response())
}

/// Handler for `GET /users/:id`
pub(crate) async fn get_user(
    UserId(id): UserId,
    state: Extension<Arc<State>>,
) -> Result<Response, ServiceError> {
    let user = store::read_user(&state.db, id).await?;

    Ok(Json(UserResponse::from(user)).into_response())
}

/// Handler for `PUT /users/:id`
pub(crate) async fn update_user(
    PathId(id): PathId,
    state: Extension<Arc<State>>,
    ValidatedJson(input): ValidatedJson<UpdateUserInput>,
) -> Result<Response, ServiceError> {
    store::update_user(&state.db, id, input.name, input.email).await?;

    Ok(message(StatusCode::OK, format!("User {} updated.", id)))
}

/// Handler for `DELETE /users/:id`
pub(crate) async fn delete_user(
    PathId(id): PathId,
    state: Extension<Arc<State>>,
) -> Result<Response, ServiceError> {
    store::delete_user(&state.db, id).await?;

    Ok(message(StatusCode::OK, format!("User {} deleted.", id)))
}
