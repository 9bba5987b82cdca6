//! User storage operations.
//!
//! Each operation checks a connection out of the pool for its own use only.
//! Mutations run in a transaction that commits on `Ok` and rolls back on
//! `Err`, and the connection goes back to the pool on every path.

use chrono::Utc;
use entity::user;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set, SqlErr, TransactionError, TransactionTrait,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// The outcome of a storage operation that did not succeed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("User {0} already exists.")]
    Conflict(String),

    #[error("User not found.")]
    NotFound(i32),

    #[error(transparent)]
    Storage(#[from] DbErr),
}

impl From<TransactionError<StoreError>> for StoreError {
    fn from(err: TransactionError<StoreError>) -> Self {
        match err {
            TransactionError::Connection(err) => StoreError::Storage(err),
            TransactionError::Transaction(err) => err,
        }
    }
}

/// Map a unique-constraint violation on `email` to a conflict.
fn conflict_on_unique(err: DbErr, email: &str) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => StoreError::Conflict(email.to_owned()),
        _ => StoreError::Storage(err),
    }
}

fn log_failure(operation: &str, err: &StoreError) {
    match err {
        StoreError::Conflict(email) => info!("User {} already exists", email),
        StoreError::NotFound(id) => warn!("User ID {} not found.", id),
        StoreError::Storage(err) => error!("Error in {}: {}", operation, err),
    }
}

fn now() -> DateTimeWithTimeZone {
    Utc::now().into()
}

/// Create a user unless the email is taken.
pub async fn create_user(
    db: &DatabaseConnection,
    name: String,
    email: String,
) -> Result<user::Model, StoreError> {
    let result = db
        .transaction::<_, user::Model, StoreError>(|txn| {
            Box::pin(async move {
                let existing = user::Entity::find()
                    .filter(user::Column::Email.eq(email.as_str()))
                    .one(txn)
                    .await?;
                if existing.is_some() {
                    return Err(StoreError::Conflict(email));
                }

                user::ActiveModel {
                    name: Set(name),
                    email: Set(email.clone()),
                    created_at: Set(now()),
                    updated_at: Set(None),
                    ..Default::default()
                }
                .insert(txn)
                .await
                .map_err(|err| conflict_on_unique(err, &email))
            })
        })
        .await
        .map_err(StoreError::from);

    match &result {
        Ok(user) => info!("User {} created.", user.email),
        Err(err) => log_failure("create_user", err),
    }
    debug!("Session closed");
    result
}

/// Every user, oldest first.
pub async fn read_users(db: &DatabaseConnection) -> Result<Vec<user::Model>, StoreError> {
    user::Entity::find()
        .order_by_asc(user::Column::Id)
        .all(db)
        .await
        .map_err(|err| {
            let err = StoreError::from(err);
            log_failure("read_users", &err);
            err
        })
}

pub async fn read_user(db: &DatabaseConnection, id: i32) -> Result<user::Model, StoreError> {
    let result = match user::Entity::find_by_id(id).one(db).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(StoreError::NotFound(id)),
        Err(err) => Err(StoreError::from(err)),
    };

    if let Err(err) = &result {
        log_failure("read_user", err);
    }
    result
}

/// Apply whichever of `name` and `email` is supplied. Empty strings count as
/// not supplied; supplying neither leaves the row untouched.
pub async fn update_user(
    db: &DatabaseConnection,
    id: i32,
    name: Option<String>,
    email: Option<String>,
) -> Result<user::Model, StoreError> {
    let name = name.filter(|name| !name.is_empty());
    let email = email.filter(|email| !email.is_empty());

    let result = db
        .transaction::<_, user::Model, StoreError>(|txn| {
            Box::pin(async move {
                let existing = user::Entity::find_by_id(id)
                    .one(txn)
                    .await?
                    .ok_or(StoreError::NotFound(id))?;

                if name.is_none() && email.is_none() {
                    return Ok(existing);
                }

                if let Some(email) = &email {
                    let taken = user::Entity::find()
                        .filter(user::Column::Email.eq(email.as_str()))
                        .filter(user::Column::Id.ne(id))
                        .one(txn)
                        .await?;
                    if taken.is_some() {
                        return Err(StoreError::Conflict(email.clone()));
                    }
                }

                let mut active: user::ActiveModel = existing.into();
                if let Some(name) = name {
                    active.name = Set(name);
                }
                if let Some(email) = &email {
                    active.email = Set(email.clone());
                }
                active.updated_at = Set(Some(now()));

                active.update(txn).await.map_err(|err| match &email {
                    Some(email) => conflict_on_unique(err, email),
                    None => StoreError::Storage(err),
                })
            })
        })
        .await
        .map_err(StoreError::from);

    match &result {
        Ok(_) => info!("User {} updated.", id),
        Err(err) => log_failure("update_user", err),
    }
    debug!("Session closed");
    result
}

pub async fn delete_user(db: &DatabaseConnection, id: i32) -> Result<(), StoreError> {
    let result = db
        .transaction::<_, (), StoreError>(|txn| {
            Box::pin(async move {
                let existing = user::Entity::find_by_id(id)
                    .one(txn)
                    .await?
                    .ok_or(StoreError::NotFound(id))?;
                existing.delete(txn).await?;
                Ok(())
            })
        })
        .await
        .map_err(StoreError::from);

    match &result {
        Ok(()) => info!("User {} deleted.", id),
        Err(err) => log_failure("delete_user", err),
    }
    debug!("Session closed");
    result
}
