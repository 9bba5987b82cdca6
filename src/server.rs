use anyhow::Result;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use sea_orm::DatabaseConnection;
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::connection::{self, Link};
use crate::constants::DEFAULT_LOG_LEVEL;
use crate::error::{BootError, INTERNAL_SERVER_ERROR_MESSAGE};
use crate::handlers;

/// Process-wide state, built once during bootstrap and shared by every request.
#[derive(Debug, Clone)]
pub struct State {
    pub db: DatabaseConnection,
}

impl State {
    pub fn new(db: DatabaseConnection) -> State {
        State { db }
    }
}

/// Build the application router around `state`.
pub fn router(state: Arc<State>) -> Router {
    Router::new()
        .route("/users", post(handlers::create_user).get(handlers::list_users))
        .route(
            "/users/:id",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
}

/// Turn a panic in a handler into a generic 500. The detail only goes to the log.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    error!("Handler panicked: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": INTERNAL_SERVER_ERROR_MESSAGE })),
    )
        .into_response()
}

/// Map a `LOG_LEVEL` value onto a tracing filter directive. Unknown values mean `info`.
pub(crate) fn level_directive(level: Option<&str>) -> &'static str {
    match level
        .unwrap_or(DEFAULT_LOG_LEVEL)
        .trim()
        .to_ascii_uppercase()
        .as_str()
    {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "WARN" | "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}

fn init_tracing() {
    let level = std::env::var("LOG_LEVEL").ok();
    let filter = EnvFilter::new(level_directive(level.as_deref()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Check the database is reachable and the `users` table exists.
pub async fn prepare_database(db: &DatabaseConnection) -> Result<(), BootError> {
    connection::verify_connectivity(db)
        .await
        .map_err(BootError::Connectivity)?;
    connection::ensure_schema(db)
        .await
        .map_err(BootError::Schema)?;
    info!("Database connection successful and tables ensured.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received.");
}

async fn serve(config: &Config, db: DatabaseConnection) -> Result<(), BootError> {
    prepare_database(&db).await?;

    let app = router(Arc::new(State::new(db)));
    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("Listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Run the server.
pub async fn run() -> Result<()> {
    init_tracing();

    let config = Config::from_env().map_err(BootError::from)?;
    let (db, link): (DatabaseConnection, Link) =
        connection::init_connection_pool(&config.database).map_err(BootError::from)?;
    info!("Database connection pool initialized.");

    let served = serve(&config, db).await;
    link.release().await;

    Ok(served?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use axum::body::to_bytes;
    use std::path::PathBuf;

    #[test]
    fn log_levels_map_like_the_usual_names() {
        assert_eq!(level_directive(None), "info");
        assert_eq!(level_directive(Some("DEBUG")), "debug");
        assert_eq!(level_directive(Some("warning")), "warn");
        assert_eq!(level_directive(Some("Critical")), "error");
        assert_eq!(level_directive(Some("trace")), "trace");
        assert_eq!(level_directive(Some("chatty")), "info");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreachable_database_is_a_connectivity_error() {
        let config = DatabaseConfig {
            host: None,
            port: 5432,
            user: Some("app".into()),
            password: Some("pw".into()),
            name: "postgres".into(),
            instance_connection_name: Some("proj:region:inst".into()),
            iam_user: None,
            socket_dir: PathBuf::from("/nonexistent/users-server-sockets"),
        };
        let (db, link) = connection::init_connection_pool(&config).unwrap();

        let err = prepare_database(&db).await.unwrap_err();
        assert!(matches!(err, BootError::Connectivity(_)), "{:?}", err);

        link.release().await;
    }

    #[tokio::test]
    async fn panics_become_generic_500s() {
        let response = handle_panic(Box::new(String::from("secret detail")));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains(INTERNAL_SERVER_ERROR_MESSAGE));
        assert!(!body.contains("secret detail"));
    }
}
