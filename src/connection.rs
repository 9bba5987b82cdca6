//! Database connection factory.
//!
//! Picks one of three strategies from the configuration, builds a lazily
//! connected pool for it and hands back the session factory together with a
//! [`Link`] describing how the pool reaches the database.

use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbErr, Schema, SqlxPostgresConnector, Statement,
};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::{ConfigError, DatabaseConfig};
use crate::constants::{
    IAM_SERVICE_ACCOUNT_SUFFIX, POOL_ACQUIRE_TIMEOUT, POOL_MAX_LIFETIME, POOL_MAX_OVERFLOW,
    POOL_SIZE, RE_INSTANCE_CONNECTION_NAME,
};

/// A password that stays out of logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// How the managed connector authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    Password {
        user: Option<String>,
        password: Secret,
    },
    /// The connector vouches for the calling identity, no password is sent.
    Iam { user: String },
}

/// The way the pool reaches the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Tcp {
        host: String,
        port: u16,
        user: Option<String>,
        password: Option<Secret>,
        database: String,
    },
    Connector {
        instance: String,
        socket: PathBuf,
        auth: Auth,
        database: String,
    },
}

impl Strategy {
    /// Select a strategy, in order: `DB_HOST`, then `INSTANCE_CONNECTION_NAME`
    /// (password auth when `DB_PASS` is set, identity auth otherwise).
    pub fn select(config: &DatabaseConfig) -> Result<Strategy, ConfigError> {
        if let Some(host) = &config.host {
            debug!("Using DB_HOST for connection.");
            return Ok(Strategy::Tcp {
                host: host.clone(),
                port: config.port,
                user: config.user.clone(),
                password: config.password.clone().map(Secret),
                database: config.name.clone(),
            });
        }

        if let Some(instance) = &config.instance_connection_name {
            if !RE_INSTANCE_CONNECTION_NAME.is_match(instance) {
                return Err(ConfigError::InvalidInstanceConnectionName(
                    instance.clone(),
                ));
            }

            let auth = match &config.password {
                Some(password) => {
                    debug!("Using SQL connector with password authentication.");
                    Auth::Password {
                        user: config.user.clone(),
                        password: Secret(password.clone()),
                    }
                }
                None => {
                    debug!("Using IAM authentication for the SQL connector.");
                    let user = config
                        .iam_user
                        .as_deref()
                        .or(config.user.as_deref())
                        .ok_or(ConfigError::MissingIamUser)?;
                    Auth::Iam {
                        user: iam_login(user),
                    }
                }
            };

            return Ok(Strategy::Connector {
                instance: instance.clone(),
                socket: config.socket_dir.join(instance),
                auth,
                database: config.name.clone(),
            });
        }

        Err(ConfigError::MissingConnectionType)
    }

    fn connect_options(&self) -> PgConnectOptions {
        match self {
            Strategy::Tcp {
                host,
                port,
                user,
                password,
                database,
            } => {
                let mut options = PgConnectOptions::new()
                    .host(host)
                    .port(*port)
                    .database(database);
                if let Some(user) = user {
                    options = options.username(user);
                }
                if let Some(password) = password {
                    options = options.password(password.expose());
                }
                options
            }
            Strategy::Connector {
                socket,
                auth,
                database,
                ..
            } => {
                let options = PgConnectOptions::new().socket(socket).database(database);
                match auth {
                    Auth::Password { user, password } => {
                        let options = match user {
                            Some(user) => options.username(user),
                            None => options,
                        };
                        options.password(password.expose())
                    }
                    Auth::Iam { user } => options.username(user),
                }
            }
        }
    }
}

/// Service accounts log in under their email without the domain suffix.
fn iam_login(user: &str) -> String {
    user.strip_suffix(IAM_SERVICE_ACCOUNT_SUFFIX)
        .unwrap_or(user)
        .to_owned()
}

fn pool_options() -> PgPoolOptions {
    PgPoolOptions::new()
        .min_connections(POOL_SIZE)
        .max_connections(POOL_SIZE + POOL_MAX_OVERFLOW)
        .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
        .max_lifetime(POOL_MAX_LIFETIME)
}

/// The managed connector in use. Closing it drains the pool it serves.
#[derive(Debug)]
pub struct Connector {
    instance: String,
    pool: PgPool,
}

impl Connector {
    fn instance(&self) -> &str {
        &self.instance
    }

    pub async fn close(self) {
        self.pool.close().await;
        info!(instance = %self.instance(), "Managed database connector closed.");
    }
}

/// What the factory connected through.
#[derive(Debug)]
pub enum Link {
    Tcp,
    Managed(Connector),
}

impl Link {
    /// Release whatever the link holds. Called once, on shutdown.
    pub async fn release(self) {
        match self {
            Link::Tcp => debug!("TCP link needs no release."),
            Link::Managed(connector) => connector.close().await,
        }
    }
}

/// Build the session factory for `config`.
///
/// No I/O happens here: the pool connects on first use, so an unreachable
/// database shows up in [`verify_connectivity`], not here.
pub fn init_connection_pool(
    config: &DatabaseConfig,
) -> Result<(DatabaseConnection, Link), ConfigError> {
    let strategy = Strategy::select(config)?;
    let pool = pool_options().connect_lazy_with(strategy.connect_options());
    let db = SqlxPostgresConnector::from_sqlx_postgres_pool(pool.clone());

    let link = match strategy {
        Strategy::Tcp { .. } => Link::Tcp,
        Strategy::Connector { instance, .. } => Link::Managed(Connector { instance, pool }),
    };

    Ok((db, link))
}

/// Round-trip a trivial query.
pub async fn verify_connectivity(db: &DatabaseConnection) -> Result<(), DbErr> {
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "SELECT 1".to_owned(),
    ))
    .await?;
    Ok(())
}

/// Create the `users` table unless it already exists. Never alters an existing table.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let mut statement = Schema::new(backend).create_table_from_entity(entity::user::Entity);
    statement.if_not_exists();
    db.execute(backend.build(&statement)).await?;
    Ok(())
}
