//! Environment configuration.
//!
//! Every value is read once at startup. Empty or whitespace-only variables count
//! as unset, so `DB_HOST=` in a `.env` file does not select the TCP strategy.
//! `DB_PASS` is the exception: only an empty value is unset.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use thiserror::Error;

use crate::constants::{
    DEFAULT_DB_NAME, DEFAULT_DB_PORT, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SOCKET_DIR,
};

/// Any problem with the environment that keeps the process from starting.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing database connection type. Please define one of DB_HOST, or INSTANCE_CONNECTION_NAME")]
    MissingConnectionType,

    #[error("{key} must be a port number, got {value:?}")]
    InvalidPort { key: &'static str, value: String },

    #[error("HOST must be an IP address, got {0:?}")]
    InvalidHost(String),

    #[error("INSTANCE_CONNECTION_NAME must look like project:region:instance, got {0:?}")]
    InvalidInstanceConnectionName(String),

    #[error("Identity-based authentication needs DB_IAM_USER or DB_USER")]
    MissingIamUser,
}

/// The raw database settings. Which strategy they select is decided by
/// [`crate::connection::Strategy::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub name: String,
    pub instance_connection_name: Option<String>,
    pub iam_user: Option<String>,
    pub socket_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database: DatabaseConfig,
    pub listen_addr: SocketAddr,
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Config, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        // passwords are taken as given, whitespace included
        let secret = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let database = DatabaseConfig {
            host: var("DB_HOST"),
            port: parse_port("DB_PORT", var("DB_PORT"), DEFAULT_DB_PORT)?,
            user: var("DB_USER"),
            password: secret("DB_PASS"),
            name: var("DB_NAME").unwrap_or_else(|| DEFAULT_DB_NAME.to_owned()),
            instance_connection_name: var("INSTANCE_CONNECTION_NAME"),
            iam_user: var("DB_IAM_USER"),
            socket_dir: var("DB_SOCKET_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_DIR)),
        };

        let host = var("HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned());
        let ip: IpAddr = host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(host.clone()))?;
        let port = parse_port("PORT", var("PORT"), DEFAULT_PORT)?;

        Ok(Config {
            database,
            listen_addr: SocketAddr::new(ip, port),
        })
    }
}

fn parse_port(key: &'static str, value: Option<String>, default: u16) -> Result<u16, ConfigError> {
    match value {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidPort { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[("DB_HOST", "127.0.0.1")]).unwrap();

        assert_eq!(config.database.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.name, "postgres");
        assert_eq!(config.database.socket_dir, PathBuf::from("/cloudsql"));
        assert_eq!(config.listen_addr, "0.0.0.0:5000".parse().unwrap());
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = config_from(&[("DB_HOST", " "), ("DB_PASS", ""), ("DB_NAME", "")]).unwrap();

        assert_eq!(config.database.host, None);
        assert_eq!(config.database.password, None);
        assert_eq!(config.database.name, "postgres");
    }

    #[test]
    fn whitespace_password_is_kept() {
        let config = config_from(&[("INSTANCE_CONNECTION_NAME", "p:r:i"), ("DB_PASS", "  ")]).unwrap();

        assert_eq!(config.database.password.as_deref(), Some("  "));
    }

    #[test]
    fn explicit_values_are_kept() {
        let config = config_from(&[
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6543"),
            ("DB_USER", "app"),
            ("DB_PASS", "secret"),
            ("DB_NAME", "users"),
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
        ])
        .unwrap();

        assert_eq!(config.database.port, 6543);
        assert_eq!(config.database.user.as_deref(), Some("app"));
        assert_eq!(config.database.password.as_deref(), Some("secret"));
        assert_eq!(config.database.name, "users");
        assert_eq!(config.listen_addr, "127.0.0.1:8080".parse().unwrap());
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = config_from(&[("DB_PORT", "postgres")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidPort {
                key: "DB_PORT",
                value: "postgres".into()
            }
        );

        let err = config_from(&[("PORT", "70000")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort { key: "PORT", .. }));
    }

    #[test]
    fn bad_host_is_rejected() {
        let err = config_from(&[("HOST", "localhost")]).unwrap_err();
        assert_eq!(err, ConfigError::InvalidHost("localhost".into()));
    }
}
