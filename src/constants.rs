//! Constants

use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;

lazy_static! {
    /// `project:region:instance`
    pub(crate) static ref RE_INSTANCE_CONNECTION_NAME: Regex =
        Regex::new(r"^[^:/\s]+:[^:/\s]+:[^:/\s]+$").unwrap();
}

// for the connection pool
pub(crate) const POOL_SIZE: u32 = 5;
pub(crate) const POOL_MAX_OVERFLOW: u32 = 2;
pub(crate) const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const POOL_MAX_LIFETIME: Duration = Duration::from_secs(1800);

// for config defaults
pub(crate) const DEFAULT_DB_PORT: u16 = 5432;
pub(crate) const DEFAULT_DB_NAME: &str = "postgres";
pub(crate) const DEFAULT_SOCKET_DIR: &str = "/cloudsql";
pub(crate) const DEFAULT_LOG_LEVEL: &str = "INFO";
pub(crate) const DEFAULT_HOST: &str = "0.0.0.0";
pub(crate) const DEFAULT_PORT: u16 = 5000;

// service accounts log in under their email minus this suffix
pub(crate) const IAM_SERVICE_ACCOUNT_SUFFIX: &str = ".gserviceaccount.com";
