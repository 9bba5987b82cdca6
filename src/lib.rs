//! A small JSON service for a single `users` table on Postgres.
//!
//! The database is reached either over TCP or through a managed connector's
//! instance socket; see [`connection`].

pub mod config;
mod constants;
pub mod connection;
pub mod error;
mod handlers;
pub mod server;
pub mod store;
