//! Database entities
//!
//! Note that the `users` table is created from these definitions at startup,
//! so a column change here changes the bootstrap DDL too.

pub mod user;
