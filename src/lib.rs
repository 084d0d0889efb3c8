//! Data-access core for the student violation tracker.
//!
//! Three components back the CLI: the violation store, the student store,
//! and the auth gateway. Each is a trait with a Postgres implementation
//! and an in-memory implementation, wired together once at startup.

pub mod auth;
pub mod blob;
pub mod db;
pub mod error;
pub mod memory;
pub mod models;
pub mod report;
pub mod stats;
pub mod store;
