//! # deces-common
//!
//! Shared code for the death-records services:
//! - Error type and result alias
//! - Root folder resolution and TOML bootstrap configuration
//! - SQLite schema and database initialization
//! - Import event types and the broadcast event bus

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
