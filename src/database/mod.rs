//! # Database Layer
//!
//! Connection management, schema migrations with advisory-lock guarding,
//! and the advisory-lock helpers that serialize conversation and user
//! mutations.

pub mod connection;
pub mod locks;
pub mod migrations;

pub use connection::DatabaseConnection;
pub use locks::{conversation_lock, user_lock};
pub use migrations::DatabaseMigrations;
