//! Database module for schema_autogen
//!
//! This module handles database connections.

pub mod connection;

pub use connection::DatabaseConnection;
