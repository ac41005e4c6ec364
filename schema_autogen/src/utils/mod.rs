//! Utilities for schema_autogen

pub mod logging;
pub mod repr;

pub use logging::init_logging;
