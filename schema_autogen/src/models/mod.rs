//! Models module for schema_autogen
//!
//! This module handles model registration and definition file loading.

pub mod registry;

pub use registry::{Model, ModelRegistry};
