//! # cdidb Common Library
//!
//! Shared code for all cdidb crates including:
//! - Database schema, models and snapshot persistence helpers
//! - Sentinel constants (gender, boolean-like flags, no-data marker)
//! - Configuration loading and data root resolution
//! - Date parsing and age arithmetic
//! - Common error type

pub mod config;
pub mod constants;
pub mod dates;
pub mod db;
pub mod error;

pub use error::{Error, Result};
