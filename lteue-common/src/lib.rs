//! Common types and utilities for the lteue stack
//!
//! This crate provides the shared types, configuration structures and
//! logging setup used across the lteue crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::UeConfig;
pub use error::Error;
pub use logging::{init_logging, init_logging_with_filter, LogLevel};
pub use types::{FoundPlmn, Plmn, STmsi};
