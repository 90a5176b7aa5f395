//! # exprsql-core
//!
//! Core types shared by the exprsql crates: the error taxonomy, compiler
//! settings, and tracing-based logging setup. This crate has no dependency on
//! the compiler itself.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`settings`] - Compiler settings and global configuration
//! - [`settings_loader`] - TOML/JSON/environment loading of settings
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{ErrorKind, SqlError, SqlResult};
pub use settings::{EmptyInPolicy, Settings, SETTINGS};
