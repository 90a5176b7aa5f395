//! Field definitions and type handlers.
//!
//! This module provides the [`FieldDef`] struct describing how one entity
//! member maps to a column, and the [`TypeHandler`] trait for custom value
//! binding.

pub mod handlers;
pub mod types;

pub use handlers::{EnumNameHandler, JsonHandler, TypeHandler};
pub use types::FieldDef;
