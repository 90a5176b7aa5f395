//! # exprsql-db
//!
//! Compiles strongly-typed expression trees into MySQL text with an ordered,
//! typed parameter list. Callers build a [`Query`](query::Query),
//! [`Update`](query::Update) or [`Delete`](query::Delete) from lambdas over
//! mapped entities; a [`SqlCompiler`](query::SqlCompiler) resolves members
//! through a [`ModelProvider`](model::ModelProvider), translates method calls
//! through its [`TranslationTable`](query::TranslationTable), and renders the
//! statement.
//!
//! ## Architecture
//!
//! Builders record a call chain without touching SQL. Compilation plans the
//! statement into a typed IR, deciding for every value whether it is inlined
//! as a literal (compile-time constants) or bound as a parameter (captured
//! runtime values). The writer then renders the IR, allocating placeholders in
//! textual order into a single sink.
//!
//! ## Module Overview
//!
//! - [`model`] - Entity mappings and the [`ModelProvider`](model::ModelProvider) trait
//! - [`fields`] - Member-to-column definitions ([`FieldDef`](fields::FieldDef)) and type handlers
//! - [`value`] - Host values, host types and native parameter types
//! - [`query`] - Expression trees, builders, translation, and compilation

// These clippy lints are intentionally allowed for the compiler crate:
// - struct_excessive_bools: FieldDef carries one flag per mapping attribute
// - too_many_lines: translation and walker matches are inherently large
// - cast_precision_loss: i64-to-f64 casts are acceptable in host evaluation
// - result_large_err: SqlError is the crate error type and is used consistently
// - format_push_string: format! with push_str is clearer than write! for SQL generation
// - doc_markdown: backtick requirements for documentation items are too strict
// - needless_pass_by_value: builder signatures take owned expressions
// - use_self: explicit type names are clearer in some contexts
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::result_large_err)]
#![allow(clippy::format_push_string)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::use_self)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::should_implement_trait)]
// literal_string_with_formatting_args: dialect templates use {0}/{*} placeholders
#![allow(clippy::literal_string_with_formatting_args)]

pub mod fields;
pub mod model;
pub mod query;
pub mod value;

// Re-export the most commonly used types at the crate root.
pub use fields::{FieldDef, TypeHandler};
pub use model::{EntityMap, ModelProvider, ModelRegistry};
pub use query::{
    CompileOptions, CompiledStatement, CteTable, Delete, DeferredProjection, Expr, JoinKind,
    MultipleQuery, Parameters, Query, Row, SqlCompiler, Update, UpdatePlan,
};
pub use value::{EnumValue, HostType, NativeType, Record, Value};
