//! # exprsql
//!
//! Compiles expression trees over mapped entities into MySQL text plus an
//! ordered list of typed parameters.
//!
//! This is the meta-crate that re-exports the sub-crates for convenient
//! access. Depend on `exprsql` for everything, or on the individual crates for
//! finer-grained control.
//!
//! ```
//! use std::sync::Arc;
//!
//! use exprsql::prelude::*;
//!
//! let models = ModelRegistry::new().with(
//!     EntityMap::new("User")
//!         .field(FieldDef::new("Id", HostType::Int32).primary_key())
//!         .field(FieldDef::new("Name", HostType::String)),
//! );
//! let compiler = SqlCompiler::mysql(Arc::new(models));
//! let delete = Delete::entity("User").where_keys(vec![Record::new().with("Id", 5)]);
//! let compiled = delete.to_sql(&compiler).unwrap();
//! assert_eq!(compiled.sql, "DELETE FROM `User` WHERE `Id`=@Id0");
//! ```

/// Error types, settings, and logging.
pub use exprsql_core as core;

/// Expression trees, builders, translation, and the statement compiler.
pub use exprsql_db as db;

// Re-export third-party crates that users commonly need.
pub use chrono;
pub use serde;
pub use serde_json;
pub use tracing;
pub use tracing_subscriber;

/// The types most programs need, in one import.
pub mod prelude {
    pub use exprsql_core::{EmptyInPolicy, Settings, SqlError, SqlResult};
    pub use exprsql_db::query::cte::CteTable;
    pub use exprsql_db::query::expr::{
        array, captured, constant, enum_value, lambda, new_object, null, param, static_call,
        static_member, Expr,
    };
    pub use exprsql_db::query::queryset::{Delete, MultipleQuery, Query, Update};
    pub use exprsql_db::query::{CompiledStatement, SqlCompiler, UpdatePlan};
    pub use exprsql_db::{EntityMap, FieldDef, HostType, ModelRegistry, Record, Value};
}
