//! Expression compilation.
//!
//! This module contains the complete pipeline from a lambda tree to SQL text:
//!
//! - [`expr`] - The host expression tree and its builders
//! - [`queryset`] - Query, update, delete and batch builders
//! - [`cte`] - Common table expressions
//! - [`translate`] - Method and static-member translation table
//! - [`dialect`] - Dialect hooks; MySQL ships
//! - [`coerce`] - Literal versus parameter rendering of host values
//! - [`params`] - The parameter sink
//! - [`ir`] - The typed SQL tree the walker produces
//! - [`compiler`] - Statement compilation entry points
//! - [`deferred`] - Projections evaluated after fetch
//!
//! Walking, rendering and bulk expansion are internal; [`planner`] exposes
//! the statement plans the renderer consumes.

mod bulk;
pub mod coerce;
pub mod compiler;
pub mod cte;
pub mod deferred;
pub mod dialect;
pub mod eval;
pub mod expr;
pub mod ir;
pub mod params;
pub mod planner;
pub mod queryset;
pub mod translate;
mod walker;
mod writer;

pub use compiler::{CompileOptions, CompiledStatement, SqlCompiler, UpdatePlan};
pub use cte::CteTable;
pub use deferred::{DeferredColumn, DeferredProjection, Row};
pub use dialect::{MySqlDialect, SqlDialect};
pub use expr::Expr;
pub use params::{Parameter, Parameters};
pub use queryset::{Delete, JoinKind, MultipleQuery, Query, Update};
pub use translate::{Translation, TranslationTable};
