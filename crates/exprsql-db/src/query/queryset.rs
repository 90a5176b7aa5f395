//! Query builders.
//!
//! [`Query`], [`Update`], [`Delete`] and [`MultipleQuery`] record a call chain
//! of lambdas without touching SQL. The terminal `to_sql` call hands the
//! builder to a [`SqlCompiler`]. Builders are plain values: compiling one
//! borrows it, so the same builder compiles to the same text every time.
//!
//! # Examples
//!
//! ```
//! use exprsql_db::query::expr::{constant, lambda, param};
//! use exprsql_db::query::queryset::Query;
//!
//! let q = Query::from("User")
//!     .where_(lambda(["f"], param("f").member("Id").eq(constant(1))))
//!     .order_by(lambda(["f"], param("f").member("Name")))
//!     .take(10);
//! assert_eq!(q.entity_name(), Some("User"));
//! ```

use exprsql_core::SqlResult;

use super::compiler::{CompiledStatement, SqlCompiler, UpdatePlan};
use super::cte::CteTable;
use super::expr::Expr;
use crate::value::{Record, Value};

/// Join flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `INNER JOIN`
    Inner,
    /// `LEFT JOIN`
    Left,
    /// `RIGHT JOIN`
    Right,
}

impl JoinKind {
    /// The join keyword.
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
        }
    }
}

/// Where the rows of a table position come from.
#[derive(Debug, Clone)]
pub enum TableSource {
    /// A mapped entity.
    Entity(String),
    /// A derived table `(SELECT ...)`.
    Derived(Box<Query>),
    /// A common table expression, emitted in the `WITH` block.
    Cte(CteTable),
    /// The CTE currently being defined, referenced from its recursive member.
    SelfRef(String),
}

impl TableSource {
    fn describe(&self) -> Option<&str> {
        match self {
            Self::Entity(name) | Self::SelfRef(name) => Some(name),
            Self::Cte(cte) => Some(cte.name()),
            Self::Derived(query) => query.entity_name(),
        }
    }
}

impl From<&str> for TableSource {
    fn from(entity: &str) -> Self {
        Self::Entity(entity.to_string())
    }
}

impl From<String> for TableSource {
    fn from(entity: String) -> Self {
        Self::Entity(entity)
    }
}

impl From<Query> for TableSource {
    fn from(query: Query) -> Self {
        Self::Derived(Box::new(query))
    }
}

impl From<CteTable> for TableSource {
    fn from(cte: CteTable) -> Self {
        Self::Cte(cte)
    }
}

impl From<&CteTable> for TableSource {
    fn from(cte: &CteTable) -> Self {
        Self::Cte(cte.clone())
    }
}

/// One join of a query or update.
#[derive(Debug, Clone)]
pub struct JoinClause {
    /// Join flavour.
    pub kind: JoinKind,
    /// The joined rows.
    pub source: TableSource,
    /// `(t1, ..., tn) => predicate` over every table up to and including
    /// this one.
    pub on: Expr,
    /// An alias override.
    pub alias: Option<String>,
}

/// The select list of a query.
#[derive(Debug, Clone)]
pub enum Projection {
    /// `Select(x => ...)`.
    Select(Expr),
    /// Every mapped column of the first table plus the members of the
    /// lambda's `new { ... }` body; a member named like a column replaces it.
    Flatten(Expr),
}

/// A SELECT builder.
#[derive(Debug, Clone)]
pub struct Query {
    pub(crate) from: TableSource,
    pub(crate) from_alias: Option<String>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) filters: Vec<Expr>,
    pub(crate) group_by: Option<Expr>,
    pub(crate) having: Vec<Expr>,
    pub(crate) order_by: Vec<(Expr, bool)>,
    pub(crate) projection: Option<Projection>,
    pub(crate) distinct: bool,
    pub(crate) limit: Option<usize>,
    pub(crate) offset: Option<usize>,
}

impl Query {
    /// Starts a query over an entity, derived query, or CTE.
    #[allow(clippy::should_implement_trait)]
    pub fn from(source: impl Into<TableSource>) -> Self {
        Self {
            from: source.into(),
            from_alias: None,
            joins: Vec::new(),
            filters: Vec::new(),
            group_by: None,
            having: Vec::new(),
            order_by: Vec::new(),
            projection: None,
            distinct: false,
            limit: None,
            offset: None,
        }
    }

    /// The entity (or CTE) name of the first table, if it has one.
    pub fn entity_name(&self) -> Option<&str> {
        self.from.describe()
    }

    /// Overrides the alias of the most recently added table.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        let alias = Some(alias.into());
        match self.joins.last_mut() {
            Some(join) => join.alias = alias,
            None => self.from_alias = alias,
        }
        self
    }

    /// Adds a join.
    #[must_use]
    pub fn join(mut self, kind: JoinKind, source: impl Into<TableSource>, on: Expr) -> Self {
        self.joins.push(JoinClause {
            kind,
            source: source.into(),
            on,
            alias: None,
        });
        self
    }

    /// Adds an `INNER JOIN`.
    #[must_use]
    pub fn inner_join(self, source: impl Into<TableSource>, on: Expr) -> Self {
        self.join(JoinKind::Inner, source, on)
    }

    /// Adds a `LEFT JOIN`.
    #[must_use]
    pub fn left_join(self, source: impl Into<TableSource>, on: Expr) -> Self {
        self.join(JoinKind::Left, source, on)
    }

    /// Adds a `RIGHT JOIN`.
    #[must_use]
    pub fn right_join(self, source: impl Into<TableSource>, on: Expr) -> Self {
        self.join(JoinKind::Right, source, on)
    }

    /// Adds a filter; several filters are joined with `AND`.
    #[must_use]
    pub fn where_(mut self, predicate: Expr) -> Self {
        self.filters.push(predicate);
        self
    }

    /// Groups by a key selector; `new { ... }` gives a composite key.
    #[must_use]
    pub fn group_by(mut self, key: Expr) -> Self {
        self.group_by = Some(key);
        self
    }

    /// Adds a group filter.
    #[must_use]
    pub fn having(mut self, predicate: Expr) -> Self {
        self.having.push(predicate);
        self
    }

    /// Adds an ascending sort key.
    #[must_use]
    pub fn order_by(mut self, key: Expr) -> Self {
        self.order_by.push((key, false));
        self
    }

    /// Adds a descending sort key.
    #[must_use]
    pub fn order_by_desc(mut self, key: Expr) -> Self {
        self.order_by.push((key, true));
        self
    }

    /// Sets the projection.
    #[must_use]
    pub fn select(mut self, projection: Expr) -> Self {
        self.projection = Some(Projection::Select(projection));
        self
    }

    /// Projects every column of the first table plus extra computed members.
    #[must_use]
    pub fn select_flatten(mut self, extra: Expr) -> Self {
        self.projection = Some(Projection::Flatten(extra));
        self
    }

    /// Adds `DISTINCT`.
    #[must_use]
    pub const fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Limits the number of rows.
    #[must_use]
    pub const fn take(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Skips rows.
    #[must_use]
    pub const fn skip(mut self, n: usize) -> Self {
        self.offset = Some(n);
        self
    }

    /// Compiles this query.
    ///
    /// # Errors
    ///
    /// Propagates any translation error.
    pub fn to_sql(&self, compiler: &SqlCompiler) -> SqlResult<CompiledStatement> {
        compiler.compile_select(self)
    }
}

/// One `SET` entry of an [`Update`].
#[derive(Debug, Clone)]
pub enum Assignment {
    /// `Set(f => new { A = ..., B = ... })`.
    Lambda(Expr),
    /// `Set(f => f.A, value)`; the value may be a lambda over the tables.
    Field {
        /// The assigned member.
        member: String,
        /// The assigned expression.
        value: Expr,
    },
    /// A host value bound as `@Member` with the field's native type.
    Value {
        /// The assigned member.
        member: String,
        /// The value.
        value: Value,
    },
    /// Every member of an object; key members become the `WHERE` clause.
    Object(Record),
}

/// An UPDATE builder.
///
/// # Examples
///
/// ```
/// use exprsql_db::query::queryset::Update;
/// use exprsql_db::value::Record;
///
/// let update = Update::entity("Order")
///     .set_bulk(vec![
///         Record::new().with("Id", 1).with("Price", 9.5),
///         Record::new().with("Id", 2).with("Price", 3.0),
///     ])
///     .only_fields(["Price"]);
/// assert!(update.is_bulk());
/// ```
#[derive(Debug, Clone)]
pub struct Update {
    pub(crate) entity: String,
    pub(crate) assignments: Vec<Assignment>,
    pub(crate) bulk_rows: Option<Vec<Record>>,
    pub(crate) only_fields: Vec<String>,
    pub(crate) ignore_fields: Vec<String>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) filters: Vec<Expr>,
    pub(crate) key_rows: Vec<Record>,
}

impl Update {
    /// Starts an update of an entity's table.
    pub fn entity(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            assignments: Vec::new(),
            bulk_rows: None,
            only_fields: Vec::new(),
            ignore_fields: Vec::new(),
            joins: Vec::new(),
            filters: Vec::new(),
            key_rows: Vec::new(),
        }
    }

    /// `SET` from a lambda returning `new { ... }`.
    #[must_use]
    pub fn set(mut self, assignments: Expr) -> Self {
        self.assignments.push(Assignment::Lambda(assignments));
        self
    }

    /// `SET member = value`.
    #[must_use]
    pub fn set_field(mut self, member: impl Into<String>, value: Expr) -> Self {
        self.assignments.push(Assignment::Field {
            member: member.into(),
            value,
        });
        self
    }

    /// `SET member = @member` with a host value.
    #[must_use]
    pub fn set_value(mut self, member: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments.push(Assignment::Value {
            member: member.into(),
            value: value.into(),
        });
        self
    }

    /// `SET` every non-key member of an object, keyed by its key members.
    #[must_use]
    pub fn set_object(mut self, object: Record) -> Self {
        self.assignments.push(Assignment::Object(object));
        self
    }

    /// One `UPDATE` per row, keyed by the entity key.
    #[must_use]
    pub fn set_bulk(mut self, rows: Vec<Record>) -> Self {
        self.bulk_rows = Some(rows);
        self
    }

    /// Restricts object and bulk members to these.
    #[must_use]
    pub fn only_fields<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only_fields.extend(members.into_iter().map(Into::into));
        self
    }

    /// Excludes these members from object and bulk updates.
    #[must_use]
    pub fn ignore_fields<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_fields.extend(members.into_iter().map(Into::into));
        self
    }

    /// Adds an `INNER JOIN`; the updated table is aliased once joins exist.
    #[must_use]
    pub fn inner_join(mut self, source: impl Into<TableSource>, on: Expr) -> Self {
        self.joins.push(JoinClause {
            kind: JoinKind::Inner,
            source: source.into(),
            on,
            alias: None,
        });
        self
    }

    /// Adds a filter.
    #[must_use]
    pub fn where_(mut self, predicate: Expr) -> Self {
        self.filters.push(predicate);
        self
    }

    /// Restricts the update to the rows with these keys.
    #[must_use]
    pub fn where_keys(mut self, keys: Vec<Record>) -> Self {
        self.key_rows.extend(keys);
        self
    }

    /// Returns `true` if this is a per-row bulk update.
    pub const fn is_bulk(&self) -> bool {
        self.bulk_rows.is_some()
    }

    /// Compiles this update.
    ///
    /// # Errors
    ///
    /// Propagates any translation or planning error.
    pub fn to_sql(&self, compiler: &SqlCompiler) -> SqlResult<UpdatePlan> {
        compiler.compile_update(self)
    }
}

/// A DELETE builder.
#[derive(Debug, Clone)]
pub struct Delete {
    pub(crate) entity: String,
    pub(crate) filters: Vec<Expr>,
    pub(crate) key_rows: Vec<Record>,
}

impl Delete {
    /// Starts a delete from an entity's table.
    pub fn entity(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            filters: Vec::new(),
            key_rows: Vec::new(),
        }
    }

    /// Adds a filter.
    #[must_use]
    pub fn where_(mut self, predicate: Expr) -> Self {
        self.filters.push(predicate);
        self
    }

    /// Deletes the rows with these keys.
    #[must_use]
    pub fn where_keys(mut self, keys: Vec<Record>) -> Self {
        self.key_rows.extend(keys);
        self
    }

    /// Compiles this delete.
    ///
    /// # Errors
    ///
    /// Propagates any translation error.
    pub fn to_sql(&self, compiler: &SqlCompiler) -> SqlResult<CompiledStatement> {
        compiler.compile_delete(self)
    }
}

/// One statement of a [`MultipleQuery`].
#[derive(Debug, Clone)]
pub enum Statement {
    /// A SELECT.
    Select(Query),
    /// An UPDATE (single or bulk).
    Update(Update),
    /// A DELETE.
    Delete(Delete),
}

/// A batch of statements sharing one parameter sink.
#[derive(Debug, Clone, Default)]
pub struct MultipleQuery {
    pub(crate) statements: Vec<Statement>,
}

impl MultipleQuery {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a SELECT.
    #[must_use]
    pub fn select(mut self, query: Query) -> Self {
        self.statements.push(Statement::Select(query));
        self
    }

    /// Appends an UPDATE.
    #[must_use]
    pub fn update(mut self, update: Update) -> Self {
        self.statements.push(Statement::Update(update));
        self
    }

    /// Appends a DELETE.
    #[must_use]
    pub fn delete(mut self, delete: Delete) -> Self {
        self.statements.push(Statement::Delete(delete));
        self
    }

    /// Returns the number of statements.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Returns `true` if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Compiles the batch.
    ///
    /// # Errors
    ///
    /// Propagates the first error of any statement.
    pub fn to_sql(&self, compiler: &SqlCompiler) -> SqlResult<CompiledStatement> {
        compiler.compile_multiple(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::{constant, lambda, param};

    #[test]
    fn test_alias_applies_to_last_table() {
        let q = Query::from("User")
            .alias("u")
            .inner_join(
                "Company",
                lambda(["u", "c"], param("u").member("CompanyId").eq(param("c").member("Id"))),
            )
            .alias("c");
        assert_eq!(q.from_alias.as_deref(), Some("u"));
        assert_eq!(q.joins[0].alias.as_deref(), Some("c"));
    }

    #[test]
    fn test_filters_accumulate() {
        let q = Query::from("User")
            .where_(lambda(["f"], param("f").member("Id").gt(constant(1))))
            .where_(lambda(["f"], param("f").member("Id").lt(constant(9))));
        assert_eq!(q.filters.len(), 2);
    }

    #[test]
    fn test_update_field_lists() {
        let u = Update::entity("Order")
            .only_fields(["Price", "Quantity"])
            .ignore_fields(vec!["Quantity".to_string()]);
        assert_eq!(u.only_fields, vec!["Price", "Quantity"]);
        assert_eq!(u.ignore_fields, vec!["Quantity"]);
        assert!(!u.is_bulk());
    }

    #[test]
    fn test_multiple_query_len() {
        let m = MultipleQuery::new()
            .select(Query::from("User"))
            .delete(Delete::entity("User"));
        assert_eq!(m.len(), 2);
        assert!(!m.is_empty());
    }

    #[test]
    fn test_table_source_from() {
        assert!(matches!(TableSource::from("User"), TableSource::Entity(ref e) if e == "User"));
        assert!(matches!(
            TableSource::from(Query::from("User")),
            TableSource::Derived(_)
        ));
    }
}
