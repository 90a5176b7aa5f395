//! Common table expressions.
//!
//! A [`CteTable`] is referenced like any other table source. The compiler
//! collects every CTE reachable from a statement, dependencies first and
//! de-duplicated by name, into one `WITH` block ahead of the statement.
//! `RECURSIVE` is emitted only when some CTE references itself.
//!
//! # Examples
//!
//! ```
//! use exprsql_db::query::cte::CteTable;
//! use exprsql_db::query::expr::{lambda, null, param};
//! use exprsql_db::query::queryset::Query;
//!
//! let roots = Query::from("Menu").where_(lambda(["m"], param("m").member("ParentId").eq(null())));
//! let tree = CteTable::new("MenuTree", roots);
//! let children = Query::from("Menu").inner_join(
//!     tree.self_ref(),
//!     lambda(["m", "t"], param("m").member("ParentId").eq(param("t").member("Id"))),
//! );
//! let tree = tree.union_all_recursive(children);
//! assert!(tree.is_recursive());
//! ```

use std::sync::Arc;

use super::queryset::{Query, TableSource};

#[derive(Debug)]
struct CteInner {
    name: String,
    columns: Vec<String>,
    anchor: Query,
    union: Option<Query>,
    recursive: bool,
}

/// A named common table expression. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CteTable {
    inner: Arc<CteInner>,
}

impl CteTable {
    /// Creates a CTE whose rows are the anchor query's.
    pub fn new(name: impl Into<String>, anchor: Query) -> Self {
        Self {
            inner: Arc::new(CteInner {
                name: name.into(),
                columns: Vec::new(),
                anchor,
                union: None,
                recursive: false,
            }),
        }
    }

    fn rebuild(&self, f: impl FnOnce(&mut CteInner)) -> Self {
        let mut inner = CteInner {
            name: self.inner.name.clone(),
            columns: self.inner.columns.clone(),
            anchor: self.inner.anchor.clone(),
            union: self.inner.union.clone(),
            recursive: self.inner.recursive,
        };
        f(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Names the output columns; defaults to the anchor's projection.
    #[must_use]
    pub fn columns<I, S>(&self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        self.rebuild(|inner| inner.columns = columns)
    }

    /// Appends `UNION ALL <query>`.
    #[must_use]
    pub fn union_all(&self, query: Query) -> Self {
        self.rebuild(|inner| {
            inner.union = Some(query);
            inner.recursive = false;
        })
    }

    /// Appends `UNION ALL <query>` where `query` reads [`self_ref`](Self::self_ref).
    #[must_use]
    pub fn union_all_recursive(&self, query: Query) -> Self {
        self.rebuild(|inner| {
            inner.union = Some(query);
            inner.recursive = true;
        })
    }

    /// A table source naming this CTE from inside its own definition.
    pub fn self_ref(&self) -> TableSource {
        TableSource::SelfRef(self.inner.name.clone())
    }

    /// The CTE name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The declared column names; empty when taken from the anchor.
    pub fn declared_columns(&self) -> &[String] {
        &self.inner.columns
    }

    /// The anchor query.
    pub fn anchor(&self) -> &Query {
        &self.inner.anchor
    }

    /// The `UNION ALL` member, if any.
    pub fn union(&self) -> Option<&Query> {
        self.inner.union.as_ref()
    }

    /// Returns `true` if the union member reads this CTE.
    pub fn is_recursive(&self) -> bool {
        self.inner.recursive
    }
}
