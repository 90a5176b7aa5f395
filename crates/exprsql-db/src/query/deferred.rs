//! Projections evaluated on the client after fetch.
//!
//! A projected member whose expression has no SQL form (`string.Format`,
//! `ToString` with a numeric format, the `IsNull` extension) is not sent to
//! the database. Instead the statement selects the raw columns the expression
//! reads, each under a hidden alias `{Member}_{Column}`, and the caller
//! evaluates the expression per [`Row`] with [`DeferredProjection::evaluate`].

use exprsql_core::{SqlError, SqlResult};

use super::eval::{evaluate_with, Bindings};
use super::expr::Expr;
use crate::value::Value;

/// A fetched row: column names and their values.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row from column names and values.
    ///
    /// # Panics
    ///
    /// Panics if the number of columns does not match the number of values.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "Row column count must match value count"
        );
        Self { columns, values }
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Gets a value by column name.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::InvalidExpression`] if the column does not exist.
    pub fn get(&self, column: &str) -> SqlResult<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
            .ok_or_else(|| SqlError::InvalidExpression(format!("Column '{column}' not found in row")))
    }
}

/// One hidden column feeding a deferred projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredColumn {
    /// The lambda parameter the member was read through.
    pub param: String,
    /// The member read.
    pub member: String,
    /// The hidden select alias.
    pub column: String,
}

/// A projected member computed after fetch.
#[derive(Debug, Clone)]
pub struct DeferredProjection {
    alias: String,
    expr: Expr,
    columns: Vec<DeferredColumn>,
}

impl DeferredProjection {
    pub(crate) fn new(alias: impl Into<String>, expr: Expr, columns: Vec<DeferredColumn>) -> Self {
        Self {
            alias: alias.into(),
            expr,
            columns,
        }
    }

    /// The member name the result is exposed as.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The hidden columns the expression reads.
    pub fn columns(&self) -> &[DeferredColumn] {
        &self.columns
    }

    /// Evaluates the projection against a fetched row.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::InvalidExpression`] if a hidden column is missing
    /// from the row or the expression cannot be evaluated on its values.
    pub fn evaluate(&self, row: &Row) -> SqlResult<Value> {
        let mut bindings = Bindings::new();
        for column in &self.columns {
            bindings.insert(
                (column.param.clone(), column.member.clone()),
                row.get(&column.column)?.clone(),
            );
        }
        evaluate_with(&self.expr, &bindings).ok_or_else(|| {
            SqlError::InvalidExpression(format!(
                "Projection '{}' could not be evaluated on the fetched row",
                self.alias
            ))
        })
    }
}

/// The `(param, member)` pairs an expression reads, in first-use order.
pub(crate) fn referenced_members(expr: &Expr) -> Vec<(String, String)> {
    fn visit(expr: &Expr, out: &mut Vec<(String, String)>) {
        match expr {
            Expr::Member { target, member } => {
                if let Expr::Param(param) = target.as_ref() {
                    let pair = (param.clone(), member.clone());
                    if !out.contains(&pair) {
                        out.push(pair);
                    }
                } else {
                    visit(target, out);
                }
            }
            Expr::Call { target, args, .. } => {
                if let Some(target) = target {
                    visit(target, out);
                }
                for arg in args {
                    visit(arg, out);
                }
            }
            Expr::Binary { left, right, .. } => {
                visit(left, out);
                visit(right, out);
            }
            Expr::Unary { operand, .. } | Expr::Convert { operand, .. } => visit(operand, out),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => {
                visit(test, out);
                visit(if_true, out);
                visit(if_false, out);
            }
            Expr::New(members) => members.iter().for_each(|(_, e)| visit(e, out)),
            Expr::NewArray(items) => items.iter().for_each(|e| visit(e, out)),
            Expr::Lambda { body, .. } => visit(body, out),
            Expr::Param(_)
            | Expr::Static { .. }
            | Expr::Constant(_)
            | Expr::Captured { .. }
            | Expr::Query(_) => {}
        }
    }

    let mut out = Vec::new();
    visit(expr, &mut out);
    out
}
