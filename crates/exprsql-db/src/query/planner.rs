//! Statement planning.
//!
//! A [`Planner`] turns a [`Query`] into a [`SelectPlan`]: it resolves table
//! sources, assigns aliases, binds lambda parameters, and lowers every clause
//! through the walker. CTEs met on the way are planned once and collected in
//! dependency order. Plans hold IR only; no SQL text and no parameters exist
//! until the writer renders them.
//!
//! Aliases run `a`, `b`, `c`, ... in declaration order. Predicate subqueries
//! continue the sequence of the enclosing statement; derived tables and CTE
//! bodies start over.

use std::collections::HashMap;
use std::sync::Arc;

use exprsql_core::{SqlError, SqlResult};

use super::compiler::SqlCompiler;
use super::cte::CteTable;
use super::deferred::{referenced_members, DeferredColumn, DeferredProjection};
use super::expr::Expr;
use super::ir::SqlNode;
use super::queryset::{JoinKind, Projection, Query, TableSource};
use crate::model::EntityMap;
use crate::value::HostType;

/// One column of a plan's output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    /// The member name the column is read back as.
    pub name: String,
    /// Its host type.
    pub ty: HostType,
}

/// One entry of a select list.
#[derive(Debug, Clone)]
pub struct SelectItem {
    /// The selected expression.
    pub node: SqlNode,
    /// `AS` alias, when the member name differs from the column.
    pub alias: Option<String>,
}

/// The rows a [`TableRef`] reads.
#[derive(Debug, Clone)]
pub enum TableSourcePlan {
    /// A table or CTE name.
    Named {
        /// Table name.
        name: String,
        /// Optional schema.
        schema: Option<String>,
    },
    /// A derived table.
    Derived(Box<SelectPlan>),
}

/// A table in a `FROM` or `JOIN` clause.
#[derive(Debug, Clone)]
pub struct TableRef {
    /// The rows.
    pub source: TableSourcePlan,
    /// Alias; omitted for single-table UPDATE and DELETE.
    pub alias: Option<String>,
}

/// A planned join.
#[derive(Debug, Clone)]
pub struct JoinPlan {
    /// Join flavour.
    pub kind: JoinKind,
    /// The joined table.
    pub table: TableRef,
    /// The `ON` predicate.
    pub on: SqlNode,
}

/// A planned SELECT.
#[derive(Debug, Clone)]
pub struct SelectPlan {
    /// `SELECT DISTINCT`.
    pub distinct: bool,
    /// The select list.
    pub columns: Vec<SelectItem>,
    /// The first table.
    pub from: TableRef,
    /// Joins in declaration order.
    pub joins: Vec<JoinPlan>,
    /// `WHERE`.
    pub where_: Option<SqlNode>,
    /// `GROUP BY`.
    pub group_by: Vec<SqlNode>,
    /// `HAVING`.
    pub having: Option<SqlNode>,
    /// `ORDER BY` keys with a descending flag.
    pub order_by: Vec<(SqlNode, bool)>,
    /// `LIMIT`.
    pub limit: Option<usize>,
    /// `OFFSET`.
    pub offset: Option<usize>,
    /// Output columns as seen by an enclosing query.
    pub shape: Vec<OutputColumn>,
    /// Projections evaluated after fetch.
    pub deferred: Vec<DeferredProjection>,
}

/// A planned CTE.
#[derive(Debug, Clone)]
pub struct CtePlan {
    /// CTE name.
    pub name: String,
    /// Column names.
    pub columns: Vec<String>,
    /// The anchor member.
    pub anchor: SelectPlan,
    /// The `UNION ALL` member.
    pub union: Option<SelectPlan>,
    /// Whether the union member reads the CTE itself.
    pub self_referential: bool,
}

/// What the columns of a bound table are.
#[derive(Debug, Clone)]
pub(crate) enum Shape {
    Entity(Arc<EntityMap>),
    Derived(Vec<OutputColumn>),
}

/// A lambda parameter bound to a table.
#[derive(Debug, Clone)]
pub(crate) struct TableBinding {
    pub(crate) name: String,
    pub(crate) alias: Option<String>,
    pub(crate) shape: Shape,
}

impl TableBinding {
    /// The column node of a member.
    pub(crate) fn column(&self, member: &str) -> SqlResult<SqlNode> {
        match &self.shape {
            Shape::Entity(map) => {
                let field = map.require_field(member)?;
                Ok(SqlNode::Column {
                    alias: self.alias.clone(),
                    column: field.column.clone(),
                    ty: field.host_type.clone(),
                })
            }
            Shape::Derived(columns) => columns
                .iter()
                .find(|c| c.name == member)
                .map(|c| SqlNode::Column {
                    alias: self.alias.clone(),
                    column: c.name.clone(),
                    ty: c.ty.clone(),
                })
                .ok_or_else(|| SqlError::UnknownMember {
                    entity: self.name.clone(),
                    member: member.to_string(),
                }),
        }
    }

    /// Every column with the member name it is read back as.
    pub(crate) fn all_columns(&self) -> Vec<(String, SqlNode)> {
        match &self.shape {
            Shape::Entity(map) => map
                .mapped_fields()
                .map(|f| {
                    (
                        f.member.clone(),
                        SqlNode::Column {
                            alias: self.alias.clone(),
                            column: f.column.clone(),
                            ty: f.host_type.clone(),
                        },
                    )
                })
                .collect(),
            Shape::Derived(columns) => columns
                .iter()
                .map(|c| {
                    (
                        c.name.clone(),
                        SqlNode::Column {
                            alias: self.alias.clone(),
                            column: c.name.clone(),
                            ty: c.ty.clone(),
                        },
                    )
                })
                .collect(),
        }
    }
}

/// The grouping a grouped query's select and having lambdas bind to.
#[derive(Debug)]
pub(crate) struct GroupingBinding {
    pub(crate) keys: Vec<(String, SqlNode)>,
    pub(crate) elements: Vec<TableBinding>,
}

impl GroupingBinding {
    /// `x.Grouping`: the single key.
    pub(crate) fn single_key(&self) -> SqlResult<SqlNode> {
        match self.keys.as_slice() {
            [(_, node)] => Ok(node.clone()),
            _ => Err(SqlError::InvalidExpression(
                "A composite grouping key can only be projected, not used as a value".to_string(),
            )),
        }
    }

    /// `x.Grouping.M`: one key member.
    pub(crate) fn key_member(&self, member: &str) -> SqlResult<SqlNode> {
        self.keys
            .iter()
            .find(|(name, _)| name == member)
            .map(|(_, node)| node.clone())
            .ok_or_else(|| SqlError::UnknownMember {
                entity: "IGrouping".to_string(),
                member: member.to_string(),
            })
    }
}

/// A lambda parameter binding.
#[derive(Debug, Clone)]
pub(crate) enum Binding {
    Table(TableBinding),
    Grouping(Arc<GroupingBinding>),
}

/// The select list, output shape and deferred projections of a query.
#[derive(Debug, Default)]
struct Projected {
    items: Vec<SelectItem>,
    shape: Vec<OutputColumn>,
    deferred: Vec<DeferredProjection>,
}

impl Projected {
    fn push(&mut self, name: &str, node: SqlNode, replace: bool) {
        let alias = match &node {
            SqlNode::Column { column, .. } if column == name => None,
            _ => Some(name.to_string()),
        };
        let output = OutputColumn {
            name: name.to_string(),
            ty: node.ty(),
        };
        let item = SelectItem { node, alias };
        match self.shape.iter().position(|c| c.name == name) {
            Some(i) if replace => {
                self.items[i] = item;
                self.shape[i] = output;
            }
            _ => {
                self.items.push(item);
                self.shape.push(output);
            }
        }
    }

    fn push_scalar(&mut self, node: SqlNode) {
        let name = match &node {
            SqlNode::Column { column, .. } => column.clone(),
            _ => "Value".to_string(),
        };
        self.shape.push(OutputColumn {
            name,
            ty: node.ty(),
        });
        self.items.push(SelectItem { node, alias: None });
    }
}

#[derive(Debug)]
struct SelfRef {
    name: String,
    shape: Vec<OutputColumn>,
    referenced: bool,
}

/// Plans one statement. Lives for a single compilation.
pub(crate) struct Planner<'c> {
    pub(crate) compiler: &'c SqlCompiler,
    scopes: Vec<HashMap<String, Binding>>,
    ctes: Vec<CtePlan>,
    ctes_in_progress: Vec<String>,
    self_refs: Vec<SelfRef>,
    alias_index: u32,
    pub(crate) in_projection: bool,
    pub(crate) deferred_hit: bool,
}

impl<'c> Planner<'c> {
    pub(crate) fn new(compiler: &'c SqlCompiler) -> Self {
        Self {
            compiler,
            scopes: Vec::new(),
            ctes: Vec::new(),
            ctes_in_progress: Vec::new(),
            self_refs: Vec::new(),
            alias_index: 0,
            in_projection: false,
            deferred_hit: false,
        }
    }

    /// The CTEs collected so far, dependencies first.
    pub(crate) fn take_ctes(&mut self) -> Vec<CtePlan> {
        std::mem::take(&mut self.ctes)
    }

    // ── Aliases ─────────────────────────────────────────────────────────

    pub(crate) fn next_alias(&mut self) -> String {
        let index = self.alias_index;
        self.alias_index += 1;
        let first = u32::from(self.compiler.options().first_table_alias);
        match char::from_u32(first + index) {
            Some(c) if c.is_ascii_alphabetic() => c.to_string(),
            _ => format!("t{index}"),
        }
    }

    fn restart_aliases(&mut self) -> u32 {
        std::mem::replace(&mut self.alias_index, 0)
    }

    // ── Scopes ──────────────────────────────────────────────────────────

    pub(crate) fn lookup(&self, name: &str) -> SqlResult<Binding> {
        self.scopes
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
            .cloned()
            .ok_or_else(|| {
                SqlError::AmbiguousColumn(format!("Parameter '{name}' is not bound to any table"))
            })
    }

    /// Binds the parameters of `lambda` positionally to `bindings` and runs
    /// `f` on its body. A non-lambda expression runs with no new bindings.
    pub(crate) fn in_lambda<T>(
        &mut self,
        lambda: &Expr,
        bindings: &[Binding],
        f: impl FnOnce(&mut Self, &Expr) -> SqlResult<T>,
    ) -> SqlResult<T> {
        let (params, body) = lambda.as_lambda().unwrap_or((&[], lambda));
        if let Some(extra) = params.get(bindings.len()) {
            return Err(SqlError::AmbiguousColumn(format!(
                "Lambda parameter '{extra}' matches no table"
            )));
        }
        let frame = params
            .iter()
            .cloned()
            .zip(bindings.iter().cloned())
            .collect();
        self.scopes.push(frame);
        let result = f(self, body);
        self.scopes.pop();
        result
    }

    pub(crate) fn lambda_predicate(&mut self, lambda: &Expr, bindings: &[Binding]) -> SqlResult<SqlNode> {
        self.in_lambda(lambda, bindings, |p, body| p.predicate(body))
    }

    pub(crate) fn lambda_value(&mut self, lambda: &Expr, bindings: &[Binding]) -> SqlResult<SqlNode> {
        self.in_lambda(lambda, bindings, |p, body| p.walk(body))
    }

    // ── Tables ──────────────────────────────────────────────────────────

    /// The binding of a mapped entity under `alias`.
    pub(crate) fn entity_binding(&self, entity: &str, alias: Option<String>) -> SqlResult<TableBinding> {
        let map = self.compiler.models().entity(entity)?;
        Ok(TableBinding {
            name: entity.to_string(),
            alias,
            shape: Shape::Entity(map),
        })
    }

    pub(crate) fn resolve_source(
        &mut self,
        source: &TableSource,
        alias_override: Option<&str>,
    ) -> SqlResult<(TableRef, TableBinding)> {
        let (source, name, shape) = match source {
            TableSource::Entity(entity) => {
                let map = self.compiler.models().entity(entity)?;
                (
                    TableSourcePlan::Named {
                        name: map.table.clone(),
                        schema: map.schema.clone(),
                    },
                    entity.clone(),
                    Shape::Entity(map),
                )
            }
            TableSource::Derived(query) => {
                let plan = self.plan_derived(query)?;
                let shape = Shape::Derived(plan.shape.clone());
                let name = query.entity_name().unwrap_or("<derived>").to_string();
                (TableSourcePlan::Derived(Box::new(plan)), name, shape)
            }
            TableSource::Cte(cte) => {
                let shape = match self.self_ref_shape(cte.name()) {
                    Some(shape) => shape,
                    None => self.ensure_cte(cte)?,
                };
                (
                    TableSourcePlan::Named {
                        name: cte.name().to_string(),
                        schema: None,
                    },
                    cte.name().to_string(),
                    Shape::Derived(shape),
                )
            }
            TableSource::SelfRef(name) => {
                let shape = self.self_ref_shape(name).ok_or_else(|| {
                    SqlError::InvalidExpression(format!(
                        "CTE '{name}' is referenced outside its recursive member"
                    ))
                })?;
                (
                    TableSourcePlan::Named {
                        name: name.clone(),
                        schema: None,
                    },
                    name.clone(),
                    Shape::Derived(shape),
                )
            }
        };
        let generated = self.next_alias();
        let alias = alias_override.map_or(generated, str::to_string);
        let binding = TableBinding {
            name,
            alias: Some(alias.clone()),
            shape,
        };
        Ok((
            TableRef {
                source,
                alias: Some(alias),
            },
            binding,
        ))
    }

    fn self_ref_shape(&mut self, name: &str) -> Option<Vec<OutputColumn>> {
        let entry = self.self_refs.iter_mut().rev().find(|s| s.name == name)?;
        entry.referenced = true;
        Some(entry.shape.clone())
    }

    fn ensure_cte(&mut self, cte: &CteTable) -> SqlResult<Vec<OutputColumn>> {
        if let Some(done) = self.ctes.iter().find(|c| c.name == cte.name()) {
            return Ok(cte_shape(&done.columns, &done.anchor.shape));
        }
        if self.ctes_in_progress.iter().any(|n| n == cte.name()) {
            return Err(SqlError::InvalidExpression(format!(
                "CTE '{}' depends on itself; reference it through self_ref()",
                cte.name()
            )));
        }
        tracing::trace!(cte = cte.name(), "planning CTE");
        self.ctes_in_progress.push(cte.name().to_string());
        let saved_alias = self.restart_aliases();
        let saved_projection = std::mem::replace(&mut self.in_projection, false);

        let result = self.plan_cte_body(cte);

        self.alias_index = saved_alias;
        self.in_projection = saved_projection;
        self.ctes_in_progress.pop();

        let plan = result?;
        let shape = cte_shape(&plan.columns, &plan.anchor.shape);
        self.ctes.push(plan);
        Ok(shape)
    }

    fn plan_cte_body(&mut self, cte: &CteTable) -> SqlResult<CtePlan> {
        let anchor = self.plan_query(cte.anchor())?;
        let columns: Vec<String> = if cte.declared_columns().is_empty() {
            anchor.shape.iter().map(|c| c.name.clone()).collect()
        } else {
            cte.declared_columns().to_vec()
        };
        if columns.len() != anchor.shape.len() {
            return Err(SqlError::InvalidExpression(format!(
                "CTE '{}' declares {} columns but its anchor selects {}",
                cte.name(),
                columns.len(),
                anchor.shape.len()
            )));
        }
        let shape = cte_shape(&columns, &anchor.shape);

        let mut self_referential = false;
        let union = match cte.union() {
            Some(query) => {
                self.alias_index = 0;
                self.self_refs.push(SelfRef {
                    name: cte.name().to_string(),
                    shape,
                    referenced: false,
                });
                let planned = self.plan_query(query);
                let entry = self.self_refs.pop();
                self_referential = cte.is_recursive() || entry.is_some_and(|e| e.referenced);
                let planned = planned?;
                if planned.shape.len() != columns.len() {
                    return Err(SqlError::InvalidExpression(format!(
                        "UNION ALL member of CTE '{}' selects {} columns, expected {}",
                        cte.name(),
                        planned.shape.len(),
                        columns.len()
                    )));
                }
                Some(planned)
            }
            None => None,
        };

        Ok(CtePlan {
            name: cte.name().to_string(),
            columns,
            anchor,
            union,
            self_referential,
        })
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Plans a top-level SELECT.
    pub(crate) fn plan_statement(&mut self, query: &Query) -> SqlResult<SelectPlan> {
        self.alias_index = 0;
        self.plan_query(query)
    }

    /// Plans a subquery used in a predicate or as a scalar; aliases continue.
    pub(crate) fn plan_subquery(&mut self, query: &Query) -> SqlResult<SelectPlan> {
        let saved_projection = std::mem::replace(&mut self.in_projection, false);
        let result = self.plan_query(query);
        self.in_projection = saved_projection;
        result
    }

    /// Plans a derived table; aliases start over inside it.
    fn plan_derived(&mut self, query: &Query) -> SqlResult<SelectPlan> {
        let saved_alias = self.restart_aliases();
        let result = self.plan_subquery(query);
        self.alias_index = saved_alias;
        result
    }

    fn plan_query(&mut self, query: &Query) -> SqlResult<SelectPlan> {
        let (from, first) = self.resolve_source(&query.from, query.from_alias.as_deref())?;
        let mut tables = vec![first];
        let mut joins = Vec::with_capacity(query.joins.len());
        for join in &query.joins {
            let (table, binding) = self.resolve_source(&join.source, join.alias.as_deref())?;
            tables.push(binding);
            let scope = table_scope(&tables);
            let on = self.lambda_predicate(&join.on, &scope)?;
            joins.push(JoinPlan {
                kind: join.kind,
                table,
                on,
            });
        }
        let scope = table_scope(&tables);

        let mut filters = Vec::with_capacity(query.filters.len());
        for filter in &query.filters {
            filters.push(self.lambda_predicate(filter, &scope)?);
        }

        let grouping = match &query.group_by {
            Some(key) => Some(Arc::new(self.group_keys(key, &scope, &tables)?)),
            None => None,
        };
        let group_by: Vec<SqlNode> = grouping
            .as_ref()
            .map(|g| g.keys.iter().map(|(_, n)| n.clone()).collect())
            .unwrap_or_default();
        let outer_scope = match &grouping {
            Some(g) => vec![Binding::Grouping(Arc::clone(g))],
            None => scope.clone(),
        };

        let projected = self.project(query, &tables, &outer_scope, grouping.as_deref())?;

        let mut having = Vec::with_capacity(query.having.len());
        for predicate in &query.having {
            having.push(self.lambda_predicate(predicate, &outer_scope)?);
        }

        let mut order_by = Vec::with_capacity(query.order_by.len());
        for (key, desc) in &query.order_by {
            order_by.push((self.lambda_value(key, &outer_scope)?, *desc));
        }

        Ok(SelectPlan {
            distinct: query.distinct,
            columns: projected.items,
            from,
            joins,
            where_: SqlNode::conjunction(filters),
            group_by,
            having: SqlNode::conjunction(having),
            order_by,
            limit: query.limit,
            offset: query.offset,
            shape: projected.shape,
            deferred: projected.deferred,
        })
    }

    fn group_keys(
        &mut self,
        key: &Expr,
        scope: &[Binding],
        tables: &[TableBinding],
    ) -> SqlResult<GroupingBinding> {
        let keys = self.in_lambda(key, scope, |p, body| match body {
            Expr::New(members) => members
                .iter()
                .map(|(name, e)| Ok((name.clone(), p.walk(e)?)))
                .collect::<SqlResult<Vec<_>>>(),
            Expr::Member { member, .. } => Ok(vec![(member.clone(), p.walk(body)?)]),
            other => Ok(vec![("Key".to_string(), p.walk(other)?)]),
        })?;
        Ok(GroupingBinding {
            keys,
            elements: tables.to_vec(),
        })
    }

    // ── Projection ──────────────────────────────────────────────────────

    fn project(
        &mut self,
        query: &Query,
        tables: &[TableBinding],
        scope: &[Binding],
        grouping: Option<&GroupingBinding>,
    ) -> SqlResult<Projected> {
        let mut out = Projected::default();
        match &query.projection {
            None => match grouping {
                Some(g) => {
                    for (name, node) in &g.keys {
                        out.push(name, node.clone(), false);
                    }
                }
                None => {
                    for (name, node) in tables[0].all_columns() {
                        out.push(&name, node, false);
                    }
                }
            },
            Some(Projection::Select(lambda)) => {
                self.in_lambda(lambda, scope, |p, body| p.project_body(body, &mut out))?;
            }
            Some(Projection::Flatten(lambda)) => {
                for (name, node) in tables[0].all_columns() {
                    out.push(&name, node, false);
                }
                let table_scope = table_scope(tables);
                self.in_lambda(lambda, &table_scope, |p, body| match body {
                    Expr::New(members) => {
                        for (name, e) in members {
                            p.project_member(name, e, &mut out, true)?;
                        }
                        Ok(())
                    }
                    _ => Err(SqlError::InvalidExpression(
                        "A flatten projection must return new { ... }".to_string(),
                    )),
                })?;
            }
        }
        Ok(out)
    }

    fn grouping_of(&self, expr: &Expr) -> Option<Arc<GroupingBinding>> {
        let param = match expr {
            Expr::Param(p) => p,
            Expr::Member { target, member } if member == "Grouping" || member == "Key" => {
                match target.as_ref() {
                    Expr::Param(p) => p,
                    _ => return None,
                }
            }
            _ => return None,
        };
        match self.lookup(param) {
            Ok(Binding::Grouping(g)) => Some(g),
            _ => None,
        }
    }

    fn project_body(&mut self, body: &Expr, out: &mut Projected) -> SqlResult<()> {
        if let Some(g) = self.grouping_of(body) {
            for (name, node) in &g.keys {
                out.push(name, node.clone(), false);
            }
            return Ok(());
        }
        match body {
            Expr::New(members) => {
                for (name, e) in members {
                    match self.grouping_of(e) {
                        Some(g) if g.keys.len() > 1 => {
                            for (key, node) in &g.keys {
                                out.push(key, node.clone(), false);
                            }
                        }
                        _ => self.project_member(name, e, out, false)?,
                    }
                }
                Ok(())
            }
            Expr::Param(p) => match self.lookup(p)? {
                Binding::Table(t) => {
                    for (name, node) in t.all_columns() {
                        out.push(&name, node, false);
                    }
                    Ok(())
                }
                Binding::Grouping(_) => unreachable_grouping(),
            },
            scalar => {
                let name = match scalar {
                    Expr::Member { member, .. } => member.clone(),
                    _ => "Value".to_string(),
                };
                match self.walk_projected(scalar)? {
                    Some(node) => out.push_scalar(node),
                    None => self.defer(&name, scalar, out)?,
                }
                Ok(())
            }
        }
    }

    fn project_member(
        &mut self,
        name: &str,
        expr: &Expr,
        out: &mut Projected,
        replace: bool,
    ) -> SqlResult<()> {
        match self.walk_projected(expr)? {
            Some(node) => out.push(name, node, replace),
            None => self.defer(name, expr, out)?,
        }
        Ok(())
    }

    /// Walks a projected expression; `None` when it must be evaluated after
    /// fetch instead.
    fn walk_projected(&mut self, expr: &Expr) -> SqlResult<Option<SqlNode>> {
        let saved_alias = self.alias_index;
        self.in_projection = true;
        self.deferred_hit = false;
        let result = self.walk(expr);
        self.in_projection = false;
        if std::mem::take(&mut self.deferred_hit) {
            self.alias_index = saved_alias;
            return Ok(None);
        }
        result.map(Some)
    }

    fn defer(&mut self, name: &str, expr: &Expr, out: &mut Projected) -> SqlResult<()> {
        tracing::debug!(member = name, "projection deferred to the client");
        let mut columns = Vec::new();
        for (param, member) in referenced_members(expr) {
            let node = match self.lookup(&param)? {
                Binding::Table(t) => t.column(&member)?,
                Binding::Grouping(g) => g.key_member(&member)?,
            };
            let column = format!("{name}_{member}");
            out.items.push(SelectItem {
                node,
                alias: Some(column.clone()),
            });
            columns.push(DeferredColumn {
                param,
                member,
                column,
            });
        }
        out.deferred
            .push(DeferredProjection::new(name, expr.clone(), columns));
        Ok(())
    }
}

fn unreachable_grouping() -> SqlResult<()> {
    Err(SqlError::InvalidExpression(
        "Grouping parameter cannot be projected directly".to_string(),
    ))
}

pub(crate) fn table_scope(tables: &[TableBinding]) -> Vec<Binding> {
    tables.iter().cloned().map(Binding::Table).collect()
}

fn cte_shape(columns: &[String], anchor: &[OutputColumn]) -> Vec<OutputColumn> {
    columns
        .iter()
        .zip(anchor)
        .map(|(name, c)| OutputColumn {
            name: name.clone(),
            ty: c.ty.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldDef;
    use crate::model::ModelRegistry;
    use crate::query::expr::{constant, lambda, new_object, null, param, static_call};

    fn compiler() -> SqlCompiler {
        let models = ModelRegistry::new()
            .with(
                EntityMap::new("Order")
                    .table("sys_order")
                    .field(FieldDef::new("Id", HostType::Int32).primary_key())
                    .field(FieldDef::new("BuyerId", HostType::Int32))
                    .field(FieldDef::new("Total", HostType::Decimal)),
            )
            .with(
                EntityMap::new("User")
                    .field(FieldDef::new("Id", HostType::Int32).primary_key())
                    .field(FieldDef::new("Name", HostType::String))
                    .field(FieldDef::new("ParentId", HostType::Int32).nullable()),
            );
        SqlCompiler::mysql(Arc::new(models))
    }

    fn alias(table: &TableRef) -> Option<&str> {
        table.alias.as_deref()
    }

    fn shape_names(plan: &SelectPlan) -> Vec<&str> {
        plan.shape.iter().map(|c| c.name.as_str()).collect()
    }

    fn buyer_join() -> Expr {
        lambda(
            ["o", "u"],
            param("o").member("BuyerId").eq(param("u").member("Id")),
        )
    }

    #[test]
    fn test_default_projection_is_every_mapped_column() {
        let c = compiler();
        let plan = Planner::new(&c)
            .plan_statement(&Query::from("Order"))
            .unwrap();
        assert_eq!(shape_names(&plan), vec!["Id", "BuyerId", "Total"]);
        assert!(plan.columns.iter().all(|item| item.alias.is_none()));
        assert_eq!(alias(&plan.from), Some("a"));
        assert!(matches!(
            &plan.from.source,
            TableSourcePlan::Named { name, schema: None } if name == "sys_order"
        ));
    }

    #[test]
    fn test_join_aliases_follow_declaration_order() {
        let c = compiler();
        let plan = Planner::new(&c)
            .plan_statement(&Query::from("Order").left_join("User", buyer_join()))
            .unwrap();
        assert_eq!(alias(&plan.from), Some("a"));
        assert_eq!(alias(&plan.joins[0].table), Some("b"));
        assert_eq!(plan.joins[0].kind, JoinKind::Left);
    }

    #[test]
    fn test_alias_override() {
        let c = compiler();
        let plan = Planner::new(&c)
            .plan_statement(&Query::from("Order").alias("o"))
            .unwrap();
        assert_eq!(alias(&plan.from), Some("o"));
    }

    #[test]
    fn test_derived_table_restarts_aliases() {
        let c = compiler();
        let query = Query::from(Query::from("Order")).inner_join("User", buyer_join());
        let plan = Planner::new(&c).plan_statement(&query).unwrap();
        let TableSourcePlan::Derived(inner) = &plan.from.source else {
            panic!("expected a derived table");
        };
        assert_eq!(alias(&inner.from), Some("a"));
        assert_eq!(alias(&plan.from), Some("a"));
        assert_eq!(alias(&plan.joins[0].table), Some("b"));
        assert_eq!(shape_names(&plan), vec!["Id", "BuyerId", "Total"]);
    }

    #[test]
    fn test_subquery_continues_aliases() {
        let c = compiler();
        let mut planner = Planner::new(&c);
        assert_eq!(planner.next_alias(), "a");
        assert_eq!(planner.next_alias(), "b");
        let sub = planner.plan_subquery(&Query::from("User")).unwrap();
        assert_eq!(alias(&sub.from), Some("c"));
    }

    #[test]
    fn test_ctes_are_planned_once_dependencies_first() {
        let c = compiler();
        let big = CteTable::new(
            "BigOrders",
            Query::from("Order").where_(lambda(["o"], param("o").member("Total").gt(constant(100)))),
        );
        let buyers = CteTable::new(
            "BigBuyers",
            Query::from(&big).select(lambda(["b"], param("b").member("BuyerId"))),
        );
        let query = Query::from(&buyers).inner_join(
            &big,
            lambda(
                ["x", "y"],
                param("x").member("BuyerId").eq(param("y").member("BuyerId")),
            ),
        );
        let mut planner = Planner::new(&c);
        let plan = planner.plan_statement(&query).unwrap();
        let ctes = planner.take_ctes();
        let names: Vec<&str> = ctes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["BigOrders", "BigBuyers"]);
        assert!(ctes.iter().all(|c| !c.self_referential));
        assert_eq!(ctes[1].columns, vec!["BuyerId"]);
        assert_eq!(alias(&ctes[1].anchor.from), Some("a"));
        assert_eq!(alias(&plan.joins[0].table), Some("b"));
    }

    #[test]
    fn test_self_reference_marks_cte_recursive() {
        let c = compiler();
        let roots = Query::from("User")
            .where_(lambda(["u"], param("u").member("ParentId").eq(null())));
        let tree = CteTable::new("Tree", roots);
        let children = Query::from("User")
            .inner_join(
                tree.self_ref(),
                lambda(
                    ["u", "t"],
                    param("u").member("ParentId").eq(param("t").member("Id")),
                ),
            )
            .select(lambda(
                ["u", "t"],
                new_object([
                    ("Id", param("u").member("Id")),
                    ("Name", param("u").member("Name")),
                    ("ParentId", param("u").member("ParentId")),
                ]),
            ));
        let tree = tree.union_all(children);

        let mut planner = Planner::new(&c);
        planner.plan_statement(&Query::from(&tree)).unwrap();
        let ctes = planner.take_ctes();
        assert_eq!(ctes.len(), 1);
        assert!(ctes[0].self_referential);
        assert!(ctes[0].union.is_some());
    }

    #[test]
    fn test_self_ref_outside_its_cte_is_rejected() {
        let c = compiler();
        let tree = CteTable::new("Tree", Query::from("User"));
        let err = Planner::new(&c)
            .plan_statement(&Query::from(tree.self_ref()))
            .unwrap_err();
        assert!(matches!(err, SqlError::InvalidExpression(_)));
    }

    #[test]
    fn test_flatten_replaces_same_named_member_in_place() {
        let c = compiler();
        let query = Query::from("User").select_flatten(lambda(
            ["u"],
            new_object([
                ("Name", param("u").member("Name").call("ToUpper", vec![])),
                ("Label", param("u").member("Name").call("Trim", vec![])),
            ]),
        ));
        let plan = Planner::new(&c).plan_statement(&query).unwrap();
        assert_eq!(shape_names(&plan), vec!["Id", "Name", "ParentId", "Label"]);
        let aliases: Vec<Option<&str>> =
            plan.columns.iter().map(|i| i.alias.as_deref()).collect();
        assert_eq!(aliases, vec![None, Some("Name"), None, Some("Label")]);
    }

    #[test]
    fn test_deferred_projection_adds_hidden_columns() {
        let c = compiler();
        let query = Query::from("User").select(lambda(
            ["u"],
            new_object([
                ("Id", param("u").member("Id")),
                (
                    "Text",
                    static_call(
                        "String",
                        "Format",
                        vec![constant("{0}"), param("u").member("Name")],
                    ),
                ),
            ]),
        ));
        let plan = Planner::new(&c).plan_statement(&query).unwrap();
        assert_eq!(plan.deferred.len(), 1);
        let aliases: Vec<Option<&str>> =
            plan.columns.iter().map(|i| i.alias.as_deref()).collect();
        assert_eq!(aliases, vec![None, Some("Text_Name")]);
    }

    #[test]
    fn test_extra_lambda_parameter_is_ambiguous() {
        let c = compiler();
        let query = Query::from("User").where_(lambda(
            ["u", "o"],
            param("o").member("Id").eq(constant(1)),
        ));
        let err = Planner::new(&c).plan_statement(&query).unwrap_err();
        assert!(matches!(err, SqlError::AmbiguousColumn(_)));
    }

    #[test]
    fn test_grouping_keys_become_group_by() {
        let c = compiler();
        let query = Query::from("Order")
            .group_by(lambda(["o"], param("o").member("BuyerId")))
            .select(lambda(
                ["g"],
                new_object([
                    ("BuyerId", param("g").member("Grouping")),
                    ("Orders", param("g").call("Count", vec![])),
                ]),
            ));
        let plan = Planner::new(&c).plan_statement(&query).unwrap();
        assert_eq!(plan.group_by.len(), 1);
        assert_eq!(shape_names(&plan), vec!["BuyerId", "Orders"]);
        assert_eq!(plan.shape[1].ty, HostType::Int32);
    }
}
