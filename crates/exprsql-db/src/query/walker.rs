//! Lowering of expression trees to IR.
//!
//! Every sub-expression is first classified by origin. Sub-trees that touch
//! no lambda parameter are evaluated on the host: compile-time constants
//! become inline literals and captured values become parameters. Everything
//! else is lowered structurally through the translation table.

use exprsql_core::{EmptyInPolicy, SqlError, SqlResult};

use super::coerce::{comparable, constant_node, variable_node};
use super::dialect::{AggregateFunc, CastTarget, IntervalUnit, SqlDialect, SqlFunc};
use super::eval::evaluate;
use super::expr::{BinaryOp, Expr, UnaryOp};
use super::ir::{SqlNode, SqlOp, SqlUnaryOp};
use super::planner::{Binding, GroupingBinding, Planner, SelectItem};
use super::queryset::Query;
use super::translate::{ReturnType, StaticMember, Translation, TranslationTable, TypeKey};
use crate::value::{HostType, Value};

/// Where the value of a sub-expression comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Origin {
    /// Literals and constant statics.
    Constant,
    /// Closure-captured values.
    Runtime,
    /// Anything reading a column or evaluated by the database.
    Sql,
}

impl<'c> Planner<'c> {
    fn dialect(&self) -> &'c dyn SqlDialect {
        self.compiler.dialect()
    }

    fn translations(&self) -> &'c TranslationTable {
        self.compiler.translations()
    }

    /// Lowers a value expression.
    pub(crate) fn walk(&mut self, expr: &Expr) -> SqlResult<SqlNode> {
        let origin = self.origin(expr);
        if origin != Origin::Sql && self.foldable(expr) {
            if let Some(value) = evaluate(expr) {
                return self.value_node(&value, origin);
            }
        }
        self.lower(expr)
    }

    /// Lowers a boolean expression into a predicate.
    pub(crate) fn predicate(&mut self, expr: &Expr) -> SqlResult<SqlNode> {
        Ok(to_predicate(self.walk(expr)?))
    }

    /// Lowers the right-hand side of a `SET`. A bare host value binds as a
    /// positional parameter even when it is a compile-time constant; `null`
    /// stays `NULL`.
    pub(crate) fn assigned_value(&mut self, expr: &Expr) -> SqlResult<SqlNode> {
        let bare = matches!(
            strip_convert(expr),
            Expr::Constant(_) | Expr::Captured { .. } | Expr::Static { .. }
        );
        if bare && self.origin(expr) != Origin::Sql {
            if let Some(value) = evaluate(expr) {
                return Ok(if value.is_null() {
                    SqlNode::Null
                } else {
                    variable_node(&value)
                });
            }
        }
        self.walk(expr)
    }

    fn origin(&self, expr: &Expr) -> Origin {
        match expr {
            Expr::Constant(_) => Origin::Constant,
            Expr::Captured { .. } => Origin::Runtime,
            Expr::Param(_) | Expr::Lambda { .. } | Expr::Query(_) => Origin::Sql,
            Expr::Static { type_name, member } => match TypeKey::from_type_name(type_name)
                .and_then(|key| self.translations().lookup_static(key, member))
            {
                Some(StaticMember::Function { .. }) => Origin::Sql,
                _ => Origin::Constant,
            },
            Expr::Member { target: inner, .. }
            | Expr::Unary { operand: inner, .. }
            | Expr::Convert { operand: inner, .. } => self.origin(inner),
            Expr::Call {
                target,
                type_name,
                args,
                ..
            } => {
                if type_name.as_deref() == Some("Sql") {
                    return Origin::Sql;
                }
                target
                    .iter()
                    .map(|t| self.origin(t))
                    .chain(args.iter().map(|a| self.origin(a)))
                    .max()
                    .unwrap_or(Origin::Constant)
            }
            Expr::Binary { left, right, .. } => self.origin(left).max(self.origin(right)),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => self
                .origin(test)
                .max(self.origin(if_true))
                .max(self.origin(if_false)),
            Expr::New(members) => members
                .iter()
                .map(|(_, e)| self.origin(e))
                .max()
                .unwrap_or(Origin::Constant),
            Expr::NewArray(items) => items
                .iter()
                .map(|e| self.origin(e))
                .max()
                .unwrap_or(Origin::Constant),
        }
    }

    fn foldable(&self, expr: &Expr) -> bool {
        self.compiler.options().fold_constant_calls || !contains_call(expr)
    }

    fn value_node(&self, value: &Value, origin: Origin) -> SqlResult<SqlNode> {
        match (origin, value) {
            (_, Value::List(_) | Value::Record(_)) => Err(SqlError::InvalidExpression(format!(
                "'{value}' cannot be used as a scalar value"
            ))),
            (Origin::Constant, _) => constant_node(value, self.dialect()),
            _ => Ok(variable_node(value)),
        }
    }

    fn lower(&mut self, expr: &Expr) -> SqlResult<SqlNode> {
        match expr {
            Expr::Constant(value) => self.value_node(value, Origin::Constant),
            Expr::Captured { value, .. } => self.value_node(value, Origin::Runtime),
            Expr::Param(name) => match self.lookup(name)? {
                Binding::Grouping(g) => g.single_key(),
                Binding::Table(t) => Err(SqlError::InvalidExpression(format!(
                    "Parameter '{name}' is a whole '{}' row and cannot be used as a value",
                    t.name
                ))),
            },
            Expr::Member { target, member } => self.lower_member(target, member),
            Expr::Static { type_name, member } => self.lower_static(type_name, member),
            Expr::Call {
                target,
                type_name,
                method,
                args,
            } => self.lower_call(target.as_deref(), type_name.as_deref(), method, args),
            Expr::Binary { op, left, right } => self.lower_binary(*op, left, right),
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => Ok(negate(self.predicate(operand)?)),
            Expr::Unary {
                op: UnaryOp::Negate,
                operand,
            } => {
                let node = self.walk(operand)?;
                let ty = node.ty();
                Ok(SqlNode::Unary {
                    op: SqlUnaryOp::Negate,
                    operand: Box::new(node),
                    ty,
                })
            }
            Expr::Conditional { .. } => self.lower_conditional(expr),
            Expr::Convert { operand, to } => Ok(retype(self.walk(operand)?, to)),
            Expr::Query(query) => {
                let plan = self.plan_subquery(query)?;
                let ty = plan.shape.first().map_or(HostType::Unknown, |c| c.ty.clone());
                Ok(SqlNode::Subquery {
                    query: Box::new(plan),
                    ty,
                })
            }
            Expr::New(_) | Expr::NewArray(_) => Err(SqlError::InvalidExpression(
                "Object and array construction is only valid in a projection or membership test"
                    .to_string(),
            )),
            Expr::Lambda { .. } => Err(SqlError::InvalidExpression(
                "A lambda cannot be used as a value".to_string(),
            )),
        }
    }

    // ── Members ─────────────────────────────────────────────────────────

    fn lower_member(&mut self, target: &Expr, member: &str) -> SqlResult<SqlNode> {
        if let Expr::Param(name) = target {
            return match self.lookup(name)? {
                Binding::Table(t) => t.column(member),
                Binding::Grouping(g) => match member {
                    "Grouping" | "Key" => g.single_key(),
                    other => g.key_member(other),
                },
            };
        }
        if let Expr::Member {
            target: inner,
            member: key,
        } = target
        {
            if let (Expr::Param(name), "Grouping" | "Key") = (inner.as_ref(), key.as_str()) {
                if let Binding::Grouping(g) = self.lookup(name)? {
                    if let Ok(node) = g.key_member(member) {
                        return Ok(node);
                    }
                }
            }
        }
        match member {
            "HasValue" => {
                return Ok(SqlNode::IsNull {
                    operand: Box::new(self.walk(target)?),
                    negated: true,
                })
            }
            "Value" => return self.walk(target),
            _ => {}
        }

        let node = self.walk(target)?;
        let ty = node.ty();
        let translation = self
            .translations()
            .lookup_member(TypeKey::for_host_type(&ty), member)
            .ok_or_else(|| SqlError::unsupported(&ty.display_name(), member, 0))?;
        Ok(SqlNode::func(
            translation.func,
            vec![node],
            translation.returns.clone(),
        ))
    }

    fn lower_static(&self, type_name: &str, member: &str) -> SqlResult<SqlNode> {
        let found = TypeKey::from_type_name(type_name)
            .and_then(|key| self.translations().lookup_static(key, member));
        match found {
            Some(StaticMember::Function { func, returns }) => {
                Ok(SqlNode::func(*func, Vec::new(), returns.clone()))
            }
            Some(StaticMember::Value(value)) => constant_node(value, self.dialect()),
            None => Err(SqlError::unsupported(type_name, member, 0)),
        }
    }

    // ── Calls ───────────────────────────────────────────────────────────

    fn lower_call(
        &mut self,
        target: Option<&Expr>,
        type_name: Option<&str>,
        method: &str,
        args: &[Expr],
    ) -> SqlResult<SqlNode> {
        let table = self.translations();
        if let Some(target) = target {
            if method == "Contains" && args.len() == 1 && self.is_collection(target) {
                return self.membership(target, &args[0], false);
            }
            if let Expr::Param(name) = target {
                if let Binding::Grouping(g) = self.lookup(name)? {
                    return self.grouping_call(&g, method, args);
                }
            }
            let node = self.walk(target)?;
            let declaring = node.ty().display_name();
            let translation = table
                .lookup_method(TypeKey::for_host_type(&node.ty()), method, args.len())
                .ok_or_else(|| SqlError::unsupported(&declaring, method, args.len()))?;
            return self.apply(translation, Some((target, node)), args, &declaring, method);
        }

        let type_name = type_name.ok_or_else(|| {
            SqlError::InvalidExpression(format!(
                "Call to '{method}' has neither a target nor a declaring type"
            ))
        })?;
        let translation = TypeKey::from_type_name(type_name)
            .and_then(|key| table.lookup_method(key, method, args.len()))
            .ok_or_else(|| SqlError::unsupported(type_name, method, args.len()))?;
        self.apply(translation, None, args, type_name, method)
    }

    fn operands(&mut self, target: Option<SqlNode>, args: &[Expr]) -> SqlResult<Vec<SqlNode>> {
        let mut operands: Vec<SqlNode> = target.into_iter().collect();
        for arg in args {
            operands.push(self.walk(arg)?);
        }
        Ok(operands)
    }

    #[allow(clippy::too_many_lines)]
    fn apply(
        &mut self,
        translation: &Translation,
        target: Option<(&Expr, SqlNode)>,
        args: &[Expr],
        declaring: &str,
        method: &str,
    ) -> SqlResult<SqlNode> {
        let unsupported = || SqlError::unsupported(declaring, method, args.len());
        let (target_expr, target_node) = match target {
            Some((expr, node)) => (Some(expr), Some(node)),
            None => (None, None),
        };

        match translation {
            Translation::Function { func, returns } => {
                let operands = self.operands(target_node, args)?;
                let ty = match returns {
                    ReturnType::Fixed(ty) => ty.clone(),
                    ReturnType::Operand => operands.first().map_or(HostType::Unknown, SqlNode::ty),
                };
                Ok(SqlNode::func(*func, operands, ty))
            }
            Translation::Concat => {
                let operands = self.operands(target_node, args)?;
                self.concat(operands)
            }
            Translation::Equals => {
                let mut operands = self.operands(target_node, args)?;
                match (operands.pop(), operands.pop(), operands.is_empty()) {
                    (Some(right), Some(left), true) => compare(SqlOp::Eq, left, right),
                    _ => Err(unsupported()),
                }
            }
            Translation::Membership => match (target_expr, args) {
                (Some(collection), [item]) => self.membership(collection, item, false),
                (None, [collection, item]) => self.membership(collection, item, false),
                _ => Err(unsupported()),
            },
            Translation::DateAdd { unit, scale } => match (target_node, args) {
                (Some(node), [amount]) => self.date_add(node, amount, *unit, *scale),
                _ => Err(unsupported()),
            },
            Translation::AddSpan => {
                let node = target_node.ok_or_else(unsupported)?;
                let span = self.walk(args.first().ok_or_else(unsupported)?)?;
                let ty = node.ty();
                Ok(SqlNode::func(SqlFunc::AddTime, vec![node, span], ty))
            }
            Translation::Subtract => {
                let node = target_node.ok_or_else(unsupported)?;
                let other = self.walk(args.first().ok_or_else(unsupported)?)?;
                Ok(subtract(node, other))
            }
            Translation::Substring => {
                let node = target_node.ok_or_else(unsupported)?;
                let start = self.one_based(args.first().ok_or_else(unsupported)?)?;
                let mut operands = vec![node, start];
                let func = match args.get(1) {
                    Some(length) => {
                        operands.push(self.walk(length)?);
                        SqlFunc::SubstringLength
                    }
                    None => SqlFunc::Substring,
                };
                Ok(SqlNode::func(func, operands, HostType::String))
            }
            Translation::Pad(func) => {
                let node = target_node.ok_or_else(unsupported)?;
                let width = self.walk(args.first().ok_or_else(unsupported)?)?;
                let fill = match args.get(1) {
                    Some(fill) => self.walk(fill)?,
                    None => constant_node(&Value::from(" "), self.dialect())?,
                };
                Ok(SqlNode::func(*func, vec![node, width, fill], HostType::String))
            }
            Translation::TrimChars(func) => {
                let node = target_node.ok_or_else(unsupported)?;
                let chars = self.walk(args.first().ok_or_else(unsupported)?)?;
                Ok(SqlNode::func(*func, vec![node, chars], HostType::String))
            }
            Translation::Cast(cast, ty) => {
                let mut operands = self.operands(target_node, args)?;
                if operands.len() != 1 {
                    return Err(unsupported());
                }
                Ok(SqlNode::func(
                    SqlFunc::Cast(*cast),
                    vec![operands.remove(0)],
                    ty.clone(),
                ))
            }
            Translation::ToString => {
                let node = target_node.ok_or_else(unsupported)?;
                self.stringify(node, args, declaring, method)
            }
            Translation::TimeSpanFrom { seconds } => {
                let amount = self.walk(args.first().ok_or_else(unsupported)?)?;
                let amount = if (seconds - 1.0).abs() < f64::EPSILON {
                    amount
                } else {
                    let factor = constant_node(&Value::Float(*seconds), self.dialect())?;
                    SqlNode::binary(SqlOp::Mul, amount, factor, HostType::Double)
                };
                Ok(SqlNode::func(SqlFunc::SecToTime, vec![amount], HostType::TimeSpan))
            }
            Translation::Aggregate(func) => {
                let operands = self.operands(target_node, args)?;
                Ok(aggregate(*func, operands))
            }
            Translation::SqlIn { negated } => match args {
                [item, collection] => self.membership(collection, item, *negated),
                _ => Err(unsupported()),
            },
            Translation::SqlExists { negated } => match args {
                [Expr::Query(query)] => self.exists(query, *negated),
                _ => Err(SqlError::InvalidExpression(format!(
                    "{declaring}.{method} expects a subquery"
                ))),
            },
            Translation::IsNullExtension => {
                if self.in_projection {
                    return Err(self.deferred(declaring, method, args.len()));
                }
                let operands = self.operands(target_node, args)?;
                let ty = operands.first().map_or(HostType::Unknown, SqlNode::ty);
                Ok(SqlNode::func(SqlFunc::IfNull, operands, ty))
            }
            Translation::Round => {
                let operands = self.operands(target_node, args)?;
                let func = if operands.len() == 2 {
                    SqlFunc::RoundDigits
                } else {
                    SqlFunc::Round
                };
                let ty = operands.first().map_or(HostType::Unknown, SqlNode::ty);
                Ok(SqlNode::func(func, operands, ty))
            }
            Translation::Deferred => Err(self.deferred(declaring, method, args.len())),
        }
    }

    /// Marks the current projection as deferred; outside projections the
    /// call has no SQL form at all.
    fn deferred(&mut self, declaring: &str, method: &str, arity: usize) -> SqlError {
        if self.in_projection {
            self.deferred_hit = true;
        }
        SqlError::unsupported(declaring, method, arity)
    }

    fn stringify(
        &mut self,
        node: SqlNode,
        args: &[Expr],
        declaring: &str,
        method: &str,
    ) -> SqlResult<SqlNode> {
        let ty = node.ty();
        match args {
            [] if ty.is_string() => Ok(node),
            [] => Ok(SqlNode::func(
                SqlFunc::Cast(CastTarget::Char),
                vec![node],
                HostType::String,
            )),
            [format] => {
                let format_value = if self.origin(format) == Origin::Sql {
                    None
                } else {
                    evaluate(format)
                };
                if let (HostType::DateTime | HostType::DateOnly, Some(Value::String(format))) =
                    (&ty, format_value)
                {
                    if let Some(converted) = self.dialect().convert_date_format(&format) {
                        let format = constant_node(&Value::String(converted), self.dialect())?;
                        return Ok(SqlNode::func(
                            SqlFunc::DateFormat,
                            vec![node, format],
                            HostType::String,
                        ));
                    }
                }
                Err(self.deferred(declaring, method, 1))
            }
            _ => Err(SqlError::unsupported(declaring, method, args.len())),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn date_add(
        &mut self,
        node: SqlNode,
        amount: &Expr,
        unit: IntervalUnit,
        scale: i64,
    ) -> SqlResult<SqlNode> {
        let ty = node.ty();
        let constant = if self.origin(amount) == Origin::Constant && self.foldable(amount) {
            evaluate(amount)
        } else {
            None
        };
        if let Some(value) = constant {
            let (negative, interval) = match value {
                Value::Int(n) => {
                    let scaled = n.checked_mul(scale).and_then(|v| v.checked_abs().map(|a| (v, a)));
                    let (scaled, magnitude) = scaled.ok_or_else(|| {
                        SqlError::InvalidExpression(format!("Interval {n} x {scale} overflows"))
                    })?;
                    (scaled < 0, SqlNode::int_literal(magnitude))
                }
                other => {
                    let f = other.as_float().ok_or_else(|| {
                        SqlError::TypeMismatch(format!("'{other}' is not a numeric interval"))
                    })? * scale as f64;
                    (f < 0.0, constant_node(&Value::Float(f.abs()), self.dialect())?)
                }
            };
            let func = if negative {
                SqlFunc::DateSub(unit)
            } else {
                SqlFunc::DateAdd(unit)
            };
            return Ok(SqlNode::func(func, vec![node, interval], ty));
        }

        let amount = self.walk(amount)?;
        let amount = if scale == 1 {
            amount
        } else {
            let amount_ty = amount.ty();
            SqlNode::binary(SqlOp::Mul, amount, SqlNode::int_literal(scale), amount_ty)
        };
        Ok(SqlNode::func(SqlFunc::DateAdd(unit), vec![node, amount], ty))
    }

    /// A zero-based host index as a one-based SQL position.
    fn one_based(&mut self, index: &Expr) -> SqlResult<SqlNode> {
        if self.origin(index) == Origin::Constant && self.foldable(index) {
            if let Some(Value::Int(n)) = evaluate(index) {
                let shifted = n.checked_add(1).ok_or_else(|| {
                    SqlError::InvalidExpression(format!("String index {n} is out of range"))
                })?;
                return Ok(SqlNode::int_literal(shifted));
            }
        }
        let node = self.walk(index)?;
        Ok(SqlNode::binary(
            SqlOp::Add,
            node,
            SqlNode::int_literal(1),
            HostType::Int32,
        ))
    }

    fn grouping_call(
        &mut self,
        grouping: &GroupingBinding,
        method: &str,
        args: &[Expr],
    ) -> SqlResult<SqlNode> {
        let Some(Translation::Aggregate(func)) =
            self.translations()
                .lookup_method(TypeKey::Grouping, method, args.len())
        else {
            return Err(SqlError::unsupported(
                TypeKey::Grouping.name(),
                method,
                args.len(),
            ));
        };
        let elements: Vec<Binding> = grouping
            .elements
            .iter()
            .cloned()
            .map(Binding::Table)
            .collect();
        let mut operands = Vec::with_capacity(1);
        if let Some(selector) = args.first() {
            operands.push(self.lambda_value(selector, &elements)?);
        }
        Ok(aggregate(*func, operands))
    }

    // ── Membership and subqueries ───────────────────────────────────────

    fn is_collection(&self, expr: &Expr) -> bool {
        match expr {
            Expr::NewArray(_) | Expr::Query(_) => true,
            Expr::Constant(value) | Expr::Captured { value, .. } => matches!(value, Value::List(_)),
            Expr::Convert { operand, .. } => self.is_collection(operand),
            other => {
                self.origin(other) != Origin::Sql && matches!(evaluate(other), Some(Value::List(_)))
            }
        }
    }

    fn membership(&mut self, collection: &Expr, item: &Expr, negated: bool) -> SqlResult<SqlNode> {
        let operand = self.walk(item)?;
        if let Some(query) = as_query(collection) {
            let plan = self.plan_subquery(query)?;
            return Ok(SqlNode::InSubquery {
                operand: Box::new(operand),
                query: Box::new(plan),
                negated,
            });
        }

        let items = match collection {
            Expr::NewArray(elements) => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.walk(element)?);
                }
                items
            }
            other => {
                let origin = self.origin(other);
                if origin == Origin::Sql {
                    return Err(SqlError::InvalidExpression(
                        "A membership collection must be a constant, a captured value, an array or a subquery"
                            .to_string(),
                    ));
                }
                let value = evaluate(other).ok_or_else(|| {
                    SqlError::InvalidExpression(
                        "Membership collection cannot be evaluated".to_string(),
                    )
                })?;
                let Value::List(values) = value else {
                    return Err(SqlError::TypeMismatch(format!("'{value}' is not a collection")));
                };
                values
                    .iter()
                    .map(|v| self.value_node(v, origin))
                    .collect::<SqlResult<Vec<_>>>()?
            }
        };

        let operand_ty = operand.ty();
        for item in &items {
            comparable(&operand_ty, &item.ty())?;
        }
        if items.is_empty() {
            return self.empty_membership(operand, negated);
        }
        Ok(SqlNode::InList {
            operand: Box::new(operand),
            items,
            negated,
        })
    }

    fn empty_membership(&self, operand: SqlNode, negated: bool) -> SqlResult<SqlNode> {
        match self.compiler.options().empty_in_policy {
            EmptyInPolicy::Reject => Err(SqlError::EmptyCollection(
                "Membership test over an empty collection".to_string(),
            )),
            EmptyInPolicy::AlwaysFalse if negated => Ok(SqlNode::Raw {
                text: "1=1".to_string(),
                ty: HostType::Bool,
            }),
            EmptyInPolicy::AlwaysFalse => {
                tracing::debug!("empty membership collection rendered as IN (NULL)");
                Ok(SqlNode::InList {
                    operand: Box::new(operand),
                    items: vec![SqlNode::Null],
                    negated: false,
                })
            }
        }
    }

    fn exists(&mut self, query: &Query, negated: bool) -> SqlResult<SqlNode> {
        let mut plan = self.plan_subquery(query)?;
        if query.projection.is_none() {
            plan.columns = vec![SelectItem {
                node: SqlNode::int_literal(1),
                alias: None,
            }];
        }
        Ok(SqlNode::Exists {
            query: Box::new(plan),
            negated,
        })
    }

    // ── Operators ───────────────────────────────────────────────────────

    fn lower_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> SqlResult<SqlNode> {
        match op {
            BinaryOp::And | BinaryOp::Or => {
                let l = self.predicate(left)?;
                let r = self.predicate(right)?;
                let op = if op == BinaryOp::And {
                    SqlOp::And
                } else {
                    SqlOp::Or
                };
                Ok(SqlNode::binary(op, l, r, HostType::Bool))
            }
            BinaryOp::Coalesce => {
                let mut parts = Vec::new();
                flatten_coalesce(left, &mut parts);
                flatten_coalesce(right, &mut parts);
                let mut args = Vec::with_capacity(parts.len());
                for part in parts {
                    args.push(self.walk(part)?);
                }
                let ty = args
                    .iter()
                    .map(SqlNode::ty)
                    .find(|t| *t != HostType::Unknown)
                    .unwrap_or(HostType::Unknown);
                Ok(SqlNode::func(SqlFunc::Coalesce, args, ty))
            }
            _ => {
                let l = self.walk(left)?;
                let r = self.walk(right)?;
                match op {
                    BinaryOp::Eq => compare(SqlOp::Eq, l, r),
                    BinaryOp::Ne => compare(SqlOp::Ne, l, r),
                    BinaryOp::Lt => compare(SqlOp::Lt, l, r),
                    BinaryOp::Le => compare(SqlOp::Le, l, r),
                    BinaryOp::Gt => compare(SqlOp::Gt, l, r),
                    BinaryOp::Ge => compare(SqlOp::Ge, l, r),
                    BinaryOp::Add if l.ty().is_string() || r.ty().is_string() => {
                        self.concat(vec![l, r])
                    }
                    BinaryOp::BitAnd | BinaryOp::BitOr
                        if l.ty() == HostType::Bool && r.ty() == HostType::Bool =>
                    {
                        let op = if op == BinaryOp::BitAnd {
                            SqlOp::And
                        } else {
                            SqlOp::Or
                        };
                        Ok(SqlNode::binary(
                            op,
                            to_predicate(l),
                            to_predicate(r),
                            HostType::Bool,
                        ))
                    }
                    BinaryOp::Add => Ok(arithmetic(SqlOp::Add, l, r)),
                    BinaryOp::Sub => Ok(arithmetic(SqlOp::Sub, l, r)),
                    BinaryOp::Mul => Ok(arithmetic(SqlOp::Mul, l, r)),
                    BinaryOp::Div => Ok(arithmetic(SqlOp::Div, l, r)),
                    BinaryOp::Mod => Ok(arithmetic(SqlOp::Mod, l, r)),
                    BinaryOp::BitAnd => Ok(arithmetic(SqlOp::BitAnd, l, r)),
                    BinaryOp::BitOr => Ok(arithmetic(SqlOp::BitOr, l, r)),
                    BinaryOp::And | BinaryOp::Or | BinaryOp::Coalesce => {
                        Err(SqlError::InvalidExpression(format!("Unexpected operator {op:?}")))
                    }
                }
            }
        }
    }

    /// One `CONCAT` over the flattened pieces, with runs of constants merged
    /// into a single string literal.
    fn concat(&self, pieces: Vec<SqlNode>) -> SqlResult<SqlNode> {
        let mut parts = Vec::with_capacity(pieces.len());
        let mut text: Option<String> = None;
        let flattened = pieces.into_iter().flat_map(|piece| match piece {
            SqlNode::Func {
                func: SqlFunc::Concat,
                args,
                ..
            } => args,
            other => vec![other],
        });
        for piece in flattened {
            match piece {
                SqlNode::Literal { value, .. } => text
                    .get_or_insert_with(String::new)
                    .push_str(&value.to_concat_string()),
                SqlNode::Null => {}
                other => {
                    if let Some(run) = text.take() {
                        parts.push(constant_node(&Value::String(run), self.dialect())?);
                    }
                    parts.push(other);
                }
            }
        }
        if let Some(run) = text.take() {
            parts.push(constant_node(&Value::String(run), self.dialect())?);
        }
        match parts.len() {
            0 => constant_node(&Value::String(String::new()), self.dialect()),
            1 if parts[0].ty().is_string() => Ok(parts.remove(0)),
            _ => Ok(SqlNode::func(SqlFunc::Concat, parts, HostType::String)),
        }
    }

    fn lower_conditional(&mut self, expr: &Expr) -> SqlResult<SqlNode> {
        let mut branches = Vec::new();
        let mut current = expr;
        while let Expr::Conditional {
            test,
            if_true,
            if_false,
        } = current
        {
            if !branches.is_empty() && self.origin(current) != Origin::Sql {
                break;
            }
            branches.push((self.predicate(test)?, self.walk(if_true)?));
            current = if_false;
        }
        let else_ = self.walk(current)?;
        let ty = branches
            .iter()
            .map(|(_, v)| v.ty())
            .chain(std::iter::once(else_.ty()))
            .find(|t| *t != HostType::Unknown)
            .unwrap_or(HostType::Unknown);
        Ok(SqlNode::CaseWhen {
            branches,
            else_: Box::new(else_),
            ty,
        })
    }
}

/// Turns a boolean value into a predicate: `x=1`, or `1=1`/`1=0` for
/// literals.
pub(crate) fn to_predicate(node: SqlNode) -> SqlNode {
    if node.is_predicate() {
        return node;
    }
    match node {
        SqlNode::Literal {
            value: Value::Bool(b),
            ..
        } => SqlNode::Raw {
            text: if b { "1=1" } else { "1=0" }.to_string(),
            ty: HostType::Bool,
        },
        other => SqlNode::binary(SqlOp::Eq, other, SqlNode::bool_literal(true), HostType::Bool),
    }
}

/// Logical negation of a predicate, folded into the predicate where it has
/// a negated form.
pub(crate) fn negate(node: SqlNode) -> SqlNode {
    match node {
        // The empty-collection form `x IN (NULL)` is never true; its negation is.
        SqlNode::InList {
            items,
            negated: false,
            ..
        } if matches!(items.as_slice(), [SqlNode::Null]) => SqlNode::Raw {
            text: "1=1".to_string(),
            ty: HostType::Bool,
        },
        SqlNode::InList {
            operand,
            items,
            negated,
        } => SqlNode::InList {
            operand,
            items,
            negated: !negated,
        },
        SqlNode::InSubquery {
            operand,
            query,
            negated,
        } => SqlNode::InSubquery {
            operand,
            query,
            negated: !negated,
        },
        SqlNode::Exists { query, negated } => SqlNode::Exists {
            query,
            negated: !negated,
        },
        SqlNode::IsNull { operand, negated } => SqlNode::IsNull {
            operand,
            negated: !negated,
        },
        SqlNode::Raw { text, ty } if text == "1=1" || text == "1=0" => SqlNode::Raw {
            text: if text == "1=1" { "1=0" } else { "1=1" }.to_string(),
            ty,
        },
        SqlNode::Binary {
            op: SqlOp::Eq,
            left,
            right,
            ty,
        } if matches!(
            right.as_ref(),
            SqlNode::Literal {
                value: Value::Bool(true),
                ..
            }
        ) && !left.is_predicate() =>
        {
            SqlNode::Binary {
                op: SqlOp::Eq,
                left,
                right: Box::new(SqlNode::bool_literal(false)),
                ty,
            }
        }
        SqlNode::Unary {
            op: SqlUnaryOp::Not,
            operand,
            ..
        } => *operand,
        other => SqlNode::Unary {
            op: SqlUnaryOp::Not,
            operand: Box::new(other),
            ty: HostType::Bool,
        },
    }
}

fn is_null(node: &SqlNode) -> bool {
    matches!(
        node,
        SqlNode::Null
            | SqlNode::Param {
                value: Value::Null,
                ..
            }
    )
}

fn compare(op: SqlOp, left: SqlNode, right: SqlNode) -> SqlResult<SqlNode> {
    if matches!(op, SqlOp::Eq | SqlOp::Ne) {
        let negated = op == SqlOp::Ne;
        if is_null(&right) {
            return Ok(SqlNode::IsNull {
                operand: Box::new(left),
                negated,
            });
        }
        if is_null(&left) {
            return Ok(SqlNode::IsNull {
                operand: Box::new(right),
                negated,
            });
        }
    }
    comparable(&left.ty(), &right.ty())?;
    Ok(SqlNode::binary(op, left, right, HostType::Bool))
}

const fn is_temporal(ty: &HostType) -> bool {
    matches!(
        ty,
        HostType::DateTime | HostType::DateOnly | HostType::TimeOnly | HostType::TimeSpan
    )
}

const fn is_integral(ty: &HostType) -> bool {
    matches!(
        ty,
        HostType::Byte | HostType::Int16 | HostType::Int32 | HostType::Int64
    )
}

fn arithmetic(op: SqlOp, left: SqlNode, right: SqlNode) -> SqlNode {
    let (lt, rt) = (left.ty(), right.ty());
    match op {
        SqlOp::Add if is_temporal(&lt) && rt == HostType::TimeSpan => {
            SqlNode::func(SqlFunc::AddTime, vec![left, right], lt)
        }
        SqlOp::Sub if is_temporal(&lt) => subtract(left, right),
        SqlOp::Div if is_integral(&lt) && is_integral(&rt) => {
            SqlNode::binary(SqlOp::IntDiv, left, right, lt.widen(&rt))
        }
        _ => {
            let ty = if lt == HostType::Unknown {
                rt
            } else {
                lt.widen(&rt)
            };
            SqlNode::binary(op, left, right, ty)
        }
    }
}

/// `a - b` over temporal operands: a duration between two dates, or a date
/// shifted back by a duration.
fn subtract(left: SqlNode, right: SqlNode) -> SqlNode {
    let (lt, rt) = (left.ty(), right.ty());
    match rt {
        HostType::DateTime | HostType::DateOnly => {
            SqlNode::func(SqlFunc::TimeDiff, vec![left, right], HostType::TimeSpan)
        }
        HostType::TimeSpan => SqlNode::func(SqlFunc::SubTime, vec![left, right], lt),
        _ => SqlNode::binary(SqlOp::Sub, left, right, lt),
    }
}

fn aggregate(func: AggregateFunc, mut operands: Vec<SqlNode>) -> SqlNode {
    let func = if operands.is_empty() {
        AggregateFunc::CountAll
    } else {
        func
    };
    let arg_ty = operands.first().map_or(HostType::Unknown, SqlNode::ty);
    let ty = match func {
        AggregateFunc::CountAll | AggregateFunc::Count | AggregateFunc::CountDistinct => {
            HostType::Int32
        }
        AggregateFunc::Avg if arg_ty == HostType::Decimal => HostType::Decimal,
        AggregateFunc::Avg => HostType::Double,
        AggregateFunc::Sum | AggregateFunc::Max | AggregateFunc::Min => arg_ty,
    };
    operands.truncate(1);
    SqlNode::func(SqlFunc::Aggregate(func), operands, ty)
}

/// Changes the host type an explicit conversion assigns; the SQL is unchanged.
fn retype(node: SqlNode, to: &HostType) -> SqlNode {
    let to = to.clone();
    match node {
        SqlNode::Literal { sql, value, .. } => SqlNode::Literal { sql, value, ty: to },
        SqlNode::Param {
            value, native, name, ..
        } => SqlNode::Param {
            value,
            native,
            name,
            ty: to,
        },
        SqlNode::Column { alias, column, .. } => SqlNode::Column {
            alias,
            column,
            ty: to,
        },
        SqlNode::Func { func, args, .. } => SqlNode::Func { func, args, ty: to },
        SqlNode::Unary { op, operand, .. } => SqlNode::Unary { op, operand, ty: to },
        SqlNode::Binary {
            op, left, right, ..
        } => SqlNode::Binary {
            op,
            left,
            right,
            ty: to,
        },
        SqlNode::CaseWhen {
            branches, else_, ..
        } => SqlNode::CaseWhen {
            branches,
            else_,
            ty: to,
        },
        SqlNode::Subquery { query, .. } => SqlNode::Subquery { query, ty: to },
        other => other,
    }
}

fn contains_call(expr: &Expr) -> bool {
    match expr {
        Expr::Call { .. } => true,
        Expr::Member { target: inner, .. }
        | Expr::Unary { operand: inner, .. }
        | Expr::Convert { operand: inner, .. } => contains_call(inner),
        Expr::Binary { left, right, .. } => contains_call(left) || contains_call(right),
        Expr::Conditional {
            test,
            if_true,
            if_false,
        } => contains_call(test) || contains_call(if_true) || contains_call(if_false),
        Expr::New(members) => members.iter().any(|(_, e)| contains_call(e)),
        Expr::NewArray(items) => items.iter().any(contains_call),
        _ => false,
    }
}

fn flatten_coalesce<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::Binary {
            op: BinaryOp::Coalesce,
            left,
            right,
        } => {
            flatten_coalesce(left, out);
            flatten_coalesce(right, out);
        }
        other => out.push(other),
    }
}

fn strip_convert(expr: &Expr) -> &Expr {
    match expr {
        Expr::Convert { operand, .. } => strip_convert(operand),
        other => other,
    }
}

fn as_query(expr: &Expr) -> Option<&Query> {
    match expr {
        Expr::Query(query) => Some(query),
        Expr::Convert { operand, .. } => as_query(operand),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, ty: HostType) -> SqlNode {
        SqlNode::Column {
            alias: Some("a".into()),
            column: name.into(),
            ty,
        }
    }

    #[test]
    fn test_bool_column_becomes_test() {
        let p = to_predicate(col("IsActive", HostType::Bool));
        assert!(matches!(p, SqlNode::Binary { op: SqlOp::Eq, .. }));
        let n = negate(p);
        match n {
            SqlNode::Binary { right, .. } => assert!(matches!(
                *right,
                SqlNode::Literal {
                    value: Value::Bool(false),
                    ..
                }
            )),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_bool_literal_becomes_tautology() {
        let p = to_predicate(SqlNode::bool_literal(true));
        assert!(matches!(p, SqlNode::Raw { ref text, .. } if text == "1=1"));
        assert!(matches!(negate(p), SqlNode::Raw { ref text, .. } if text == "1=0"));
    }

    #[test]
    fn test_negate_flips_in_list() {
        let n = negate(SqlNode::InList {
            operand: Box::new(col("Id", HostType::Int32)),
            items: vec![SqlNode::int_literal(1)],
            negated: false,
        });
        assert!(matches!(n, SqlNode::InList { negated: true, .. }));
    }

    #[test]
    fn test_double_negation_cancels() {
        let cmp = SqlNode::binary(
            SqlOp::Gt,
            col("Age", HostType::Int32),
            SqlNode::int_literal(3),
            HostType::Bool,
        );
        let twice = negate(negate(cmp));
        assert!(matches!(twice, SqlNode::Binary { op: SqlOp::Gt, .. }));
    }

    #[test]
    fn test_null_comparison_is_is_null() {
        let n = compare(SqlOp::Ne, col("Name", HostType::String), SqlNode::Null).unwrap();
        assert!(matches!(n, SqlNode::IsNull { negated: true, .. }));
    }

    #[test]
    fn test_enum_family_mismatch() {
        let err = compare(
            SqlOp::Eq,
            col("Gender", HostType::Enum("Gender".into())),
            col("Channel", HostType::Enum("Channel".into())),
        )
        .unwrap_err();
        assert!(matches!(err, SqlError::TypeMismatch(_)));
    }

    #[test]
    fn test_integer_division() {
        let n = arithmetic(
            SqlOp::Div,
            col("Age", HostType::Int32),
            SqlNode::int_literal(2),
        );
        assert!(matches!(n, SqlNode::Binary { op: SqlOp::IntDiv, .. }));
        let d = arithmetic(
            SqlOp::Div,
            col("Price", HostType::Decimal),
            SqlNode::int_literal(2),
        );
        assert!(matches!(d, SqlNode::Binary { op: SqlOp::Div, ty: HostType::Decimal, .. }));
    }

    #[test]
    fn test_date_difference_is_timediff() {
        let n = arithmetic(
            SqlOp::Sub,
            col("EndAt", HostType::DateTime),
            col("StartAt", HostType::DateTime),
        );
        assert!(matches!(
            n,
            SqlNode::Func {
                func: SqlFunc::TimeDiff,
                ty: HostType::TimeSpan,
                ..
            }
        ));
    }

    #[test]
    fn test_aggregate_types() {
        assert_eq!(aggregate(AggregateFunc::Count, vec![]).ty(), HostType::Int32);
        assert_eq!(
            aggregate(AggregateFunc::Avg, vec![col("Price", HostType::Decimal)]).ty(),
            HostType::Decimal
        );
        assert_eq!(
            aggregate(AggregateFunc::Avg, vec![col("Age", HostType::Int32)]).ty(),
            HostType::Double
        );
    }
}
