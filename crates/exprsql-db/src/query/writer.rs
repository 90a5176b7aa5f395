//! Rendering of planned statements to SQL text.
//!
//! The writer is the only place parameters are allocated: placeholders are
//! added to the sink in the order they appear in the text.

use exprsql_core::SqlResult;

use super::dialect::SqlDialect;
use super::ir::{SqlNode, SqlUnaryOp, ATOM, NEGATE, PREDICATE};
use super::params::Parameters;
use super::planner::{CtePlan, JoinPlan, SelectPlan, TableRef, TableSourcePlan};

pub(crate) struct SqlWriter<'a> {
    dialect: &'a dyn SqlDialect,
    params: &'a mut Parameters,
}

impl<'a> SqlWriter<'a> {
    pub(crate) fn new(dialect: &'a dyn SqlDialect, params: &'a mut Parameters) -> Self {
        Self { dialect, params }
    }

    pub(crate) fn quote(&self, ident: &str) -> String {
        self.dialect.quote_identifier(ident)
    }

    /// Renders one expression.
    pub(crate) fn expr(&mut self, node: &SqlNode) -> SqlResult<String> {
        Ok(match node {
            SqlNode::Literal { sql, .. } => sql.clone(),
            SqlNode::Param {
                value,
                native,
                name,
                ..
            } => match name {
                Some(name) => self.params.bind_named(name, value.clone(), *native)?,
                None => self.params.add_anonymous(value.clone(), *native),
            },
            SqlNode::Column { alias, column, .. } => match alias {
                Some(alias) => format!("{alias}.{}", self.quote(column)),
                None => self.quote(column),
            },
            SqlNode::Binary {
                op, left, right, ..
            } => {
                let prec = op.precedence();
                let l = self.wrapped(left, |p| p < prec)?;
                let same_op = matches!(right.as_ref(), SqlNode::Binary { op: r, .. } if r == op);
                let r = self.wrapped(right, |p| {
                    p < prec || (p == prec && !(op.is_associative() && same_op))
                })?;
                format!("{l}{}{r}", op.sql())
            }
            SqlNode::Unary {
                op: SqlUnaryOp::Not,
                operand,
                ..
            } => format!("NOT ({})", self.expr(operand)?),
            SqlNode::Unary {
                op: SqlUnaryOp::Negate,
                operand,
                ..
            } => format!("-{}", self.wrapped(operand, |p| p <= NEGATE)?),
            SqlNode::Func { func, args, .. } => {
                let template = self.dialect.function_template(*func)?;
                self.template(&template, args)?
            }
            SqlNode::CaseWhen {
                branches, else_, ..
            } => {
                let mut out = String::from("(CASE");
                for (test, value) in branches {
                    let test = self.expr(test)?;
                    let value = self.expr(value)?;
                    out.push_str(&format!(" WHEN {test} THEN {value}"));
                }
                out.push_str(&format!(" ELSE {} END)", self.expr(else_)?));
                out
            }
            SqlNode::InList {
                operand,
                items,
                negated,
            } => {
                if items.is_empty() {
                    return Ok(if *negated { "1=1" } else { "1=0" }.to_string());
                }
                let operand = self.wrapped(operand, |p| p <= PREDICATE)?;
                let mut rendered = Vec::with_capacity(items.len());
                for item in items {
                    rendered.push(self.expr(item)?);
                }
                let keyword = if *negated { "NOT IN" } else { "IN" };
                format!("{operand} {keyword} ({})", rendered.join(","))
            }
            SqlNode::InSubquery {
                operand,
                query,
                negated,
            } => {
                let operand = self.wrapped(operand, |p| p <= PREDICATE)?;
                let keyword = if *negated { "NOT IN" } else { "IN" };
                format!("{operand} {keyword} ({})", self.select(query)?)
            }
            SqlNode::Exists { query, negated } => {
                let keyword = if *negated { "NOT EXISTS" } else { "EXISTS" };
                format!("{keyword}({})", self.select(query)?)
            }
            SqlNode::IsNull { operand, negated } => {
                let operand = self.wrapped(operand, |p| p <= PREDICATE)?;
                let keyword = if *negated { "IS NOT NULL" } else { "IS NULL" };
                format!("{operand} {keyword}")
            }
            SqlNode::Subquery { query, .. } => format!("({})", self.select(query)?),
            SqlNode::Group(inner) => format!("({})", self.expr(inner)?),
            SqlNode::Raw { text, .. } => text.clone(),
            SqlNode::Null => "NULL".to_string(),
        })
    }

    fn wrapped(&mut self, node: &SqlNode, needs_parens: impl Fn(u8) -> bool) -> SqlResult<String> {
        let text = self.expr(node)?;
        Ok(if needs_parens(node.precedence()) {
            format!("({text})")
        } else {
            text
        })
    }

    /// Expands `{N}` and `{*}` placeholders. Each argument is rendered once,
    /// at its first occurrence, so parameters follow textual order.
    fn template(&mut self, template: &str, args: &[SqlNode]) -> SqlResult<String> {
        let mut rendered: Vec<Option<String>> = vec![None; args.len()];
        let bytes = template.as_bytes();
        let mut out = String::with_capacity(template.len() + 16);
        let mut i = 0;
        while i < template.len() {
            let close = template[i..].find('}').map(|offset| i + offset);
            let placeholder = match (bytes[i], close) {
                (b'{', Some(end)) => Some((&template[i + 1..end], end)),
                _ => None,
            };
            let Some((token, end)) = placeholder else {
                let next = template[i..].chars().next().map_or(1, char::len_utf8);
                out.push_str(&template[i..i + next]);
                i += next;
                continue;
            };

            if token == "*" {
                let mut all = Vec::with_capacity(args.len());
                for arg in args {
                    all.push(self.expr(arg)?);
                }
                out.push_str(&all.join(","));
            } else if let Ok(index) = token.parse::<usize>() {
                let Some(arg) = args.get(index) else {
                    out.push_str("NULL");
                    i = end + 1;
                    continue;
                };
                let delimited = matches!(i.checked_sub(1).map(|p| bytes[p]), Some(b'(' | b','))
                    && matches!(bytes.get(end + 1), Some(b')' | b','));
                let text = match &rendered[index] {
                    Some(text) => text.clone(),
                    None => {
                        let text = self.expr(arg)?;
                        rendered[index] = Some(text.clone());
                        text
                    }
                };
                if delimited || arg.precedence() >= ATOM {
                    out.push_str(&text);
                } else {
                    out.push_str(&format!("({text})"));
                }
            } else {
                out.push_str(&template[i..=end]);
            }
            i = end + 1;
        }
        Ok(out)
    }

    pub(crate) fn table(&mut self, table: &TableRef) -> SqlResult<String> {
        let source = match &table.source {
            TableSourcePlan::Named { name, schema } => {
                self.dialect.qualified_table(name, schema.as_deref())
            }
            TableSourcePlan::Derived(plan) => format!("({})", self.select(plan)?),
        };
        Ok(match &table.alias {
            Some(alias) => format!("{source} {alias}"),
            None => source,
        })
    }

    /// Renders join clauses, each with a leading space.
    pub(crate) fn joins(&mut self, joins: &[JoinPlan]) -> SqlResult<String> {
        let mut out = String::new();
        for join in joins {
            let table = self.table(&join.table)?;
            let on = self.expr(&join.on)?;
            out.push_str(&format!(" {} {table} ON {on}", join.kind.sql()));
        }
        Ok(out)
    }

    /// Renders a SELECT.
    pub(crate) fn select(&mut self, plan: &SelectPlan) -> SqlResult<String> {
        let mut sql = String::from("SELECT ");
        if plan.distinct {
            sql.push_str("DISTINCT ");
        }
        let mut columns = Vec::with_capacity(plan.columns.len());
        for item in &plan.columns {
            let text = self.expr(&item.node)?;
            columns.push(match &item.alias {
                Some(alias) => format!("{text} AS {}", self.quote(alias)),
                None => text,
            });
        }
        sql.push_str(&columns.join(","));
        sql.push_str(" FROM ");
        sql.push_str(&self.table(&plan.from)?);
        sql.push_str(&self.joins(&plan.joins)?);
        if let Some(where_) = &plan.where_ {
            sql.push_str(" WHERE ");
            sql.push_str(&self.expr(where_)?);
        }
        if !plan.group_by.is_empty() {
            let mut keys = Vec::with_capacity(plan.group_by.len());
            for key in &plan.group_by {
                keys.push(self.expr(key)?);
            }
            sql.push_str(" GROUP BY ");
            sql.push_str(&keys.join(","));
        }
        if let Some(having) = &plan.having {
            sql.push_str(" HAVING ");
            sql.push_str(&self.expr(having)?);
        }
        if !plan.order_by.is_empty() {
            let mut keys = Vec::with_capacity(plan.order_by.len());
            for (key, desc) in &plan.order_by {
                let text = self.expr(key)?;
                keys.push(if *desc { format!("{text} DESC") } else { text });
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(","));
        }
        sql.push_str(&self.dialect.limit_clause(plan.limit, plan.offset));
        Ok(sql)
    }

    /// Renders the `WITH` block, including its trailing newline, or an empty
    /// string when there are no CTEs.
    pub(crate) fn ctes(&mut self, ctes: &[CtePlan]) -> SqlResult<String> {
        if ctes.is_empty() {
            return Ok(String::new());
        }
        let recursive = ctes.iter().any(|c| c.self_referential);
        let mut blocks = Vec::with_capacity(ctes.len());
        for cte in ctes {
            let columns: Vec<String> = cte.columns.iter().map(|c| self.quote(c)).collect();
            let mut body = self.select(&cte.anchor)?;
            if let Some(union) = &cte.union {
                body.push_str(" UNION ALL\n");
                body.push_str(&self.select(union)?);
            }
            blocks.push(format!(
                "{}({}) AS \n(\n{body}\n)",
                self.quote(&cte.name),
                columns.join(",")
            ));
        }
        Ok(format!(
            "WITH {}{}\n",
            if recursive { "RECURSIVE " } else { "" },
            blocks.join(",\n")
        ))
    }
}
