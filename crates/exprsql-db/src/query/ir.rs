//! The dialect-neutral intermediate representation.
//!
//! The walker lowers expression trees into [`SqlNode`] trees; the writer
//! renders them to text. Every node carries a [`HostType`] so comparisons
//! and predicates can decide casts, enum coercion, and boolean tests.
//! Parameters are not allocated here: a [`SqlNode::Param`] only holds its
//! value until the writer emits it.

use super::dialect::SqlFunc;
use super::planner::SelectPlan;
use crate::value::{HostType, NativeType, Value};

/// Binary SQL operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `AND`
    And,
    /// `OR`
    Or,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// Integer division.
    IntDiv,
    /// `%`
    Mod,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
}

impl SqlOp {
    /// The operator text as emitted.
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => " AND ",
            Self::Or => " OR ",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::IntDiv => " DIV ",
            Self::Mod => "%",
            Self::BitAnd => "&",
            Self::BitOr => "|",
        }
    }

    /// Binding strength; higher binds tighter.
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Mul | Self::Div | Self::IntDiv | Self::Mod => 8,
            Self::Add | Self::Sub => 7,
            Self::BitAnd | Self::BitOr => 6,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge => PREDICATE,
            Self::And => 3,
            Self::Or => 2,
        }
    }

    /// Whether `a op (b op c)` equals `(a op b) op c`.
    pub const fn is_associative(self) -> bool {
        matches!(
            self,
            Self::Add | Self::Mul | Self::And | Self::Or | Self::BitAnd | Self::BitOr
        )
    }

    /// Returns `true` for comparison operators.
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }
}

/// Precedence of atoms (never parenthesized).
pub const ATOM: u8 = 10;
/// Precedence of unary minus.
pub const NEGATE: u8 = 9;
/// Precedence of comparisons and other predicates.
pub const PREDICATE: u8 = 5;
/// Precedence of `NOT`.
pub const NOT: u8 = 4;

/// Unary SQL operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlUnaryOp {
    /// `NOT`
    Not,
    /// `-`
    Negate,
}

/// A node of the IR.
#[derive(Debug, Clone)]
pub enum SqlNode {
    /// Inline literal text.
    Literal {
        /// The rendered literal.
        sql: String,
        /// The constant it renders.
        value: Value,
        /// Host type of the constant.
        ty: HostType,
    },
    /// A value bound as a parameter when emitted.
    Param {
        /// The bound value.
        value: Value,
        /// The declared database type.
        native: NativeType,
        /// A fixed placeholder name; anonymous when `None`.
        name: Option<String>,
        /// Host type of the value.
        ty: HostType,
    },
    /// A column reference.
    Column {
        /// The table alias; unqualified when `None`.
        alias: Option<String>,
        /// The column name.
        column: String,
        /// Host type of the member.
        ty: HostType,
    },
    /// A binary operation.
    Binary {
        /// The operator.
        op: SqlOp,
        /// Left operand.
        left: Box<SqlNode>,
        /// Right operand.
        right: Box<SqlNode>,
        /// Result type.
        ty: HostType,
    },
    /// A unary operation.
    Unary {
        /// The operator.
        op: SqlUnaryOp,
        /// The operand.
        operand: Box<SqlNode>,
        /// Result type.
        ty: HostType,
    },
    /// A dialect function applied to arguments.
    Func {
        /// The function.
        func: SqlFunc,
        /// Arguments in template order.
        args: Vec<SqlNode>,
        /// Result type.
        ty: HostType,
    },
    /// `(CASE WHEN c1 THEN v1 ... ELSE e END)`.
    CaseWhen {
        /// `(condition, value)` branches.
        branches: Vec<(SqlNode, SqlNode)>,
        /// The else value.
        else_: Box<SqlNode>,
        /// Result type.
        ty: HostType,
    },
    /// `x [NOT] IN (...)`. An empty list renders as never-true, or
    /// always-true when negated.
    InList {
        /// Tested operand.
        operand: Box<SqlNode>,
        /// Candidate values.
        items: Vec<SqlNode>,
        /// `NOT IN`.
        negated: bool,
    },
    /// `x [NOT] IN (SELECT ...)`.
    InSubquery {
        /// Tested operand.
        operand: Box<SqlNode>,
        /// The subquery.
        query: Box<SelectPlan>,
        /// `NOT IN`.
        negated: bool,
    },
    /// `[NOT ]EXISTS(SELECT ...)`.
    Exists {
        /// The subquery.
        query: Box<SelectPlan>,
        /// `NOT EXISTS`.
        negated: bool,
    },
    /// `x IS [NOT] NULL`.
    IsNull {
        /// Tested operand.
        operand: Box<SqlNode>,
        /// `IS NOT NULL`.
        negated: bool,
    },
    /// A scalar subquery `(SELECT ...)`.
    Subquery {
        /// The subquery.
        query: Box<SelectPlan>,
        /// Type of its single column.
        ty: HostType,
    },
    /// An explicitly parenthesized expression.
    Group(Box<SqlNode>),
    /// Raw SQL text emitted verbatim.
    Raw {
        /// The text.
        text: String,
        /// Its type.
        ty: HostType,
    },
    /// `NULL`.
    Null,
}

impl SqlNode {
    /// The host type of this node.
    pub fn ty(&self) -> HostType {
        match self {
            Self::Literal { ty, .. }
            | Self::Param { ty, .. }
            | Self::Column { ty, .. }
            | Self::Binary { ty, .. }
            | Self::Unary { ty, .. }
            | Self::Func { ty, .. }
            | Self::CaseWhen { ty, .. }
            | Self::Subquery { ty, .. }
            | Self::Raw { ty, .. } => ty.clone(),
            Self::Group(inner) => inner.ty(),
            Self::InList { .. }
            | Self::InSubquery { .. }
            | Self::Exists { .. }
            | Self::IsNull { .. } => HostType::Bool,
            Self::Null => HostType::Unknown,
        }
    }

    /// Binding strength of this node when it appears as an operand.
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Binary { op, .. } => op.precedence(),
            Self::Unary {
                op: SqlUnaryOp::Not,
                ..
            } => NOT,
            Self::Unary {
                op: SqlUnaryOp::Negate,
                ..
            } => NEGATE,
            Self::Func { func, .. } if func.is_bare_predicate() => PREDICATE,
            Self::InList { .. } | Self::InSubquery { .. } | Self::IsNull { .. } => PREDICATE,
            Self::Exists { negated: true, .. } => NOT,
            Self::Literal { sql, .. } if sql.starts_with('-') => NEGATE,
            _ => ATOM,
        }
    }

    /// Returns `true` if this node is already a boolean predicate (as opposed
    /// to a boolean-typed value that needs an explicit test).
    pub fn is_predicate(&self) -> bool {
        match self {
            Self::Binary { op, .. } => op.is_comparison() || matches!(op, SqlOp::And | SqlOp::Or),
            Self::Unary {
                op: SqlUnaryOp::Not,
                ..
            }
            | Self::InList { .. }
            | Self::InSubquery { .. }
            | Self::Exists { .. }
            | Self::IsNull { .. } => true,
            Self::Func { func, .. } => func.is_predicate(),
            Self::Group(inner) => inner.is_predicate(),
            Self::Raw { ty, .. } => *ty == HostType::Bool,
            _ => false,
        }
    }

    /// Returns `true` if the node contains an aggregate function.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Self::Func { func, args, .. } => {
                func.is_aggregate() || args.iter().any(Self::contains_aggregate)
            }
            Self::Binary { left, right, .. } => left.contains_aggregate() || right.contains_aggregate(),
            Self::Unary { operand, .. } | Self::IsNull { operand, .. } | Self::Group(operand) => {
                operand.contains_aggregate()
            }
            Self::CaseWhen {
                branches, else_, ..
            } => {
                else_.contains_aggregate()
                    || branches
                        .iter()
                        .any(|(c, v)| c.contains_aggregate() || v.contains_aggregate())
            }
            _ => false,
        }
    }

    /// A boolean literal node.
    pub fn bool_literal(value: bool) -> Self {
        Self::Literal {
            sql: if value { "1" } else { "0" }.to_string(),
            value: Value::Bool(value),
            ty: HostType::Bool,
        }
    }

    /// An integer literal node.
    pub fn int_literal(value: i64) -> Self {
        Self::Literal {
            sql: value.to_string(),
            value: Value::Int(value),
            ty: HostType::Int32,
        }
    }

    /// `left op right` with a result type.
    pub fn binary(op: SqlOp, left: SqlNode, right: SqlNode, ty: HostType) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            ty,
        }
    }

    /// `func(args)` with a result type.
    pub fn func(func: SqlFunc, args: Vec<SqlNode>, ty: HostType) -> Self {
        Self::Func { func, args, ty }
    }

    /// Joins predicates with `AND`; `None` when empty.
    pub fn conjunction(predicates: Vec<SqlNode>) -> Option<SqlNode> {
        predicates
            .into_iter()
            .reduce(|acc, next| Self::binary(SqlOp::And, acc, next, HostType::Bool))
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
    fn test_precedence_ordering() {
        assert!(SqlOp::Mul.precedence() > SqlOp::Add.precedence());
        assert!(SqlOp::Add.precedence() > SqlOp::Eq.precedence());
        assert!(SqlOp::Eq.precedence() > NOT);
        assert!(NOT > SqlOp::And.precedence());
        assert!(SqlOp::And.precedence() > SqlOp::Or.precedence());
    }

    #[test]
    fn test_predicate_detection() {
        let eq = SqlNode::binary(
            SqlOp::Eq,
            col("Id", HostType::Int32),
            SqlNode::int_literal(1),
            HostType::Bool,
        );
        assert!(eq.is_predicate());
        assert!(!col("IsActive", HostType::Bool).is_predicate());
        let like = SqlNode::func(
            SqlFunc::Contains,
            vec![col("Name", HostType::String), SqlNode::Null],
            HostType::Bool,
        );
        assert!(like.is_predicate());
        assert_eq!(like.precedence(), PREDICATE);
    }

    #[test]
    fn test_conjunction() {
        assert!(SqlNode::conjunction(vec![]).is_none());
        let one = SqlNode::conjunction(vec![SqlNode::bool_literal(true)]).unwrap();
        assert!(matches!(one, SqlNode::Literal { .. }));
        let two = SqlNode::conjunction(vec![SqlNode::bool_literal(true), SqlNode::bool_literal(false)])
            .unwrap();
        assert!(matches!(two, SqlNode::Binary { op: SqlOp::And, .. }));
    }

    #[test]
    fn test_in_list_type_is_bool() {
        let n = SqlNode::InList {
            operand: Box::new(col("Id", HostType::Int32)),
            items: vec![],
            negated: false,
        };
        assert_eq!(n.ty(), HostType::Bool);
    }

    #[test]
    fn test_contains_aggregate() {
        let sum = SqlNode::func(
            SqlFunc::Aggregate(crate::query::dialect::AggregateFunc::Sum),
            vec![col("Price", HostType::Decimal)],
            HostType::Decimal,
        );
        let gt = SqlNode::binary(SqlOp::Gt, sum, SqlNode::int_literal(10), HostType::Bool);
        assert!(gt.contains_aggregate());
        assert!(!col("Price", HostType::Decimal).contains_aggregate());
    }
}
