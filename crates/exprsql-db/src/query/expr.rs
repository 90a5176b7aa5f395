//! The expression tree handed to the compiler.
//!
//! Callers build an [`Expr`] tree with the constructor functions in this
//! module and the chaining methods on `Expr`; nothing is parsed from text.
//! The node kinds mirror a host-language expression-tree API: lambdas,
//! parameters, member access, method calls, operators, conditionals, object
//! and array construction, constants, closure-captured values, conversions,
//! and nested queries.
//!
//! # Examples
//!
//! ```
//! use exprsql_db::query::expr::{constant, lambda, param};
//!
//! // f => f.Id == 1 && f.Name.Contains("a")
//! let f = param("f");
//! let predicate = lambda(
//!     ["f"],
//!     f.clone()
//!         .member("Id")
//!         .eq(constant(1))
//!         .and(f.member("Name").call("Contains", vec![constant("a")])),
//! );
//! assert!(predicate.as_lambda().is_some());
//! ```

use std::ops;

use super::queryset::Query;
use crate::value::{EnumValue, HostType, Value};

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `+` (numeric addition, string concatenation, temporal addition)
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `??`
    Coalesce,
    /// `&` on integers
    BitAnd,
    /// `|` on integers
    BitOr,
}

impl BinaryOp {
    /// Returns `true` for the six comparison operators.
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Logical `!`.
    Not,
    /// Arithmetic `-`.
    Negate,
}

/// A node of the expression tree.
#[derive(Debug, Clone)]
pub enum Expr {
    /// `(p1, p2, ...) => body`. Parameters bind positionally to the tables
    /// of the enclosing query (or to the grouping after `group_by`).
    Lambda {
        /// Parameter names.
        params: Vec<String>,
        /// The lambda body.
        body: Box<Expr>,
    },
    /// A reference to a lambda parameter.
    Param(String),
    /// `target.member`.
    Member {
        /// The accessed object.
        target: Box<Expr>,
        /// The member name.
        member: String,
    },
    /// A static property such as `DateTime.Now` or `DateOnly.MinValue`.
    Static {
        /// The declaring type name.
        type_name: String,
        /// The property name.
        member: String,
    },
    /// A method call. Instance calls carry a `target`; static calls carry a
    /// `type_name`.
    Call {
        /// The instance the method is called on.
        target: Option<Box<Expr>>,
        /// The declaring type of a static call.
        type_name: Option<String>,
        /// The method name.
        method: String,
        /// The arguments.
        args: Vec<Expr>,
    },
    /// `left op right`.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// `op operand`.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        operand: Box<Expr>,
    },
    /// `test ? if_true : if_false`.
    Conditional {
        /// The condition.
        test: Box<Expr>,
        /// Value when the condition holds.
        if_true: Box<Expr>,
        /// Value otherwise.
        if_false: Box<Expr>,
    },
    /// `new { A = ..., B = ... }`, members in declaration order.
    New(Vec<(String, Expr)>),
    /// `new[] { ... }`.
    NewArray(Vec<Expr>),
    /// A compile-time constant. Rendered inline as a literal.
    Constant(Value),
    /// A closure-captured runtime value. Rendered as a parameter.
    Captured {
        /// The captured variable name, for diagnostics.
        name: String,
        /// The value at the time the tree was built.
        value: Value,
    },
    /// An explicit conversion, e.g. `(long)x` or `(int?)x`.
    Convert {
        /// The converted expression.
        operand: Box<Expr>,
        /// The target type.
        to: HostType,
    },
    /// A nested query used as a subquery.
    Query(Box<Query>),
}

impl Expr {
    /// `self.member`.
    #[must_use]
    pub fn member(self, member: impl Into<String>) -> Self {
        Self::Member {
            target: Box::new(self),
            member: member.into(),
        }
    }

    /// `self.method(args)`.
    #[must_use]
    pub fn call(self, method: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call {
            target: Some(Box::new(self)),
            type_name: None,
            method: method.into(),
            args,
        }
    }

    fn binary(self, op: BinaryOp, rhs: Expr) -> Self {
        Self::Binary {
            op,
            left: Box::new(self),
            right: Box::new(rhs),
        }
    }

    /// `self == rhs`.
    #[must_use]
    pub fn eq(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }

    /// `self != rhs`.
    #[must_use]
    pub fn ne(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Ne, rhs)
    }

    /// `self < rhs`.
    #[must_use]
    pub fn lt(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Lt, rhs)
    }

    /// `self <= rhs`.
    #[must_use]
    pub fn le(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Le, rhs)
    }

    /// `self > rhs`.
    #[must_use]
    pub fn gt(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Gt, rhs)
    }

    /// `self >= rhs`.
    #[must_use]
    pub fn ge(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Ge, rhs)
    }

    /// `self && rhs`.
    #[must_use]
    pub fn and(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::And, rhs)
    }

    /// `self || rhs`.
    #[must_use]
    pub fn or(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Or, rhs)
    }

    /// `self ?? rhs`.
    #[must_use]
    pub fn coalesce(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Coalesce, rhs)
    }

    /// `self & rhs`.
    #[must_use]
    pub fn bit_and(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::BitAnd, rhs)
    }

    /// `self | rhs`.
    #[must_use]
    pub fn bit_or(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::BitOr, rhs)
    }

    /// Returns `(params, body)` if this is a lambda.
    pub fn as_lambda(&self) -> Option<(&[String], &Expr)> {
        match self {
            Self::Lambda { params, body } => Some((params, body)),
            _ => None,
        }
    }

    /// Returns `true` for a constant or captured `null`.
    pub fn is_null_value(&self) -> bool {
        match self {
            Self::Constant(v) | Self::Captured { value: v, .. } => v.is_null(),
            Self::Convert { operand, .. } => operand.is_null_value(),
            _ => false,
        }
    }
}

impl ops::Add for Expr {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        self.binary(BinaryOp::Add, rhs)
    }
}

impl ops::Sub for Expr {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        self.binary(BinaryOp::Sub, rhs)
    }
}

impl ops::Mul for Expr {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self::Output {
        self.binary(BinaryOp::Mul, rhs)
    }
}

impl ops::Div for Expr {
    type Output = Self;
    fn div(self, rhs: Self) -> Self::Output {
        self.binary(BinaryOp::Div, rhs)
    }
}

impl ops::Rem for Expr {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self::Output {
        self.binary(BinaryOp::Mod, rhs)
    }
}

impl ops::Not for Expr {
    type Output = Self;
    fn not(self) -> Self::Output {
        Self::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }
}

impl ops::Neg for Expr {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(self),
        }
    }
}

// ── Constructors ───────────────────────────────────────────────────────

/// `(params) => body`.
pub fn lambda<I, S>(params: I, body: Expr) -> Expr
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Expr::Lambda {
        params: params.into_iter().map(Into::into).collect(),
        body: Box::new(body),
    }
}

/// A reference to a lambda parameter.
pub fn param(name: impl Into<String>) -> Expr {
    Expr::Param(name.into())
}

/// A compile-time constant.
pub fn constant(value: impl Into<Value>) -> Expr {
    Expr::Constant(value.into())
}

/// The constant `null`.
pub fn null() -> Expr {
    Expr::Constant(Value::Null)
}

/// A constant enum member.
pub fn enum_value(type_name: &str, name: &str, underlying: i64) -> Expr {
    Expr::Constant(Value::Enum(EnumValue::new(type_name, name, underlying)))
}

/// A closure-captured runtime value.
pub fn captured(name: impl Into<String>, value: impl Into<Value>) -> Expr {
    Expr::Captured {
        name: name.into(),
        value: value.into(),
    }
}

/// A static property, e.g. `static_member("DateTime", "Now")`.
pub fn static_member(type_name: impl Into<String>, member: impl Into<String>) -> Expr {
    Expr::Static {
        type_name: type_name.into(),
        member: member.into(),
    }
}

/// A static method call, e.g. `static_call("Math", "Abs", vec![x])`.
pub fn static_call(type_name: impl Into<String>, method: impl Into<String>, args: Vec<Expr>) -> Expr {
    Expr::Call {
        target: None,
        type_name: Some(type_name.into()),
        method: method.into(),
        args,
    }
}

/// `test ? if_true : if_false`.
pub fn cond(test: Expr, if_true: Expr, if_false: Expr) -> Expr {
    Expr::Conditional {
        test: Box::new(test),
        if_true: Box::new(if_true),
        if_false: Box::new(if_false),
    }
}

/// `new { name = expr, ... }`.
pub fn new_object<I, S>(members: I) -> Expr
where
    I: IntoIterator<Item = (S, Expr)>,
    S: Into<String>,
{
    Expr::New(members.into_iter().map(|(m, e)| (m.into(), e)).collect())
}

/// `new[] { ... }`.
pub fn array(items: Vec<Expr>) -> Expr {
    Expr::NewArray(items)
}

/// `(to)operand`.
pub fn convert(operand: Expr, to: HostType) -> Expr {
    Expr::Convert {
        operand: Box::new(operand),
        to,
    }
}

/// A nested query.
pub fn subquery(query: Query) -> Expr {
    Expr::Query(Box::new(query))
}
