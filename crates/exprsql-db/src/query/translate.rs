//! The method and member translation table.
//!
//! Every recognized method call is looked up by `(declaring type, method,
//! arity)` and mapped to a closed [`Translation`] variant the walker knows how
//! to lower. Lookups try the exact declaring type first, then a variadic entry,
//! then the same two lookups on [`TypeKey::Object`]. A miss is always an
//! [`UnsupportedTranslation`](exprsql_core::SqlError::UnsupportedTranslation)
//! error; nothing passes through silently.
//!
//! Instance members (`s.Length`, `d.Year`) and static members (`DateTime.Now`,
//! `DateOnly.MinValue`) have their own tables.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use super::dialect::{
    AggregateFunc, CastTarget, DatePart, IntervalUnit, SqlFunc, TimeSpanPart,
};
use crate::value::{HostType, Value};

/// Arity used for entries that accept any number of arguments.
pub const VARIADIC: usize = usize::MAX;

/// The declaring-type half of a lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKey {
    /// `string` / `char`.
    String,
    /// `DateTime`.
    DateTime,
    /// `DateOnly`.
    DateOnly,
    /// `TimeOnly`.
    TimeOnly,
    /// `TimeSpan`.
    TimeSpan,
    /// `Convert`.
    Convert,
    /// `Math`.
    Math,
    /// The `Sql` helper class.
    Sql,
    /// Arrays, lists, and `Enumerable`.
    Enumerable,
    /// The grouping object of a grouped query.
    Grouping,
    /// Fallback for every type.
    Object,
}

impl TypeKey {
    /// The key instance members of a value of `ty` are looked up under.
    pub const fn for_host_type(ty: &HostType) -> Self {
        match ty {
            HostType::String | HostType::Char => Self::String,
            HostType::DateTime => Self::DateTime,
            HostType::DateOnly => Self::DateOnly,
            HostType::TimeOnly => Self::TimeOnly,
            HostType::TimeSpan => Self::TimeSpan,
            HostType::Collection(_) => Self::Enumerable,
            HostType::Grouping => Self::Grouping,
            _ => Self::Object,
        }
    }

    /// The key of a static declaring type name, if recognized.
    pub fn from_type_name(name: &str) -> Option<Self> {
        Some(match name {
            "String" | "string" => Self::String,
            "DateTime" => Self::DateTime,
            "DateOnly" => Self::DateOnly,
            "TimeOnly" => Self::TimeOnly,
            "TimeSpan" => Self::TimeSpan,
            "Convert" => Self::Convert,
            "Math" => Self::Math,
            "Sql" => Self::Sql,
            "Enumerable" => Self::Enumerable,
            "Object" | "object" => Self::Object,
            _ => return None,
        })
    }

    /// The name used in error signatures.
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::DateTime => "DateTime",
            Self::DateOnly => "DateOnly",
            Self::TimeOnly => "TimeOnly",
            Self::TimeSpan => "TimeSpan",
            Self::Convert => "Convert",
            Self::Math => "Math",
            Self::Sql => "Sql",
            Self::Enumerable => "Enumerable",
            Self::Grouping => "IGrouping",
            Self::Object => "Object",
        }
    }
}

/// How the result type of a call is determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnType {
    /// Always this type.
    Fixed(HostType),
    /// The type of the first operand (the target of an instance call).
    Operand,
}

/// A closed set of lowering strategies.
///
/// For instance calls the target is operand 0 followed by the arguments; for
/// static calls the operands are just the arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    /// Apply a function to the operands in order.
    Function {
        /// The function.
        func: SqlFunc,
        /// Result type.
        returns: ReturnType,
    },
    /// `string.Concat(...)`, flattened with any nested concatenation.
    Concat,
    /// `a.Equals(b)` / `Equals(a, b)` as `a=b`.
    Equals,
    /// Collection membership as `x IN (...)`.
    Membership,
    /// `AddDays(n)` and friends; `scale` multiplies `n` before use.
    DateAdd {
        /// The interval unit.
        unit: IntervalUnit,
        /// Multiplier applied to the amount.
        scale: i64,
    },
    /// `Add(TimeSpan)` on a date-time or duration.
    AddSpan,
    /// `Subtract(TimeSpan)` or `Subtract(DateTime)`.
    Subtract,
    /// `Substring(start[, length])` with a zero-based start.
    Substring,
    /// `PadLeft`/`PadRight` with an optional pad character.
    Pad(SqlFunc),
    /// `Trim(chars)` variants that take the characters to strip.
    TrimChars(SqlFunc),
    /// `CAST` to a target type.
    Cast(CastTarget, HostType),
    /// `ToString()` / `ToString(format)`.
    ToString,
    /// `TimeSpan.FromX(n)`; `seconds` is the length of one unit.
    TimeSpanFrom {
        /// Seconds per unit.
        seconds: f64,
    },
    /// An aggregate; a lambda argument binds to the grouped rows.
    Aggregate(AggregateFunc),
    /// `Sql.In(x, values)` / `Sql.NotIn(x, values)`.
    SqlIn {
        /// `NOT IN`.
        negated: bool,
    },
    /// `Sql.Exists(query)` / `Sql.NotExists(query)`.
    SqlExists {
        /// `NOT EXISTS`.
        negated: bool,
    },
    /// The `IsNull(default)` extension: deferred in projections, `IFNULL`
    /// elsewhere.
    IsNullExtension,
    /// `Math.Round(x[, digits])`.
    Round,
    /// Evaluated client-side after fetch; only valid in projections.
    Deferred,
}

/// Translation of an instance member such as `s.Length`.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberTranslation {
    /// The function applied to the target.
    pub func: SqlFunc,
    /// Result type.
    pub returns: HostType,
}

/// Translation of a static member such as `DateTime.Now`.
#[derive(Debug, Clone, PartialEq)]
pub enum StaticMember {
    /// A function evaluated by the database.
    Function {
        /// The function.
        func: SqlFunc,
        /// Result type.
        returns: HostType,
    },
    /// A fixed value, rendered as a literal.
    Value(Value),
}

type MethodKey = (TypeKey, String, usize);

/// The registry of translations.
///
/// # Examples
///
/// ```
/// use exprsql_db::query::translate::{Translation, TranslationTable, TypeKey};
///
/// let table = TranslationTable::shared_default();
/// assert!(matches!(
///     table.lookup_method(TypeKey::String, "Contains", 1),
///     Some(Translation::Function { .. })
/// ));
/// assert!(table.lookup_method(TypeKey::String, "Normalize", 0).is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    methods: HashMap<MethodKey, Translation>,
    members: HashMap<(TypeKey, String), MemberTranslation>,
    statics: HashMap<(TypeKey, String), StaticMember>,
}

static DEFAULT_TABLE: Lazy<Arc<TranslationTable>> =
    Lazy::new(|| Arc::new(TranslationTable::with_defaults()));

impl TranslationTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide default table, built once.
    pub fn shared_default() -> Arc<Self> {
        Arc::clone(&DEFAULT_TABLE)
    }

    /// Registers a method translation.
    pub fn register_method(
        &mut self,
        key: TypeKey,
        method: &str,
        arity: usize,
        translation: Translation,
    ) {
        tracing::trace!(
            type_key = key.name(),
            method,
            arity,
            "registering method translation"
        );
        self.methods.insert((key, method.to_string(), arity), translation);
    }

    /// Registers an instance member translation.
    pub fn register_member(&mut self, key: TypeKey, member: &str, func: SqlFunc, returns: HostType) {
        tracing::trace!(type_key = key.name(), member, "registering member translation");
        self.members
            .insert((key, member.to_string()), MemberTranslation { func, returns });
    }

    /// Registers a static member translation.
    pub fn register_static(&mut self, key: TypeKey, member: &str, translation: StaticMember) {
        tracing::trace!(type_key = key.name(), member, "registering static member");
        self.statics.insert((key, member.to_string()), translation);
    }

    /// Looks up a method: exact, variadic, then the same on `Object`.
    pub fn lookup_method(&self, key: TypeKey, method: &str, arity: usize) -> Option<&Translation> {
        let entry = |k: TypeKey, a: usize| self.methods.get(&(k, method.to_string(), a));
        let found = entry(key, arity)
            .or_else(|| entry(key, VARIADIC))
            .or_else(|| entry(TypeKey::Object, arity))
            .or_else(|| entry(TypeKey::Object, VARIADIC));
        tracing::trace!(
            type_key = key.name(),
            method,
            arity,
            found = found.is_some(),
            "method lookup"
        );
        found
    }

    /// Looks up an instance member.
    pub fn lookup_member(&self, key: TypeKey, member: &str) -> Option<&MemberTranslation> {
        self.members.get(&(key, member.to_string()))
    }

    /// Looks up a static member.
    pub fn lookup_static(&self, key: TypeKey, member: &str) -> Option<&StaticMember> {
        self.statics.get(&(key, member.to_string()))
    }

    /// Builds the table with every built-in translation.
    pub fn with_defaults() -> Self {
        let mut t = Self::new();
        register_string(&mut t);
        register_temporal(&mut t);
        register_numeric(&mut t);
        register_sql(&mut t);
        t
    }
}

fn function(func: SqlFunc, returns: HostType) -> Translation {
    Translation::Function {
        func,
        returns: ReturnType::Fixed(returns),
    }
}

fn same_type(func: SqlFunc) -> Translation {
    Translation::Function {
        func,
        returns: ReturnType::Operand,
    }
}

fn register_string(t: &mut TranslationTable) {
    use TypeKey::String as S;

    t.register_method(S, "Contains", 1, function(SqlFunc::Contains, HostType::Bool));
    t.register_method(S, "StartsWith", 1, function(SqlFunc::StartsWith, HostType::Bool));
    t.register_method(S, "EndsWith", 1, function(SqlFunc::EndsWith, HostType::Bool));
    t.register_method(S, "Trim", 0, function(SqlFunc::Trim, HostType::String));
    t.register_method(S, "TrimStart", 0, function(SqlFunc::LTrim, HostType::String));
    t.register_method(S, "TrimEnd", 0, function(SqlFunc::RTrim, HostType::String));
    t.register_method(S, "Trim", 1, Translation::TrimChars(SqlFunc::TrimBoth));
    t.register_method(S, "TrimStart", 1, Translation::TrimChars(SqlFunc::TrimLeading));
    t.register_method(S, "TrimEnd", 1, Translation::TrimChars(SqlFunc::TrimTrailing));
    for (method, func) in [
        ("ToUpper", SqlFunc::Upper),
        ("ToUpperInvariant", SqlFunc::Upper),
        ("ToLower", SqlFunc::Lower),
        ("ToLowerInvariant", SqlFunc::Lower),
    ] {
        t.register_method(S, method, 0, function(func, HostType::String));
    }
    t.register_method(S, "Substring", 1, Translation::Substring);
    t.register_method(S, "Substring", 2, Translation::Substring);
    t.register_method(S, "IndexOf", 1, function(SqlFunc::IndexOf, HostType::Int32));
    t.register_method(S, "Replace", 2, function(SqlFunc::Replace, HostType::String));
    for arity in [1, 2] {
        t.register_method(S, "PadLeft", arity, Translation::Pad(SqlFunc::PadLeft));
        t.register_method(S, "PadRight", arity, Translation::Pad(SqlFunc::PadRight));
    }
    t.register_method(S, "IsNullOrEmpty", 1, function(SqlFunc::IsNullOrEmpty, HostType::Bool));
    t.register_method(
        S,
        "IsNullOrWhiteSpace",
        1,
        function(SqlFunc::IsNullOrWhiteSpace, HostType::Bool),
    );
    t.register_method(S, "Concat", VARIADIC, Translation::Concat);
    t.register_method(S, "Compare", 2, function(SqlFunc::Compare, HostType::Int32));
    t.register_method(S, "Format", VARIADIC, Translation::Deferred);
    t.register_member(S, "Length", SqlFunc::Length, HostType::Int32);
    t.register_static(S, "Empty", StaticMember::Value(Value::String(String::new())));

    // Fallbacks shared by every type.
    use TypeKey::Object as O;
    t.register_method(O, "Equals", 1, Translation::Equals);
    t.register_method(O, "Equals", 2, Translation::Equals);
    t.register_method(O, "CompareTo", 1, function(SqlFunc::Compare, HostType::Int32));
    t.register_method(O, "ToString", 0, Translation::ToString);
    t.register_method(O, "ToString", 1, Translation::ToString);
    t.register_method(O, "IsNull", 1, Translation::IsNullExtension);
}

fn register_temporal(t: &mut TranslationTable) {
    use TypeKey::{DateOnly as DO, DateTime as DT, TimeOnly as TO, TimeSpan as TS};

    let adders = [
        ("AddYears", IntervalUnit::Year, 1),
        ("AddMonths", IntervalUnit::Month, 1),
        ("AddDays", IntervalUnit::Day, 1),
        ("AddHours", IntervalUnit::Hour, 1),
        ("AddMinutes", IntervalUnit::Minute, 1),
        ("AddSeconds", IntervalUnit::Second, 1),
        ("AddMilliseconds", IntervalUnit::Microsecond, 1000),
    ];
    for (method, unit, scale) in adders {
        t.register_method(DT, method, 1, Translation::DateAdd { unit, scale });
    }
    for (method, unit, scale) in &adders[..3] {
        t.register_method(DO, method, 1, Translation::DateAdd { unit: *unit, scale: *scale });
    }
    for (method, unit, scale) in &adders[3..5] {
        t.register_method(TO, method, 1, Translation::DateAdd { unit: *unit, scale: *scale });
    }
    for key in [DT, TS] {
        t.register_method(key, "Add", 1, Translation::AddSpan);
        t.register_method(key, "Subtract", 1, Translation::Subtract);
    }

    let parts = [
        ("Year", DatePart::Year),
        ("Month", DatePart::Month),
        ("Day", DatePart::Day),
        ("Hour", DatePart::Hour),
        ("Minute", DatePart::Minute),
        ("Second", DatePart::Second),
        ("Millisecond", DatePart::Millisecond),
        ("DayOfWeek", DatePart::DayOfWeek),
        ("DayOfYear", DatePart::DayOfYear),
    ];
    for (member, part) in parts {
        t.register_member(DT, member, SqlFunc::DatePart(part), HostType::Int32);
    }
    t.register_member(DT, "Date", SqlFunc::DatePart(DatePart::Date), HostType::DateTime);
    t.register_member(
        DT,
        "TimeOfDay",
        SqlFunc::DatePart(DatePart::TimeOfDay),
        HostType::TimeSpan,
    );
    for (member, part) in [
        ("Year", DatePart::Year),
        ("Month", DatePart::Month),
        ("Day", DatePart::Day),
        ("DayOfWeek", DatePart::DayOfWeek),
        ("DayOfYear", DatePart::DayOfYear),
    ] {
        t.register_member(DO, member, SqlFunc::DatePart(part), HostType::Int32);
    }
    for (member, part) in [
        ("Hour", DatePart::Hour),
        ("Minute", DatePart::Minute),
        ("Second", DatePart::Second),
        ("Millisecond", DatePart::Millisecond),
    ] {
        t.register_member(TO, member, SqlFunc::DatePart(part), HostType::Int32);
    }

    t.register_static(
        DT,
        "Now",
        StaticMember::Function {
            func: SqlFunc::Now,
            returns: HostType::DateTime,
        },
    );
    t.register_static(
        DT,
        "Today",
        StaticMember::Function {
            func: SqlFunc::Today,
            returns: HostType::DateTime,
        },
    );
    t.register_static(
        DT,
        "UtcNow",
        StaticMember::Function {
            func: SqlFunc::UtcNow,
            returns: HostType::DateTime,
        },
    );
    for (key, member) in [
        (DT, "MinValue"),
        (DT, "MaxValue"),
        (DT, "UnixEpoch"),
        (DO, "MinValue"),
        (DO, "MaxValue"),
        (TO, "MinValue"),
        (TO, "MaxValue"),
        (TS, "Zero"),
    ] {
        if let Some(value) = super::eval::static_value(key.name(), member) {
            t.register_static(key, member, StaticMember::Value(value));
        }
    }

    t.register_method(DT, "DaysInMonth", 2, function(SqlFunc::DaysInMonth, HostType::Int32));
    t.register_method(DT, "IsLeapYear", 1, function(SqlFunc::IsLeapYear, HostType::Bool));
    t.register_method(
        DT,
        "Parse",
        1,
        Translation::Cast(CastTarget::DateTime, HostType::DateTime),
    );
    t.register_method(DT, "Compare", 2, function(SqlFunc::Compare, HostType::Int32));
    t.register_method(
        DO,
        "FromDateTime",
        1,
        function(SqlFunc::DatePart(DatePart::Date), HostType::DateOnly),
    );
    t.register_method(DO, "Parse", 1, Translation::Cast(CastTarget::Date, HostType::DateOnly));
    t.register_method(
        TO,
        "FromDateTime",
        1,
        function(SqlFunc::DatePart(DatePart::TimeOfDay), HostType::TimeOnly),
    );
    t.register_method(TO, "Parse", 1, Translation::Cast(CastTarget::Time, HostType::TimeOnly));

    for (method, seconds) in [
        ("FromDays", 86_400.0),
        ("FromHours", 3600.0),
        ("FromMinutes", 60.0),
        ("FromSeconds", 1.0),
        ("FromMilliseconds", 0.001),
    ] {
        t.register_method(TS, method, 1, Translation::TimeSpanFrom { seconds });
    }
    for (member, part, returns) in [
        ("Days", TimeSpanPart::Days, HostType::Int32),
        ("Hours", TimeSpanPart::Hours, HostType::Int32),
        ("Minutes", TimeSpanPart::Minutes, HostType::Int32),
        ("Seconds", TimeSpanPart::Seconds, HostType::Int32),
        ("Milliseconds", TimeSpanPart::Milliseconds, HostType::Int32),
        ("TotalDays", TimeSpanPart::TotalDays, HostType::Double),
        ("TotalHours", TimeSpanPart::TotalHours, HostType::Double),
        ("TotalMinutes", TimeSpanPart::TotalMinutes, HostType::Double),
        ("TotalSeconds", TimeSpanPart::TotalSeconds, HostType::Double),
        ("TotalMilliseconds", TimeSpanPart::TotalMilliseconds, HostType::Double),
    ] {
        t.register_member(TS, member, SqlFunc::TimeSpanPart(part), returns);
    }
}

fn register_numeric(t: &mut TranslationTable) {
    use TypeKey::{Convert as C, Math as M};

    for (method, target, ty) in [
        ("ToByte", CastTarget::Signed, HostType::Byte),
        ("ToInt16", CastTarget::Signed, HostType::Int16),
        ("ToInt32", CastTarget::Signed, HostType::Int32),
        ("ToInt64", CastTarget::Signed, HostType::Int64),
        ("ToDouble", CastTarget::Double, HostType::Double),
        ("ToSingle", CastTarget::Double, HostType::Double),
        ("ToDecimal", CastTarget::Decimal, HostType::Decimal),
        ("ToString", CastTarget::Char, HostType::String),
        ("ToDateTime", CastTarget::DateTime, HostType::DateTime),
        ("ToBoolean", CastTarget::Boolean, HostType::Bool),
    ] {
        t.register_method(C, method, 1, Translation::Cast(target, ty));
    }

    for (method, func) in [
        ("Abs", SqlFunc::Abs),
        ("Ceiling", SqlFunc::Ceiling),
        ("Floor", SqlFunc::Floor),
        ("Truncate", SqlFunc::Truncate),
    ] {
        t.register_method(M, method, 1, same_type(func));
    }
    t.register_method(M, "Round", 1, Translation::Round);
    t.register_method(M, "Round", 2, Translation::Round);
    t.register_method(M, "Pow", 2, function(SqlFunc::Pow, HostType::Double));
    t.register_method(M, "Sqrt", 1, function(SqlFunc::Sqrt, HostType::Double));
    t.register_method(M, "Exp", 1, function(SqlFunc::Exp, HostType::Double));
    t.register_method(M, "Log", 1, function(SqlFunc::Ln, HostType::Double));
    t.register_method(M, "Log10", 1, function(SqlFunc::Log10, HostType::Double));
    t.register_method(M, "Sign", 1, function(SqlFunc::Sign, HostType::Int32));
    t.register_method(M, "Max", 2, same_type(SqlFunc::Greatest));
    t.register_method(M, "Min", 2, same_type(SqlFunc::Least));
}

fn register_sql(t: &mut TranslationTable) {
    use TypeKey::{Enumerable as E, Grouping as G, Sql as Q};

    t.register_method(E, "Contains", 1, Translation::Membership);
    t.register_method(E, "Contains", 2, Translation::Membership);

    t.register_method(Q, "Count", 0, Translation::Aggregate(AggregateFunc::CountAll));
    t.register_method(Q, "Count", 1, Translation::Aggregate(AggregateFunc::Count));
    t.register_method(Q, "CountDistinct", 1, Translation::Aggregate(AggregateFunc::CountDistinct));
    t.register_method(Q, "Sum", 1, Translation::Aggregate(AggregateFunc::Sum));
    t.register_method(Q, "Avg", 1, Translation::Aggregate(AggregateFunc::Avg));
    t.register_method(Q, "Max", 1, Translation::Aggregate(AggregateFunc::Max));
    t.register_method(Q, "Min", 1, Translation::Aggregate(AggregateFunc::Min));
    t.register_method(Q, "In", 2, Translation::SqlIn { negated: false });
    t.register_method(Q, "NotIn", 2, Translation::SqlIn { negated: true });
    t.register_method(Q, "Exists", 1, Translation::SqlExists { negated: false });
    t.register_method(Q, "NotExists", 1, Translation::SqlExists { negated: true });
    t.register_method(Q, "IsNull", 2, same_type(SqlFunc::IfNull));
    t.register_method(Q, "Coalesce", VARIADIC, same_type(SqlFunc::Coalesce));

    t.register_method(G, "Count", 0, Translation::Aggregate(AggregateFunc::CountAll));
    t.register_method(G, "LongCount", 0, Translation::Aggregate(AggregateFunc::CountAll));
    t.register_method(G, "Sum", 1, Translation::Aggregate(AggregateFunc::Sum));
    t.register_method(G, "Average", 1, Translation::Aggregate(AggregateFunc::Avg));
    t.register_method(G, "Max", 1, Translation::Aggregate(AggregateFunc::Max));
    t.register_method(G, "Min", 1, Translation::Aggregate(AggregateFunc::Min));
}
