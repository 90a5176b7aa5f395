//! SQL dialect back ends.
//!
//! The walker produces dialect-neutral [`SqlFunc`] nodes; a [`SqlDialect`]
//! turns each into a template such as `DATE_ADD({0},INTERVAL {1} DAY)`.
//! Template placeholders are `{N}` for the N-th argument and `{*}` for all
//! arguments joined by `,`. [`MySqlDialect`] is the shipped back end.

use std::borrow::Cow;
use std::fmt::Debug;

use exprsql_core::{SqlError, SqlResult};
use once_cell::sync::Lazy;
use regex::Regex;

/// Interval units for date arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntervalUnit {
    /// Years.
    Year,
    /// Months.
    Month,
    /// Days.
    Day,
    /// Hours.
    Hour,
    /// Minutes.
    Minute,
    /// Seconds.
    Second,
    /// Microseconds.
    Microsecond,
}

impl IntervalUnit {
    /// The SQL keyword of this unit.
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Year => "YEAR",
            Self::Month => "MONTH",
            Self::Day => "DAY",
            Self::Hour => "HOUR",
            Self::Minute => "MINUTE",
            Self::Second => "SECOND",
            Self::Microsecond => "MICROSECOND",
        }
    }
}

/// Parts extracted from a date or time value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePart {
    /// Year.
    Year,
    /// Month (1-12).
    Month,
    /// Day of month.
    Day,
    /// Hour.
    Hour,
    /// Minute.
    Minute,
    /// Second.
    Second,
    /// Millisecond.
    Millisecond,
    /// Day of week, Sunday = 0.
    DayOfWeek,
    /// Day of year.
    DayOfYear,
    /// The date portion.
    Date,
    /// The time-of-day portion.
    TimeOfDay,
}

/// Components of a duration stored as a TIME column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeSpanPart {
    /// Whole days.
    Days,
    /// Hours component (0-23).
    Hours,
    /// Minutes component (0-59).
    Minutes,
    /// Seconds component (0-59).
    Seconds,
    /// Milliseconds component.
    Milliseconds,
    /// Fractional total days.
    TotalDays,
    /// Fractional total hours.
    TotalHours,
    /// Fractional total minutes.
    TotalMinutes,
    /// Total seconds.
    TotalSeconds,
    /// Total milliseconds.
    TotalMilliseconds,
}

/// Targets of `CAST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastTarget {
    /// Signed integer.
    Signed,
    /// Double.
    Double,
    /// Exact decimal.
    Decimal,
    /// Character data.
    Char,
    /// Date and time.
    DateTime,
    /// Date.
    Date,
    /// Time.
    Time,
    /// Boolean (non-zero test).
    Boolean,
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunc {
    /// `COUNT(1)`.
    CountAll,
    /// `COUNT(x)`.
    Count,
    /// `COUNT(DISTINCT x)`.
    CountDistinct,
    /// `SUM(x)`.
    Sum,
    /// `AVG(x)`.
    Avg,
    /// `MAX(x)`.
    Max,
    /// `MIN(x)`.
    Min,
}

/// Dialect-neutral SQL functions and operator templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlFunc {
    // ── Strings ──────────────────────────────────────────────────────
    /// Concatenation of all arguments.
    Concat,
    /// Upper case.
    Upper,
    /// Lower case.
    Lower,
    /// Trim whitespace on both sides.
    Trim,
    /// Trim leading whitespace.
    LTrim,
    /// Trim trailing whitespace.
    RTrim,
    /// Trim a given string on both sides.
    TrimBoth,
    /// Trim a given string at the start.
    TrimLeading,
    /// Trim a given string at the end.
    TrimTrailing,
    /// Character length.
    Length,
    /// Substring from a 1-based position to the end.
    Substring,
    /// Substring from a 1-based position with a length.
    SubstringLength,
    /// Zero-based position of `{1}` within `{0}`, -1 when absent.
    IndexOf,
    /// Replace all occurrences.
    Replace,
    /// Left pad.
    PadLeft,
    /// Right pad.
    PadRight,
    /// `{0}` contains `{1}`.
    Contains,
    /// `{0}` starts with `{1}`.
    StartsWith,
    /// `{0}` ends with `{1}`.
    EndsWith,
    /// Null or empty string test.
    IsNullOrEmpty,
    /// Null, empty, or whitespace-only string test.
    IsNullOrWhiteSpace,
    /// Three-way comparison yielding -1, 0, or 1.
    Compare,

    // ── Dates and times ──────────────────────────────────────────────
    /// Current local date and time.
    Now,
    /// Current date.
    Today,
    /// Current UTC date and time.
    UtcNow,
    /// Add an interval.
    DateAdd(IntervalUnit),
    /// Subtract an interval.
    DateSub(IntervalUnit),
    /// Add a duration.
    AddTime,
    /// Subtract a duration.
    SubTime,
    /// Difference of two date-times as a duration.
    TimeDiff,
    /// Extract a part.
    DatePart(DatePart),
    /// Days in a given year and month.
    DaysInMonth,
    /// Whether a year is a leap year.
    IsLeapYear,
    /// Format a date with a dialect format string.
    DateFormat,
    /// Seconds to a duration.
    SecToTime,
    /// Extract a duration component.
    TimeSpanPart(TimeSpanPart),

    // ── Conversion ───────────────────────────────────────────────────
    /// `CAST`.
    Cast(CastTarget),

    // ── Math ─────────────────────────────────────────────────────────
    /// Absolute value.
    Abs,
    /// Round up.
    Ceiling,
    /// Round down.
    Floor,
    /// Round to integer.
    Round,
    /// Round to `{1}` digits.
    RoundDigits,
    /// Truncate toward zero.
    Truncate,
    /// Power.
    Pow,
    /// Square root.
    Sqrt,
    /// Sign.
    Sign,
    /// Natural exponent.
    Exp,
    /// Natural logarithm.
    Ln,
    /// Base-10 logarithm.
    Log10,
    /// Greatest of the arguments.
    Greatest,
    /// Least of the arguments.
    Least,

    // ── Nulls ────────────────────────────────────────────────────────
    /// First non-null argument.
    Coalesce,
    /// `{0}` unless null, else `{1}`.
    IfNull,

    // ── Aggregates ───────────────────────────────────────────────────
    /// An aggregate.
    Aggregate(AggregateFunc),
}

impl SqlFunc {
    /// Returns `true` for functions whose template is a bare (unparenthesized)
    /// predicate, such as `{0} LIKE ...`. Those need parentheses when nested
    /// inside tighter operators.
    pub const fn is_bare_predicate(self) -> bool {
        matches!(self, Self::Contains | Self::StartsWith | Self::EndsWith)
    }

    /// Returns `true` for functions that yield a boolean predicate.
    pub const fn is_predicate(self) -> bool {
        matches!(
            self,
            Self::Contains
                | Self::StartsWith
                | Self::EndsWith
                | Self::IsNullOrEmpty
                | Self::IsNullOrWhiteSpace
                | Self::IsLeapYear
                | Self::Cast(CastTarget::Boolean)
        )
    }

    /// Returns `true` for aggregate functions.
    pub const fn is_aggregate(self) -> bool {
        matches!(self, Self::Aggregate(_))
    }
}

/// A SQL dialect back end.
///
/// Implementations must be thread-safe; compilers share them through
/// `Arc<dyn SqlDialect>`.
pub trait SqlDialect: Debug + Send + Sync {
    /// The dialect name, e.g. `"mysql"`.
    fn name(&self) -> &'static str;

    /// Quotes an identifier.
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quotes a string literal.
    fn quote_string(&self, value: &str) -> String;

    /// The literal text of a boolean.
    fn bool_literal(&self, value: bool) -> &'static str;

    /// The template of a function.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::UnsupportedTranslation`] if the dialect cannot
    /// express the function.
    fn function_template(&self, func: SqlFunc) -> SqlResult<Cow<'static, str>>;

    /// Converts a host date format string (`yyyy-MM-dd`) to the dialect's
    /// format string, or `None` if it contains untranslatable tokens.
    fn convert_date_format(&self, format: &str) -> Option<String>;

    /// The `LIMIT`/`OFFSET` clause including its leading space, or an empty
    /// string.
    fn limit_clause(&self, limit: Option<usize>, offset: Option<usize>) -> String;

    /// A possibly schema-qualified table name.
    fn qualified_table(&self, table: &str, schema: Option<&str>) -> String {
        match schema {
            Some(schema) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(table)
            ),
            None => self.quote_identifier(table),
        }
    }
}

/// The MySQL dialect.
///
/// # Examples
///
/// ```
/// use exprsql_db::query::dialect::{MySqlDialect, SqlDialect, SqlFunc};
///
/// let d = MySqlDialect;
/// assert_eq!(d.quote_identifier("User"), "`User`");
/// assert_eq!(d.quote_string("it's"), "'it''s'");
/// assert_eq!(d.function_template(SqlFunc::Upper).unwrap(), "UPPER({0})");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn quote_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    fn function_template(&self, func: SqlFunc) -> SqlResult<Cow<'static, str>> {
        let template: &'static str = match func {
            SqlFunc::Concat => "CONCAT({*})",
            SqlFunc::Upper => "UPPER({0})",
            SqlFunc::Lower => "LOWER({0})",
            SqlFunc::Trim => "TRIM({0})",
            SqlFunc::LTrim => "LTRIM({0})",
            SqlFunc::RTrim => "RTRIM({0})",
            SqlFunc::TrimBoth => "TRIM(BOTH {1} FROM {0})",
            SqlFunc::TrimLeading => "TRIM(LEADING {1} FROM {0})",
            SqlFunc::TrimTrailing => "TRIM(TRAILING {1} FROM {0})",
            SqlFunc::Length => "CHAR_LENGTH({0})",
            SqlFunc::Substring => "SUBSTR({0},{1})",
            SqlFunc::SubstringLength => "SUBSTR({0},{1},{2})",
            SqlFunc::IndexOf => "(LOCATE({1},{0})-1)",
            SqlFunc::Replace => "REPLACE({0},{1},{2})",
            SqlFunc::PadLeft => "LPAD({0},{1},{2})",
            SqlFunc::PadRight => "RPAD({0},{1},{2})",
            SqlFunc::Contains => "{0} LIKE CONCAT('%',{1},'%')",
            SqlFunc::StartsWith => "{0} LIKE CONCAT({1},'%')",
            SqlFunc::EndsWith => "{0} LIKE CONCAT('%',{1})",
            SqlFunc::IsNullOrEmpty => "({0} IS NULL OR {0}='')",
            SqlFunc::IsNullOrWhiteSpace => "({0} IS NULL OR TRIM({0})='')",
            SqlFunc::Compare => "(CASE WHEN {0}={1} THEN 0 WHEN {0}>{1} THEN 1 ELSE -1 END)",
            SqlFunc::Now => "NOW()",
            SqlFunc::Today => "CURDATE()",
            SqlFunc::UtcNow => "UTC_TIMESTAMP()",
            SqlFunc::DateAdd(unit) => {
                return Ok(Cow::Owned(format!(
                    "DATE_ADD({{0}},INTERVAL {{1}} {})",
                    unit.keyword()
                )))
            }
            SqlFunc::DateSub(unit) => {
                return Ok(Cow::Owned(format!(
                    "DATE_SUB({{0}},INTERVAL {{1}} {})",
                    unit.keyword()
                )))
            }
            SqlFunc::AddTime => "ADDTIME({0},{1})",
            SqlFunc::SubTime => "SUBTIME({0},{1})",
            SqlFunc::TimeDiff => "TIMEDIFF({0},{1})",
            SqlFunc::DatePart(part) => match part {
                DatePart::Year => "YEAR({0})",
                DatePart::Month => "MONTH({0})",
                DatePart::Day => "DAY({0})",
                DatePart::Hour => "HOUR({0})",
                DatePart::Minute => "MINUTE({0})",
                DatePart::Second => "SECOND({0})",
                DatePart::Millisecond => "(MICROSECOND({0}) DIV 1000)",
                DatePart::DayOfWeek => "(DAYOFWEEK({0})-1)",
                DatePart::DayOfYear => "DAYOFYEAR({0})",
                DatePart::Date => "DATE({0})",
                DatePart::TimeOfDay => "TIME({0})",
            },
            SqlFunc::DaysInMonth => {
                "(CASE WHEN {1}=2 THEN (CASE WHEN ({0}%4=0 AND {0}%100<>0) OR {0}%400=0 THEN 29 ELSE 28 END) WHEN {1} IN (4,6,9,11) THEN 30 ELSE 31 END)"
            }
            SqlFunc::IsLeapYear => "(({0}%4=0 AND {0}%100<>0) OR {0}%400=0)",
            SqlFunc::DateFormat => "DATE_FORMAT({0},{1})",
            SqlFunc::SecToTime => "SEC_TO_TIME({0})",
            SqlFunc::TimeSpanPart(part) => match part {
                TimeSpanPart::Days => "FLOOR(TIME_TO_SEC({0})/86400)",
                TimeSpanPart::Hours => "(FLOOR(TIME_TO_SEC({0})/3600)%24)",
                TimeSpanPart::Minutes => "(FLOOR(TIME_TO_SEC({0})/60)%60)",
                TimeSpanPart::Seconds => "(FLOOR(TIME_TO_SEC({0}))%60)",
                TimeSpanPart::Milliseconds => "(MICROSECOND({0}) DIV 1000)",
                TimeSpanPart::TotalDays => "(TIME_TO_SEC({0})/86400)",
                TimeSpanPart::TotalHours => "(TIME_TO_SEC({0})/3600)",
                TimeSpanPart::TotalMinutes => "(TIME_TO_SEC({0})/60)",
                TimeSpanPart::TotalSeconds => "TIME_TO_SEC({0})",
                TimeSpanPart::TotalMilliseconds => "(TIME_TO_SEC({0})*1000)",
            },
            SqlFunc::Cast(target) => match target {
                CastTarget::Signed => "CAST({0} AS SIGNED)",
                CastTarget::Double => "CAST({0} AS DOUBLE)",
                CastTarget::Decimal => "CAST({0} AS DECIMAL(36,18))",
                CastTarget::Char => "CAST({0} AS CHAR)",
                CastTarget::DateTime => "CAST({0} AS DATETIME)",
                CastTarget::Date => "CAST({0} AS DATE)",
                CastTarget::Time => "CAST({0} AS TIME)",
                CastTarget::Boolean => "({0}<>0)",
            },
            SqlFunc::Abs => "ABS({0})",
            SqlFunc::Ceiling => "CEILING({0})",
            SqlFunc::Floor => "FLOOR({0})",
            SqlFunc::Round => "ROUND({0})",
            SqlFunc::RoundDigits => "ROUND({0},{1})",
            SqlFunc::Truncate => "TRUNCATE({0},0)",
            SqlFunc::Pow => "POW({0},{1})",
            SqlFunc::Sqrt => "SQRT({0})",
            SqlFunc::Sign => "SIGN({0})",
            SqlFunc::Exp => "EXP({0})",
            SqlFunc::Ln => "LN({0})",
            SqlFunc::Log10 => "LOG10({0})",
            SqlFunc::Greatest => "GREATEST({*})",
            SqlFunc::Least => "LEAST({*})",
            SqlFunc::Coalesce => "COALESCE({*})",
            SqlFunc::IfNull => "IFNULL({0},{1})",
            SqlFunc::Aggregate(agg) => match agg {
                AggregateFunc::CountAll => "COUNT(1)",
                AggregateFunc::Count => "COUNT({0})",
                AggregateFunc::CountDistinct => "COUNT(DISTINCT {0})",
                AggregateFunc::Sum => "SUM({0})",
                AggregateFunc::Avg => "AVG({0})",
                AggregateFunc::Max => "MAX({0})",
                AggregateFunc::Min => "MIN({0})",
            },
        };
        Ok(Cow::Borrowed(template))
    }

    fn convert_date_format(&self, format: &str) -> Option<String> {
        static TOKEN: Lazy<Option<Regex>> = Lazy::new(|| {
            Regex::new(r"yyyy|yy|MMMM|MMM|MM|M|dddd|ddd|dd|d|HH|H|hh|h|mm|ss|ffffff|fff|tt|[A-Za-z]+|.")
                .ok()
        });
        let token_re = TOKEN.as_ref()?;

        let mut out = String::with_capacity(format.len() * 2);
        for m in token_re.find_iter(format) {
            let piece = match m.as_str() {
                "yyyy" => "%Y",
                "yy" => "%y",
                "MMMM" => "%M",
                "MMM" => "%b",
                "MM" => "%m",
                "M" => "%c",
                "dddd" => "%W",
                "ddd" => "%a",
                "dd" => "%d",
                "d" => "%e",
                "HH" => "%H",
                "H" => "%k",
                "hh" => "%h",
                "h" => "%l",
                "mm" => "%i",
                "ss" => "%s",
                "ffffff" => "%f",
                "tt" => "%p",
                "%" => "%%",
                other if other.chars().all(|c| c.is_ascii_alphabetic()) => return None,
                other => other,
            };
            out.push_str(piece);
        }
        Some(out)
    }

    fn limit_clause(&self, limit: Option<usize>, offset: Option<usize>) -> String {
        match (limit, offset) {
            (Some(limit), Some(offset)) if offset > 0 => format!(" LIMIT {limit} OFFSET {offset}"),
            (Some(limit), _) => format!(" LIMIT {limit}"),
            (None, Some(offset)) if offset > 0 => {
                format!(" LIMIT 18446744073709551615 OFFSET {offset}")
            }
            (None, _) => String::new(),
        }
    }
}

/// Returns the dialect registered under `name`.
///
/// # Errors
///
/// Returns [`SqlError::ConfigurationError`] for an unknown dialect name.
pub fn dialect_by_name(name: &str) -> SqlResult<std::sync::Arc<dyn SqlDialect>> {
    match name.trim().to_lowercase().as_str() {
        "mysql" | "mariadb" => Ok(std::sync::Arc::new(MySqlDialect)),
        other => Err(SqlError::ConfigurationError(format!(
            "Unsupported SQL dialect: '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_escapes_backtick() {
        assert_eq!(MySqlDialect.quote_identifier("a`b"), "`a``b`");
    }

    #[test]
    fn test_quote_string_escapes() {
        assert_eq!(MySqlDialect.quote_string(r"a\b"), r"'a\\b'");
        assert_eq!(MySqlDialect.quote_string("O'Neil"), "'O''Neil'");
    }

    #[test]
    fn test_date_add_template() {
        assert_eq!(
            MySqlDialect
                .function_template(SqlFunc::DateAdd(IntervalUnit::Day))
                .unwrap(),
            "DATE_ADD({0},INTERVAL {1} DAY)"
        );
        assert_eq!(
            MySqlDialect
                .function_template(SqlFunc::DateSub(IntervalUnit::Month))
                .unwrap(),
            "DATE_SUB({0},INTERVAL {1} MONTH)"
        );
    }

    #[test]
    fn test_like_templates() {
        assert_eq!(
            MySqlDialect.function_template(SqlFunc::Contains).unwrap(),
            "{0} LIKE CONCAT('%',{1},'%')"
        );
        assert!(SqlFunc::Contains.is_bare_predicate());
        assert!(!SqlFunc::IsNullOrEmpty.is_bare_predicate());
        assert!(SqlFunc::IsNullOrEmpty.is_predicate());
    }

    #[test]
    fn test_convert_date_format() {
        assert_eq!(
            MySqlDialect.convert_date_format("yyyy-MM-dd HH:mm:ss").as_deref(),
            Some("%Y-%m-%d %H:%i:%s")
        );
        assert_eq!(
            MySqlDialect.convert_date_format("dd/MM/yy").as_deref(),
            Some("%d/%m/%y")
        );
        assert_eq!(MySqlDialect.convert_date_format("yyyy zzz"), None);
    }

    #[test]
    fn test_limit_clause() {
        assert_eq!(MySqlDialect.limit_clause(Some(10), None), " LIMIT 10");
        assert_eq!(MySqlDialect.limit_clause(Some(10), Some(20)), " LIMIT 10 OFFSET 20");
        assert_eq!(
            MySqlDialect.limit_clause(None, Some(5)),
            " LIMIT 18446744073709551615 OFFSET 5"
        );
        assert_eq!(MySqlDialect.limit_clause(None, None), "");
    }

    #[test]
    fn test_qualified_table() {
        assert_eq!(MySqlDialect.qualified_table("Order", None), "`Order`");
        assert_eq!(
            MySqlDialect.qualified_table("Order", Some("sales")),
            "`sales`.`Order`"
        );
    }

    #[test]
    fn test_dialect_by_name() {
        assert_eq!(dialect_by_name("MySQL").unwrap().name(), "mysql");
        assert!(matches!(
            dialect_by_name("oracle"),
            Err(SqlError::ConfigurationError(_))
        ));
    }
}
