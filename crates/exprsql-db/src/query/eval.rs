//! Host-side evaluation of expression subtrees.
//!
//! The walker folds subtrees that reference no lambda parameter (constants,
//! captured values, static members and calls over them) into a single value
//! before translation. Deferred projections reuse the same evaluator after
//! fetch, with lambda members bound to the fetched column values.
//!
//! Every entry point returns `None` when a subtree cannot be evaluated on
//! the host; callers then fall back to SQL translation (or report an error).

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use super::expr::{BinaryOp, Expr, UnaryOp};
use crate::value::{HostType, Record, Value};

/// Values bound to `(lambda parameter, member)` pairs.
pub type Bindings = HashMap<(String, String), Value>;

/// Evaluates `expr` with no lambda bindings.
///
/// # Examples
///
/// ```
/// use exprsql_db::query::eval::evaluate;
/// use exprsql_db::query::expr::constant;
/// use exprsql_db::value::Value;
///
/// let upper = constant("_AbCd").call("ToUpper", vec![]);
/// assert_eq!(evaluate(&upper), Some(Value::from("_ABCD")));
/// ```
pub fn evaluate(expr: &Expr) -> Option<Value> {
    Evaluator { bindings: None }.eval(expr)
}

/// Evaluates `expr` with lambda members resolved through `bindings`.
pub fn evaluate_with(expr: &Expr, bindings: &Bindings) -> Option<Value> {
    Evaluator {
        bindings: Some(bindings),
    }
    .eval(expr)
}

/// The value of a constant static member such as `DateOnly.MinValue`.
pub fn static_value(type_name: &str, member: &str) -> Option<Value> {
    let min_date = NaiveDate::from_ymd_opt(1, 1, 1)?;
    let max_date = NaiveDate::from_ymd_opt(9999, 12, 31)?;
    Some(match (type_name, member) {
        ("DateTime", "MinValue") => Value::DateTime(min_date.and_hms_opt(0, 0, 0)?),
        ("DateTime", "MaxValue") => {
            Value::DateTime(max_date.and_hms_milli_opt(23, 59, 59, 999)?)
        }
        ("DateTime", "UnixEpoch") => {
            Value::DateTime(NaiveDate::from_ymd_opt(1970, 1, 1)?.and_hms_opt(0, 0, 0)?)
        }
        ("DateOnly", "MinValue") => Value::Date(min_date),
        ("DateOnly", "MaxValue") => Value::Date(max_date),
        ("TimeOnly", "MinValue") => Value::Time(NaiveTime::MIN),
        ("TimeOnly", "MaxValue") => {
            Value::Time(NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)?)
        }
        ("TimeSpan", "Zero") => Value::TimeSpan(Duration::zero()),
        ("String" | "string", "Empty") => Value::String(String::new()),
        _ => return None,
    })
}

/// Formats a value with a host format string (`yyyy-MM-dd`, `F2`, `0.00`).
pub fn format_value(value: &Value, format: &str) -> Option<String> {
    match value {
        Value::DateTime(dt) => Some(dt.format(&chrono_format(format)?).to_string()),
        Value::Date(d) => Some(d.format(&chrono_format(format)?).to_string()),
        Value::Time(t) => Some(t.format(&chrono_format(format)?).to_string()),
        Value::Int(_) | Value::Float(_) | Value::Decimal(_) => {
            let digits = numeric_digits(format)?;
            Some(format!("{:.*}", digits, value.as_float()?))
        }
        _ => None,
    }
}

fn numeric_digits(format: &str) -> Option<usize> {
    let upper = format.to_ascii_uppercase();
    if let Some(rest) = upper.strip_prefix('F').or_else(|| upper.strip_prefix('N')) {
        return if rest.is_empty() { Some(2) } else { rest.parse().ok() };
    }
    if format.chars().all(|c| c == '0' || c == '#' || c == '.') {
        return Some(format.split_once('.').map_or(0, |(_, frac)| frac.len()));
    }
    None
}

fn chrono_format(format: &str) -> Option<String> {
    const TOKENS: [(&str, &str); 19] = [
        ("yyyy", "%Y"),
        ("yy", "%y"),
        ("MMMM", "%B"),
        ("MMM", "%b"),
        ("MM", "%m"),
        ("M", "%-m"),
        ("dddd", "%A"),
        ("ddd", "%a"),
        ("dd", "%d"),
        ("d", "%-d"),
        ("HH", "%H"),
        ("H", "%-H"),
        ("hh", "%I"),
        ("h", "%-I"),
        ("mm", "%M"),
        ("ss", "%S"),
        ("ffffff", "%6f"),
        ("fff", "%3f"),
        ("tt", "%p"),
    ];
    let mut out = String::new();
    let mut rest = format;
    'outer: while let Some(c) = rest.chars().next() {
        for (token, replacement) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(replacement);
                rest = tail;
                continue 'outer;
            }
        }
        if c.is_ascii_alphabetic() {
            return None;
        }
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    Some(out)
}

/// Expands `{0}` / `{1:fmt}` placeholders of a composite format string.
pub fn composite_format(format: &str, args: &[Value]) -> Option<String> {
    let mut out = String::new();
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut spec = String::new();
                for next in chars.by_ref() {
                    if next == '}' {
                        break;
                    }
                    spec.push(next);
                }
                let (index, fmt) = match spec.split_once(':') {
                    Some((i, f)) => (i, Some(f)),
                    None => (spec.as_str(), None),
                };
                let value = args.get(index.trim().parse::<usize>().ok()?)?;
                match fmt {
                    Some(fmt) => out.push_str(&format_value(value, fmt)?),
                    None => out.push_str(&value.to_concat_string()),
                }
            }
            other => out.push(other),
        }
    }
    Some(out)
}

struct Evaluator<'a> {
    bindings: Option<&'a Bindings>,
}

impl Evaluator<'_> {
    fn eval(&self, expr: &Expr) -> Option<Value> {
        match expr {
            Expr::Constant(v) | Expr::Captured { value: v, .. } => Some(v.clone()),
            Expr::Static { type_name, member } => static_value(type_name, member),
            Expr::Member { target, member } => {
                if let Expr::Param(p) = target.as_ref() {
                    return self
                        .bindings?
                        .get(&(p.clone(), member.clone()))
                        .cloned();
                }
                member_value(&self.eval(target)?, member)
            }
            Expr::Convert { operand, to } => convert_value(self.eval(operand)?, to),
            Expr::Unary { op, operand } => {
                let v = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Some(Value::Bool(!v.as_bool()?)),
                    UnaryOp::Negate => negate(&v),
                }
            }
            Expr::Binary { op, left, right } => self.binary(*op, left, right),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => {
                if self.eval(test)?.as_bool()? {
                    self.eval(if_true)
                } else {
                    self.eval(if_false)
                }
            }
            Expr::NewArray(items) => items
                .iter()
                .map(|e| self.eval(e))
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            Expr::New(members) => {
                let mut record = Record::new();
                for (name, e) in members {
                    record.set(name.clone(), self.eval(e)?);
                }
                Some(Value::Record(record))
            }
            Expr::Call {
                target,
                type_name,
                method,
                args,
            } => {
                let args = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<Option<Vec<_>>>()?;
                match (target, type_name) {
                    (Some(target), _) => instance_call(&self.eval(target)?, method, &args),
                    (None, Some(type_name)) => static_call(type_name, method, &args),
                    (None, None) => None,
                }
            }
            Expr::Lambda { .. } | Expr::Param(_) | Expr::Query(_) => None,
        }
    }

    fn binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Option<Value> {
        match op {
            BinaryOp::And => {
                if !self.eval(left)?.as_bool()? {
                    return Some(Value::Bool(false));
                }
                Some(Value::Bool(self.eval(right)?.as_bool()?))
            }
            BinaryOp::Or => {
                if self.eval(left)?.as_bool()? {
                    return Some(Value::Bool(true));
                }
                Some(Value::Bool(self.eval(right)?.as_bool()?))
            }
            BinaryOp::Coalesce => {
                let l = self.eval(left)?;
                if l.is_null() {
                    self.eval(right)
                } else {
                    Some(l)
                }
            }
            _ => binary_value(op, &self.eval(left)?, &self.eval(right)?),
        }
    }
}

fn binary_value(op: BinaryOp, l: &Value, r: &Value) -> Option<Value> {
    match op {
        BinaryOp::Eq => Some(Value::Bool(values_equal(l, r))),
        BinaryOp::Ne => Some(Value::Bool(!values_equal(l, r))),
        BinaryOp::Lt => Some(Value::Bool(compare_values(l, r)? == Ordering::Less)),
        BinaryOp::Le => Some(Value::Bool(compare_values(l, r)? != Ordering::Greater)),
        BinaryOp::Gt => Some(Value::Bool(compare_values(l, r)? == Ordering::Greater)),
        BinaryOp::Ge => Some(Value::Bool(compare_values(l, r)? != Ordering::Less)),
        BinaryOp::Add => match (l, r) {
            (Value::String(_), _) | (_, Value::String(_)) => Some(Value::String(format!(
                "{}{}",
                l.to_concat_string(),
                r.to_concat_string()
            ))),
            (Value::DateTime(dt), Value::TimeSpan(ts)) => dt.checked_add_signed(*ts).map(Value::DateTime),
            (Value::Time(t), Value::TimeSpan(ts)) => Some(Value::Time(t.overflowing_add_signed(*ts).0)),
            (Value::TimeSpan(a), Value::TimeSpan(b)) => a.checked_add(b).map(Value::TimeSpan),
            _ => arithmetic(op, l, r),
        },
        BinaryOp::Sub => match (l, r) {
            (Value::DateTime(dt), Value::TimeSpan(ts)) => dt.checked_sub_signed(*ts).map(Value::DateTime),
            (Value::DateTime(a), Value::DateTime(b)) => Some(Value::TimeSpan(*a - *b)),
            (Value::TimeSpan(a), Value::TimeSpan(b)) => a.checked_sub(b).map(Value::TimeSpan),
            _ => arithmetic(op, l, r),
        },
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => arithmetic(op, l, r),
        BinaryOp::BitAnd | BinaryOp::BitOr => match (l, r) {
            (Value::Bool(a), Value::Bool(b)) => Some(Value::Bool(if op == BinaryOp::BitAnd {
                *a && *b
            } else {
                *a || *b
            })),
            _ => {
                let (a, b) = (int_of(l)?, int_of(r)?);
                Some(Value::Int(if op == BinaryOp::BitAnd { a & b } else { a | b }))
            }
        },
        BinaryOp::And | BinaryOp::Or | BinaryOp::Coalesce => None,
    }
}

fn int_of(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(*i),
        Value::Enum(e) => Some(e.underlying),
        _ => None,
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Option<Value> {
    if let (Value::Int(a), Value::Int(b)) = (l, r) {
        return match op {
            BinaryOp::Add => a.checked_add(*b),
            BinaryOp::Sub => a.checked_sub(*b),
            BinaryOp::Mul => a.checked_mul(*b),
            BinaryOp::Div => a.checked_div(*b),
            BinaryOp::Mod => a.checked_rem(*b),
            _ => None,
        }
        .map(Value::Int);
    }
    let (a, b) = (l.as_float()?, r.as_float()?);
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div if b != 0.0 => a / b,
        BinaryOp::Mod if b != 0.0 => a % b,
        _ => return None,
    };
    let decimal = matches!(l, Value::Decimal(_)) || matches!(r, Value::Decimal(_));
    let float = matches!(l, Value::Float(_)) || matches!(r, Value::Float(_));
    Some(if decimal && !float {
        Value::Decimal(result.to_string())
    } else {
        Value::Float(result)
    })
}

fn negate(v: &Value) -> Option<Value> {
    match v {
        Value::Int(i) => i.checked_neg().map(Value::Int),
        Value::Float(f) => Some(Value::Float(-f)),
        Value::Decimal(d) => Some(Value::Decimal(match d.strip_prefix('-') {
            Some(positive) => positive.to_string(),
            None => format!("-{d}"),
        })),
        Value::TimeSpan(ts) => Some(Value::TimeSpan(-*ts)),
        _ => None,
    }
}

/// Host equality; `null` equals only `null`.
pub fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => compare_values(l, r).map_or(l == r, |o| o == Ordering::Equal),
    }
}

/// Host ordering of two comparable values.
pub fn compare_values(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
        (Value::TimeSpan(a), Value::TimeSpan(b)) => Some(a.cmp(b)),
        (Value::Guid(a), Value::Guid(b)) => Some(a.cmp(b)),
        (Value::Enum(a), Value::Enum(b)) if a.type_name == b.type_name => {
            Some(a.underlying.cmp(&b.underlying))
        }
        _ => l.as_float()?.partial_cmp(&r.as_float()?),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn convert_value(value: Value, to: &HostType) -> Option<Value> {
    if value.is_null() {
        return Some(value);
    }
    Some(match to {
        HostType::Byte | HostType::Int16 | HostType::Int32 | HostType::Int64 => match value {
            Value::Int(_) => value,
            Value::Enum(e) => Value::Int(e.underlying),
            Value::Float(f) => Value::Int(f.trunc() as i64),
            Value::Decimal(ref d) => Value::Int(d.parse::<f64>().ok()?.trunc() as i64),
            Value::Bool(b) => Value::Int(i64::from(b)),
            _ => return None,
        },
        HostType::Double => Value::Float(value.as_float()?),
        HostType::Decimal => match value {
            Value::Decimal(_) => value,
            other => Value::Decimal(other.as_float()?.to_string()),
        },
        HostType::String => Value::String(value.to_concat_string()),
        _ => value,
    })
}

#[allow(clippy::cast_precision_loss)]
fn member_value(target: &Value, member: &str) -> Option<Value> {
    let int = |v: u32| Some(Value::Int(i64::from(v)));
    match (target, member) {
        (Value::Record(record), m) => record.get(m).cloned(),
        (Value::Null, "HasValue") => Some(Value::Bool(false)),
        (_, "HasValue") => Some(Value::Bool(true)),
        (_, "Value") if !target.is_null() => Some(target.clone()),
        (Value::String(s), "Length") => Some(Value::Int(i64::try_from(s.chars().count()).ok()?)),
        (Value::List(items), "Length" | "Count") => Some(Value::Int(i64::try_from(items.len()).ok()?)),
        (Value::DateTime(dt), m) => match m {
            "Year" => Some(Value::Int(i64::from(dt.year()))),
            "Month" => int(dt.month()),
            "Day" => int(dt.day()),
            "Hour" => int(dt.hour()),
            "Minute" => int(dt.minute()),
            "Second" => int(dt.second()),
            "Millisecond" => int(dt.nanosecond() / 1_000_000),
            "DayOfWeek" => int(dt.weekday().num_days_from_sunday()),
            "DayOfYear" => int(dt.ordinal()),
            "Date" => Some(Value::DateTime(dt.date().and_hms_opt(0, 0, 0)?)),
            "TimeOfDay" => Some(Value::TimeSpan(dt.time() - NaiveTime::MIN)),
            _ => None,
        },
        (Value::Date(d), m) => match m {
            "Year" => Some(Value::Int(i64::from(d.year()))),
            "Month" => int(d.month()),
            "Day" => int(d.day()),
            "DayOfWeek" => int(d.weekday().num_days_from_sunday()),
            "DayOfYear" => int(d.ordinal()),
            _ => None,
        },
        (Value::Time(t), m) => match m {
            "Hour" => int(t.hour()),
            "Minute" => int(t.minute()),
            "Second" => int(t.second()),
            "Millisecond" => int(t.nanosecond() / 1_000_000),
            _ => None,
        },
        (Value::TimeSpan(ts), m) => {
            let secs = ts.num_milliseconds() as f64 / 1000.0;
            match m {
                "Days" => Some(Value::Int(ts.num_days())),
                "Hours" => Some(Value::Int(ts.num_hours() % 24)),
                "Minutes" => Some(Value::Int(ts.num_minutes() % 60)),
                "Seconds" => Some(Value::Int(ts.num_seconds() % 60)),
                "Milliseconds" => Some(Value::Int(ts.num_milliseconds() % 1000)),
                "TotalDays" => Some(Value::Float(secs / 86_400.0)),
                "TotalHours" => Some(Value::Float(secs / 3600.0)),
                "TotalMinutes" => Some(Value::Float(secs / 60.0)),
                "TotalSeconds" => Some(Value::Float(secs)),
                "TotalMilliseconds" => Some(Value::Float(secs * 1000.0)),
                _ => None,
            }
        }
        _ => None,
    }
}

fn add_months(dt: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let m = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        dt.checked_add_months(m)
    } else {
        dt.checked_sub_months(m)
    }
}

fn add_date_months(d: NaiveDate, months: i64) -> Option<NaiveDate> {
    let m = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        d.checked_add_months(m)
    } else {
        d.checked_sub_months(m)
    }
}

fn duration_from_float(seconds: f64) -> Option<Duration> {
    #[allow(clippy::cast_possible_truncation)]
    let micros = (seconds * 1_000_000.0).round() as i64;
    Some(Duration::microseconds(micros))
}

fn instance_call(target: &Value, method: &str, args: &[Value]) -> Option<Value> {
    let amount = || args.first()?.as_float();
    let whole = || args.first()?.as_int();
    match (target, method, args.len()) {
        (_, "ToString", 0) => Some(Value::String(target.to_concat_string())),
        (_, "ToString", 1) => Some(Value::String(format_value(target, args[0].as_str()?)?)),
        (_, "Equals", 1) => Some(Value::Bool(values_equal(target, &args[0]))),
        (_, "CompareTo", 1) => Some(ordering_value(compare_values(target, &args[0])?)),
        (_, "IsNull", 1) => Some(if target.is_null() {
            args[0].clone()
        } else {
            target.clone()
        }),
        (Value::String(s), _, _) => string_call(s, method, args),
        (Value::List(items), "Contains", 1) => {
            Some(Value::Bool(items.iter().any(|i| values_equal(i, &args[0]))))
        }
        (Value::DateTime(dt), _, 1) => match method {
            "AddYears" => add_months(*dt, whole()?.checked_mul(12)?).map(Value::DateTime),
            "AddMonths" => add_months(*dt, whole()?).map(Value::DateTime),
            "AddDays" => dt.checked_add_signed(duration_from_float(amount()? * 86_400.0)?).map(Value::DateTime),
            "AddHours" => dt.checked_add_signed(duration_from_float(amount()? * 3600.0)?).map(Value::DateTime),
            "AddMinutes" => dt.checked_add_signed(duration_from_float(amount()? * 60.0)?).map(Value::DateTime),
            "AddSeconds" => dt.checked_add_signed(duration_from_float(amount()?)?).map(Value::DateTime),
            "AddMilliseconds" => dt.checked_add_signed(duration_from_float(amount()? / 1000.0)?).map(Value::DateTime),
            "Add" | "Subtract" => binary_value(
                if method == "Add" { BinaryOp::Add } else { BinaryOp::Sub },
                target,
                &args[0],
            ),
            _ => None,
        },
        (Value::Date(d), _, 1) => match method {
            "AddYears" => add_date_months(*d, whole()?.checked_mul(12)?).map(Value::Date),
            "AddMonths" => add_date_months(*d, whole()?).map(Value::Date),
            "AddDays" => d.checked_add_signed(Duration::days(whole()?)).map(Value::Date),
            _ => None,
        },
        (Value::Time(t), _, 1) => match method {
            "AddHours" => Some(Value::Time(t.overflowing_add_signed(duration_from_float(amount()? * 3600.0)?).0)),
            "AddMinutes" => Some(Value::Time(t.overflowing_add_signed(duration_from_float(amount()? * 60.0)?).0)),
            _ => None,
        },
        (Value::TimeSpan(_), "Add", 1) => binary_value(BinaryOp::Add, target, &args[0]),
        (Value::TimeSpan(_), "Subtract", 1) => binary_value(BinaryOp::Sub, target, &args[0]),
        _ => None,
    }
}

fn ordering_value(o: Ordering) -> Value {
    Value::Int(match o {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    })
}

fn string_call(s: &str, method: &str, args: &[Value]) -> Option<Value> {
    let text = |i: usize| args.get(i).and_then(Value::as_str);
    let index = |i: usize| args.get(i)?.as_int().and_then(|n| usize::try_from(n).ok());
    let pad_char = || match args.get(1) {
        Some(Value::String(c)) => c.chars().next(),
        None => Some(' '),
        _ => None,
    };
    Some(match (method, args.len()) {
        ("ToUpper" | "ToUpperInvariant", 0) => Value::String(s.to_uppercase()),
        ("ToLower" | "ToLowerInvariant", 0) => Value::String(s.to_lowercase()),
        ("Trim", 0) => Value::String(s.trim().to_string()),
        ("TrimStart", 0) => Value::String(s.trim_start().to_string()),
        ("TrimEnd", 0) => Value::String(s.trim_end().to_string()),
        ("Contains", 1) => Value::Bool(s.contains(text(0)?)),
        ("StartsWith", 1) => Value::Bool(s.starts_with(text(0)?)),
        ("EndsWith", 1) => Value::Bool(s.ends_with(text(0)?)),
        ("IndexOf", 1) => Value::Int(
            s.find(text(0)?)
                .map_or(Ok(-1), |byte| i64::try_from(s[..byte].chars().count()))
                .ok()?,
        ),
        ("Replace", 2) => Value::String(s.replace(text(0)?, text(1)?)),
        ("Substring", 1) => Value::String(s.chars().skip(index(0)?).collect()),
        ("Substring", 2) => Value::String(s.chars().skip(index(0)?).take(index(1)?).collect()),
        ("PadLeft" | "PadRight", 1 | 2) => {
            let width = index(0)?;
            let fill = pad_char()?;
            let len = s.chars().count();
            let padding: String = std::iter::repeat(fill).take(width.saturating_sub(len)).collect();
            Value::String(if method == "PadLeft" {
                format!("{padding}{s}")
            } else {
                format!("{s}{padding}")
            })
        }
        _ => return None,
    })
}

#[allow(clippy::cast_possible_truncation)]
fn static_call(type_name: &str, method: &str, args: &[Value]) -> Option<Value> {
    let float = |i: usize| args.get(i)?.as_float();
    let to_float = |f: f64| Some(Value::Float(f));
    match (type_name, method, args.len()) {
        ("String" | "string", "IsNullOrEmpty", 1) => Some(Value::Bool(match &args[0] {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => return None,
        })),
        ("String" | "string", "IsNullOrWhiteSpace", 1) => Some(Value::Bool(match &args[0] {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            _ => return None,
        })),
        ("String" | "string", "Concat", _) => Some(Value::String(
            args.iter().map(Value::to_concat_string).collect(),
        )),
        ("String" | "string", "Format", n) if n >= 1 => {
            Some(Value::String(composite_format(args[0].as_str()?, &args[1..])?))
        }
        ("String" | "string", "Compare", 2) => {
            Some(ordering_value(compare_values(&args[0], &args[1])?))
        }
        ("Math", "Abs", 1) => match &args[0] {
            Value::Int(i) => i.checked_abs().map(Value::Int),
            _ => to_float(float(0)?.abs()),
        },
        ("Math", "Ceiling", 1) => to_float(float(0)?.ceil()),
        ("Math", "Floor", 1) => to_float(float(0)?.floor()),
        ("Math", "Truncate", 1) => to_float(float(0)?.trunc()),
        ("Math", "Round", 1) => to_float(float(0)?.round()),
        ("Math", "Round", 2) => {
            let factor = 10f64.powi(i32::try_from(args[1].as_int()?).ok()?);
            to_float((float(0)? * factor).round() / factor)
        }
        ("Math", "Pow", 2) => to_float(float(0)?.powf(float(1)?)),
        ("Math", "Sqrt", 1) => to_float(float(0)?.sqrt()),
        ("Math", "Exp", 1) => to_float(float(0)?.exp()),
        ("Math", "Log", 1) => to_float(float(0)?.ln()),
        ("Math", "Log10", 1) => to_float(float(0)?.log10()),
        ("Math", "Sign", 1) => Some(Value::Int(float(0)?.signum() as i64)),
        ("Math", "Max" | "Min", 2) => {
            let ord = compare_values(&args[0], &args[1])?;
            let pick_first = (method == "Max") == (ord != Ordering::Less);
            Some(if pick_first { args[0].clone() } else { args[1].clone() })
        }
        ("Convert", m, 1) => {
            let to = match m {
                "ToByte" => HostType::Byte,
                "ToInt16" => HostType::Int16,
                "ToInt32" => HostType::Int32,
                "ToInt64" => HostType::Int64,
                "ToDouble" | "ToSingle" => HostType::Double,
                "ToDecimal" => HostType::Decimal,
                "ToString" => HostType::String,
                "ToBoolean" => {
                    return match &args[0] {
                        Value::Bool(_) => Some(args[0].clone()),
                        other => Some(Value::Bool(other.as_float()? != 0.0)),
                    }
                }
                _ => return None,
            };
            convert_value(args[0].clone(), &to)
        }
        ("TimeSpan", m, 1) => {
            let unit = match m {
                "FromDays" => 86_400.0,
                "FromHours" => 3600.0,
                "FromMinutes" => 60.0,
                "FromSeconds" => 1.0,
                "FromMilliseconds" => 0.001,
                _ => return None,
            };
            duration_from_float(float(0)? * unit).map(Value::TimeSpan)
        }
        ("DateTime", "IsLeapYear", 1) => {
            let y = args[0].as_int()?;
            Some(Value::Bool((y % 4 == 0 && y % 100 != 0) || y % 400 == 0))
        }
        ("DateTime", "DaysInMonth", 2) => {
            let y = i32::try_from(args[0].as_int()?).ok()?;
            let m = u32::try_from(args[1].as_int()?).ok()?;
            let first = NaiveDate::from_ymd_opt(y, m, 1)?;
            let next = first.checked_add_months(Months::new(1))?;
            Some(Value::Int((next - first).num_days()))
        }
        ("DateOnly", "FromDateTime", 1) => match &args[0] {
            Value::DateTime(dt) => Some(Value::Date(dt.date())),
            _ => None,
        },
        ("TimeOnly", "FromDateTime", 1) => match &args[0] {
            Value::DateTime(dt) => Some(Value::Time(dt.time())),
            _ => None,
        },
        (_, "Equals", 2) => Some(Value::Bool(values_equal(&args[0], &args[1]))),
        _ => None,
    }
}
