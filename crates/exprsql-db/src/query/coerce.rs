//! Value coercion rules.
//!
//! Compile-time constants are rendered inline as literals; runtime values are
//! bound as parameters. This module holds the fixed literal format table and
//! the rules that decide the bound value and native type of a parameter.
//!
//! | Value | Literal |
//! |---|---|
//! | enum | `'Name'` |
//! | DateTime | `'yyyy-MM-dd HH:mm:ss.fff'` |
//! | DateOnly | `'yyyy-MM-dd'` |
//! | TimeOnly | `'HH:mm:ss.ffffff'` |
//! | TimeSpan | `'[-][d.]HH:mm:ss.ffffff'` |
//! | Guid | `'xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx'` |
//! | bool | `1` / `0` |

use exprsql_core::{SqlError, SqlResult};

use super::dialect::SqlDialect;
use super::ir::SqlNode;
use crate::fields::FieldDef;
use crate::value::{HostType, NativeType, Value};

/// Formats a duration as `[-][d.]HH:mm:ss.ffffff`.
///
/// # Examples
///
/// ```
/// use exprsql_db::query::coerce::format_timespan;
///
/// assert_eq!(format_timespan(chrono::Duration::minutes(90)), "01:30:00.000000");
/// assert_eq!(format_timespan(chrono::Duration::hours(-49)), "-2.01:00:00.000000");
/// ```
pub fn format_timespan(span: chrono::Duration) -> String {
    let negative = span < chrono::Duration::zero();
    let span = if negative { -span } else { span };
    let total_seconds = span.num_seconds();
    let micros = (span - chrono::Duration::seconds(total_seconds))
        .num_microseconds()
        .unwrap_or(0);
    let days = total_seconds / 86_400;
    let hours = (total_seconds / 3600) % 24;
    let minutes = (total_seconds / 60) % 60;
    let seconds = total_seconds % 60;

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if days > 0 {
        out.push_str(&format!("{days}."));
    }
    out.push_str(&format!("{hours:02}:{minutes:02}:{seconds:02}.{micros:06}"));
    out
}

/// Formats a date-time as `yyyy-MM-dd HH:mm:ss.fff`.
pub fn format_datetime(value: chrono::NaiveDateTime) -> String {
    value.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Formats a date as `yyyy-MM-dd`.
pub fn format_date(value: chrono::NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

/// Formats a time of day as `HH:mm:ss.ffffff`.
pub fn format_time(value: chrono::NaiveTime) -> String {
    value.format("%H:%M:%S%.6f").to_string()
}

/// Renders a constant as inline SQL literal text.
///
/// # Errors
///
/// Returns [`SqlError::InvalidExpression`] for values that have no literal
/// form (lists and records).
pub fn literal_sql(value: &Value, dialect: &dyn SqlDialect) -> SqlResult<String> {
    Ok(match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => dialect.bool_literal(*b).to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format_float(*f),
        Value::Decimal(d) => d.clone(),
        Value::String(s) => dialect.quote_string(s),
        Value::Bytes(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
            format!("X'{hex}'")
        }
        Value::Date(d) => dialect.quote_string(&format_date(*d)),
        Value::DateTime(dt) => dialect.quote_string(&format_datetime(*dt)),
        Value::Time(t) => dialect.quote_string(&format_time(*t)),
        Value::TimeSpan(span) => dialect.quote_string(&format_timespan(*span)),
        Value::Guid(u) => dialect.quote_string(&u.hyphenated().to_string()),
        Value::Enum(e) => dialect.quote_string(&e.name),
        Value::Json(j) => dialect.quote_string(&j.to_string()),
        Value::List(_) | Value::Record(_) => {
            return Err(SqlError::InvalidExpression(format!(
                "Value has no SQL literal form: {value}"
            )))
        }
    })
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{f:.0}")
    } else {
        f.to_string()
    }
}

/// The value and native type bound for a runtime value in expression
/// context. Enums always bind by name as strings.
pub fn parameter_value(value: &Value) -> (Value, NativeType) {
    match value {
        Value::Enum(e) => (Value::String(e.name.clone()), NativeType::String),
        Value::Null => (Value::Null, NativeType::String),
        Value::Json(_) => (value.clone(), NativeType::Json),
        Value::Bytes(_) => (value.clone(), NativeType::Binary),
        other => (other.clone(), other.host_type().native_type()),
    }
}

/// The value and native type bound for an object-form value of `field`.
pub fn field_parameter_value(field: &FieldDef, value: &Value) -> SqlResult<(Value, NativeType)> {
    Ok((field.to_db_value(value)?, field.native_type))
}

/// An IR literal for a compile-time constant.
pub fn constant_node(value: &Value, dialect: &dyn SqlDialect) -> SqlResult<SqlNode> {
    if value.is_null() {
        return Ok(SqlNode::Null);
    }
    Ok(SqlNode::Literal {
        sql: literal_sql(value, dialect)?,
        value: value.clone(),
        ty: value.host_type(),
    })
}

/// An IR parameter for a runtime value.
pub fn variable_node(value: &Value) -> SqlNode {
    let ty = value.host_type();
    let (value, native) = parameter_value(value);
    SqlNode::Param {
        value,
        native,
        name: None,
        ty,
    }
}

/// An IR parameter for an object-form value with a fixed placeholder name.
pub fn named_field_node(field: &FieldDef, name: String, value: &Value) -> SqlResult<SqlNode> {
    if value.is_null() {
        return Ok(SqlNode::Null);
    }
    let (value, native) = field_parameter_value(field, value)?;
    Ok(SqlNode::Param {
        value,
        native,
        name: Some(name),
        ty: field.host_type.clone(),
    })
}

/// Checks that operands of these host types can be compared.
///
/// Enums of different families never compare.
pub fn comparable(left: &HostType, right: &HostType) -> SqlResult<()> {
    match (left, right) {
        (HostType::Enum(a), HostType::Enum(b)) if a != b => Err(SqlError::TypeMismatch(format!(
            "Cannot compare enum '{a}' with enum '{b}'"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::dialect::MySqlDialect;
    use crate::value::EnumValue;
    use chrono::{NaiveDate, NaiveTime};

    #[test]
    fn test_literal_dates() {
        let d = MySqlDialect;
        let min = NaiveDate::from_ymd_opt(1, 1, 1).unwrap();
        assert_eq!(literal_sql(&Value::Date(min), &d).unwrap(), "'0001-01-01'");

        let dt = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_milli_opt(7, 8, 9, 26)
            .unwrap();
        assert_eq!(
            literal_sql(&Value::DateTime(dt), &d).unwrap(),
            "'2024-03-05 07:08:09.026'"
        );

        let t = NaiveTime::from_hms_micro_opt(13, 4, 5, 120).unwrap();
        assert_eq!(literal_sql(&Value::Time(t), &d).unwrap(), "'13:04:05.000120'");
    }

    #[test]
    fn test_literal_timespan_with_days() {
        let span = chrono::Duration::days(3) + chrono::Duration::seconds(61);
        assert_eq!(
            literal_sql(&Value::TimeSpan(span), &MySqlDialect).unwrap(),
            "'3.00:01:01.000000'"
        );
    }

    #[test]
    fn test_literal_scalars() {
        let d = MySqlDialect;
        assert_eq!(literal_sql(&Value::Bool(true), &d).unwrap(), "1");
        assert_eq!(literal_sql(&Value::Bool(false), &d).unwrap(), "0");
        assert_eq!(literal_sql(&Value::Float(2.0), &d).unwrap(), "2");
        assert_eq!(literal_sql(&Value::Float(2.5), &d).unwrap(), "2.5");
        assert_eq!(literal_sql(&Value::Decimal("12.50".into()), &d).unwrap(), "12.50");
        assert_eq!(literal_sql(&Value::Bytes(vec![0xAB, 0x01]), &d).unwrap(), "X'AB01'");
        assert_eq!(literal_sql(&Value::Null, &d).unwrap(), "NULL");
    }

    #[test]
    fn test_literal_enum_is_quoted_name() {
        let v = Value::Enum(EnumValue::new("Channel", "Internet", 2));
        assert_eq!(literal_sql(&v, &MySqlDialect).unwrap(), "'Internet'");
    }

    #[test]
    fn test_literal_guid() {
        let u = uuid::Uuid::nil();
        assert_eq!(
            literal_sql(&Value::Guid(u), &MySqlDialect).unwrap(),
            "'00000000-0000-0000-0000-000000000000'"
        );
    }

    #[test]
    fn test_literal_list_rejected() {
        let err = literal_sql(&Value::List(vec![]), &MySqlDialect).unwrap_err();
        assert!(matches!(err, SqlError::InvalidExpression(_)));
    }

    #[test]
    fn test_parameter_value_enum_is_string() {
        let (v, native) = parameter_value(&Value::Enum(EnumValue::new("Gender", "Male", 1)));
        assert_eq!(v, Value::String("Male".into()));
        assert_eq!(native, NativeType::String);
    }

    #[test]
    fn test_parameter_value_follows_value() {
        assert_eq!(parameter_value(&Value::Int(3)).1, NativeType::Int32);
        assert_eq!(parameter_value(&Value::Float(3.0)).1, NativeType::Double);
        assert_eq!(
            parameter_value(&Value::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())).1,
            NativeType::Date
        );
    }

    #[test]
    fn test_comparable_enums() {
        let a = HostType::Enum("Gender".into());
        let b = HostType::Enum("Channel".into());
        assert!(comparable(&a, &a).is_ok());
        assert!(matches!(comparable(&a, &b), Err(SqlError::TypeMismatch(_))));
        assert!(comparable(&a, &HostType::String).is_ok());
    }

    #[test]
    fn test_constant_node_null() {
        assert!(matches!(
            constant_node(&Value::Null, &MySqlDialect).unwrap(),
            SqlNode::Null
        ));
    }
}
