//! Host values and type descriptors.
//!
//! The [`Value`] enum represents every value the compiler can meet in an
//! expression tree: closure-captured variables, constants, `Set(new { ... })`
//! objects, and `SetBulk` rows. [`HostType`] is the static type the walker
//! tracks for each expression, and [`NativeType`] is the declared database
//! type a parameter is bound with.

use std::fmt;

/// The static type of an expression as seen by the host query language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum HostType {
    /// `bool`.
    Bool,
    /// `byte`.
    Byte,
    /// `short`.
    Int16,
    /// `int`.
    Int32,
    /// `long`.
    Int64,
    /// `double` / `float`.
    Double,
    /// `decimal`.
    Decimal,
    /// `string`.
    String,
    /// `char`.
    Char,
    /// A date and time.
    DateTime,
    /// A date without time.
    DateOnly,
    /// A time of day without date.
    TimeOnly,
    /// A duration.
    TimeSpan,
    /// A GUID.
    Guid,
    /// A named enum type.
    Enum(String),
    /// A mapped entity (a whole table row).
    Entity(String),
    /// An array or list of the inner type.
    Collection(Box<HostType>),
    /// The grouping object of a grouped query.
    Grouping,
    /// Any other object (anonymous types, records).
    Object,
    /// The type could not be determined (e.g. a bare `null`).
    Unknown,
}

impl HostType {
    /// Returns `true` for the integral and floating-point types.
    pub const fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Byte | Self::Int16 | Self::Int32 | Self::Int64 | Self::Double | Self::Decimal
        )
    }

    /// Returns `true` for `string` and `char`.
    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String | Self::Char)
    }

    /// Returns the enum type name, if this is an enum.
    pub fn enum_name(&self) -> Option<&str> {
        match self {
            Self::Enum(name) => Some(name),
            _ => None,
        }
    }

    /// The name used in diagnostics and method signatures.
    pub fn display_name(&self) -> String {
        match self {
            Self::Bool => "Boolean".to_string(),
            Self::Byte => "Byte".to_string(),
            Self::Int16 => "Int16".to_string(),
            Self::Int32 => "Int32".to_string(),
            Self::Int64 => "Int64".to_string(),
            Self::Double => "Double".to_string(),
            Self::Decimal => "Decimal".to_string(),
            Self::String => "String".to_string(),
            Self::Char => "Char".to_string(),
            Self::DateTime => "DateTime".to_string(),
            Self::DateOnly => "DateOnly".to_string(),
            Self::TimeOnly => "TimeOnly".to_string(),
            Self::TimeSpan => "TimeSpan".to_string(),
            Self::Guid => "Guid".to_string(),
            Self::Enum(name) | Self::Entity(name) => name.clone(),
            Self::Collection(inner) => format!("IEnumerable<{}>", inner.display_name()),
            Self::Grouping => "IGrouping".to_string(),
            Self::Object => "Object".to_string(),
            Self::Unknown => "Unknown".to_string(),
        }
    }

    /// The database type a value of this host type binds as by default.
    ///
    /// Enums bind as strings: expression-context enum values are always
    /// materialized by name.
    pub const fn native_type(&self) -> NativeType {
        match self {
            Self::Bool => NativeType::Boolean,
            Self::Byte => NativeType::Byte,
            Self::Int16 => NativeType::Int16,
            Self::Int32 => NativeType::Int32,
            Self::Int64 => NativeType::Int64,
            Self::Double => NativeType::Double,
            Self::Decimal => NativeType::Decimal,
            Self::DateTime => NativeType::DateTime,
            Self::DateOnly => NativeType::Date,
            Self::TimeOnly | Self::TimeSpan => NativeType::Time,
            Self::Guid => NativeType::Guid,
            Self::Collection(_) | Self::Object => NativeType::Json,
            Self::String
            | Self::Char
            | Self::Enum(_)
            | Self::Entity(_)
            | Self::Grouping
            | Self::Unknown => NativeType::String,
        }
    }

    /// The wider of two numeric types, used for arithmetic results.
    pub fn widen(&self, other: &Self) -> Self {
        fn rank(t: &HostType) -> u8 {
            match t {
                HostType::Byte => 1,
                HostType::Int16 => 2,
                HostType::Int32 => 3,
                HostType::Int64 => 4,
                HostType::Decimal => 5,
                HostType::Double => 6,
                _ => 0,
            }
        }
        if rank(other) > rank(self) {
            other.clone()
        } else {
            self.clone()
        }
    }
}

/// The declared database type of a column or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum NativeType {
    /// Boolean / `TINYINT(1)`.
    Boolean,
    /// Unsigned 8-bit integer.
    Byte,
    /// 16-bit integer.
    Int16,
    /// 32-bit integer.
    Int32,
    /// 64-bit integer.
    Int64,
    /// Double-precision float.
    Double,
    /// Exact decimal.
    Decimal,
    /// Character data.
    String,
    /// Date and time.
    DateTime,
    /// Date.
    Date,
    /// Time / interval.
    Time,
    /// GUID / `CHAR(36)`.
    Guid,
    /// Binary data.
    Binary,
    /// JSON document.
    Json,
}

impl NativeType {
    /// Returns `true` for integer and floating-point storage types.
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Byte | Self::Int16 | Self::Int32 | Self::Int64 | Self::Double | Self::Decimal
        )
    }
}

/// A value of a named enum type.
///
/// Enums carry both their declared member name and the underlying integer so
/// the compiler can materialize either, depending on context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    /// The enum type name (e.g. `Gender`).
    pub type_name: String,
    /// The declared member name (e.g. `Male`).
    pub name: String,
    /// The underlying integer value.
    pub underlying: i64,
}

impl EnumValue {
    /// Creates a new enum value.
    pub fn new(type_name: impl Into<String>, name: impl Into<String>, underlying: i64) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
            underlying,
        }
    }
}

/// An ordered member→value map.
///
/// Used for `Set(new { ... })` objects, `SetBulk` rows, key records, and
/// closure-captured objects whose members are read by the expression.
///
/// # Examples
///
/// ```
/// use exprsql_db::value::{Record, Value};
///
/// let row = Record::new().with("Id", 1).with("Price", 9.5);
/// assert_eq!(row.get("Id"), Some(&Value::Int(1)));
/// assert_eq!(row.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    members: Vec<(String, Value)>,
}

impl Record {
    /// Creates an empty record.
    pub const fn new() -> Self {
        Self {
            members: Vec::new(),
        }
    }

    /// Adds (or replaces) a member, returning the record.
    #[must_use]
    pub fn with(mut self, member: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(member, value);
        self
    }

    /// Sets a member value, keeping the original position when replacing.
    pub fn set(&mut self, member: impl Into<String>, value: impl Into<Value>) {
        let member = member.into();
        let value = value.into();
        if let Some(slot) = self.members.iter_mut().find(|(m, _)| *m == member) {
            slot.1 = value;
        } else {
            self.members.push((member, value));
        }
    }

    /// Returns the value of a member.
    pub fn get(&self, member: &str) -> Option<&Value> {
        self.members
            .iter()
            .find(|(m, _)| m == member)
            .map(|(_, v)| v)
    }

    /// Iterates over `(member, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.members.iter().map(|(m, v)| (m.as_str(), v))
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if the record has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// A host value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `null` / `DBNull`.
    Null,
    /// A boolean value.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A floating-point number.
    Float(f64),
    /// An exact decimal kept as its canonical text (e.g. `"12.50"`).
    Decimal(String),
    /// A UTF-8 string.
    String(String),
    /// Raw binary data.
    Bytes(Vec<u8>),
    /// A date without time (DateOnly).
    Date(chrono::NaiveDate),
    /// A date and time.
    DateTime(chrono::NaiveDateTime),
    /// A time of day (TimeOnly).
    Time(chrono::NaiveTime),
    /// A duration (TimeSpan).
    TimeSpan(chrono::Duration),
    /// A GUID.
    Guid(uuid::Uuid),
    /// An enum member.
    Enum(EnumValue),
    /// A list of values (arrays, `List<T>`, `IN` sources).
    List(Vec<Value>),
    /// An object with named members.
    Record(Record),
    /// A JSON document.
    Json(serde_json::Value),
}

impl Value {
    /// Returns `true` if this value is `Null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Attempts to extract a boolean value.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to extract an integer value.
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Attempts to extract a float value; integers widen.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            Self::Decimal(d) => d.parse().ok(),
            _ => None,
        }
    }

    /// Attempts to extract a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The host type this value has when it appears as a constant.
    pub fn host_type(&self) -> HostType {
        match self {
            Self::Null | Self::Json(_) => HostType::Unknown,
            Self::Bool(_) => HostType::Bool,
            Self::Int(i) => {
                if i32::try_from(*i).is_ok() {
                    HostType::Int32
                } else {
                    HostType::Int64
                }
            }
            Self::Float(_) => HostType::Double,
            Self::Decimal(_) => HostType::Decimal,
            Self::String(_) => HostType::String,
            Self::Bytes(_) | Self::Record(_) => HostType::Object,
            Self::Date(_) => HostType::DateOnly,
            Self::DateTime(_) => HostType::DateTime,
            Self::Time(_) => HostType::TimeOnly,
            Self::TimeSpan(_) => HostType::TimeSpan,
            Self::Guid(_) => HostType::Guid,
            Self::Enum(e) => HostType::Enum(e.type_name.clone()),
            Self::List(items) => HostType::Collection(Box::new(
                items
                    .iter()
                    .find(|v| !v.is_null())
                    .map_or(HostType::Unknown, Self::host_type),
            )),
        }
    }

    /// The text this value contributes to a string concatenation.
    pub fn to_concat_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            Self::Enum(e) => e.name.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Self::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
            Self::TimeSpan(d) => write!(f, "{}", crate::query::coerce::format_timespan(*d)),
            Self::Guid(u) => write!(f, "{u}"),
            Self::Enum(e) => write!(f, "{}", e.name),
            Self::Json(j) => write!(f, "{j}"),
            Self::List(vals) => {
                write!(f, "[")?;
                for (i, v) in vals.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Self::Record(record) => {
                write!(f, "{{ ")?;
                for (i, (m, v)) in record.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{m} = {v}")?;
                }
                write!(f, " }}")
            }
        }
    }
}

// ── From implementations ───────────────────────────────────────────────

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<chrono::NaiveDate> for Value {
    fn from(v: chrono::NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<chrono::NaiveDateTime> for Value {
    fn from(v: chrono::NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl From<chrono::NaiveTime> for Value {
    fn from(v: chrono::NaiveTime) -> Self {
        Self::Time(v)
    }
}

impl From<chrono::Duration> for Value {
    fn from(v: chrono::Duration) -> Self {
        Self::TimeSpan(v)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(v: uuid::Uuid) -> Self {
        Self::Guid(v)
    }
}

impl From<EnumValue> for Value {
    fn from(v: EnumValue) -> Self {
        Self::Enum(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Self::Record(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Self::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_integers() {
        assert_eq!(Value::from(42_u8), Value::Int(42));
        assert_eq!(Value::from(42_i32), Value::Int(42));
        assert_eq!(Value::from(42_i64), Value::Int(42));
    }

    #[test]
    fn test_from_option() {
        let none_val: Option<i64> = None;
        assert_eq!(Value::from(none_val), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::String("x".into()));
    }

    #[test]
    fn test_host_type_of_values() {
        assert_eq!(Value::Int(1).host_type(), HostType::Int32);
        assert_eq!(Value::Int(i64::MAX).host_type(), HostType::Int64);
        assert_eq!(Value::from("a").host_type(), HostType::String);
        assert_eq!(
            Value::Enum(EnumValue::new("Gender", "Male", 1)).host_type(),
            HostType::Enum("Gender".into())
        );
        assert_eq!(
            Value::List(vec![Value::Null, Value::Int(2)]).host_type(),
            HostType::Collection(Box::new(HostType::Int32))
        );
    }

    #[test]
    fn test_enum_native_type_is_string() {
        assert_eq!(HostType::Enum("Gender".into()).native_type(), NativeType::String);
        assert_eq!(HostType::DateOnly.native_type(), NativeType::Date);
        assert_eq!(HostType::TimeSpan.native_type(), NativeType::Time);
    }

    #[test]
    fn test_widen() {
        assert_eq!(HostType::Int32.widen(&HostType::Double), HostType::Double);
        assert_eq!(HostType::Int64.widen(&HostType::Int16), HostType::Int64);
    }

    #[test]
    fn test_record_set_keeps_position() {
        let mut r = Record::new().with("A", 1).with("B", 2);
        r.set("A", 10);
        let members: Vec<&str> = r.iter().map(|(m, _)| m).collect();
        assert_eq!(members, vec!["A", "B"]);
        assert_eq!(r.get("A"), Some(&Value::Int(10)));
        assert!(r.get("C").is_none());
    }

    #[test]
    fn test_concat_string() {
        assert_eq!(Value::Bool(true).to_concat_string(), "True");
        assert_eq!(Value::Null.to_concat_string(), "");
        assert_eq!(
            Value::Enum(EnumValue::new("Gender", "Female", 2)).to_concat_string(),
            "Female"
        );
    }

    #[test]
    fn test_display_list() {
        let v = Value::List(vec![Value::Int(1), Value::from("a")]);
        assert_eq!(v.to_string(), "[1, a]");
    }
}
