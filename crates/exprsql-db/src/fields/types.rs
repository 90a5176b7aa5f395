//! Field metadata for mapped entity members.
//!
//! A [`FieldDef`] captures everything the compiler needs to know about one
//! mapped member: its column name, host type, declared native type, key
//! flags, and an optional [`TypeHandler`] that overrides how values are bound.

use std::fmt;
use std::sync::Arc;

use exprsql_core::SqlResult;

use super::handlers::TypeHandler;
use crate::value::{HostType, NativeType, Value};

/// Complete definition of a mapped member.
///
/// Constructed with [`FieldDef::new`] and refined with the builder methods.
///
/// # Examples
///
/// ```
/// use exprsql_db::fields::FieldDef;
/// use exprsql_db::value::{HostType, NativeType};
///
/// let gender = FieldDef::new("Gender", HostType::Enum("Gender".into()))
///     .native_type(NativeType::Byte);
/// assert_eq!(gender.column, "Gender");
/// assert_eq!(gender.native_type, NativeType::Byte);
/// ```
#[derive(Clone)]
pub struct FieldDef {
    /// The member name used in expressions.
    pub member: String,
    /// The database column name (may differ from `member`).
    pub column: String,
    /// The static host type of the member.
    pub host_type: HostType,
    /// The declared database type values are bound with.
    pub native_type: NativeType,
    /// Whether this member is (part of) the key.
    pub primary_key: bool,
    /// Whether the database generates this value.
    pub auto_increment: bool,
    /// Whether this member is unmapped (never read or written).
    pub ignore: bool,
    /// Whether NULL is allowed in the database.
    pub nullable: bool,
    /// An optional handler that converts values before binding.
    pub type_handler: Option<Arc<dyn TypeHandler>>,
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("member", &self.member)
            .field("column", &self.column)
            .field("host_type", &self.host_type)
            .field("native_type", &self.native_type)
            .field("primary_key", &self.primary_key)
            .field("ignore", &self.ignore)
            .field(
                "type_handler",
                &self.type_handler.as_ref().map(|h| h.name()),
            )
            .finish_non_exhaustive()
    }
}

impl FieldDef {
    /// Creates a new `FieldDef` whose column equals the member name and whose
    /// native type follows the host type.
    pub fn new(member: impl Into<String>, host_type: HostType) -> Self {
        let member = member.into();
        Self {
            column: member.clone(),
            member,
            native_type: host_type.native_type(),
            host_type,
            primary_key: false,
            auto_increment: false,
            ignore: false,
            nullable: false,
            type_handler: None,
        }
    }

    /// Sets the database column name.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Sets the declared native type.
    #[must_use]
    pub const fn native_type(mut self, native_type: NativeType) -> Self {
        self.native_type = native_type;
        self
    }

    /// Marks this member as part of the key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Marks this member as database generated.
    #[must_use]
    pub const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Excludes this member from the mapping.
    #[must_use]
    pub const fn ignored(mut self) -> Self {
        self.ignore = true;
        self
    }

    /// Allows NULL values.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Attaches a type handler.
    #[must_use]
    pub fn type_handler(mut self, handler: impl TypeHandler + 'static) -> Self {
        self.type_handler = Some(Arc::new(handler));
        self
    }

    /// Converts a host value into the value bound for this field.
    ///
    /// A type handler, when present, decides. Otherwise enums become their
    /// underlying integer for numeric columns and their name for anything
    /// else; all other values pass through unchanged.
    pub fn to_db_value(&self, value: &Value) -> SqlResult<Value> {
        if let Some(handler) = &self.type_handler {
            return handler.to_db_value(value, self.native_type);
        }
        Ok(match value {
            Value::Enum(e) if self.native_type.is_numeric() => Value::Int(e.underlying),
            Value::Enum(e) => Value::String(e.name.clone()),
            other => other.clone(),
        })
    }
}
