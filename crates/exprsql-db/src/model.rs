//! Entity metadata and the model metadata provider.
//!
//! The compiler never inspects host types directly. It asks a
//! [`ModelProvider`] for the table, columns, and key of each entity named in
//! an expression. [`ModelRegistry`] is the in-memory provider most callers
//! use; [`EntityMap`] describes a single entity.

use std::collections::HashMap;
use std::sync::Arc;

use exprsql_core::{SqlError, SqlResult};

use crate::fields::FieldDef;

/// The mapping of one entity type to a table.
///
/// # Examples
///
/// ```
/// use exprsql_db::fields::FieldDef;
/// use exprsql_db::model::EntityMap;
/// use exprsql_db::value::HostType;
///
/// let user = EntityMap::new("User")
///     .table("users")
///     .field(FieldDef::new("Id", HostType::Int32).primary_key())
///     .field(FieldDef::new("Name", HostType::String));
/// assert_eq!(user.table, "users");
/// assert_eq!(user.key_members(), vec!["Id"]);
/// ```
#[derive(Debug, Clone)]
pub struct EntityMap {
    /// The entity (host type) name.
    pub entity: String,
    /// The table name. Defaults to the entity name.
    pub table: String,
    /// An optional schema qualifier.
    pub schema: Option<String>,
    /// The mapped members in declaration order.
    pub fields: Vec<FieldDef>,
}

impl EntityMap {
    /// Creates a mapping whose table name equals the entity name.
    pub fn new(entity: impl Into<String>) -> Self {
        let entity = entity.into();
        Self {
            table: entity.clone(),
            entity,
            schema: None,
            fields: Vec::new(),
        }
    }

    /// Sets the table name.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Sets the schema qualifier.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Adds a member mapping.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Looks up a mapped (non-ignored) member.
    pub fn get_field(&self, member: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.member == member && !f.ignore)
    }

    /// Looks up a mapped member, failing with `UnknownMember`.
    pub fn require_field(&self, member: &str) -> SqlResult<&FieldDef> {
        self.get_field(member).ok_or_else(|| SqlError::UnknownMember {
            entity: self.entity.clone(),
            member: member.to_string(),
        })
    }

    /// Iterates over mapped (non-ignored) members.
    pub fn mapped_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !f.ignore)
    }

    /// Returns the key member names in declaration order.
    pub fn key_members(&self) -> Vec<&str> {
        self.mapped_fields()
            .filter(|f| f.primary_key)
            .map(|f| f.member.as_str())
            .collect()
    }
}

/// Supplies entity metadata to the compiler.
///
/// Implementations must be thread-safe; a compiler may be shared across
/// threads. Only [`entity`](ModelProvider::entity) is required; the
/// `resolve_*` helpers derive from it.
pub trait ModelProvider: Send + Sync {
    /// Returns the mapping for an entity.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::UnknownEntity`] if the entity is not registered.
    fn entity(&self, entity: &str) -> SqlResult<Arc<EntityMap>>;

    /// Resolves `(table, schema)` for an entity.
    fn resolve_table(&self, entity: &str) -> SqlResult<(String, Option<String>)> {
        let map = self.entity(entity)?;
        Ok((map.table.clone(), map.schema.clone()))
    }

    /// Resolves the field definition of one member.
    fn resolve_column(&self, entity: &str, member: &str) -> SqlResult<FieldDef> {
        let map = self.entity(entity)?;
        map.require_field(member).cloned()
    }

    /// Resolves the ordered key member names.
    fn resolve_key(&self, entity: &str) -> SqlResult<Vec<String>> {
        let map = self.entity(entity)?;
        Ok(map.key_members().into_iter().map(str::to_string).collect())
    }
}

/// An in-memory [`ModelProvider`] keyed by entity name.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    entities: HashMap<String, Arc<EntityMap>>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) an entity mapping.
    pub fn register(&mut self, map: EntityMap) {
        tracing::trace!(entity = %map.entity, table = %map.table, "registering entity");
        self.entities.insert(map.entity.clone(), Arc::new(map));
    }

    /// Registers an entity mapping, returning the registry.
    #[must_use]
    pub fn with(mut self, map: EntityMap) -> Self {
        self.register(map);
        self
    }

    /// Returns the number of registered entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no entity is registered.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl ModelProvider for ModelRegistry {
    fn entity(&self, entity: &str) -> SqlResult<Arc<EntityMap>> {
        self.entities
            .get(entity)
            .cloned()
            .ok_or_else(|| SqlError::UnknownEntity(entity.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{HostType, NativeType};

    fn registry() -> ModelRegistry {
        ModelRegistry::new().with(
            EntityMap::new("OrderDetail")
                .table("order_details")
                .schema("sales")
                .field(FieldDef::new("OrderId", HostType::Int32).primary_key())
                .field(FieldDef::new("ProductId", HostType::Int32).primary_key())
                .field(FieldDef::new("Price", HostType::Decimal).column("unit_price"))
                .field(FieldDef::new("Cache", HostType::String).ignored()),
        )
    }

    #[test]
    fn test_resolve_table_with_schema() {
        let reg = registry();
        let (table, schema) = reg.resolve_table("OrderDetail").unwrap();
        assert_eq!(table, "order_details");
        assert_eq!(schema.as_deref(), Some("sales"));
    }

    #[test]
    fn test_resolve_column_uses_column_name() {
        let reg = registry();
        let f = reg.resolve_column("OrderDetail", "Price").unwrap();
        assert_eq!(f.column, "unit_price");
        assert_eq!(f.native_type, NativeType::Decimal);
    }

    #[test]
    fn test_resolve_key_is_ordered() {
        let reg = registry();
        assert_eq!(reg.resolve_key("OrderDetail").unwrap(), vec!["OrderId", "ProductId"]);
    }

    #[test]
    fn test_ignored_member_is_unknown() {
        let reg = registry();
        let err = reg.resolve_column("OrderDetail", "Cache").unwrap_err();
        assert!(matches!(err, SqlError::UnknownMember { .. }));
    }

    #[test]
    fn test_unknown_entity() {
        let reg = registry();
        assert!(matches!(reg.entity("Nope"), Err(SqlError::UnknownEntity(_))));
        assert_eq!(reg.len(), 1);
        assert!(!reg.is_empty());
    }
}
