//! Sample model shared by the integration suites.

#![allow(dead_code)]

use std::sync::Arc;

use exprsql_db::fields::FieldDef;
use exprsql_db::model::{EntityMap, ModelRegistry};
use exprsql_db::query::compiler::SqlCompiler;
use exprsql_db::query::expr::{param, Expr};
use exprsql_db::value::{HostType, NativeType};

/// A user account. `Gender` is stored as a `TINYINT`.
pub fn user() -> EntityMap {
    EntityMap::new("User")
        .field(FieldDef::new("Id", HostType::Int32).primary_key().auto_increment())
        .field(FieldDef::new("Name", HostType::String))
        .field(FieldDef::new("Age", HostType::Int32))
        .field(FieldDef::new("Gender", HostType::Enum("Gender".into())).native_type(NativeType::Byte))
        .field(FieldDef::new("CompanyId", HostType::Int32).nullable())
        .field(FieldDef::new("IsEnabled", HostType::Bool))
        .field(FieldDef::new("Birthday", HostType::DateOnly))
        .field(FieldDef::new("CreatedAt", HostType::DateTime))
        .field(FieldDef::new("Secret", HostType::String).ignored())
}

/// A company. `Nature` is stored by name.
pub fn company() -> EntityMap {
    EntityMap::new("Company")
        .field(FieldDef::new("Id", HostType::Int32).primary_key().auto_increment())
        .field(FieldDef::new("Name", HostType::String))
        .field(FieldDef::new("Nature", HostType::Enum("CompanyNature".into())))
}

/// An order, mapped onto the `sys_order` table.
pub fn order() -> EntityMap {
    EntityMap::new("Order")
        .table("sys_order")
        .field(FieldDef::new("Id", HostType::Int32).primary_key().auto_increment())
        .field(FieldDef::new("OrderNo", HostType::String))
        .field(FieldDef::new("BuyerId", HostType::Int32))
        .field(FieldDef::new("SellerId", HostType::Int32).nullable())
        .field(FieldDef::new("TotalAmount", HostType::Decimal))
        .field(FieldDef::new("CreatedAt", HostType::DateTime))
}

pub fn order_detail() -> EntityMap {
    EntityMap::new("OrderDetail")
        .field(FieldDef::new("Id", HostType::Int32).primary_key().auto_increment())
        .field(FieldDef::new("OrderId", HostType::Int32))
        .field(FieldDef::new("ProductId", HostType::Int32))
        .field(FieldDef::new("Price", HostType::Decimal))
        .field(FieldDef::new("Quantity", HostType::Int32))
        .field(FieldDef::new("Amount", HostType::Decimal))
}

pub fn product() -> EntityMap {
    EntityMap::new("Product")
        .field(FieldDef::new("Id", HostType::Int32).primary_key())
        .field(FieldDef::new("Name", HostType::String))
        .field(FieldDef::new("Price", HostType::Decimal))
        .field(FieldDef::new("CompanyId", HostType::Int32))
}

/// A user's membership in a role, keyed by both ids.
pub fn user_role() -> EntityMap {
    EntityMap::new("UserRole")
        .field(FieldDef::new("UserId", HostType::Int32).primary_key())
        .field(FieldDef::new("RoleId", HostType::Int32).primary_key())
        .field(FieldDef::new("GrantedAt", HostType::DateTime))
}

/// A self-referencing menu tree.
pub fn menu() -> EntityMap {
    EntityMap::new("Menu")
        .field(FieldDef::new("Id", HostType::Int32).primary_key())
        .field(FieldDef::new("Name", HostType::String))
        .field(FieldDef::new("ParentId", HostType::Int32).nullable())
}

pub fn models() -> ModelRegistry {
    ModelRegistry::new()
        .with(user())
        .with(company())
        .with(order())
        .with(order_detail())
        .with(product())
        .with(menu())
        .with(user_role())
}

pub fn compiler() -> SqlCompiler {
    SqlCompiler::mysql(Arc::new(models()))
}

/// `p.member`.
pub fn m(p: &str, member: &str) -> Expr {
    param(p).member(member)
}
