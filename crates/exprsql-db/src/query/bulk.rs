//! Bulk updates.
//!
//! A bulk update compiles to one `UPDATE` per input row, keyed by the entity
//! key. Row members bind as `@{Member}{i}` and key members as `@k{Key}{i}`,
//! where `i` is the row position. Assignments made with `set`, `set_field` or
//! `set_value` apply to every row and win over a row member of the same name.
//! A host value given to `set_value` or `set_field` binds as `@{Member}` and
//! that placeholder is shared by all statements.
//!
//! Each statement renders into its own child sink so that it can be executed
//! on its own; the parent sink receives the union, with shared names once.

use exprsql_core::logging::compile_span;
use exprsql_core::{SqlError, SqlResult};

use super::coerce::named_field_node;
use super::compiler::{
    equals, field_included, plan_assignments, required_key, target_ref,
    CompiledStatement, SqlCompiler,
};
use super::ir::SqlNode;
use super::params::Parameters;
use super::planner::{table_scope, Planner};
use super::queryset::{Assignment, Update};
use super::writer::SqlWriter;
use crate::model::EntityMap;
use crate::value::Record;

/// Compiles a bulk update into one statement per row, merging every
/// statement's parameters into `parameters`.
pub(crate) fn write_bulk(
    compiler: &SqlCompiler,
    update: &Update,
    parameters: &mut Parameters,
) -> SqlResult<Vec<CompiledStatement>> {
    let span = compile_span("bulk_update", &update.entity);
    let _guard = span.enter();

    let rows = update.bulk_rows.as_deref().unwrap_or_default();
    check_bulk(update, rows)?;
    let map = compiler.models().entity(&update.entity)?;
    if map.key_members().is_empty() {
        return Err(SqlError::InvalidExpression(format!(
            "Entity '{}' has no key; a bulk update needs one",
            map.entity
        )));
    }

    let mut statements = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let mut sink = parameters.child();
        let sql = write_row(compiler, update, &map, index, row, &mut sink)?;
        merge_checked(parameters, &sink)?;
        statements.push(CompiledStatement {
            sql,
            parameters: sink,
            deferred: Vec::new(),
        });
    }
    tracing::debug!(
        kind = "bulk_update",
        statements = statements.len(),
        parameters = parameters.len(),
        "compiled statement"
    );
    Ok(statements)
}

fn check_bulk(update: &Update, rows: &[Record]) -> SqlResult<()> {
    if rows.is_empty() {
        return Err(SqlError::EmptyCollection(format!(
            "Bulk update of '{}' has no rows",
            update.entity
        )));
    }
    if !update.filters.is_empty() || !update.key_rows.is_empty() {
        return Err(SqlError::InvalidExpression(
            "A bulk update is keyed by its rows and cannot be filtered".to_string(),
        ));
    }
    if !update.joins.is_empty() {
        return Err(SqlError::InvalidExpression(
            "A bulk update cannot join other tables".to_string(),
        ));
    }
    if update
        .assignments
        .iter()
        .any(|a| matches!(a, Assignment::Object(_)))
    {
        return Err(SqlError::InvalidExpression(
            "A bulk update cannot also take an object assignment".to_string(),
        ));
    }
    Ok(())
}

fn write_row(
    compiler: &SqlCompiler,
    update: &Update,
    map: &EntityMap,
    index: usize,
    row: &Record,
    sink: &mut Parameters,
) -> SqlResult<String> {
    let mut planner = Planner::new(compiler);
    let target = planner.entity_binding(&update.entity, None)?;
    let scope = table_scope(std::slice::from_ref(&target));
    let uniform = plan_assignments(&mut planner, update, map, &target, &scope)?;

    let mut sets: Vec<(String, SqlNode)> = Vec::with_capacity(row.len() + uniform.sets.len());
    for (member, value) in row.iter() {
        let Some(field) = map.get_field(member) else {
            if map.fields.iter().any(|f| f.member == member) {
                continue;
            }
            return Err(SqlError::UnknownMember {
                entity: map.entity.clone(),
                member: member.to_string(),
            });
        };
        if field.primary_key
            || field.auto_increment
            || !field_included(update, member)
            || uniform.sets.iter().any(|(m, _)| m == member)
        {
            continue;
        }
        sets.push((
            member.to_string(),
            named_field_node(field, format!("{member}{index}"), value)?,
        ));
    }
    sets.extend(uniform.sets);
    if sets.is_empty() {
        return Err(SqlError::InvalidExpression(format!(
            "Bulk row {index} of '{}' assigns no columns",
            update.entity
        )));
    }

    let mut keys = Vec::new();
    for key in map.key_members() {
        let field = map.require_field(key)?;
        let value = named_field_node(field, format!("k{key}{index}"), required_key(row, key)?)?;
        keys.push(equals(target.column(key)?, value));
    }
    let where_ = SqlNode::conjunction(keys);
    let ctes = planner.take_ctes();

    let mut writer = SqlWriter::new(compiler.dialect(), sink);
    let mut sql = writer.ctes(&ctes)?;
    sql.push_str("UPDATE ");
    sql.push_str(&writer.table(&target_ref(map, None))?);
    let mut rendered = Vec::with_capacity(sets.len());
    for (member, value) in &sets {
        let column = writer.expr(&target.column(member)?)?;
        rendered.push(format!("{column}={}", writer.expr(value)?));
    }
    sql.push_str(" SET ");
    sql.push_str(&rendered.join(","));
    if let Some(predicate) = &where_ {
        sql.push_str(" WHERE ");
        sql.push_str(&writer.expr(predicate)?);
    }
    Ok(sql)
}

/// Merges a statement's sink into the batch sink. A name bound to two
/// different values fails rather than silently keeping the first.
fn merge_checked(parent: &mut Parameters, child: &Parameters) -> SqlResult<()> {
    for entry in child.iter() {
        if let Some(existing) = parent.get(&entry.name) {
            if existing.value != entry.value {
                return Err(SqlError::InvalidExpression(format!(
                    "Placeholder '{}' is bound to two different values",
                    entry.name
                )));
            }
        }
    }
    parent.merge(child);
    Ok(())
}
