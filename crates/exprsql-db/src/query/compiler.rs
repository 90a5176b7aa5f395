//! The statement compiler.
//!
//! [`SqlCompiler`] is the entry point of the pipeline. Each `compile_*` call
//! plans its builder with a fresh planner, collects the CTEs the plan reached,
//! and renders the `WITH` block followed by the statement into one parameter
//! sink. The compiler itself holds only shared, immutable state, so one
//! instance can serve any number of threads.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use exprsql_db::model::{EntityMap, ModelRegistry};
//! use exprsql_db::fields::FieldDef;
//! use exprsql_db::query::compiler::SqlCompiler;
//! use exprsql_db::query::expr::{captured, lambda, param};
//! use exprsql_db::query::queryset::Query;
//! use exprsql_db::value::HostType;
//!
//! let models = ModelRegistry::new().with(
//!     EntityMap::new("User")
//!         .field(FieldDef::new("Id", HostType::Int32).primary_key())
//!         .field(FieldDef::new("Name", HostType::String)),
//! );
//! let compiler = SqlCompiler::mysql(Arc::new(models));
//! let q = Query::from("User").where_(lambda(["f"], param("f").member("Name").eq(captured("name", "ann"))));
//! let compiled = q.to_sql(&compiler).unwrap();
//! assert_eq!(compiled.sql, "SELECT a.`Id`,a.`Name` FROM `User` a WHERE a.`Name`=@p0");
//! assert_eq!(compiled.parameters.names(), vec!["@p0"]);
//! ```

use std::fmt;
use std::sync::Arc;

use exprsql_core::logging::compile_span;
use exprsql_core::{EmptyInPolicy, Settings, SqlError, SqlResult, SETTINGS};

use super::bulk::write_bulk;
use super::coerce::named_field_node;
use super::deferred::DeferredProjection;
use super::dialect::{dialect_by_name, MySqlDialect, SqlDialect};
use super::expr::Expr;
use super::ir::{SqlNode, SqlOp};
use super::params::Parameters;
use super::planner::{
    table_scope, Binding, JoinPlan, Planner, TableBinding, TableRef, TableSourcePlan,
};
use super::queryset::{Assignment, Delete, MultipleQuery, Query, Statement, Update};
use super::translate::TranslationTable;
use super::writer::SqlWriter;
use crate::fields::FieldDef;
use crate::model::{EntityMap, ModelProvider};
use crate::value::{HostType, Record, Value};

/// Naming and translation choices that vary per compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// The character prefixed to every placeholder.
    pub parameter_prefix: char,
    /// The stem of anonymous placeholders.
    pub anonymous_parameter_name: String,
    /// The alias of the first table of a statement.
    pub first_table_alias: char,
    /// Membership tests over statically empty collections.
    pub empty_in_policy: EmptyInPolicy,
    /// Fold calls whose operands are all constant.
    pub fold_constant_calls: bool,
}

/// Follows the global [`SETTINGS`] once they are configured, and the
/// built-in defaults before that.
impl Default for CompileOptions {
    fn default() -> Self {
        SETTINGS
            .try_get()
            .map_or_else(|| Self::from_settings(&Settings::default()), Self::from_settings)
    }
}

impl CompileOptions {
    /// Takes the compiler-relevant part of the settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            parameter_prefix: settings.parameter_prefix,
            anonymous_parameter_name: settings.anonymous_parameter_name.clone(),
            first_table_alias: settings.first_table_alias,
            empty_in_policy: settings.empty_in_policy,
            fold_constant_calls: settings.fold_constant_calls,
        }
    }

    fn validate(&self) -> SqlResult<()> {
        if !self.first_table_alias.is_ascii_lowercase() {
            return Err(SqlError::ConfigurationError(format!(
                "first_table_alias must be a lowercase ASCII letter, got '{}'",
                self.first_table_alias
            )));
        }
        if self.anonymous_parameter_name.is_empty()
            || !self
                .anonymous_parameter_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(SqlError::ConfigurationError(format!(
                "anonymous_parameter_name must be a non-empty identifier, got '{}'",
                self.anonymous_parameter_name
            )));
        }
        Ok(())
    }
}

/// The text and bindings of one compiled statement.
#[derive(Debug, Clone)]
pub struct CompiledStatement {
    /// The SQL text.
    pub sql: String,
    /// Parameters in emission order.
    pub parameters: Parameters,
    /// Projections the caller evaluates per fetched row.
    pub deferred: Vec<DeferredProjection>,
}

impl fmt::Display for CompiledStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// The result of compiling an [`Update`].
#[derive(Debug, Clone)]
pub enum UpdatePlan {
    /// One statement.
    Single(CompiledStatement),
    /// One statement per bulk row, in row order.
    Bulk(Vec<CompiledStatement>),
}

impl UpdatePlan {
    /// The SQL text; bulk statements are joined with `;`.
    pub fn sql(&self) -> String {
        match self {
            Self::Single(statement) => statement.sql.clone(),
            Self::Bulk(statements) => statements
                .iter()
                .map(|s| s.sql.as_str())
                .collect::<Vec<_>>()
                .join(";"),
        }
    }

    /// Every parameter in statement order; shared names appear once.
    pub fn parameters(&self) -> Parameters {
        let statements = self.statements();
        let mut all = statements
            .first()
            .map(|s| s.parameters.child())
            .unwrap_or_default();
        for statement in statements {
            all.merge(&statement.parameters);
        }
        all
    }

    /// The individual statements.
    pub fn statements(&self) -> &[CompiledStatement] {
        match self {
            Self::Single(statement) => std::slice::from_ref(statement),
            Self::Bulk(statements) => statements,
        }
    }
}

/// Compiles query, update and delete builders to SQL.
#[derive(Clone)]
pub struct SqlCompiler {
    dialect: Arc<dyn SqlDialect>,
    models: Arc<dyn ModelProvider>,
    translations: Arc<TranslationTable>,
    options: CompileOptions,
}

impl fmt::Debug for SqlCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlCompiler")
            .field("dialect", &self.dialect.name())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SqlCompiler {
    /// Creates a compiler with the default translations and options; the
    /// options follow the global settings when those are configured.
    pub fn new(dialect: Arc<dyn SqlDialect>, models: Arc<dyn ModelProvider>) -> Self {
        Self {
            dialect,
            models,
            translations: TranslationTable::shared_default(),
            options: CompileOptions::default(),
        }
    }

    /// Creates a MySQL compiler.
    pub fn mysql(models: Arc<dyn ModelProvider>) -> Self {
        Self::new(Arc::new(MySqlDialect), models)
    }

    /// Creates a compiler for the dialect and options named in `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::ConfigurationError`] for an unknown dialect or
    /// unusable naming options.
    pub fn from_settings(settings: &Settings, models: Arc<dyn ModelProvider>) -> SqlResult<Self> {
        let options = CompileOptions::from_settings(settings);
        options.validate()?;
        let dialect = dialect_by_name(&settings.dialect)?;
        tracing::debug!(dialect = dialect.name(), "compiler configured from settings");
        Ok(Self::new(dialect, models).with_options(options))
    }

    /// Replaces the translation table.
    #[must_use]
    pub fn with_translations(mut self, translations: Arc<TranslationTable>) -> Self {
        self.translations = translations;
        self
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    /// The dialect.
    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    /// The model provider.
    pub fn models(&self) -> &dyn ModelProvider {
        self.models.as_ref()
    }

    /// The translation table.
    pub fn translations(&self) -> &TranslationTable {
        &self.translations
    }

    /// The options.
    pub const fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// An empty sink using this compiler's placeholder naming.
    pub fn new_parameters(&self) -> Parameters {
        Parameters::new(
            self.options.parameter_prefix,
            self.options.anonymous_parameter_name.clone(),
        )
    }

    // ── Entry points ────────────────────────────────────────────────────

    /// Compiles a SELECT.
    ///
    /// # Errors
    ///
    /// Propagates any planning or translation error.
    pub fn compile_select(&self, query: &Query) -> SqlResult<CompiledStatement> {
        let mut parameters = self.new_parameters();
        let (sql, deferred) = self.write_select(query, &mut parameters)?;
        Ok(CompiledStatement {
            sql,
            parameters,
            deferred,
        })
    }

    /// Compiles an UPDATE, or one UPDATE per row for a bulk update.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::InvalidExpression`] for an update that assigns
    /// nothing or combines a bulk update with filters or joins, and
    /// propagates any translation error.
    pub fn compile_update(&self, update: &Update) -> SqlResult<UpdatePlan> {
        let mut parameters = self.new_parameters();
        if update.is_bulk() {
            return Ok(UpdatePlan::Bulk(write_bulk(self, update, &mut parameters)?));
        }
        let sql = self.write_update(update, &mut parameters)?;
        Ok(UpdatePlan::Single(CompiledStatement {
            sql,
            parameters,
            deferred: Vec::new(),
        }))
    }

    /// Compiles a DELETE.
    ///
    /// # Errors
    ///
    /// Propagates any planning or translation error.
    pub fn compile_delete(&self, delete: &Delete) -> SqlResult<CompiledStatement> {
        let mut parameters = self.new_parameters();
        let sql = self.write_delete(delete, &mut parameters)?;
        Ok(CompiledStatement {
            sql,
            parameters,
            deferred: Vec::new(),
        })
    }

    /// Compiles a batch into one `;`-separated text with one shared sink.
    ///
    /// Statements are compiled independently, so two of them may pick the
    /// same placeholder name for different values (two key deletes both
    /// binding `@Id0`). The later one is then bound as `@Id0_{position}`.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::InvalidExpression`] for an empty batch and
    /// propagates the first error of any statement.
    pub fn compile_multiple(&self, batch: &MultipleQuery) -> SqlResult<CompiledStatement> {
        if batch.is_empty() {
            return Err(SqlError::InvalidExpression(
                "MultipleQuery has no statements".to_string(),
            ));
        }
        let mut parameters = self.new_parameters();
        let mut parts = Vec::with_capacity(batch.len());
        let mut deferred = Vec::new();
        for (position, statement) in batch.statements.iter().enumerate() {
            parameters.begin_statement(position);
            match statement {
                Statement::Select(query) => {
                    let (sql, projections) = self.write_select(query, &mut parameters)?;
                    parts.push(sql);
                    deferred.extend(projections);
                }
                Statement::Update(update) if update.is_bulk() => {
                    parts.extend(
                        write_bulk(self, update, &mut parameters)?
                            .into_iter()
                            .map(|s| s.sql),
                    );
                }
                Statement::Update(update) => parts.push(self.write_update(update, &mut parameters)?),
                Statement::Delete(delete) => parts.push(self.write_delete(delete, &mut parameters)?),
            }
        }
        tracing::debug!(
            statements = parts.len(),
            parameters = parameters.len(),
            "compiled batch"
        );
        Ok(CompiledStatement {
            sql: parts.join(";"),
            parameters,
            deferred,
        })
    }

    // ── Statement writers ───────────────────────────────────────────────

    fn write_select(
        &self,
        query: &Query,
        parameters: &mut Parameters,
    ) -> SqlResult<(String, Vec<DeferredProjection>)> {
        let span = compile_span("select", query.entity_name().unwrap_or("<derived>"));
        let _guard = span.enter();

        let mut planner = Planner::new(self);
        let mut plan = planner.plan_statement(query)?;
        let ctes = planner.take_ctes();

        let mut writer = SqlWriter::new(self.dialect(), parameters);
        let mut sql = writer.ctes(&ctes)?;
        sql.push_str(&writer.select(&plan)?);
        tracing::debug!(
            kind = "select",
            sql = %sql,
            parameters = parameters.len(),
            "compiled statement"
        );
        Ok((sql, std::mem::take(&mut plan.deferred)))
    }

    fn write_update(&self, update: &Update, parameters: &mut Parameters) -> SqlResult<String> {
        let span = compile_span("update", &update.entity);
        let _guard = span.enter();

        let mut planner = Planner::new(self);
        let alias = if update.joins.is_empty() {
            None
        } else {
            Some(planner.next_alias())
        };
        let target = planner.entity_binding(&update.entity, alias)?;
        let map = self.models.entity(&update.entity)?;

        let mut tables = vec![target.clone()];
        let mut joins = Vec::with_capacity(update.joins.len());
        for join in &update.joins {
            let (table, binding) = planner.resolve_source(&join.source, join.alias.as_deref())?;
            tables.push(binding);
            let on = planner.lambda_predicate(&join.on, &table_scope(&tables))?;
            joins.push(JoinPlan {
                kind: join.kind,
                table,
                on,
            });
        }
        let scope = table_scope(&tables);

        let assignments = plan_assignments(&mut planner, update, &map, &target, &scope)?;
        if assignments.sets.is_empty() {
            return Err(SqlError::InvalidExpression(format!(
                "UPDATE of '{}' assigns no columns",
                update.entity
            )));
        }
        let mut filters = Vec::with_capacity(update.filters.len() + 1);
        for filter in &update.filters {
            filters.push(planner.lambda_predicate(filter, &scope)?);
        }
        filters.extend(assignments.keys);
        if !update.key_rows.is_empty() {
            filters.push(key_rows_predicate(&map, &update.key_rows, target.alias.as_deref())?);
        }
        let where_ = SqlNode::conjunction(filters);
        let ctes = planner.take_ctes();

        let mut writer = SqlWriter::new(self.dialect(), parameters);
        let mut sql = writer.ctes(&ctes)?;
        sql.push_str("UPDATE ");
        sql.push_str(&writer.table(&target_ref(&map, target.alias.clone()))?);
        sql.push_str(&writer.joins(&joins)?);
        let mut sets = Vec::with_capacity(assignments.sets.len());
        for (member, value) in &assignments.sets {
            let column = writer.expr(&target.column(member)?)?;
            sets.push(format!("{column}={}", writer.expr(value)?));
        }
        sql.push_str(" SET ");
        sql.push_str(&sets.join(","));
        match &where_ {
            Some(predicate) => {
                sql.push_str(" WHERE ");
                sql.push_str(&writer.expr(predicate)?);
            }
            None => tracing::warn!(entity = %update.entity, "UPDATE without a WHERE clause"),
        }
        tracing::debug!(
            kind = "update",
            sql = %sql,
            parameters = parameters.len(),
            "compiled statement"
        );
        Ok(sql)
    }

    fn write_delete(&self, delete: &Delete, parameters: &mut Parameters) -> SqlResult<String> {
        let span = compile_span("delete", &delete.entity);
        let _guard = span.enter();

        let mut planner = Planner::new(self);
        let target = planner.entity_binding(&delete.entity, None)?;
        let map = self.models.entity(&delete.entity)?;
        let scope = table_scope(std::slice::from_ref(&target));

        let mut filters = Vec::with_capacity(delete.filters.len() + 1);
        for filter in &delete.filters {
            filters.push(planner.lambda_predicate(filter, &scope)?);
        }
        if !delete.key_rows.is_empty() {
            filters.push(key_rows_predicate(&map, &delete.key_rows, None)?);
        }
        let where_ = SqlNode::conjunction(filters);
        let ctes = planner.take_ctes();

        let mut writer = SqlWriter::new(self.dialect(), parameters);
        let mut sql = writer.ctes(&ctes)?;
        sql.push_str("DELETE FROM ");
        sql.push_str(&writer.table(&target_ref(&map, None))?);
        match &where_ {
            Some(predicate) => {
                sql.push_str(" WHERE ");
                sql.push_str(&writer.expr(predicate)?);
            }
            None => tracing::warn!(entity = %delete.entity, "DELETE without a WHERE clause"),
        }
        tracing::debug!(
            kind = "delete",
            sql = %sql,
            parameters = parameters.len(),
            "compiled statement"
        );
        Ok(sql)
    }
}

// ── Assignments ─────────────────────────────────────────────────────────

/// The planned `SET` list of a single update and the key predicates an
/// object assignment contributes to its `WHERE`.
#[derive(Debug, Default)]
pub(crate) struct AssignmentPlan {
    pub(crate) sets: Vec<(String, SqlNode)>,
    pub(crate) keys: Vec<SqlNode>,
}

impl AssignmentPlan {
    /// A later assignment of the same member replaces the earlier one.
    fn set(&mut self, member: &str, value: SqlNode) {
        match self.sets.iter_mut().find(|(m, _)| m == member) {
            Some(slot) => slot.1 = value,
            None => self.sets.push((member.to_string(), value)),
        }
    }
}

pub(crate) fn plan_assignments(
    planner: &mut Planner<'_>,
    update: &Update,
    map: &EntityMap,
    target: &TableBinding,
    scope: &[Binding],
) -> SqlResult<AssignmentPlan> {
    let mut plan = AssignmentPlan::default();
    for assignment in &update.assignments {
        match assignment {
            Assignment::Lambda(lambda) => {
                let values = planner.in_lambda(lambda, scope, |p, body| {
                    let Expr::New(members) = body else {
                        return Err(SqlError::InvalidExpression(
                            "Set expects a lambda returning new { ... }".to_string(),
                        ));
                    };
                    let mut values = Vec::with_capacity(members.len());
                    for (member, value) in members {
                        map.require_field(member)?;
                        values.push((member.clone(), p.assigned_value(value)?));
                    }
                    Ok(values)
                })?;
                for (member, value) in values {
                    plan.set(&member, value);
                }
            }
            Assignment::Field { member, value } => {
                let field = map.require_field(member)?;
                // A host value applied to every bulk row binds once, by name.
                let shared = match value {
                    Expr::Constant(host) | Expr::Captured { value: host, .. }
                        if update.is_bulk() =>
                    {
                        Some(named_field_node(field, member.clone(), host)?)
                    }
                    _ => None,
                };
                let value = match shared {
                    Some(node) => node,
                    None => planner.in_lambda(value, scope, |p, body| p.assigned_value(body))?,
                };
                plan.set(member, value);
            }
            Assignment::Value { member, value } => {
                let field = map.require_field(member)?;
                plan.set(member, named_field_node(field, member.clone(), value)?);
            }
            Assignment::Object(record) => plan_object(&mut plan, update, map, target, record)?,
        }
    }
    Ok(plan)
}

fn plan_object(
    plan: &mut AssignmentPlan,
    update: &Update,
    map: &EntityMap,
    target: &TableBinding,
    record: &Record,
) -> SqlResult<()> {
    let keys = map.key_members();
    if keys.is_empty() {
        return Err(SqlError::InvalidExpression(format!(
            "Entity '{}' has no key; an object update needs one",
            map.entity
        )));
    }
    for key in keys {
        let field = map.require_field(key)?;
        let value = required_key(record, key)?;
        let name = format!("k{key}");
        plan.keys.push(equals(target.column(key)?, named_field_node(field, name, value)?));
    }
    for (member, value) in record.iter() {
        let Some(field) = map.get_field(member) else {
            if map.fields.iter().any(|f| f.member == member) {
                continue;
            }
            return Err(SqlError::UnknownMember {
                entity: map.entity.clone(),
                member: member.to_string(),
            });
        };
        if field.primary_key || field.auto_increment || !field_included(update, member) {
            continue;
        }
        plan.set(member, named_field_node(field, member.to_string(), value)?);
    }
    Ok(())
}

/// Whether `only_fields` and `ignore_fields` admit a member.
pub(crate) fn field_included(update: &Update, member: &str) -> bool {
    (update.only_fields.is_empty() || update.only_fields.iter().any(|m| m == member))
        && !update.ignore_fields.iter().any(|m| m == member)
}

// ── Key predicates ──────────────────────────────────────────────────────

/// The predicate selecting the rows whose keys appear in `rows`.
///
/// A single key gives `Id=@Id0` for one row and `Id IN (@Id0,@Id1)` for
/// several; a composite key gives `(K1=@K1_0 AND K2=@K2_0) OR ...`.
fn key_rows_predicate(
    map: &EntityMap,
    rows: &[Record],
    alias: Option<&str>,
) -> SqlResult<SqlNode> {
    let keys = map.key_members();
    if keys.is_empty() {
        return Err(SqlError::InvalidExpression(format!(
            "Entity '{}' has no key to match rows by",
            map.entity
        )));
    }
    if rows.is_empty() {
        return Err(SqlError::EmptyCollection(format!(
            "No key rows given for '{}'",
            map.entity
        )));
    }

    if let [key] = keys.as_slice() {
        let field = map.require_field(key)?;
        let mut items = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            items.push(named_field_node(field, format!("{key}{i}"), required_key(row, key)?)?);
        }
        let column = key_column(field, alias);
        return Ok(if items.len() == 1 {
            equals(column, items.remove(0))
        } else {
            SqlNode::InList {
                operand: Box::new(column),
                items,
                negated: false,
            }
        });
    }

    let mut alternatives = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let mut parts = Vec::with_capacity(keys.len());
        for key in &keys {
            let field = map.require_field(key)?;
            let value = named_field_node(field, format!("{key}_{i}"), required_key(row, key)?)?;
            parts.push(equals(key_column(field, alias), value));
        }
        if let Some(all) = SqlNode::conjunction(parts) {
            alternatives.push(SqlNode::Group(Box::new(all)));
        }
    }
    alternatives
        .into_iter()
        .reduce(|acc, next| SqlNode::binary(SqlOp::Or, acc, next, HostType::Bool))
        .ok_or_else(|| SqlError::EmptyCollection(format!("No key rows given for '{}'", map.entity)))
}

pub(crate) fn required_key<'r>(row: &'r Record, key: &str) -> SqlResult<&'r Value> {
    row.get(key).filter(|v| !v.is_null()).ok_or_else(|| {
        SqlError::InvalidExpression(format!("Key member '{key}' is missing or null"))
    })
}

fn key_column(field: &FieldDef, alias: Option<&str>) -> SqlNode {
    SqlNode::Column {
        alias: alias.map(str::to_string),
        column: field.column.clone(),
        ty: field.host_type.clone(),
    }
}

pub(crate) fn equals(left: SqlNode, right: SqlNode) -> SqlNode {
    SqlNode::binary(SqlOp::Eq, left, right, HostType::Bool)
}

pub(crate) fn target_ref(map: &EntityMap, alias: Option<String>) -> TableRef {
    TableRef {
        source: TableSourcePlan::Named {
            name: map.table.clone(),
            schema: map.schema.clone(),
        },
        alias,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelRegistry;
    use crate::query::expr::{captured, constant, lambda, new_object, null, param};
    use crate::value::NativeType;

    fn compiler() -> SqlCompiler {
        let models = ModelRegistry::new()
            .with(
                EntityMap::new("User")
                    .field(FieldDef::new("Id", HostType::Int32).primary_key().auto_increment())
                    .field(FieldDef::new("Name", HostType::String))
                    .field(FieldDef::new("CompanyId", HostType::Int32))
                    .field(FieldDef::new("Secret", HostType::String).ignored()),
            )
            .with(
                EntityMap::new("Company")
                    .field(FieldDef::new("Id", HostType::Int32).primary_key())
                    .field(FieldDef::new("Title", HostType::String)),
            )
            .with(
                EntityMap::new("OrderDetail")
                    .field(FieldDef::new("OrderId", HostType::Int32).primary_key())
                    .field(FieldDef::new("ProductId", HostType::Int32).primary_key())
                    .field(FieldDef::new("Quantity", HostType::Int32)),
            );
        SqlCompiler::mysql(Arc::new(models))
    }

    #[test]
    fn test_options_from_settings() {
        let mut settings = Settings::default();
        settings.parameter_prefix = '?';
        settings.anonymous_parameter_name = "v".to_string();
        let compiler = SqlCompiler::from_settings(&settings, Arc::new(ModelRegistry::new())).unwrap();
        assert_eq!(compiler.options().parameter_prefix, '?');
        let mut params = compiler.new_parameters();
        assert_eq!(params.add_anonymous(Value::Int(1), NativeType::Int32), "?v0");
    }

    #[test]
    fn test_from_settings_rejects_unknown_dialect() {
        let mut settings = Settings::default();
        settings.dialect = "oracle".to_string();
        let err = SqlCompiler::from_settings(&settings, Arc::new(ModelRegistry::new())).unwrap_err();
        assert!(matches!(err, SqlError::ConfigurationError(_)));
    }

    #[test]
    fn test_from_settings_rejects_bad_alias() {
        let mut settings = Settings::default();
        settings.first_table_alias = '1';
        assert!(SqlCompiler::from_settings(&settings, Arc::new(ModelRegistry::new())).is_err());
    }

    #[test]
    fn test_update_set_value_is_named() {
        let plan = Update::entity("User")
            .set_value("Name", "ann")
            .where_(lambda(["f"], param("f").member("Id").eq(constant(3))))
            .to_sql(&compiler())
            .unwrap();
        assert_eq!(plan.sql(), "UPDATE `User` SET `Name`=@Name WHERE `Id`=3");
        assert_eq!(plan.parameters().names(), vec!["@Name"]);
    }

    #[test]
    fn test_update_lambda_constant_binds_positionally() {
        let plan = Update::entity("User")
            .set(lambda(
                ["f"],
                new_object([("Name", constant("x")), ("CompanyId", null())]),
            ))
            .where_keys(vec![Record::new().with("Id", 4)])
            .to_sql(&compiler())
            .unwrap();
        assert_eq!(
            plan.sql(),
            "UPDATE `User` SET `Name`=@p0,`CompanyId`=NULL WHERE `Id`=@Id0"
        );
        assert_eq!(plan.parameters().names(), vec!["@p0", "@Id0"]);
    }

    #[test]
    fn test_update_later_assignment_wins() {
        let plan = Update::entity("User")
            .set_value("Name", "a")
            .set_field("Name", captured("name", "b"))
            .where_keys(vec![Record::new().with("Id", 1)])
            .to_sql(&compiler())
            .unwrap();
        assert_eq!(plan.sql(), "UPDATE `User` SET `Name`=@p0 WHERE `Id`=@Id0");
    }

    #[test]
    fn test_update_with_join_aliases_target() {
        let plan = Update::entity("User")
            .inner_join(
                "Company",
                lambda(["u", "c"], param("u").member("CompanyId").eq(param("c").member("Id"))),
            )
            .set_field(
                "Name",
                lambda(["u", "c"], param("c").member("Title")),
            )
            .to_sql(&compiler())
            .unwrap();
        assert_eq!(
            plan.sql(),
            "UPDATE `User` a INNER JOIN `Company` b ON a.`CompanyId`=b.`Id` SET a.`Name`=b.`Title`"
        );
    }

    #[test]
    fn test_update_object_skips_key_and_auto_increment() {
        let plan = Update::entity("User")
            .set_object(
                Record::new()
                    .with("Id", 9)
                    .with("Name", "bob")
                    .with("CompanyId", 2)
                    .with("Secret", "x"),
            )
            .ignore_fields(["CompanyId"])
            .to_sql(&compiler())
            .unwrap();
        assert_eq!(plan.sql(), "UPDATE `User` SET `Name`=@Name WHERE `Id`=@kId");
        assert_eq!(plan.parameters().names(), vec!["@Name", "@kId"]);
    }

    #[test]
    fn test_update_without_assignments_fails() {
        let err = Update::entity("User").to_sql(&compiler()).unwrap_err();
        assert!(matches!(err, SqlError::InvalidExpression(_)));
    }

    #[test]
    fn test_update_unknown_member() {
        let err = Update::entity("User")
            .set_value("Nope", 1)
            .to_sql(&compiler())
            .unwrap_err();
        assert!(matches!(err, SqlError::UnknownMember { .. }));
    }

    #[test]
    fn test_delete_single_key_rows() {
        let one = Delete::entity("User")
            .where_keys(vec![Record::new().with("Id", 1)])
            .to_sql(&compiler())
            .unwrap();
        assert_eq!(one.sql, "DELETE FROM `User` WHERE `Id`=@Id0");

        let many = Delete::entity("User")
            .where_keys(vec![Record::new().with("Id", 1), Record::new().with("Id", 2)])
            .to_sql(&compiler())
            .unwrap();
        assert_eq!(many.sql, "DELETE FROM `User` WHERE `Id` IN (@Id0,@Id1)");
        assert_eq!(many.parameters.len(), 2);
    }

    #[test]
    fn test_delete_composite_key_rows() {
        let stmt = Delete::entity("OrderDetail")
            .where_keys(vec![
                Record::new().with("OrderId", 1).with("ProductId", 7),
                Record::new().with("OrderId", 2).with("ProductId", 8),
            ])
            .to_sql(&compiler())
            .unwrap();
        assert_eq!(
            stmt.sql,
            "DELETE FROM `OrderDetail` WHERE (`OrderId`=@OrderId_0 AND `ProductId`=@ProductId_0) \
             OR (`OrderId`=@OrderId_1 AND `ProductId`=@ProductId_1)"
        );
    }

    #[test]
    fn test_delete_key_row_missing_key() {
        let err = Delete::entity("User")
            .where_keys(vec![Record::new().with("Name", "x")])
            .to_sql(&compiler())
            .unwrap_err();
        assert!(matches!(err, SqlError::InvalidExpression(_)));
    }

    #[test]
    fn test_multiple_shares_sink() {
        let batch = MultipleQuery::new()
            .select(Query::from("User").where_(lambda(
                ["f"],
                param("f").member("Name").eq(captured("n", "a")),
            )))
            .delete(Delete::entity("User").where_(lambda(
                ["f"],
                param("f").member("Name").eq(captured("n", "b")),
            )));
        let compiled = batch.to_sql(&compiler()).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT a.`Id`,a.`Name`,a.`CompanyId` FROM `User` a WHERE a.`Name`=@p0;\
             DELETE FROM `User` WHERE `Name`=@p1"
        );
        assert_eq!(compiled.parameters.names(), vec!["@p0", "@p1"]);
    }

    #[test]
    fn test_multiple_empty_fails() {
        assert!(MultipleQuery::new().to_sql(&compiler()).is_err());
    }

    #[test]
    fn test_compile_is_deterministic() {
        let q = Query::from("User").where_(lambda(["f"], param("f").member("Id").gt(captured("id", 2))));
        let c = compiler();
        let first = q.to_sql(&c).unwrap();
        let second = q.to_sql(&c).unwrap();
        assert_eq!(first.sql, second.sql);
        assert_eq!(first.parameters, second.parameters);
    }
}
