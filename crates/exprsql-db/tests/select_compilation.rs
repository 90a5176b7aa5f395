//! SELECT compilation against the sample model.
//!
//! These tests cover the full pipeline from builder to text:
//! - Constants inlined as literals, captured values bound as parameters
//! - Membership tests over arrays, captured lists and subqueries
//! - String, date and math translations
//! - Joins, grouping, ordering and paging
//! - Derived tables and recursive CTEs
//! - Projections deferred to the client

mod common;

use chrono::{Duration, NaiveDate};
use common::{compiler, m};
use exprsql_core::settings_loader;
use exprsql_core::{EmptyInPolicy, SqlError};
use exprsql_db::query::compiler::SqlCompiler;
use exprsql_db::query::cte::CteTable;
use exprsql_db::query::deferred::Row;
use exprsql_db::query::expr::{
    array, captured, cond, constant, enum_value, lambda, new_object, null, param, static_call,
    static_member, subquery,
};
use exprsql_db::query::queryset::Query;
use exprsql_db::value::{NativeType, Value};

// ═══════════════════════════════════════════════════════════════════════
// VALUES AND PARAMETERS
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_default_projection_lists_mapped_columns() {
    let compiled = Query::from("Order").to_sql(&compiler()).unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`Id`,a.`OrderNo`,a.`BuyerId`,a.`SellerId`,a.`TotalAmount`,a.`CreatedAt` FROM `sys_order` a"
    );
    assert!(compiled.parameters.is_empty());
}

#[test]
fn test_captured_value_is_parameter() {
    let compiled = Query::from("User")
        .where_(lambda(["f"], m("f", "Name").eq(captured("name", "kevin"))))
        .select(lambda(
            ["f"],
            new_object([("Id", m("f", "Id")), ("Name", m("f", "Name"))]),
        ))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`Id`,a.`Name` FROM `User` a WHERE a.`Name`=@p0"
    );
    assert_eq!(compiled.parameters.names(), vec!["@p0"]);
    assert_eq!(compiled.parameters.values(), vec![&Value::from("kevin")]);
}

#[test]
fn test_constants_are_inlined() {
    let compiled = Query::from("User")
        .where_(lambda(
            ["f"],
            m("f", "Age")
                .gt(constant(18))
                .and(m("f", "IsEnabled")),
        ))
        .select(lambda(["f"], m("f", "Name")))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`Name` FROM `User` a WHERE a.`Age`>18 AND a.`IsEnabled`=1"
    );
    assert!(compiled.parameters.is_empty());
}

#[test]
fn test_static_constant_is_folded() {
    let compiled = Query::from("User")
        .select(lambda(
            ["f"],
            new_object([
                ("Id", m("f", "Id")),
                ("Birthday", static_member("DateOnly", "MinValue")),
            ]),
        ))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`Id`,'0001-01-01' AS `Birthday` FROM `User` a"
    );
    assert!(compiled.parameters.is_empty());
}

#[test]
fn test_enum_constant_and_captured_enum() {
    let compiled = Query::from("Company")
        .where_(lambda(
            ["c"],
            m("c", "Nature").eq(enum_value("CompanyNature", "State", 1)),
        ))
        .select(lambda(["c"], m("c", "Id")))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`Id` FROM `Company` a WHERE a.`Nature`='State'"
    );

    let nature = Value::Enum(exprsql_db::EnumValue::new("CompanyNature", "Private", 2));
    let compiled = Query::from("Company")
        .where_(lambda(["c"], m("c", "Nature").ne(captured("nature", nature))))
        .select(lambda(["c"], m("c", "Id")))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`Id` FROM `Company` a WHERE a.`Nature`<>@p0"
    );
    let bound = compiled.parameters.get("@p0").unwrap();
    assert_eq!(bound.value, Value::from("Private"));
    assert_eq!(bound.native_type, NativeType::String);
}

#[test]
fn test_null_comparison() {
    let compiled = Query::from("User")
        .where_(lambda(["f"], m("f", "CompanyId").eq(null())))
        .where_(lambda(["f"], m("f", "Name").ne(null())))
        .select(lambda(["f"], m("f", "Id")))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`Id` FROM `User` a WHERE a.`CompanyId` IS NULL AND a.`Name` IS NOT NULL"
    );
}

#[test]
fn test_compilation_is_deterministic() {
    let query = Query::from("User")
        .where_(lambda(["f"], m("f", "Age").ge(captured("age", 30))))
        .order_by(lambda(["f"], m("f", "Name")));
    let c = compiler();
    let first = query.to_sql(&c).unwrap();
    let second = query.to_sql(&c).unwrap();
    assert_eq!(first.sql, second.sql);
    assert_eq!(first.parameters, second.parameters);
}

// ═══════════════════════════════════════════════════════════════════════
// MEMBERSHIP
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_constant_array_membership() {
    let compiled = Query::from("User")
        .where_(lambda(
            ["f"],
            array(vec![constant(1), constant(2)]).call("Contains", vec![m("f", "Id")]),
        ))
        .select(lambda(["f"], m("f", "Name")))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`Name` FROM `User` a WHERE a.`Id` IN (1,2)"
    );
    assert!(compiled.parameters.is_empty());
}

#[test]
fn test_captured_list_membership() {
    let ids = vec![Value::Int(4), Value::Int(5)];
    let compiled = Query::from("User")
        .where_(lambda(
            ["f"],
            captured("ids", ids).call("Contains", vec![m("f", "Id")]),
        ))
        .select(lambda(["f"], m("f", "Name")))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`Name` FROM `User` a WHERE a.`Id` IN (@p0,@p1)"
    );
    assert_eq!(
        compiled.parameters.values(),
        vec![&Value::Int(4), &Value::Int(5)]
    );
}

#[test]
fn test_empty_membership_default_policy() {
    let empty = || captured("ids", Vec::<Value>::new());
    let compiled = Query::from("User")
        .where_(lambda(["f"], empty().call("Contains", vec![m("f", "Id")])))
        .select(lambda(["f"], m("f", "Id")))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`Id` FROM `User` a WHERE a.`Id` IN (NULL)"
    );

    let negated = Query::from("User")
        .where_(lambda(
            ["f"],
            !empty().call("Contains", vec![m("f", "Id")]),
        ))
        .select(lambda(["f"], m("f", "Id")))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(negated.sql, "SELECT a.`Id` FROM `User` a WHERE 1=1");

    let not_in = Query::from("User")
        .where_(lambda(
            ["f"],
            static_call("Sql", "NotIn", vec![m("f", "Id"), empty()]),
        ))
        .select(lambda(["f"], m("f", "Id")))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(not_in.sql, "SELECT a.`Id` FROM `User` a WHERE 1=1");
}

#[test]
fn test_empty_membership_reject_policy() {
    let settings = settings_loader::from_toml_str("empty_in_policy = \"reject\"").unwrap();
    assert_eq!(settings.empty_in_policy, EmptyInPolicy::Reject);
    let compiler =
        SqlCompiler::from_settings(&settings, std::sync::Arc::new(common::models())).unwrap();
    let err = Query::from("User")
        .where_(lambda(
            ["f"],
            captured("ids", Vec::<Value>::new()).call("Contains", vec![m("f", "Id")]),
        ))
        .to_sql(&compiler)
        .unwrap_err();
    assert!(matches!(err, SqlError::EmptyCollection(_)));
}

#[test]
fn test_in_subquery() {
    let state_companies = Query::from("Company")
        .where_(lambda(
            ["c"],
            m("c", "Nature").eq(enum_value("CompanyNature", "State", 1)),
        ))
        .select(lambda(["c"], m("c", "Id")));
    let compiled = Query::from("User")
        .where_(lambda(
            ["f"],
            static_call(
                "Sql",
                "In",
                vec![m("f", "CompanyId"), subquery(state_companies)],
            ),
        ))
        .select(lambda(["f"], m("f", "Name")))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`Name` FROM `User` a WHERE a.`CompanyId` IN \
         (SELECT b.`Id` FROM `Company` b WHERE b.`Nature`='State')"
    );
}

#[test]
fn test_exists_subquery_continues_aliases() {
    let orders = Query::from("Order")
        .where_(lambda(["o"], m("o", "BuyerId").eq(m("u", "Id"))));
    let compiled = Query::from("User")
        .where_(lambda(
            ["u"],
            static_call("Sql", "Exists", vec![subquery(orders)]),
        ))
        .select(lambda(["u"], m("u", "Name")))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`Name` FROM `User` a WHERE \
         EXISTS(SELECT 1 FROM `sys_order` b WHERE b.`BuyerId`=a.`Id`)"
    );
}

// ═══════════════════════════════════════════════════════════════════════
// TRANSLATIONS
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_string_predicates() {
    let compiled = Query::from("User")
        .where_(lambda(
            ["f"],
            m("f", "Name").call("Contains", vec![captured("keyword", "ev")]),
        ))
        .where_(lambda(
            ["f"],
            m("f", "Name").call("StartsWith", vec![constant("K")]),
        ))
        .select(lambda(["f"], m("f", "Id")))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`Id` FROM `User` a WHERE a.`Name` LIKE CONCAT('%',@p0,'%') \
         AND a.`Name` LIKE CONCAT('K','%')"
    );
}

#[test]
fn test_string_functions_in_projection() {
    let compiled = Query::from("User")
        .select(lambda(
            ["f"],
            new_object([
                ("Upper", m("f", "Name").call("ToUpper", vec![])),
                (
                    "Head",
                    m("f", "Name").call("Substring", vec![constant(0), constant(3)]),
                ),
                ("Len", m("f", "Name").member("Length")),
            ]),
        ))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT UPPER(a.`Name`) AS `Upper`,SUBSTR(a.`Name`,1,3) AS `Head`,\
         CHAR_LENGTH(a.`Name`) AS `Len` FROM `User` a"
    );
}

#[test]
fn test_concat_merges_constant_runs() {
    let label = m("f", "Name") + constant("-") + constant("x") + m("f", "Age");
    let compiled = Query::from("User")
        .select(lambda(["f"], new_object([("Label", label)])))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT CONCAT(a.`Name`,'-x',a.`Age`) AS `Label` FROM `User` a"
    );
}

#[test]
fn test_string_compare() {
    let compiled = Query::from("User")
        .where_(lambda(
            ["f"],
            static_call("String", "Compare", vec![m("f", "Name"), constant("m")]).gt(constant(0)),
        ))
        .select(lambda(["f"], m("f", "Id")))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`Id` FROM `User` a WHERE \
         (CASE WHEN a.`Name`='m' THEN 0 WHEN a.`Name`>'m' THEN 1 ELSE -1 END)>0"
    );
}

#[test]
fn test_conditional_and_coalesce() {
    let compiled = Query::from("Order")
        .select(lambda(
            ["o"],
            new_object([
                (
                    "Size",
                    cond(
                        m("o", "TotalAmount").ge(constant(100)),
                        constant("large"),
                        constant("small"),
                    ),
                ),
                ("Seller", m("o", "SellerId").coalesce(m("o", "BuyerId"))),
            ]),
        ))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT (CASE WHEN a.`TotalAmount`>=100 THEN 'large' ELSE 'small' END) AS `Size`,\
         COALESCE(a.`SellerId`,a.`BuyerId`) AS `Seller` FROM `sys_order` a"
    );
}

#[test]
fn test_date_arithmetic() {
    let compiled = Query::from("Order")
        .where_(lambda(
            ["o"],
            m("o", "CreatedAt")
                .call("AddDays", vec![constant(7)])
                .gt(static_member("DateTime", "Now")),
        ))
        .where_(lambda(
            ["o"],
            m("o", "CreatedAt")
                .call("AddMonths", vec![constant(-3)])
                .lt(captured(
                    "since",
                    NaiveDate::from_ymd_opt(2024, 1, 1)
                        .unwrap()
                        .and_hms_opt(0, 0, 0)
                        .unwrap(),
                )),
        ))
        .select(lambda(["o"], m("o", "Id")))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`Id` FROM `sys_order` a WHERE DATE_ADD(a.`CreatedAt`,INTERVAL 7 DAY)>NOW() \
         AND DATE_SUB(a.`CreatedAt`,INTERVAL 3 MONTH)<@p0"
    );
    assert_eq!(
        compiled.parameters.get("@p0").unwrap().native_type,
        NativeType::DateTime
    );
}

#[test]
fn test_unsupported_method_names_the_call() {
    let err = Query::from("User")
        .where_(lambda(
            ["f"],
            m("f", "Name").call("Normalize", vec![]).eq(constant("x")),
        ))
        .to_sql(&compiler())
        .unwrap_err();
    assert!(matches!(err, SqlError::UnsupportedTranslation(_)));
    assert!(err.to_string().contains("Normalize"));
}

#[test]
fn test_trim_and_lower_in_projection() {
    let compiled = Query::from("User")
        .select(lambda(
            ["f"],
            new_object([
                ("Trimmed", m("f", "Name").call("Trim", vec![])),
                ("Left", m("f", "Name").call("TrimStart", vec![])),
                ("Right", m("f", "Name").call("TrimEnd", vec![])),
                ("Lower", m("f", "Name").call("ToLower", vec![])),
            ]),
        ))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT TRIM(a.`Name`) AS `Trimmed`,LTRIM(a.`Name`) AS `Left`,\
         RTRIM(a.`Name`) AS `Right`,LOWER(a.`Name`) AS `Lower` FROM `User` a"
    );
}

#[test]
fn test_instance_compare_to() {
    let compiled = Query::from("User")
        .where_(lambda(
            ["f"],
            m("f", "Name")
                .call("CompareTo", vec![constant("m")])
                .lt(constant(0)),
        ))
        .select(lambda(["f"], m("f", "Id")))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`Id` FROM `User` a WHERE \
         (CASE WHEN a.`Name`='m' THEN 0 WHEN a.`Name`>'m' THEN 1 ELSE -1 END)<0"
    );
}

#[test]
fn test_today_and_utc_now() {
    let compiled = Query::from("Order")
        .where_(lambda(
            ["o"],
            m("o", "CreatedAt").ge(static_member("DateTime", "Today")),
        ))
        .where_(lambda(
            ["o"],
            m("o", "CreatedAt").lt(static_member("DateTime", "UtcNow")),
        ))
        .select(lambda(["o"], m("o", "Id")))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`Id` FROM `sys_order` a WHERE a.`CreatedAt`>=CURDATE() \
         AND a.`CreatedAt`<UTC_TIMESTAMP()"
    );
    assert!(compiled.parameters.is_empty());
}

#[test]
fn test_leap_year_and_days_in_month() {
    let year = m("o", "CreatedAt").member("Year");
    let month = m("o", "CreatedAt").member("Month");
    let compiled = Query::from("Order")
        .where_(lambda(
            ["o"],
            static_call("DateTime", "IsLeapYear", vec![year.clone()]),
        ))
        .select(lambda(
            ["o"],
            new_object([(
                "Days",
                static_call("DateTime", "DaysInMonth", vec![year, month]),
            )]),
        ))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT (CASE WHEN MONTH(a.`CreatedAt`)=2 THEN (CASE WHEN \
         (YEAR(a.`CreatedAt`)%4=0 AND YEAR(a.`CreatedAt`)%100<>0) OR YEAR(a.`CreatedAt`)%400=0 \
         THEN 29 ELSE 28 END) WHEN MONTH(a.`CreatedAt`) IN (4,6,9,11) THEN 30 ELSE 31 END) \
         AS `Days` FROM `sys_order` a WHERE \
         ((YEAR(a.`CreatedAt`)%4=0 AND YEAR(a.`CreatedAt`)%100<>0) OR YEAR(a.`CreatedAt`)%400=0)"
    );
}

#[test]
fn test_time_span_arithmetic() {
    let since = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let compiled = Query::from("Order")
        .select(lambda(
            ["o"],
            new_object([
                ("Later", m("o", "CreatedAt") + captured("span", Duration::hours(2))),
                ("Earlier", m("o", "CreatedAt") - captured("span", Duration::hours(2))),
                (
                    "Elapsed",
                    m("o", "CreatedAt").call("Subtract", vec![captured("since", since)]),
                ),
            ]),
        ))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT ADDTIME(a.`CreatedAt`,@p0) AS `Later`,SUBTIME(a.`CreatedAt`,@p1) AS `Earlier`,\
         TIMEDIFF(a.`CreatedAt`,@p2) AS `Elapsed` FROM `sys_order` a"
    );
    assert_eq!(
        compiled.parameters.values(),
        vec![
            &Value::TimeSpan(Duration::hours(2)),
            &Value::TimeSpan(Duration::hours(2)),
            &Value::DateTime(since),
        ]
    );
}

#[test]
fn test_substring_index_overflow_is_rejected() {
    let err = Query::from("User")
        .select(lambda(
            ["f"],
            m("f", "Name").call("Substring", vec![constant(i64::MAX)]),
        ))
        .to_sql(&compiler())
        .unwrap_err();
    assert!(matches!(err, SqlError::InvalidExpression(_)));
    assert!(err.to_string().contains("out of range"));
}

// ═══════════════════════════════════════════════════════════════════════
// JOINS, GROUPING AND PAGING
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_join_order_and_paging() {
    let compiled = Query::from("Order")
        .inner_join(
            "User",
            lambda(["o", "u"], m("o", "BuyerId").eq(m("u", "Id"))),
        )
        .where_(lambda(["o", "u"], m("u", "Name").eq(captured("name", "kevin"))))
        .order_by_desc(lambda(["o", "u"], m("o", "CreatedAt")))
        .select(lambda(
            ["o", "u"],
            new_object([("OrderNo", m("o", "OrderNo")), ("BuyerName", m("u", "Name"))]),
        ))
        .skip(20)
        .take(10)
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`OrderNo`,b.`Name` AS `BuyerName` FROM `sys_order` a \
         INNER JOIN `User` b ON a.`BuyerId`=b.`Id` WHERE b.`Name`=@p0 \
         ORDER BY a.`CreatedAt` DESC LIMIT 10 OFFSET 20"
    );
}

#[test]
fn test_group_by_with_aggregates() {
    let compiled = Query::from("OrderDetail")
        .group_by(lambda(["d"], m("d", "OrderId")))
        .having(lambda(["g"], param("g").call("Count", vec![]).gt(constant(1))))
        .select(lambda(
            ["g"],
            new_object([
                ("OrderId", m("g", "Grouping")),
                (
                    "Total",
                    param("g").call("Sum", vec![lambda(["d"], m("d", "Amount"))]),
                ),
                ("Lines", param("g").call("Count", vec![])),
            ]),
        ))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`OrderId`,SUM(a.`Amount`) AS `Total`,COUNT(1) AS `Lines` \
         FROM `OrderDetail` a GROUP BY a.`OrderId` HAVING COUNT(1)>1"
    );
}

#[test]
fn test_derived_table_restarts_aliases() {
    let inner = Query::from("Order").where_(lambda(["o"], m("o", "BuyerId").eq(captured("buyer", 3))));
    let compiled = Query::from(inner)
        .select(lambda(["x"], m("x", "OrderNo")))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`OrderNo` FROM (SELECT a.`Id`,a.`OrderNo`,a.`BuyerId`,a.`SellerId`,\
         a.`TotalAmount`,a.`CreatedAt` FROM `sys_order` a WHERE a.`BuyerId`=@p0) a"
    );
}

#[test]
fn test_count_distinct() {
    let compiled = Query::from("Order")
        .where_(lambda(["o"], m("o", "TotalAmount").gt(constant(0))))
        .select(lambda(
            ["o"],
            new_object([(
                "Buyers",
                static_call("Sql", "CountDistinct", vec![m("o", "BuyerId")]),
            )]),
        ))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT COUNT(DISTINCT a.`BuyerId`) AS `Buyers` FROM `sys_order` a \
         WHERE a.`TotalAmount`>0"
    );
}

#[test]
fn test_select_flatten() {
    let compiled = Query::from("Order")
        .inner_join(
            "User",
            lambda(["o", "u"], m("o", "BuyerId").eq(m("u", "Id"))),
        )
        .select_flatten(lambda(
            ["o", "u"],
            new_object([
                ("OrderNo", m("o", "OrderNo").call("Trim", vec![])),
                ("BuyerName", m("u", "Name")),
            ]),
        ))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`Id`,TRIM(a.`OrderNo`) AS `OrderNo`,a.`BuyerId`,a.`SellerId`,\
         a.`TotalAmount`,a.`CreatedAt`,b.`Name` AS `BuyerName` FROM `sys_order` a \
         INNER JOIN `User` b ON a.`BuyerId`=b.`Id`"
    );
}

#[test]
fn test_unbound_lambda_parameter_is_ambiguous() {
    let extra = Query::from("User")
        .where_(lambda(["f", "g"], m("g", "Id").eq(constant(1))))
        .to_sql(&compiler())
        .unwrap_err();
    assert!(matches!(extra, SqlError::AmbiguousColumn(_)));

    let stray = Query::from("User")
        .where_(lambda(["f"], m("x", "Id").eq(constant(1))))
        .to_sql(&compiler())
        .unwrap_err();
    assert!(matches!(stray, SqlError::AmbiguousColumn(_)));
    assert!(stray.to_string().contains("'x'"));
}

// ═══════════════════════════════════════════════════════════════════════
// CTE
// ═══════════════════════════════════════════════════════════════════════

fn menu_columns(p: &str) -> exprsql_db::query::expr::Expr {
    new_object([
        ("Id", m(p, "Id")),
        ("Name", m(p, "Name")),
        ("ParentId", m(p, "ParentId")),
    ])
}

#[test]
fn test_recursive_cte() {
    let roots = Query::from("Menu")
        .where_(lambda(["m"], m("m", "ParentId").eq(null())))
        .select(lambda(["m"], menu_columns("m")));
    let tree = CteTable::new("MenuTree", roots);
    let children = Query::from("Menu")
        .inner_join(
            tree.self_ref(),
            lambda(["m", "t"], m("m", "ParentId").eq(m("t", "Id"))),
        )
        .select(lambda(["m", "t"], menu_columns("m")));
    let tree = tree.union_all_recursive(children);

    let compiled = Query::from(&tree)
        .where_(lambda(
            ["t"],
            m("t", "Name").call("StartsWith", vec![constant("Sys")]),
        ))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "WITH RECURSIVE `MenuTree`(`Id`,`Name`,`ParentId`) AS \n(\n\
         SELECT a.`Id`,a.`Name`,a.`ParentId` FROM `Menu` a WHERE a.`ParentId` IS NULL UNION ALL\n\
         SELECT a.`Id`,a.`Name`,a.`ParentId` FROM `Menu` a INNER JOIN `MenuTree` b ON a.`ParentId`=b.`Id`\n\
         )\n\
         SELECT a.`Id`,a.`Name`,a.`ParentId` FROM `MenuTree` a WHERE a.`Name` LIKE CONCAT('Sys','%')"
    );
}

#[test]
fn test_cte_declared_column_count_mismatch() {
    let cte = CteTable::new(
        "Names",
        Query::from("Menu").select(lambda(["m"], m("m", "Name"))),
    )
    .columns(["Id", "Name"]);
    let err = Query::from(&cte).to_sql(&compiler()).unwrap_err();
    assert!(matches!(err, SqlError::InvalidExpression(_)));
}

#[test]
fn test_several_plain_ctes() {
    let big_orders = CteTable::new(
        "BigOrders",
        Query::from("Order")
            .where_(lambda(["o"], m("o", "TotalAmount").gt(constant(100))))
            .select(lambda(
                ["o"],
                new_object([("Id", m("o", "Id")), ("BuyerId", m("o", "BuyerId"))]),
            )),
    );
    let buyers = CteTable::new(
        "Buyers",
        Query::from("User")
            .where_(lambda(["u"], m("u", "IsEnabled")))
            .select(lambda(
                ["u"],
                new_object([("Id", m("u", "Id")), ("Name", m("u", "Name"))]),
            )),
    );

    let compiled = Query::from(&big_orders)
        .inner_join(
            &buyers,
            lambda(["o", "b"], m("o", "BuyerId").eq(m("b", "Id"))),
        )
        .select(lambda(
            ["o", "b"],
            new_object([("Id", m("o", "Id")), ("Name", m("b", "Name"))]),
        ))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "WITH `BigOrders`(`Id`,`BuyerId`) AS \n(\n\
         SELECT a.`Id`,a.`BuyerId` FROM `sys_order` a WHERE a.`TotalAmount`>100\n\
         ),\n\
         `Buyers`(`Id`,`Name`) AS \n(\n\
         SELECT a.`Id`,a.`Name` FROM `User` a WHERE a.`IsEnabled`=1\n\
         )\n\
         SELECT a.`Id`,b.`Name` FROM `BigOrders` a INNER JOIN `Buyers` b ON a.`BuyerId`=b.`Id`"
    );
}

// ═══════════════════════════════════════════════════════════════════════
// DEFERRED PROJECTIONS
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_format_projection_is_deferred() {
    let label = static_call(
        "String",
        "Format",
        vec![constant("{0}#{1}"), m("f", "Name"), m("f", "Age")],
    );
    let compiled = Query::from("User")
        .select(lambda(
            ["f"],
            new_object([("Id", m("f", "Id")), ("Label", label)]),
        ))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT a.`Id`,a.`Name` AS `Label_Name`,a.`Age` AS `Label_Age` FROM `User` a"
    );
    assert_eq!(compiled.deferred.len(), 1);
    let projection = &compiled.deferred[0];
    assert_eq!(projection.alias(), "Label");

    let row = Row::new(
        vec!["Id".into(), "Label_Name".into(), "Label_Age".into()],
        vec![Value::Int(1), Value::from("ann"), Value::Int(30)],
    );
    assert_eq!(projection.evaluate(&row).unwrap(), Value::from("ann#30"));
}

#[test]
fn test_format_in_predicate_is_rejected() {
    let err = Query::from("User")
        .where_(lambda(
            ["f"],
            static_call("String", "Format", vec![constant("{0}"), m("f", "Name")])
                .eq(constant("x")),
        ))
        .to_sql(&compiler())
        .unwrap_err();
    assert!(matches!(err, SqlError::UnsupportedTranslation(_)));
}
