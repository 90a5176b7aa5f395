//! Compilers built without explicit options follow the global settings.
//!
//! Kept in its own test binary: the global can be configured only once per
//! process.

mod common;

use common::{compiler, m};
use exprsql_core::{settings_loader, SETTINGS};
use exprsql_db::query::expr::{captured, lambda};
use exprsql_db::query::queryset::Query;

#[test]
fn test_default_options_follow_configured_settings() {
    let settings = settings_loader::from_toml_str(
        r#"
        anonymous_parameter_name = "arg"
        first_table_alias = "t"
        "#,
    )
    .unwrap();
    SETTINGS.configure(settings);

    let compiled = Query::from("User")
        .where_(lambda(["f"], m("f", "Name").eq(captured("name", "kevin"))))
        .select(lambda(["f"], m("f", "Id")))
        .to_sql(&compiler())
        .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT t.`Id` FROM `User` t WHERE t.`Name`=@arg0"
    );
    assert_eq!(compiled.parameters.names(), vec!["@arg0"]);
}
